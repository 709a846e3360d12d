//! Replicated state machine over `DomainState`.
//!
//! openraft drives `apply` from a single task, in commit order. Domain
//! state, the last applied log id and the last membership live together
//! behind one `RwLock`, so a snapshot or a read never sees half of an
//! entry and a restore replaces all three at once.
//!
//! Snapshots are the JSON image of `DomainState`. The latest one is kept
//! in redb so a restarted node can restore it before log replay.

use std::io::Cursor;
use std::sync::{Arc, PoisonError, RwLock};

use openraft::storage::{RaftSnapshotBuilder, RaftStateMachine};
use openraft::{
    BasicNode, Entry, EntryPayload, LogId, Snapshot, SnapshotMeta, StorageError,
    StoredMembership,
};
use raft3d_state::{Command, DomainState};
use redb::{Database, ReadableDatabase};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::tables::{SNAPSHOT, read_err, write_err};
use crate::typ::{Response, TypeConfig};

const CURRENT_SNAPSHOT_KEY: &str = "current";

/// Everything a replica has built from the log.
#[derive(Debug, Default)]
struct Replica {
    domain: DomainState,
    last_applied: Option<LogId<u64>>,
    last_membership: StoredMembership<u64, BasicNode>,
}

/// Snapshot as persisted in redb.
#[derive(Serialize, Deserialize)]
struct StoredSnapshot {
    meta: SnapshotMeta<u64, BasicNode>,
    data: Vec<u8>,
}

impl StoredSnapshot {
    fn into_snapshot(self) -> Snapshot<TypeConfig> {
        Snapshot {
            meta: self.meta,
            snapshot: Box::new(Cursor::new(self.data)),
        }
    }
}

/// Read-only handle to a replica's domain state.
#[derive(Clone)]
pub struct StateReader {
    replica: Arc<RwLock<Replica>>,
}

impl StateReader {
    /// Run `f` against the current state under the shared lock.
    pub fn read<R>(&self, f: impl FnOnce(&DomainState) -> R) -> R {
        let replica = self.replica.read().unwrap_or_else(PoisonError::into_inner);
        f(&replica.domain)
    }

    /// Index of the last entry applied on this replica.
    pub fn last_applied_index(&self) -> Option<u64> {
        let replica = self.replica.read().unwrap_or_else(PoisonError::into_inner);
        replica.last_applied.map(|id| id.index)
    }
}

/// Raft state machine applying raft3d commands.
pub struct StateMachine {
    db: Arc<Database>,
    replica: Arc<RwLock<Replica>>,
}

/// Snapshot builder sharing the state machine's replica.
pub struct SmSnapshotBuilder {
    db: Arc<Database>,
    replica: Arc<RwLock<Replica>>,
}

impl StateMachine {
    /// Open the state machine, restoring the last persisted snapshot.
    ///
    /// A snapshot that cannot be decoded is an error: the node must not
    /// start with partial state.
    pub fn open(db: Arc<Database>) -> Result<Self, StorageError<u64>> {
        let txn = db.begin_write().map_err(write_err)?;
        txn.open_table(SNAPSHOT).map_err(write_err)?;
        txn.commit().map_err(write_err)?;

        let replica = match load_snapshot(&db)? {
            Some(stored) => {
                let domain: DomainState = serde_json::from_slice(&stored.data).map_err(|e| {
                    error!(snapshot_id = %stored.meta.snapshot_id, error = %e, "persisted snapshot is corrupt");
                    read_err(e)
                })?;
                let (printers, filaments, jobs) = domain.counts();
                info!(
                    snapshot_id = %stored.meta.snapshot_id,
                    printers,
                    filaments,
                    jobs,
                    "restored state from snapshot"
                );
                Replica {
                    domain,
                    last_applied: stored.meta.last_log_id,
                    last_membership: stored.meta.last_membership,
                }
            }
            None => Replica::default(),
        };

        Ok(Self {
            db,
            replica: Arc::new(RwLock::new(replica)),
        })
    }

    /// Handle for reading domain state from outside the Raft task.
    pub fn reader(&self) -> StateReader {
        StateReader {
            replica: Arc::clone(&self.replica),
        }
    }
}

fn load_snapshot(db: &Database) -> Result<Option<StoredSnapshot>, StorageError<u64>> {
    let txn = db.begin_read().map_err(read_err)?;
    let table = txn.open_table(SNAPSHOT).map_err(read_err)?;
    match table.get(CURRENT_SNAPSHOT_KEY).map_err(read_err)? {
        Some(val) => Ok(Some(serde_json::from_slice(val.value()).map_err(read_err)?)),
        None => Ok(None),
    }
}

fn save_snapshot(db: &Database, stored: &StoredSnapshot) -> Result<(), StorageError<u64>> {
    let data = serde_json::to_vec(stored).map_err(write_err)?;
    let txn = db.begin_write().map_err(write_err)?;
    {
        let mut table = txn.open_table(SNAPSHOT).map_err(write_err)?;
        table
            .insert(CURRENT_SNAPSHOT_KEY, data.as_slice())
            .map_err(write_err)?;
    }
    txn.commit().map_err(write_err)?;
    Ok(())
}

impl RaftStateMachine<TypeConfig> for StateMachine {
    type SnapshotBuilder = SmSnapshotBuilder;

    async fn applied_state(
        &mut self,
    ) -> Result<(Option<LogId<u64>>, StoredMembership<u64, BasicNode>), StorageError<u64>> {
        let replica = self.replica.read().map_err(|_| read_err("replica lock poisoned"))?;
        Ok((replica.last_applied, replica.last_membership.clone()))
    }

    async fn apply<I>(&mut self, entries: I) -> Result<Vec<Response>, StorageError<u64>>
    where
        I: IntoIterator<Item = Entry<TypeConfig>> + Send,
        I::IntoIter: Send,
    {
        let mut responses = Vec::new();
        let mut replica = self
            .replica
            .write()
            .map_err(|_| write_err("replica lock poisoned"))?;

        for entry in entries {
            let log_id = entry.log_id;

            if replica.last_applied.is_some_and(|applied| log_id.index <= applied.index) {
                debug!(index = log_id.index, "entry already applied, skipping");
                responses.push(Response { success: true });
                continue;
            }

            let success = match entry.payload {
                EntryPayload::Blank => true,
                EntryPayload::Normal(req) => match Command::decode(&req.command) {
                    Ok(command) => {
                        debug!(index = log_id.index, kind = command.kind(), "applying entry");
                        replica.domain.apply(command);
                        true
                    }
                    Err(e) => {
                        warn!(index = log_id.index, error = %e, "skipping undecodable log entry");
                        false
                    }
                },
                EntryPayload::Membership(membership) => {
                    replica.last_membership = StoredMembership::new(Some(log_id), membership);
                    true
                }
            };

            replica.last_applied = Some(log_id);
            responses.push(Response { success });
        }

        Ok(responses)
    }

    async fn get_snapshot_builder(&mut self) -> Self::SnapshotBuilder {
        SmSnapshotBuilder {
            db: Arc::clone(&self.db),
            replica: Arc::clone(&self.replica),
        }
    }

    async fn begin_receiving_snapshot(
        &mut self,
    ) -> Result<Box<Cursor<Vec<u8>>>, StorageError<u64>> {
        Ok(Box::new(Cursor::new(Vec::new())))
    }

    async fn install_snapshot(
        &mut self,
        meta: &SnapshotMeta<u64, BasicNode>,
        snapshot: Box<Cursor<Vec<u8>>>,
    ) -> Result<(), StorageError<u64>> {
        let data = snapshot.into_inner();

        // Decode completely before touching live state.
        let domain: DomainState = serde_json::from_slice(&data).map_err(|e| {
            error!(snapshot_id = %meta.snapshot_id, error = %e, "received snapshot is corrupt");
            read_err(e)
        })?;

        save_snapshot(
            &self.db,
            &StoredSnapshot {
                meta: meta.clone(),
                data,
            },
        )?;

        let (printers, filaments, jobs) = domain.counts();
        {
            let mut replica = self
                .replica
                .write()
                .map_err(|_| write_err("replica lock poisoned"))?;
            *replica = Replica {
                domain,
                last_applied: meta.last_log_id,
                last_membership: meta.last_membership.clone(),
            };
        }

        info!(snapshot_id = %meta.snapshot_id, printers, filaments, jobs, "installed snapshot");
        Ok(())
    }

    async fn get_current_snapshot(
        &mut self,
    ) -> Result<Option<Snapshot<TypeConfig>>, StorageError<u64>> {
        Ok(load_snapshot(&self.db)?.map(StoredSnapshot::into_snapshot))
    }
}

impl RaftSnapshotBuilder<TypeConfig> for SmSnapshotBuilder {
    async fn build_snapshot(&mut self) -> Result<Snapshot<TypeConfig>, StorageError<u64>> {
        let (data, last_applied, membership) = {
            let replica = self
                .replica
                .read()
                .map_err(|_| read_err("replica lock poisoned"))?;
            let data = serde_json::to_vec(&replica.domain).map_err(read_err)?;
            (data, replica.last_applied, replica.last_membership.clone())
        };

        let snapshot_id = format!("snap-{}", last_applied.map_or(0, |l| l.index));
        let stored = StoredSnapshot {
            meta: SnapshotMeta {
                last_log_id: last_applied,
                last_membership: membership,
                snapshot_id,
            },
            data,
        };
        save_snapshot(&self.db, &stored)?;

        debug!(snapshot_id = %stored.meta.snapshot_id, bytes = stored.data.len(), "built snapshot");
        Ok(stored.into_snapshot())
    }
}
