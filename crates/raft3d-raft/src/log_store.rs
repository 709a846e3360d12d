//! Raft log storage backed by redb.
//!
//! Entries and the small pieces of protocol metadata (vote, committed
//! id, last purged id) are JSON-serialized into the tables declared in
//! `tables`. Every mutation is a single redb write transaction.

use std::fmt::Debug;
use std::ops::RangeBounds;
use std::sync::Arc;

use openraft::storage::{LogFlushed, LogState, RaftLogReader, RaftLogStorage};
use openraft::{Entry, LogId, StorageError, Vote};
use redb::{Database, ReadableDatabase, ReadableTable};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::tables::{LOG, LOG_META, read_err, write_err};
use crate::typ::TypeConfig;

const VOTE_KEY: &str = "vote";
const COMMITTED_KEY: &str = "committed";
const LAST_PURGED_KEY: &str = "last_purged";

/// Raft log storage backed by redb.
pub struct LogStore {
    db: Arc<Database>,
}

/// Read-only view handed to openraft's replication tasks.
pub struct LogReader {
    db: Arc<Database>,
}

impl LogStore {
    /// Open the log tables in the given database, creating them if needed.
    pub fn new(db: Arc<Database>) -> Result<Self, StorageError<u64>> {
        let txn = db.begin_write().map_err(write_err)?;
        txn.open_table(LOG).map_err(write_err)?;
        txn.open_table(LOG_META).map_err(write_err)?;
        txn.commit().map_err(write_err)?;

        Ok(Self { db })
    }

    fn put_meta<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StorageError<u64>> {
        let data = serde_json::to_vec(value).map_err(write_err)?;
        let txn = self.db.begin_write().map_err(write_err)?;
        {
            let mut table = txn.open_table(LOG_META).map_err(write_err)?;
            table.insert(key, data.as_slice()).map_err(write_err)?;
        }
        txn.commit().map_err(write_err)?;
        Ok(())
    }

    fn get_meta<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StorageError<u64>> {
        let txn = self.db.begin_read().map_err(read_err)?;
        let table = txn.open_table(LOG_META).map_err(read_err)?;
        match table.get(key).map_err(read_err)? {
            Some(val) => Ok(Some(serde_json::from_slice(val.value()).map_err(read_err)?)),
            None => Ok(None),
        }
    }

    /// Delete every entry whose index falls in `range`. Returns the count.
    fn remove_entries<R>(&self, range: R) -> Result<usize, StorageError<u64>>
    where
        R: RangeBounds<u64> + 'static,
    {
        let txn = self.db.begin_write().map_err(write_err)?;
        let removed;
        {
            let mut table = txn.open_table(LOG).map_err(write_err)?;
            let keys: Vec<u64> = table
                .range(range)
                .map_err(write_err)?
                .map(|item| item.map(|(k, _)| k.value()))
                .collect::<Result<_, _>>()
                .map_err(write_err)?;

            removed = keys.len();
            for key in keys {
                table.remove(key).map_err(write_err)?;
            }
        }
        txn.commit().map_err(write_err)?;
        Ok(removed)
    }
}

impl RaftLogReader<TypeConfig> for LogReader {
    async fn try_get_log_entries<RB: RangeBounds<u64> + Clone + Debug + Send>(
        &mut self,
        range: RB,
    ) -> Result<Vec<Entry<TypeConfig>>, StorageError<u64>> {
        let txn = self.db.begin_read().map_err(read_err)?;
        let table = txn.open_table(LOG).map_err(read_err)?;

        let entries = table
            .range(range)
            .map_err(read_err)?
            .map(|item| {
                let (_, val) = item.map_err(read_err)?;
                serde_json::from_slice::<Entry<TypeConfig>>(val.value()).map_err(read_err)
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }
}

impl RaftLogReader<TypeConfig> for LogStore {
    async fn try_get_log_entries<RB: RangeBounds<u64> + Clone + Debug + Send>(
        &mut self,
        range: RB,
    ) -> Result<Vec<Entry<TypeConfig>>, StorageError<u64>> {
        self.get_log_reader().await.try_get_log_entries(range).await
    }
}

impl RaftLogStorage<TypeConfig> for LogStore {
    type LogReader = LogReader;

    async fn get_log_state(&mut self) -> Result<LogState<TypeConfig>, StorageError<u64>> {
        let last_log_id = {
            let txn = self.db.begin_read().map_err(read_err)?;
            let table = txn.open_table(LOG).map_err(read_err)?;
            match table.last().map_err(read_err)? {
                Some((_, val)) => {
                    let entry: Entry<TypeConfig> =
                        serde_json::from_slice(val.value()).map_err(read_err)?;
                    Some(entry.log_id)
                }
                None => None,
            }
        };

        let last_purged_log_id: Option<LogId<u64>> = self.get_meta(LAST_PURGED_KEY)?;

        Ok(LogState {
            last_purged_log_id,
            // An empty table after a purge still ends at the purged id.
            last_log_id: last_log_id.or(last_purged_log_id),
        })
    }

    async fn get_log_reader(&mut self) -> Self::LogReader {
        LogReader {
            db: Arc::clone(&self.db),
        }
    }

    async fn save_vote(&mut self, vote: &Vote<u64>) -> Result<(), StorageError<u64>> {
        self.put_meta(VOTE_KEY, vote)?;
        debug!(?vote, "saved vote");
        Ok(())
    }

    async fn read_vote(&mut self) -> Result<Option<Vote<u64>>, StorageError<u64>> {
        self.get_meta(VOTE_KEY)
    }

    async fn save_committed(
        &mut self,
        committed: Option<LogId<u64>>,
    ) -> Result<(), StorageError<u64>> {
        if let Some(log_id) = committed {
            self.put_meta(COMMITTED_KEY, &log_id)?;
        }
        Ok(())
    }

    async fn read_committed(&mut self) -> Result<Option<LogId<u64>>, StorageError<u64>> {
        self.get_meta(COMMITTED_KEY)
    }

    async fn append<I>(
        &mut self,
        entries: I,
        callback: LogFlushed<TypeConfig>,
    ) -> Result<(), StorageError<u64>>
    where
        I: IntoIterator<Item = Entry<TypeConfig>> + Send,
        I::IntoIter: Send,
    {
        let txn = self.db.begin_write().map_err(write_err)?;
        let mut count = 0usize;
        {
            let mut table = txn.open_table(LOG).map_err(write_err)?;
            for entry in entries {
                let data = serde_json::to_vec(&entry).map_err(write_err)?;
                table
                    .insert(entry.log_id.index, data.as_slice())
                    .map_err(write_err)?;
                count += 1;
            }
        }
        txn.commit().map_err(write_err)?;
        debug!(count, "appended log entries");

        callback.log_io_completed(Ok(()));
        Ok(())
    }

    async fn truncate(&mut self, log_id: LogId<u64>) -> Result<(), StorageError<u64>> {
        let removed = self.remove_entries(log_id.index..)?;
        debug!(index = log_id.index, removed, "truncated log");
        Ok(())
    }

    async fn purge(&mut self, log_id: LogId<u64>) -> Result<(), StorageError<u64>> {
        self.put_meta(LAST_PURGED_KEY, &log_id)?;
        let removed = self.remove_entries(..=log_id.index)?;
        debug!(index = log_id.index, removed, "purged log");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use openraft::{CommittedLeaderId, EntryPayload};
    use redb::backends::InMemoryBackend;

    use crate::typ::Request;

    fn test_db() -> Arc<Database> {
        let backend = InMemoryBackend::new();
        Arc::new(Database::builder().create_with_backend(backend).unwrap())
    }

    fn put_raw(db: &Database, index: u64) {
        let entry = Entry::<TypeConfig> {
            log_id: LogId::new(CommittedLeaderId::new(1, 1), index),
            payload: EntryPayload::Normal(Request {
                command: format!("cmd-{index}").into_bytes(),
            }),
        };
        let data = serde_json::to_vec(&entry).unwrap();
        let txn = db.begin_write().unwrap();
        {
            let mut table = txn.open_table(LOG).unwrap();
            table.insert(index, data.as_slice()).unwrap();
        }
        txn.commit().unwrap();
    }

    #[tokio::test]
    async fn empty_log_state() {
        let mut store = LogStore::new(test_db()).unwrap();
        let state = store.get_log_state().await.unwrap();
        assert!(state.last_log_id.is_none());
        assert!(state.last_purged_log_id.is_none());
    }

    #[tokio::test]
    async fn vote_save_and_read() {
        let mut store = LogStore::new(test_db()).unwrap();
        assert!(store.read_vote().await.unwrap().is_none());

        let vote = Vote::new(3, 1);
        store.save_vote(&vote).await.unwrap();
        assert_eq!(store.read_vote().await.unwrap(), Some(vote));
    }

    #[tokio::test]
    async fn committed_save_and_read() {
        let mut store = LogStore::new(test_db()).unwrap();
        assert!(store.read_committed().await.unwrap().is_none());

        let log_id = LogId::new(CommittedLeaderId::new(1, 1), 5);
        store.save_committed(Some(log_id)).await.unwrap();
        assert_eq!(store.read_committed().await.unwrap(), Some(log_id));
    }

    // LogFlushed::new is crate-private in openraft, so entries are written
    // straight into the table and read back through the reader.
    #[tokio::test]
    async fn reader_returns_requested_range() {
        let db = test_db();
        let mut store = LogStore::new(Arc::clone(&db)).unwrap();
        for i in 1..=5 {
            put_raw(&db, i);
        }

        let entries = store.try_get_log_entries(2..4).await.unwrap();
        let indexes: Vec<u64> = entries.iter().map(|e| e.log_id.index).collect();
        assert_eq!(indexes, vec![2, 3]);

        let state = store.get_log_state().await.unwrap();
        assert_eq!(state.last_log_id.unwrap().index, 5);
    }

    #[tokio::test]
    async fn truncate_drops_tail() {
        let db = test_db();
        let mut store = LogStore::new(Arc::clone(&db)).unwrap();
        for i in 1..=5 {
            put_raw(&db, i);
        }

        store
            .truncate(LogId::new(CommittedLeaderId::new(1, 1), 3))
            .await
            .unwrap();
        let entries = store.try_get_log_entries(..).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(store.get_log_state().await.unwrap().last_log_id.unwrap().index, 2);
    }

    #[tokio::test]
    async fn purge_drops_head_and_remembers_it() {
        let db = test_db();
        let mut store = LogStore::new(Arc::clone(&db)).unwrap();
        for i in 1..=3 {
            put_raw(&db, i);
        }

        let purged = LogId::new(CommittedLeaderId::new(1, 1), 3);
        store.purge(purged).await.unwrap();

        assert!(store.try_get_log_entries(..).await.unwrap().is_empty());
        let state = store.get_log_state().await.unwrap();
        assert_eq!(state.last_purged_log_id, Some(purged));
        assert_eq!(state.last_log_id, Some(purged));
    }
}
