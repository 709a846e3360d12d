//! The consensus log seam.
//!
//! The store facade and the membership adapter only ever see
//! `ConsensusLog`: append an opaque payload and learn its commit index,
//! ask who leads, add a voter. `RaftLog` is the openraft-backed
//! implementation used by a running node.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use openraft::error::{ClientWriteError, ForwardToLeader, RaftError};
use openraft::{BasicNode, ChangeMembers, ServerState};
use thiserror::Error;
use tracing::{debug, info};

use crate::typ::{Raft3dRaft, Request};

/// Why an append or membership change did not (provably) commit.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LogError {
    #[error("not the leader; current leader: {}", .leader.as_deref().unwrap_or("unknown"))]
    NotLeader { leader: Option<String> },

    /// The outcome is unknown: the entry may still commit later.
    #[error("not committed within {0:?}")]
    Timeout(Duration),

    #[error("consensus unavailable: {0}")]
    Unavailable(String),
}

/// Ordered, replicated log of opaque payloads.
#[async_trait]
pub trait ConsensusLog: Send + Sync {
    /// Append `payload` and wait until it is committed and applied locally.
    /// Returns the entry's log index.
    async fn append(&self, payload: Vec<u8>, timeout: Duration) -> Result<u64, LogError>;

    fn is_leader(&self) -> bool;

    /// Address of the current leader, if one is known.
    fn current_leader_address(&self) -> Option<String>;

    /// Add `node_id` at `address` as a voting member. Leader only.
    async fn add_voting_member(
        &self,
        node_id: u64,
        address: String,
        timeout: Duration,
    ) -> Result<(), LogError>;
}

/// `ConsensusLog` over an openraft instance.
#[derive(Clone)]
pub struct RaftLog {
    raft: Arc<Raft3dRaft>,
}

type WriteError = RaftError<u64, ClientWriteError<u64, BasicNode>>;

impl RaftLog {
    pub fn new(raft: Arc<Raft3dRaft>) -> Self {
        Self { raft }
    }

    pub fn raft(&self) -> &Arc<Raft3dRaft> {
        &self.raft
    }

    fn node_address(&self, id: u64) -> Option<String> {
        let metrics = self.raft.metrics().borrow().clone();
        metrics
            .membership_config
            .membership()
            .get_node(&id)
            .map(|n| n.addr.clone())
    }

    fn is_voter(&self, id: u64) -> bool {
        let metrics = self.raft.metrics().borrow().clone();
        let is_voter = metrics
            .membership_config
            .membership()
            .voter_ids()
            .any(|v| v == id);
        is_voter
    }

    fn map_write_err(&self, e: WriteError) -> LogError {
        match e {
            RaftError::APIError(ClientWriteError::ForwardToLeader(fwd)) => {
                let leader = leader_hint(&fwd)
                    .or_else(|| fwd.leader_id.and_then(|id| self.node_address(id)));
                LogError::NotLeader { leader }
            }
            RaftError::APIError(ClientWriteError::ChangeMembershipError(e)) => {
                LogError::Unavailable(e.to_string())
            }
            RaftError::Fatal(f) => LogError::Unavailable(f.to_string()),
        }
    }
}

/// Leader address carried in a forward-to-leader rejection.
pub fn leader_hint(fwd: &ForwardToLeader<u64, BasicNode>) -> Option<String> {
    fwd.leader_node.as_ref().map(|n| n.addr.clone())
}

#[async_trait]
impl ConsensusLog for RaftLog {
    async fn append(&self, payload: Vec<u8>, timeout: Duration) -> Result<u64, LogError> {
        let req = Request { command: payload };
        match tokio::time::timeout(timeout, self.raft.client_write(req)).await {
            Ok(Ok(resp)) => {
                debug!(index = resp.log_id.index, "entry committed");
                Ok(resp.log_id.index)
            }
            Ok(Err(e)) => Err(self.map_write_err(e)),
            Err(_) => Err(LogError::Timeout(timeout)),
        }
    }

    fn is_leader(&self) -> bool {
        let metrics = self.raft.metrics().borrow().clone();
        metrics.state == ServerState::Leader
    }

    fn current_leader_address(&self) -> Option<String> {
        let leader = self.raft.metrics().borrow().current_leader?;
        self.node_address(leader)
    }

    async fn add_voting_member(
        &self,
        node_id: u64,
        address: String,
        timeout: Duration,
    ) -> Result<(), LogError> {
        if self.is_leader()
            && self.is_voter(node_id)
            && self.node_address(node_id).as_deref() == Some(address.as_str())
        {
            debug!(node_id, %address, "already a voter");
            return Ok(());
        }

        let change = async {
            self.raft
                .add_learner(node_id, BasicNode::new(address.clone()), true)
                .await
                .map_err(|e| self.map_write_err(e))?;

            let voters = BTreeSet::from([node_id]);
            self.raft
                .change_membership(ChangeMembers::AddVoterIds(voters), false)
                .await
                .map_err(|e| self.map_write_err(e))?;
            Ok::<(), LogError>(())
        };

        tokio::time::timeout(timeout, change)
            .await
            .map_err(|_| LogError::Timeout(timeout))??;

        info!(node_id, %address, "added voting member");
        Ok(())
    }
}
