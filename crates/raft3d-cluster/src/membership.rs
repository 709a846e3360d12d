//! Leader-side handling of join requests.

use std::sync::Arc;
use std::time::Duration;

use raft3d_raft::{ConsensusLog, LogError, NodeIdMap};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

/// How long an add-voter may take, including the new node catching up.
pub const DEFAULT_JOIN_TIMEOUT: Duration = Duration::from_secs(30);

/// A node asking to become a voter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinRequest {
    pub node_id: String,
    pub raft_address: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinResponse {
    pub node_id: String,
    pub raft_id: u64,
}

#[derive(Debug, Error)]
pub enum MembershipError {
    #[error("invalid join request: {0}")]
    Validation(String),

    #[error("not the leader; current leader: {}", .leader.as_deref().unwrap_or("unknown"))]
    NotLeader { leader: Option<String> },

    #[error("membership change not confirmed within {0:?}")]
    Timeout(Duration),

    #[error("consensus unavailable: {0}")]
    Unavailable(String),

    #[error("node id map: {0}")]
    NodeMap(String),
}

impl From<LogError> for MembershipError {
    fn from(e: LogError) -> Self {
        match e {
            LogError::NotLeader { leader } => Self::NotLeader { leader },
            LogError::Timeout(d) => Self::Timeout(d),
            LogError::Unavailable(msg) => Self::Unavailable(msg),
        }
    }
}

/// Adds joining nodes as voting members.
#[derive(Clone)]
pub struct ClusterMembership {
    log: Arc<dyn ConsensusLog>,
    ids: Arc<NodeIdMap>,
    join_timeout: Duration,
}

impl ClusterMembership {
    pub fn new(log: Arc<dyn ConsensusLog>, ids: Arc<NodeIdMap>) -> Self {
        Self {
            log,
            ids,
            join_timeout: DEFAULT_JOIN_TIMEOUT,
        }
    }

    pub fn with_join_timeout(mut self, timeout: Duration) -> Self {
        self.join_timeout = timeout;
        self
    }

    /// Add the requesting node as a voter.
    ///
    /// Refuses without touching the log when this node is not the
    /// leader. Re-joining an existing voter at the same address succeeds.
    pub async fn join(&self, req: JoinRequest) -> Result<JoinResponse, MembershipError> {
        if req.node_id.trim().is_empty() {
            return Err(MembershipError::Validation("node_id must not be empty".into()));
        }
        if req.raft_address.trim().is_empty() {
            return Err(MembershipError::Validation(
                "raft_address must not be empty".into(),
            ));
        }

        if !self.log.is_leader() {
            let leader = self.log.current_leader_address();
            warn!(node_id = %req.node_id, leader = ?leader, "join rejected: not leader");
            return Err(MembershipError::NotLeader { leader });
        }

        let raft_id = self
            .ids
            .get_or_insert(&req.node_id)
            .map_err(|e| MembershipError::NodeMap(e.to_string()))?;

        self.log
            .add_voting_member(raft_id, req.raft_address.clone(), self.join_timeout)
            .await?;

        info!(
            node_id = %req.node_id,
            raft_id,
            raft_address = %req.raft_address,
            "node joined"
        );
        Ok(JoinResponse {
            node_id: req.node_id,
            raft_id,
        })
    }
}
