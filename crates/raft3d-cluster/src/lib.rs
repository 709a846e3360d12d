//! raft3d-cluster: growing the voter set.
//!
//! ```text
//! Leader
//!   └── ClusterMembership
//!       ├── validates the join request
//!       ├── fails fast when not leader
//!       └── name → raft id (NodeIdMap), then add-voter through the log
//!
//! Starting follower
//!   └── join_cluster() → POST /join on the leader's HTTP API
//! ```

pub mod client;
pub mod membership;

pub use client::{JoinError, join_cluster};
pub use membership::{
    ClusterMembership, DEFAULT_JOIN_TIMEOUT, JoinRequest, JoinResponse, MembershipError,
};
