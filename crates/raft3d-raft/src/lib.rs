// openraft's StorageError is large; returning it by value is fine here.
#![allow(clippy::result_large_err)]

//! raft3d consensus glue: openraft + redb.
//!
//! openraft runs the protocol; this crate supplies the pieces it needs
//! from the application and exposes the narrow `ConsensusLog` seam the
//! store facade talks to.
//!
//! # Architecture
//!
//! - **`typ`**: Type configuration (`TypeConfig`, `Request`, `Response`)
//! - **`log_store`**: Raft log storage backed by redb
//! - **`state_machine`**: Applies committed commands to `DomainState`, builds and restores snapshots
//! - **`http`**: Small hyper HTTP/1 client shared by the transport and the join client
//! - **`network`** / **`server`**: JSON-over-HTTP transport for inter-node Raft RPCs
//! - **`node_map`**: String node names ↔ u64 Raft ids
//! - **`consensus`**: `ConsensusLog` trait and its openraft implementation

pub mod consensus;
pub mod http;
pub mod log_store;
pub mod network;
pub mod node_map;
pub mod server;
pub mod state_machine;
pub mod tables;
pub mod typ;

pub use consensus::{ConsensusLog, LogError, RaftLog};
pub use http::{HttpChannel, TransportError};
pub use log_store::LogStore;
pub use network::{NetworkConnection, NetworkFactory};
pub use node_map::NodeIdMap;
pub use server::{MAX_RPC_BODY_BYTES, SNAPSHOT_CHUNK_BYTES, raft_router, snapshot_rpc_body_bound};
pub use state_machine::{StateMachine, StateReader};
pub use typ::{Raft3dRaft, Request, Response, TypeConfig};
