//! raft3d node assembly.
//!
//! The `raft3d` binary is a thin wrapper over `node::start`; the pieces
//! live here so integration tests can run real nodes in-process.

pub mod config;
pub mod node;

pub use config::{Cli, NodeConfig, RaftTuning};
pub use node::{RunningNode, start};
