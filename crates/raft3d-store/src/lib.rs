//! raft3d store facade.
//!
//! `Store` is the one entry point for mutations (validate, encode, append
//! to the consensus log, wait for commit) and for reads, which go straight
//! to the local replica.

pub mod error;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use store::{DEFAULT_COMMIT_TIMEOUT, Store};
