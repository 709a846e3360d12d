//! redb table definitions shared by the Raft storage components.
//!
//! All tables live in one `raft.redb` file per node. Values are JSON.

use openraft::{ErrorSubject, ErrorVerb, StorageError};
use redb::TableDefinition;

/// Log entries keyed by log index.
pub const LOG: TableDefinition<u64, &[u8]> = TableDefinition::new("raft_log");

/// Log metadata: vote, committed id, last purged id.
pub const LOG_META: TableDefinition<&str, &[u8]> = TableDefinition::new("raft_meta");

/// The latest state machine snapshot (meta + image).
pub const SNAPSHOT: TableDefinition<&str, &[u8]> = TableDefinition::new("raft_snapshot");

/// Raft id → string node name.
pub const NODE_IDS: TableDefinition<u64, &str> = TableDefinition::new("raft_node_map");

pub(crate) fn read_err(e: impl std::fmt::Display) -> StorageError<u64> {
    StorageError::from_io_error(
        ErrorSubject::Store,
        ErrorVerb::Read,
        std::io::Error::other(e.to_string()),
    )
}

pub(crate) fn write_err(e: impl std::fmt::Display) -> StorageError<u64> {
    StorageError::from_io_error(
        ErrorSubject::Store,
        ErrorVerb::Write,
        std::io::Error::other(e.to_string()),
    )
}
