//! Error types for the raft3d command codec.

use thiserror::Error;

/// Result type alias for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors raised while turning commands into log bytes and back.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("failed to encode command: {0}")]
    Encode(String),

    #[error("failed to decode command: {0}")]
    Decode(String),
}
