//! Error types for the store facade.

use std::time::Duration;

use raft3d_raft::LogError;
use raft3d_state::{CodecError, Grams, JobStatus};
use thiserror::Error;

/// Result type alias for facade operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors surfaced by the store facade.
///
/// Validation variants are raised before anything reaches the log.
/// Submission variants come from the log; a `CommitTimeout` means the
/// outcome is unknown.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("insufficient filament: requested {requested} g, available {available} g")]
    InsufficientFilament { requested: Grams, available: Grams },

    #[error("invalid status transition from {from} to {to}")]
    InvalidTransition { from: JobStatus, to: JobStatus },

    #[error("not the leader; current leader: {}", .leader.as_deref().unwrap_or("unknown"))]
    NotLeader { leader: Option<String> },

    #[error("commit not confirmed within {0:?}; outcome unknown")]
    CommitTimeout(Duration),

    #[error("consensus unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Codec(#[from] CodecError),
}

impl StoreError {
    pub(crate) fn not_found(kind: &'static str, id: &str) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    /// True for submission failures the caller may retry, possibly
    /// against another node.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::NotLeader { .. } | Self::CommitTimeout(_) | Self::Unavailable(_)
        )
    }

    /// True for errors detected before submission.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::Validation(_)
                | Self::NotFound { .. }
                | Self::InsufficientFilament { .. }
                | Self::InvalidTransition { .. }
        )
    }
}

impl From<LogError> for StoreError {
    fn from(e: LogError) -> Self {
        match e {
            LogError::NotLeader { leader } => Self::NotLeader { leader },
            LogError::Timeout(d) => Self::CommitTimeout(d),
            LogError::Unavailable(msg) => Self::Unavailable(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_errors_map_to_retryable_submission_errors() {
        let cases = [
            LogError::NotLeader {
                leader: Some("127.0.0.1:12001".into()),
            },
            LogError::Timeout(Duration::from_secs(10)),
            LogError::Unavailable("quorum lost".into()),
        ];
        for e in cases {
            let err = StoreError::from(e);
            assert!(err.is_retryable(), "{err}");
            assert!(!err.is_validation(), "{err}");
        }
    }

    #[test]
    fn validation_errors_are_not_retryable() {
        let err = StoreError::InvalidTransition {
            from: JobStatus::Done,
            to: JobStatus::Running,
        };
        assert!(!err.is_retryable());
        assert!(err.is_validation());
        assert_eq!(err.to_string(), "invalid status transition from Done to Running");
    }

    #[test]
    fn not_leader_names_the_leader() {
        let err = StoreError::from(LogError::NotLeader {
            leader: Some("10.0.0.2:12000".into()),
        });
        assert!(err.to_string().contains("10.0.0.2:12000"));
    }
}
