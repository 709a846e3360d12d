//! Raft type configuration for raft3d.
//!
//! Log entries carry opaque codec bytes rather than a typed command, so
//! an entry that cannot be decoded still replicates and is skipped the
//! same way on every replica.

use std::io::Cursor;

use openraft::TokioRuntime;
use raft3d_state::{CodecResult, Command};

/// Client write submitted to the Raft cluster: one encoded `Command`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Request {
    pub command: Vec<u8>,
}

impl Request {
    /// Wrap a command in a log payload.
    pub fn from_command(command: &Command) -> CodecResult<Self> {
        Ok(Self {
            command: command.encode()?,
        })
    }
}

/// Response returned after an entry is applied to the state machine.
///
/// `success` is false when the entry could not be decoded and was skipped.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Response {
    pub success: bool,
}

openraft::declare_raft_types!(
    /// raft3d Raft type configuration.
    pub TypeConfig:
        D = Request,
        R = Response,
        NodeId = u64,
        Node = openraft::BasicNode,
        Entry = openraft::Entry<TypeConfig>,
        SnapshotData = Cursor<Vec<u8>>,
        AsyncRuntime = TokioRuntime,
);

/// Convenience alias for the Raft instance.
pub type Raft3dRaft = openraft::Raft<TypeConfig>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_carries_encoded_command() {
        let cmd = Command::DeletePrinter("p1".to_string());
        let req = Request::from_command(&cmd).unwrap();
        assert_eq!(Command::decode(&req.command).unwrap(), cmd);

        let json = serde_json::to_string(&req).unwrap();
        let back: Request = serde_json::from_str(&json).unwrap();
        assert_eq!(back, req);
    }
}
