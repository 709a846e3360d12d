//! Log commands and their wire codec.
//!
//! Every mutation of a replica travels through the consensus log as one
//! `Command`, encoded as `{"op": "<KIND>", "payload": ...}` JSON. The
//! consensus layer treats the encoded bytes as opaque.

use serde::{Deserialize, Serialize};

use crate::error::{CodecError, CodecResult};
use crate::types::*;

/// A replicated mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Command {
    /// Insert or overwrite a printer.
    AddPrinter(Printer),
    /// Remove a printer by id. Absent ids are a no-op.
    DeletePrinter(PrinterId),
    /// Insert a spool as given.
    AddFilament(Filament),
    /// Insert a job; the applier forces it to `Queued`.
    AddJob(PrintJob),
    /// Overwrite a job's status without re-validating the transition.
    UpdateJobStatus { job_id: JobId, status: JobStatus },
    /// Subtract consumed weight from a spool, clamped at zero.
    ReduceFilament { filament_id: FilamentId, weight: Grams },
}

impl Command {
    /// Wire tag of this command, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Command::AddPrinter(_) => "ADD_PRINTER",
            Command::DeletePrinter(_) => "DELETE_PRINTER",
            Command::AddFilament(_) => "ADD_FILAMENT",
            Command::AddJob(_) => "ADD_JOB",
            Command::UpdateJobStatus { .. } => "UPDATE_JOB_STATUS",
            Command::ReduceFilament { .. } => "REDUCE_FILAMENT",
        }
    }

    /// Encode into the bytes carried by a log entry.
    pub fn encode(&self) -> CodecResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| CodecError::Encode(e.to_string()))
    }

    /// Decode a log entry payload.
    ///
    /// Unknown `op` tags, malformed payloads and non-JSON input all come
    /// back as `CodecError::Decode`.
    pub fn decode(bytes: &[u8]) -> CodecResult<Self> {
        serde_json::from_slice(bytes).map_err(|e| CodecError::Decode(e.to_string()))
    }
}
