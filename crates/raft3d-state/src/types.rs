//! Domain types for the raft3d replicated store.
//!
//! These types are both the in-memory state of a replica and the
//! payloads carried by log commands, so every field name here is part
//! of the wire format.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Weight in grams. Signed so that bad input can be rejected explicitly.
pub type Grams = i64;

/// Unique identifier for a printer (caller-supplied).
pub type PrinterId = String;

/// Unique identifier for a filament spool (caller-supplied).
pub type FilamentId = String;

/// Unique identifier for a print job (caller-supplied).
pub type JobId = String;

// ── Printer ────────────────────────────────────────────────────────

/// A physical printer. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Printer {
    pub id: PrinterId,
    pub company: String,
    pub model: String,
}

// ── Filament ───────────────────────────────────────────────────────

/// A filament spool and its weight accounting.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Filament {
    pub id: FilamentId,
    /// Material, e.g. "PLA" or "PETG".
    #[serde(rename = "type")]
    pub material: String,
    pub color: String,
    pub total_weight_in_grams: Grams,
    /// Never exceeds `total_weight_in_grams`, never below zero.
    pub remaining_weight_in_grams: Grams,
}

/// Client request to register a new spool.
///
/// The remaining weight is not accepted from the caller; a new spool
/// always starts full.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewFilament {
    pub id: FilamentId,
    #[serde(rename = "type")]
    pub material: String,
    pub color: String,
    pub total_weight_in_grams: Grams,
}

impl NewFilament {
    /// Build the full spool record, remaining = total.
    pub fn into_filament(self) -> Filament {
        Filament {
            id: self.id,
            material: self.material,
            color: self.color,
            total_weight_in_grams: self.total_weight_in_grams,
            remaining_weight_in_grams: self.total_weight_in_grams,
        }
    }
}

// ── Print job ──────────────────────────────────────────────────────

/// A print job bound to one printer and one spool.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PrintJob {
    pub id: JobId,
    pub printer_id: PrinterId,
    pub filament_id: FilamentId,
    /// Path of the sliced model on the printer host.
    pub filepath: String,
    pub print_weight_in_grams: Grams,
    #[serde(default)]
    pub status: JobStatus,
}

/// Client request to queue a print job. Status is always decided by
/// the store, so it is not part of the request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewPrintJob {
    pub id: JobId,
    pub printer_id: PrinterId,
    pub filament_id: FilamentId,
    pub filepath: String,
    pub print_weight_in_grams: Grams,
}

impl NewPrintJob {
    /// Build a job record in the `Queued` state.
    pub fn into_job(self) -> PrintJob {
        PrintJob {
            id: self.id,
            printer_id: self.printer_id,
            filament_id: self.filament_id,
            filepath: self.filepath,
            print_weight_in_grams: self.print_weight_in_grams,
            status: JobStatus::Queued,
        }
    }
}

/// Lifecycle status of a print job.
///
/// ```text
/// Queued  -> Running | Cancelled
/// Running -> Done | Cancelled
/// Done, Cancelled: terminal
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum JobStatus {
    #[default]
    Queued,
    Running,
    Done,
    Cancelled,
}

impl JobStatus {
    /// Whether moving from `self` to `next` is a legal lifecycle step.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Queued, JobStatus::Running)
                | (JobStatus::Queued, JobStatus::Cancelled)
                | (JobStatus::Running, JobStatus::Done)
                | (JobStatus::Running, JobStatus::Cancelled)
        )
    }

    /// Done and Cancelled jobs never change again.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Cancelled)
    }

    /// Jobs that still hold a claim on their spool.
    pub fn is_active(self) -> bool {
        matches!(self, JobStatus::Queued | JobStatus::Running)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Queued => "Queued",
            JobStatus::Running => "Running",
            JobStatus::Done => "Done",
            JobStatus::Cancelled => "Cancelled",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [JobStatus; 4] = [
        JobStatus::Queued,
        JobStatus::Running,
        JobStatus::Done,
        JobStatus::Cancelled,
    ];

    #[test]
    fn legal_transitions() {
        assert!(JobStatus::Queued.can_transition_to(JobStatus::Running));
        assert!(JobStatus::Queued.can_transition_to(JobStatus::Cancelled));
        assert!(JobStatus::Running.can_transition_to(JobStatus::Done));
        assert!(JobStatus::Running.can_transition_to(JobStatus::Cancelled));
    }

    #[test]
    fn exactly_four_legal_pairs() {
        let legal = ALL
            .iter()
            .flat_map(|from| ALL.iter().map(move |to| (*from, *to)))
            .filter(|(from, to)| from.can_transition_to(*to))
            .count();
        assert_eq!(legal, 4);
    }

    #[test]
    fn terminal_states_accept_nothing() {
        for next in ALL {
            assert!(!JobStatus::Done.can_transition_to(next));
            assert!(!JobStatus::Cancelled.can_transition_to(next));
        }
        assert!(JobStatus::Done.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
    }

    #[test]
    fn no_self_transitions() {
        for s in ALL {
            assert!(!s.can_transition_to(s), "{s} -> {s} must be rejected");
        }
    }

    #[test]
    fn status_serializes_by_name() {
        assert_eq!(serde_json::to_string(&JobStatus::Running).unwrap(), "\"Running\"");
        let s: JobStatus = serde_json::from_str("\"Cancelled\"").unwrap();
        assert_eq!(s, JobStatus::Cancelled);
        assert!(serde_json::from_str::<JobStatus>("\"Paused\"").is_err());
    }

    #[test]
    fn filament_uses_type_field() {
        let f = NewFilament {
            id: "f1".into(),
            material: "PLA".into(),
            color: "red".into(),
            total_weight_in_grams: 1000,
        }
        .into_filament();
        assert_eq!(f.remaining_weight_in_grams, 1000);

        let json = serde_json::to_value(&f).unwrap();
        assert_eq!(json["type"], "PLA");
        assert!(json.get("material").is_none());
    }

    #[test]
    fn job_status_defaults_to_queued() {
        let job: PrintJob = serde_json::from_str(
            r#"{"id":"j1","printer_id":"p1","filament_id":"f1","filepath":"a.gcode","print_weight_in_grams":10}"#,
        )
        .unwrap();
        assert_eq!(job.status, JobStatus::Queued);
    }
}
