//! DomainState: the per-replica image built from the committed log.
//!
//! `apply` is the only way state changes. It trusts the log: nothing is
//! re-validated here, so replaying the same prefix on any replica gives
//! the same result.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::command::Command;
use crate::types::*;

/// Outcome of applying a single command, reported for logging only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// The command inserted, replaced, or updated an entity.
    Changed,
    /// The command targeted an id that does not exist; nothing happened.
    Missing,
}

/// Printers, filaments and print jobs, each keyed by id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainState {
    printers: BTreeMap<PrinterId, Printer>,
    filaments: BTreeMap<FilamentId, Filament>,
    print_jobs: BTreeMap<JobId, PrintJob>,
}

impl DomainState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one committed command.
    pub fn apply(&mut self, command: Command) -> Applied {
        let kind = command.kind();
        let outcome = match command {
            Command::AddPrinter(printer) => {
                self.printers.insert(printer.id.clone(), printer);
                Applied::Changed
            }
            Command::DeletePrinter(id) => match self.printers.remove(&id) {
                Some(_) => Applied::Changed,
                None => Applied::Missing,
            },
            Command::AddFilament(filament) => {
                self.filaments.insert(filament.id.clone(), filament);
                Applied::Changed
            }
            Command::AddJob(mut job) => {
                // New jobs always start queued, whatever the payload says.
                job.status = JobStatus::Queued;
                self.print_jobs.insert(job.id.clone(), job);
                Applied::Changed
            }
            Command::UpdateJobStatus { job_id, status } => {
                match self.print_jobs.get_mut(&job_id) {
                    Some(job) => {
                        job.status = status;
                        Applied::Changed
                    }
                    None => Applied::Missing,
                }
            }
            Command::ReduceFilament {
                filament_id,
                weight,
            } => match self.filaments.get_mut(&filament_id) {
                Some(filament) => {
                    // Remaining weight only ever goes down, and never below zero.
                    filament.remaining_weight_in_grams = filament
                        .remaining_weight_in_grams
                        .saturating_sub(weight.max(0))
                        .max(0);
                    Applied::Changed
                }
                None => Applied::Missing,
            },
        };
        debug!(kind, ?outcome, "applied command");
        outcome
    }

    // ── Reads ──────────────────────────────────────────────────────

    pub fn printer(&self, id: &str) -> Option<&Printer> {
        self.printers.get(id)
    }

    pub fn filament(&self, id: &str) -> Option<&Filament> {
        self.filaments.get(id)
    }

    pub fn job(&self, id: &str) -> Option<&PrintJob> {
        self.print_jobs.get(id)
    }

    /// All printers, ordered by id.
    pub fn printers(&self) -> impl Iterator<Item = &Printer> {
        self.printers.values()
    }

    /// All spools, ordered by id.
    pub fn filaments(&self) -> impl Iterator<Item = &Filament> {
        self.filaments.values()
    }

    /// All jobs, ordered by id.
    pub fn jobs(&self) -> impl Iterator<Item = &PrintJob> {
        self.print_jobs.values()
    }

    /// Weight claimed on a spool by jobs that are still queued or running.
    ///
    /// Saturates: concurrently admitted jobs can claim more than any spool holds.
    pub fn pending_filament_usage(&self, filament_id: &str) -> Grams {
        self.print_jobs
            .values()
            .filter(|job| job.filament_id == filament_id && job.status.is_active())
            .fold(0, |total: Grams, job| {
                total.saturating_add(job.print_weight_in_grams)
            })
    }

    /// Remaining weight minus pending claims, or `None` for an unknown spool.
    /// Negative when the spool is overcommitted.
    pub fn available_filament(&self, filament_id: &str) -> Option<Grams> {
        self.filament(filament_id).map(|f| {
            f.remaining_weight_in_grams
                .saturating_sub(self.pending_filament_usage(filament_id))
        })
    }

    /// Entity counts as (printers, filaments, jobs).
    pub fn counts(&self) -> (usize, usize, usize) {
        (self.printers.len(), self.filaments.len(), self.print_jobs.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn printer(id: &str) -> Printer {
        Printer {
            id: id.into(),
            company: "Bambu".into(),
            model: "X1C".into(),
        }
    }

    fn spool(id: &str, grams: Grams) -> Filament {
        Filament {
            id: id.into(),
            material: "PLA".into(),
            color: "black".into(),
            total_weight_in_grams: grams,
            remaining_weight_in_grams: grams,
        }
    }

    fn job(id: &str, filament: &str, grams: Grams, status: JobStatus) -> PrintJob {
        PrintJob {
            id: id.into(),
            printer_id: "p1".into(),
            filament_id: filament.into(),
            filepath: format!("/gcode/{id}.gcode"),
            print_weight_in_grams: grams,
            status,
        }
    }

    fn sample_log() -> Vec<Command> {
        vec![
            Command::AddPrinter(printer("p1")),
            Command::AddPrinter(printer("p2")),
            Command::AddFilament(spool("f1", 1000)),
            Command::AddJob(job("j1", "f1", 400, JobStatus::Queued)),
            Command::AddJob(job("j2", "f1", 100, JobStatus::Queued)),
            Command::UpdateJobStatus {
                job_id: "j1".into(),
                status: JobStatus::Running,
            },
            Command::ReduceFilament {
                filament_id: "f1".into(),
                weight: 400,
            },
            Command::UpdateJobStatus {
                job_id: "j1".into(),
                status: JobStatus::Done,
            },
            Command::DeletePrinter("p2".into()),
        ]
    }

    #[test]
    fn same_log_gives_identical_bytes() {
        let mut a = DomainState::new();
        let mut b = DomainState::new();
        for cmd in sample_log() {
            a.apply(cmd.clone());
            b.apply(cmd);
        }
        assert_eq!(
            serde_json::to_vec(&a).unwrap(),
            serde_json::to_vec(&b).unwrap()
        );
        assert_eq!(a.counts(), (1, 1, 2));
    }

    #[test]
    fn delete_missing_printer_is_noop() {
        let mut state = DomainState::new();
        state.apply(Command::AddPrinter(printer("p1")));
        assert_eq!(state.apply(Command::DeletePrinter("nope".into())), Applied::Missing);
        assert_eq!(state.apply(Command::DeletePrinter("p1".into())), Applied::Changed);
        assert_eq!(state.apply(Command::DeletePrinter("p1".into())), Applied::Missing);
        assert!(state.printer("p1").is_none());
    }

    #[test]
    fn add_printer_overwrites() {
        let mut state = DomainState::new();
        state.apply(Command::AddPrinter(printer("p1")));
        let mut updated = printer("p1");
        updated.model = "P1S".into();
        state.apply(Command::AddPrinter(updated));
        assert_eq!(state.printer("p1").unwrap().model, "P1S");
        assert_eq!(state.counts().0, 1);
    }

    #[test]
    fn reduce_clamps_at_zero() {
        let mut state = DomainState::new();
        state.apply(Command::AddFilament(spool("f1", 300)));
        state.apply(Command::ReduceFilament {
            filament_id: "f1".into(),
            weight: 1000,
        });
        assert_eq!(state.filament("f1").unwrap().remaining_weight_in_grams, 0);

        state.apply(Command::ReduceFilament {
            filament_id: "f1".into(),
            weight: 5,
        });
        assert_eq!(state.filament("f1").unwrap().remaining_weight_in_grams, 0);
    }

    #[test]
    fn reduce_unknown_spool_is_noop() {
        let mut state = DomainState::new();
        let outcome = state.apply(Command::ReduceFilament {
            filament_id: "ghost".into(),
            weight: 10,
        });
        assert_eq!(outcome, Applied::Missing);
    }

    #[test]
    fn add_job_forces_queued() {
        let mut state = DomainState::new();
        state.apply(Command::AddJob(job("j1", "f1", 10, JobStatus::Done)));
        assert_eq!(state.job("j1").unwrap().status, JobStatus::Queued);
    }

    #[test]
    fn status_update_is_applied_verbatim() {
        let mut state = DomainState::new();
        state.apply(Command::AddJob(job("j1", "f1", 10, JobStatus::Queued)));
        // Illegal per the lifecycle, but the log is trusted.
        state.apply(Command::UpdateJobStatus {
            job_id: "j1".into(),
            status: JobStatus::Done,
        });
        assert_eq!(state.job("j1").unwrap().status, JobStatus::Done);

        let outcome = state.apply(Command::UpdateJobStatus {
            job_id: "missing".into(),
            status: JobStatus::Running,
        });
        assert_eq!(outcome, Applied::Missing);
    }

    #[test]
    fn pending_usage_counts_active_jobs_only() {
        let mut state = DomainState::new();
        state.apply(Command::AddFilament(spool("f1", 1000)));
        state.apply(Command::AddFilament(spool("f2", 1000)));
        for (id, spool_id, grams) in [("a", "f1", 100), ("b", "f1", 200), ("c", "f1", 300), ("d", "f2", 50)] {
            state.apply(Command::AddJob(job(id, spool_id, grams, JobStatus::Queued)));
        }
        state.apply(Command::UpdateJobStatus { job_id: "b".into(), status: JobStatus::Running });
        state.apply(Command::UpdateJobStatus { job_id: "c".into(), status: JobStatus::Cancelled });

        assert_eq!(state.pending_filament_usage("f1"), 300);
        assert_eq!(state.pending_filament_usage("f2"), 50);
        assert_eq!(state.pending_filament_usage("none"), 0);
        assert_eq!(state.available_filament("f1"), Some(700));
        assert_eq!(state.available_filament("none"), None);
    }

    #[test]
    fn overcommitted_claims_saturate() {
        let mut state = DomainState::new();
        state.apply(Command::AddFilament(spool("f1", Grams::MAX)));
        state.apply(Command::AddJob(job("a", "f1", Grams::MAX, JobStatus::Queued)));
        state.apply(Command::AddJob(job("b", "f1", Grams::MAX - 1, JobStatus::Queued)));

        assert_eq!(state.pending_filament_usage("f1"), Grams::MAX);
        assert_eq!(state.available_filament("f1"), Some(0));

        state.apply(Command::ReduceFilament {
            filament_id: "f1".into(),
            weight: Grams::MAX,
        });
        assert_eq!(state.available_filament("f1"), Some(-Grams::MAX));
    }

    #[test]
    fn listings_are_ordered_by_id() {
        let mut state = DomainState::new();
        for id in ["p3", "p1", "p2"] {
            state.apply(Command::AddPrinter(printer(id)));
        }
        let ids: Vec<_> = state.printers().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, ["p1", "p2", "p3"]);
    }

    #[test]
    fn serde_image_restores_equal_state() {
        let mut state = DomainState::new();
        for cmd in sample_log() {
            state.apply(cmd);
        }
        let bytes = serde_json::to_vec(&state).unwrap();
        let back: DomainState = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(back, state);
    }
}
