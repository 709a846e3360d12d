//! Store facade over the consensus log and the local replica.
//!
//! Writes are validate-then-submit: the validation read and the append
//! are two separate steps, so concurrent admissions against one filament
//! can jointly overcommit it. The apply-time clamp keeps the remaining
//! weight at or above zero; nothing here serializes admissions.

use std::sync::Arc;
use std::time::Duration;

use raft3d_raft::{ConsensusLog, StateReader};
use raft3d_state::{
    Command, Filament, Grams, JobStatus, NewFilament, NewPrintJob, PrintJob, Printer,
};
use tracing::{debug, info, warn};

use crate::error::{StoreError, StoreResult};

/// How long a submission waits for its entry to commit.
pub const DEFAULT_COMMIT_TIMEOUT: Duration = Duration::from_secs(10);

/// Entry point for all reads and writes against the replicated state.
#[derive(Clone)]
pub struct Store {
    log: Arc<dyn ConsensusLog>,
    reader: StateReader,
    commit_timeout: Duration,
}

fn require_id(kind: &str, id: &str) -> StoreResult<()> {
    if id.trim().is_empty() {
        return Err(StoreError::Validation(format!("{kind} id must not be empty")));
    }
    Ok(())
}

impl Store {
    pub fn new(log: Arc<dyn ConsensusLog>, reader: StateReader) -> Self {
        Self {
            log,
            reader,
            commit_timeout: DEFAULT_COMMIT_TIMEOUT,
        }
    }

    pub fn with_commit_timeout(mut self, timeout: Duration) -> Self {
        self.commit_timeout = timeout;
        self
    }

    pub fn commit_timeout(&self) -> Duration {
        self.commit_timeout
    }

    /// Encode `command`, append it and wait for commit.
    ///
    /// Returns the commit index. On `CommitTimeout` the entry may still
    /// be applied later.
    pub async fn submit(&self, command: Command) -> StoreResult<u64> {
        let kind = command.kind();
        let payload = command.encode()?;

        match self.log.append(payload, self.commit_timeout).await {
            Ok(index) => {
                debug!(kind, index, "command committed");
                Ok(index)
            }
            Err(e) => {
                warn!(kind, error = %e, "command not committed");
                Err(e.into())
            }
        }
    }

    // ── Printers ───────────────────────────────────────────────────

    pub async fn create_printer(&self, printer: Printer) -> StoreResult<Printer> {
        require_id("printer", &printer.id)?;
        self.submit(Command::AddPrinter(printer.clone())).await?;
        info!(printer_id = %printer.id, "printer created");
        Ok(printer)
    }

    /// Delete a printer. Jobs that reference it are left untouched.
    pub async fn delete_printer(&self, id: &str) -> StoreResult<()> {
        if self.get_printer(id).is_none() {
            return Err(StoreError::not_found("printer", id));
        }
        self.submit(Command::DeletePrinter(id.to_string())).await?;
        info!(printer_id = %id, "printer deleted");
        Ok(())
    }

    pub fn list_printers(&self) -> Vec<Printer> {
        self.reader.read(|s| s.printers().cloned().collect())
    }

    pub fn get_printer(&self, id: &str) -> Option<Printer> {
        self.reader.read(|s| s.printer(id).cloned())
    }

    // ── Filaments ──────────────────────────────────────────────────

    /// Create a filament spool; remaining weight starts at the total.
    pub async fn create_filament(&self, new: NewFilament) -> StoreResult<Filament> {
        require_id("filament", &new.id)?;
        if new.total_weight_in_grams <= 0 {
            return Err(StoreError::Validation(format!(
                "total_weight_in_grams must be positive, got {}",
                new.total_weight_in_grams
            )));
        }

        let filament = new.into_filament();
        self.submit(Command::AddFilament(filament.clone())).await?;
        info!(
            filament_id = %filament.id,
            total = filament.total_weight_in_grams,
            "filament created"
        );
        Ok(filament)
    }

    pub fn list_filaments(&self) -> Vec<Filament> {
        self.reader.read(|s| s.filaments().cloned().collect())
    }

    pub fn get_filament(&self, id: &str) -> Option<Filament> {
        self.reader.read(|s| s.filament(id).cloned())
    }

    /// Weight claimed by queued and running jobs on this filament.
    pub fn pending_filament_usage(&self, filament_id: &str) -> Grams {
        self.reader.read(|s| s.pending_filament_usage(filament_id))
    }

    // ── Print jobs ─────────────────────────────────────────────────

    /// Admit a print job if its printer and filament exist and the
    /// filament has enough unclaimed weight. The job always starts
    /// `Queued`.
    pub async fn create_job(&self, new: NewPrintJob) -> StoreResult<PrintJob> {
        require_id("print job", &new.id)?;
        let requested = new.print_weight_in_grams;
        if requested <= 0 {
            return Err(StoreError::Validation(format!(
                "print_weight_in_grams must be positive, got {requested}"
            )));
        }

        let available = self.reader.read(|s| {
            if s.printer(&new.printer_id).is_none() {
                return Err(StoreError::not_found("printer", &new.printer_id));
            }
            s.available_filament(&new.filament_id)
                .ok_or_else(|| StoreError::not_found("filament", &new.filament_id))
        })?;

        if requested > available {
            debug!(
                job_id = %new.id,
                filament_id = %new.filament_id,
                requested,
                available,
                "job rejected"
            );
            return Err(StoreError::InsufficientFilament {
                requested,
                available,
            });
        }

        let job = new.into_job();
        self.submit(Command::AddJob(job.clone())).await?;
        info!(
            job_id = %job.id,
            filament_id = %job.filament_id,
            weight = requested,
            "print job queued"
        );
        Ok(job)
    }

    /// Move a job to `status` if the lifecycle allows it.
    ///
    /// Completing a job first commits the filament reduction, then the
    /// status change. These are two log entries; if the second fails the
    /// filament is already reduced and the job keeps its old status.
    pub async fn update_job_status(
        &self,
        job_id: &str,
        status: JobStatus,
    ) -> StoreResult<PrintJob> {
        let mut job = self
            .get_job(job_id)
            .ok_or_else(|| StoreError::not_found("print job", job_id))?;

        if !job.status.can_transition_to(status) {
            return Err(StoreError::InvalidTransition {
                from: job.status,
                to: status,
            });
        }

        if status == JobStatus::Done {
            self.submit(Command::ReduceFilament {
                filament_id: job.filament_id.clone(),
                weight: job.print_weight_in_grams,
            })
            .await?;
        }

        self.submit(Command::UpdateJobStatus {
            job_id: job.id.clone(),
            status,
        })
        .await?;

        info!(job_id = %job.id, from = %job.status, to = %status, "job status updated");
        job.status = status;
        Ok(job)
    }

    pub fn list_jobs(&self) -> Vec<PrintJob> {
        self.reader.read(|s| s.jobs().cloned().collect())
    }

    pub fn get_job(&self, id: &str) -> Option<PrintJob> {
        self.reader.read(|s| s.job(id).cloned())
    }
}
