//! Orphan reconciliation primitives.
//!
//! Helpers for the sweep that removes scheduler jobs whose CI agent no longer
//! exists. Key concepts:
//!
//! - **Candidate**: a running job under the managed prefix with no registered agent.
//! - **Grace window**: a freshly submitted job may not have an agent record yet;
//!   it is only an orphan once `submit_time + worker_timeout` has passed.
//!
//! # Invariants
//!
//! - Decisions are deterministic given the same inputs
//! - A job inside its grace window is never selected for deletion

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use ci_nomad_api::JobInfo;
use thiserror::Error;

/// Reconciliation errors.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Job detail could not be fetched; the job is skipped this pass.
    #[error("job detail unavailable for {job_id}: {reason}")]
    DetailUnavailable { job_id: String, reason: String },

    /// The job disappeared between listing and inspection.
    #[error("job not found: {0}")]
    NotFound(String),
}

/// Select running jobs under `prefix` that have no registered agent.
///
/// Jobs are matched on their name, which is also the agent name.
pub fn orphan_candidates<'a, F>(jobs: &'a [JobInfo], prefix: &str, is_registered: F) -> Vec<&'a JobInfo>
where
    F: Fn(&str) -> bool,
{
    jobs.iter()
        .filter(|job| job.is_running())
        .filter(|job| job.name.starts_with(prefix))
        .filter(|job| !is_registered(&job.name))
        .collect()
}

/// Grace window protecting freshly submitted jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GraceWindow {
    timeout: Duration,
}

impl GraceWindow {
    /// Create a window of the given length (the worker launch timeout).
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Instant after which a job submitted at `submit_time_ns` may be deleted.
    ///
    /// Saturates at the maximum representable time.
    pub fn expiry(&self, submit_time_ns: i64) -> DateTime<Utc> {
        let submitted = DateTime::from_timestamp_nanos(submit_time_ns);
        TimeDelta::from_std(self.timeout)
            .ok()
            .and_then(|delta| submitted.checked_add_signed(delta))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Returns true once `now` is strictly past the expiry.
    pub fn is_expired(&self, submit_time_ns: i64, now: DateTime<Utc>) -> bool {
        now > self.expiry(submit_time_ns)
    }
}

/// Outcome counters for one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepStats {
    /// Jobs returned by the scheduler listing.
    pub examined: usize,
    /// Running jobs without a registered agent.
    pub orphans: usize,
    /// Orphans whose deletion was requested.
    pub deleted: usize,
    /// Orphans still inside their grace window.
    pub deferred: usize,
    /// Orphans whose detail could not be fetched.
    pub skipped: usize,
}
