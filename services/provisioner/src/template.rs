//! Worker templates.
//!
//! A template describes one kind of worker: its labels, executor count, idle
//! policy and the job text submitted to the scheduler.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::TemplateError;
use crate::label::{label_set, LabelExpr};

/// Prefix used when a template does not configure one.
pub const DEFAULT_PREFIX: &str = "jenkins";

static LAST_NAME_NANOS: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerTemplate {
    prefix: String,
    labels: String,
    label_set: BTreeSet<String>,
    idle_termination_minutes: u32,
    reusable: bool,
    num_executors: u32,
    remote_fs: String,
    job_template: String,
}

impl WorkerTemplate {
    /// Create a template. An empty prefix becomes [`DEFAULT_PREFIX`].
    pub fn new(
        prefix: &str,
        labels: &str,
        num_executors: u32,
        job_template: impl Into<String>,
    ) -> Result<Self, TemplateError> {
        let prefix = if prefix.trim().is_empty() {
            DEFAULT_PREFIX.to_string()
        } else {
            prefix.trim().to_string()
        };

        if num_executors == 0 {
            return Err(TemplateError::NoExecutors { prefix });
        }

        Ok(Self {
            prefix,
            labels: labels.to_string(),
            label_set: label_set(labels),
            idle_termination_minutes: 0,
            reusable: false,
            num_executors,
            remote_fs: String::new(),
            job_template: job_template.into(),
        })
    }

    pub fn with_remote_fs(mut self, remote_fs: impl Into<String>) -> Self {
        self.remote_fs = remote_fs.into();
        self
    }

    pub fn with_idle_termination_minutes(mut self, minutes: u32) -> Self {
        self.idle_termination_minutes = minutes;
        self
    }

    pub fn with_reusable(mut self, reusable: bool) -> Self {
        self.reusable = reusable;
        self
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn labels(&self) -> &str {
        &self.labels
    }

    pub fn label_set(&self) -> &BTreeSet<String> {
        &self.label_set
    }

    pub fn idle_termination_minutes(&self) -> u32 {
        self.idle_termination_minutes
    }

    pub fn reusable(&self) -> bool {
        self.reusable
    }

    pub fn num_executors(&self) -> u32 {
        self.num_executors
    }

    pub fn remote_fs(&self) -> &str {
        &self.remote_fs
    }

    pub fn job_template(&self) -> &str {
        &self.job_template
    }

    /// Returns true if this template can serve a request for `label`.
    ///
    /// A request without a label only matches templates without labels, and a
    /// template without labels never serves a labelled request.
    pub fn matches(&self, label: Option<&LabelExpr>) -> bool {
        match label {
            None => self.label_set.is_empty(),
            Some(expr) => !self.label_set.is_empty() && expr.matches(&self.label_set),
        }
    }

    /// Generate a fresh worker name: `<prefix>-<hex nanos>`.
    ///
    /// Names are unique within the process even when generated concurrently.
    pub fn create_worker_name(&self) -> String {
        format!("{}-{:x}", self.prefix, next_name_nanos())
    }
}

/// Wall-clock nanoseconds, forced strictly increasing across calls.
fn next_name_nanos() -> u64 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
        .unwrap_or(0);

    let mut last = LAST_NAME_NANOS.load(Ordering::Relaxed);
    loop {
        let next = now.max(last.saturating_add(1));
        match LAST_NAME_NANOS.compare_exchange_weak(last, next, Ordering::SeqCst, Ordering::Relaxed) {
            Ok(_) => return next,
            Err(actual) => last = actual,
        }
    }
}
