//! CI build agents backed by scheduler jobs.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use ci_nomad_api::Placement;
use tracing::warn;

use crate::template::WorkerTemplate;

/// A CI agent record. The agent name is also the scheduler job id.
#[derive(Debug)]
pub struct Agent {
    name: String,
    cloud_name: String,
    labels: String,
    num_executors: u32,
    idle_termination_minutes: u32,
    reusable: bool,
    remote_fs: String,
    placement: OnceLock<Placement>,
    /// Milliseconds since the epoch of the last connection, 0 if never connected.
    connected_since: AtomicI64,
    accepting_tasks: AtomicBool,
}

impl Agent {
    pub fn from_template(name: impl Into<String>, cloud_name: impl Into<String>, template: &WorkerTemplate) -> Self {
        Self {
            name: name.into(),
            cloud_name: cloud_name.into(),
            labels: template.labels().to_string(),
            num_executors: template.num_executors(),
            idle_termination_minutes: template.idle_termination_minutes(),
            reusable: template.reusable(),
            remote_fs: template.remote_fs().to_string(),
            placement: OnceLock::new(),
            connected_since: AtomicI64::new(0),
            accepting_tasks: AtomicBool::new(true),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cloud_name(&self) -> &str {
        &self.cloud_name
    }

    pub fn labels(&self) -> &str {
        &self.labels
    }

    pub fn num_executors(&self) -> u32 {
        self.num_executors
    }

    pub fn idle_termination_minutes(&self) -> u32 {
        self.idle_termination_minutes
    }

    pub fn reusable(&self) -> bool {
        self.reusable
    }

    pub fn remote_fs(&self) -> &str {
        &self.remote_fs
    }

    /// Record where the scheduler placed the job. Only the first call wins.
    pub fn set_placement(&self, placement: Placement) -> bool {
        let stored = self.placement.set(placement).is_ok();
        if !stored {
            warn!(agent = %self.name, "Placement already recorded, ignoring update");
        }
        stored
    }

    pub fn placement(&self) -> Option<&Placement> {
        self.placement.get()
    }

    pub fn namespace(&self) -> Option<&str> {
        self.placement().and_then(|p| p.namespace.as_deref())
    }

    pub fn region(&self) -> Option<&str> {
        self.placement().and_then(|p| p.region.as_deref())
    }

    pub fn mark_connected(&self, at: DateTime<Utc>) {
        self.connected_since
            .store(at.timestamp_millis().max(1), Ordering::SeqCst);
    }

    /// Time of the last connection, if the agent ever connected.
    pub fn connected_since(&self) -> Option<DateTime<Utc>> {
        match self.connected_since.load(Ordering::SeqCst) {
            0 => None,
            ms => DateTime::from_timestamp_millis(ms),
        }
    }

    pub fn has_connected(&self) -> bool {
        self.connected_since.load(Ordering::SeqCst) != 0
    }

    /// Called when the agent picks up a task. A non-reusable agent stops
    /// accepting work after its first task.
    pub fn task_accepted(&self) {
        if !self.reusable {
            self.accepting_tasks.store(false, Ordering::SeqCst);
        }
    }

    pub fn is_accepting_tasks(&self) -> bool {
        self.accepting_tasks.load(Ordering::SeqCst)
    }
}
