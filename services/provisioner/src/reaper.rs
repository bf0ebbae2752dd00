//! Orphaned job cleanup.
//!
//! A job is an orphan when it is running under a managed prefix but no agent
//! with its name is registered. Orphans younger than the worker timeout are
//! left alone since their agent may not have been registered yet.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use ci_nomad_reconcile::{orphan_candidates, GraceWindow, ReconcileError, SweepStats};
use tracing::{debug, info, warn};

use crate::client::SchedulerClient;
use crate::error::SchedulerError;
use crate::registry::NodeRegistry;

pub struct OrphanReaper {
    client: Arc<SchedulerClient>,
    registry: Arc<dyn NodeRegistry>,
    window: GraceWindow,
}

impl OrphanReaper {
    pub fn new(client: Arc<SchedulerClient>, registry: Arc<dyn NodeRegistry>, worker_timeout: Duration) -> Self {
        Self {
            client,
            registry,
            window: GraceWindow::new(worker_timeout),
        }
    }

    /// Stop orphaned jobs under `prefix`.
    pub async fn sweep(&self, prefix: &str) -> SweepStats {
        self.sweep_at(prefix, Utc::now()).await
    }

    /// Like [`sweep`](Self::sweep) with an explicit notion of now.
    pub async fn sweep_at(&self, prefix: &str, now: DateTime<Utc>) -> SweepStats {
        let jobs = self.client.list_jobs(prefix).await;
        let mut stats = SweepStats {
            examined: jobs.len(),
            ..SweepStats::default()
        };

        let mut registered = HashSet::new();
        for job in jobs.iter().filter(|job| job.is_running()) {
            if self.registry.get(&job.name).await.is_some() {
                registered.insert(job.name.clone());
            }
        }

        let orphans = orphan_candidates(&jobs, prefix, |name| registered.contains(name));
        stats.orphans = orphans.len();

        for job in orphans {
            let detail = match self.client.job_detail(&job.id, job.namespace()).await {
                Ok(detail) => detail,
                Err(e) => {
                    let err = match e {
                        SchedulerError::Client { status: 404, .. } => ReconcileError::NotFound(job.id.clone()),
                        e => ReconcileError::DetailUnavailable {
                            job_id: job.id.clone(),
                            reason: e.to_string(),
                        },
                    };
                    warn!(error = %err, "Skipping orphan");
                    stats.skipped += 1;
                    continue;
                }
            };

            if !self.window.is_expired(detail.submit_time, now) {
                debug!(
                    job_id = %job.id,
                    expires = %self.window.expiry(detail.submit_time),
                    "Orphan still inside grace window"
                );
                stats.deferred += 1;
                continue;
            }

            info!(job_id = %job.id, "Stopping orphaned job");
            let namespace = detail.namespace.as_deref().or(job.namespace());
            self.client
                .stop_job(&job.id, namespace, detail.region.as_deref())
                .await;
            stats.deleted += 1;
        }

        if stats.orphans > 0 {
            info!(
                prefix = %prefix,
                examined = stats.examined,
                orphans = stats.orphans,
                deleted = stats.deleted,
                deferred = stats.deferred,
                skipped = stats.skipped,
                "Orphan sweep complete"
            );
        }

        stats
    }
}
