//! Scheduler-backed cloud.
//!
//! Matches build requests to worker templates and turns excess workload into
//! concurrent launches, tracking executors in flight.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::agent::Agent;
use crate::client::SchedulerClient;
use crate::cloud::{Cloud, PlannedAgent};
use crate::label::LabelExpr;
use crate::launch::{LaunchContext, LaunchRequest, LaunchWorkflow};
use crate::pending::PendingCounter;
use crate::reaper::OrphanReaper;
use crate::registry::NodeRegistry;
use crate::template::WorkerTemplate;

#[derive(Debug, Clone)]
pub struct CloudSettings {
    pub name: String,
    /// Sweep orphaned jobs before provisioning.
    pub prune: bool,
    pub worker_timeout: Duration,
}

pub struct NomadCloud {
    name: String,
    prune: bool,
    templates: Vec<Arc<WorkerTemplate>>,
    pending: Arc<PendingCounter>,
    ctx: Arc<LaunchContext>,
    reaper: OrphanReaper,
}

impl NomadCloud {
    pub fn new(
        settings: CloudSettings,
        templates: Vec<WorkerTemplate>,
        client: Arc<SchedulerClient>,
        registry: Arc<dyn NodeRegistry>,
    ) -> Self {
        let reaper = OrphanReaper::new(client.clone(), registry.clone(), settings.worker_timeout);
        let ctx = Arc::new(LaunchContext {
            cloud_name: settings.name.clone(),
            client,
            registry,
            worker_timeout: settings.worker_timeout,
        });

        Self {
            name: settings.name,
            prune: settings.prune,
            templates: templates.into_iter().map(Arc::new).collect(),
            pending: PendingCounter::new(),
            ctx,
            reaper,
        }
    }

    pub fn templates(&self) -> &[Arc<WorkerTemplate>] {
        &self.templates
    }

    pub fn client(&self) -> &Arc<SchedulerClient> {
        &self.ctx.client
    }

    pub fn worker_timeout(&self) -> Duration {
        self.ctx.worker_timeout
    }

    pub fn reaper(&self) -> &OrphanReaper {
        &self.reaper
    }

    /// First template, in configuration order, that serves `label`.
    pub fn match_template(&self, label: Option<&LabelExpr>) -> Option<&Arc<WorkerTemplate>> {
        self.templates.iter().find(|t| t.matches(label))
    }

    /// Remove an agent record and stop its job.
    pub async fn terminate_agent(&self, agent: &Agent) {
        self.ctx.terminate(agent).await;
    }
}

#[async_trait]
impl Cloud for NomadCloud {
    fn name(&self) -> &str {
        &self.name
    }

    fn can_provision(&self, label: Option<&LabelExpr>) -> bool {
        self.match_template(label).is_some()
    }

    async fn provision(&self, label: Option<&LabelExpr>, excess_workload: u32) -> Vec<PlannedAgent> {
        let Some(template) = self.match_template(label).cloned() else {
            debug!(cloud = %self.name, label = ?label.map(ToString::to_string), "No template for label");
            return Vec::new();
        };

        if self.prune {
            self.reaper.sweep(template.prefix()).await;
        }

        let mut planned = Vec::new();
        let mut remaining = i64::from(excess_workload);
        while remaining > 0 {
            let name = template.create_worker_name();
            let executors = template.num_executors();
            info!(
                cloud = %self.name,
                worker = %name,
                executors,
                remaining,
                "Planning worker launch"
            );

            let workflow = LaunchWorkflow::new(
                self.ctx.clone(),
                LaunchRequest {
                    name: name.clone(),
                    template: template.clone(),
                },
                self.pending.acquire(executors),
            );

            let state = workflow.subscribe();
            planned.push(PlannedAgent {
                name,
                executors,
                handle: tokio::spawn(workflow.run()),
                state,
            });
            remaining -= i64::from(executors);
        }

        planned
    }

    fn pending_executors(&self) -> u64 {
        self.pending.get()
    }
}
