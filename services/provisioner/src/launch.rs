//! Single worker launch.
//!
//! ```text
//! Created -> Submitted -> WaitingConnection -> Connected
//!                                           \-> TimedOut
//! ```
//!
//! A launch registers the agent, submits the rendered job and waits for the
//! agent to connect. If it does not connect within the worker timeout the
//! agent record is removed and the job stopped. Submission failures are not
//! reported separately; they surface as a timeout.
//!
//! Progress is published on a watch channel; see [`LaunchWorkflow::subscribe`].

use std::sync::Arc;
use std::time::Duration;

use ci_nomad_api::Placement;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::agent::Agent;
use crate::client::SchedulerClient;
use crate::error::{LaunchError, RegistryError};
use crate::pending::PendingLease;
use crate::registry::NodeRegistry;
use crate::template::WorkerTemplate;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchState {
    Created,
    Submitted,
    WaitingConnection,
    Connected,
    TimedOut,
}

/// Shared dependencies of all launches of one cloud.
pub struct LaunchContext {
    pub cloud_name: String,
    pub client: Arc<SchedulerClient>,
    pub registry: Arc<dyn NodeRegistry>,
    pub worker_timeout: Duration,
}

impl LaunchContext {
    /// Remove the agent record and stop its job.
    pub async fn terminate(&self, agent: &Agent) {
        info!(agent = %agent.name(), "Terminating worker");
        if let Err(e) = self.registry.remove(agent.name()).await {
            warn!(agent = %agent.name(), error = %e, "Removing agent record failed");
        }
        self.client
            .stop_job(agent.name(), agent.namespace(), agent.region())
            .await;
    }
}

#[derive(Debug, Clone)]
pub struct LaunchRequest {
    pub name: String,
    pub template: Arc<WorkerTemplate>,
}

pub struct LaunchWorkflow {
    ctx: Arc<LaunchContext>,
    request: LaunchRequest,
    state: watch::Sender<LaunchState>,
    pending: PendingLease,
}

impl LaunchWorkflow {
    pub fn new(ctx: Arc<LaunchContext>, request: LaunchRequest, pending: PendingLease) -> Self {
        let (state, _) = watch::channel(LaunchState::Created);
        Self {
            ctx,
            request,
            state,
            pending,
        }
    }

    /// Follow the launch state. Once `run` returns the state is `Connected`
    /// or `TimedOut`, or still `Created` if the agent could not be registered.
    pub fn subscribe(&self) -> watch::Receiver<LaunchState> {
        self.state.subscribe()
    }

    /// Drive the launch to completion. The pending executors are released
    /// when this returns, whatever the outcome.
    pub async fn run(self) -> Result<Arc<Agent>, LaunchError> {
        let name = self.request.name.clone();
        let template = self.request.template.clone();

        let agent = Arc::new(Agent::from_template(&name, &self.ctx.cloud_name, &template));
        self.ctx.registry.register(agent.clone()).await?;

        let secret = self.ctx.registry.agent_secret(&name);
        info!(
            worker = %name,
            executors = self.pending.executors(),
            "Asking scheduler to schedule new worker"
        );
        let document = self.ctx.client.submit_job(&name, &secret, &template).await;
        agent.set_placement(Placement::from_document(&document));
        self.transition(LaunchState::Submitted);

        let token = CancellationToken::new();
        let mut wait = tokio::spawn(wait_for_connection(
            self.ctx.registry.clone(),
            name.clone(),
            token.clone(),
        ));
        self.transition(LaunchState::WaitingConnection);

        let outcome = tokio::time::timeout(self.ctx.worker_timeout, &mut wait).await;
        token.cancel();

        let failure = match outcome {
            Ok(Ok(Ok(()))) => None,
            Ok(Ok(Err(e))) => Some(e.to_string()),
            Ok(Err(e)) => Some(e.to_string()),
            Err(_) => {
                wait.abort();
                Some(format!("no connection after {:?}", self.ctx.worker_timeout))
            }
        };

        match failure {
            None => {
                self.transition(LaunchState::Connected);
                info!(worker = %name, "Worker connected");
                Ok(agent)
            }
            Some(reason) => {
                self.transition(LaunchState::TimedOut);
                error!(worker = %name, reason = %reason, "Worker did not connect in time");
                self.ctx.terminate(&agent).await;
                Err(LaunchError::Timeout {
                    worker: name,
                    timeout: self.ctx.worker_timeout,
                })
            }
        }
    }

    fn transition(&self, next: LaunchState) {
        let from = self.state.send_replace(next);
        debug!(worker = %self.request.name, from = ?from, to = ?next, "Launch state change");
    }
}

async fn wait_for_connection(
    registry: Arc<dyn NodeRegistry>,
    name: String,
    token: CancellationToken,
) -> Result<(), RegistryError> {
    tokio::select! {
        _ = token.cancelled() => Err(RegistryError::Interrupted(name.clone())),
        result = registry.wait_until_online(&name) => result,
    }
}
