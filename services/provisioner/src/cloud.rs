//! Capacity sources consulted by the provisioning strategy.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::agent::Agent;
use crate::error::LaunchError;
use crate::label::LabelExpr;
use crate::launch::LaunchState;

/// A launch that has been started but not yet resolved.
#[derive(Debug)]
pub struct PlannedAgent {
    pub name: String,
    pub executors: u32,
    pub handle: JoinHandle<Result<Arc<Agent>, LaunchError>>,
    /// Progress of the launch.
    pub state: watch::Receiver<LaunchState>,
}

impl PlannedAgent {
    /// Wait for the launch to resolve.
    pub async fn wait(self) -> Result<Arc<Agent>, LaunchError> {
        match self.handle.await {
            Ok(result) => result,
            Err(e) => Err(LaunchError::Aborted(e.to_string())),
        }
    }
}

#[async_trait]
pub trait Cloud: Send + Sync {
    fn name(&self) -> &str;

    /// Returns true if some template serves `label`.
    fn can_provision(&self, label: Option<&LabelExpr>) -> bool;

    /// Start enough launches to cover `excess_workload` executors.
    async fn provision(&self, label: Option<&LabelExpr>, excess_workload: u32) -> Vec<PlannedAgent>;

    /// Executors planned by this cloud that have not resolved yet.
    fn pending_executors(&self) -> u64;
}
