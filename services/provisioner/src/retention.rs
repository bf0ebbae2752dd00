//! Idle agent retention.

use std::time::Duration;

use tracing::{info, trace};

use crate::agent::Agent;
use crate::orchestrator::NomadCloud;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetentionDecision {
    Keep,
    Reclaim,
}

/// Reclaims agents idle longer than their template allows.
///
/// Agents that never connected are left to the launch timeout for as long as
/// that timeout has not elapsed.
#[derive(Debug, Clone, Copy)]
pub struct RetentionStrategy {
    launch_timeout: Duration,
}

impl RetentionStrategy {
    pub fn new(launch_timeout: Duration) -> Self {
        Self { launch_timeout }
    }

    pub fn check(&self, agent: &Agent, idle: Duration) -> RetentionDecision {
        if !agent.has_connected() && idle <= self.launch_timeout {
            trace!(agent = %agent.name(), "Agent still launching, keeping");
            return RetentionDecision::Keep;
        }

        let limit = Duration::from_secs(u64::from(agent.idle_termination_minutes()) * 60);
        if idle > limit {
            RetentionDecision::Reclaim
        } else {
            RetentionDecision::Keep
        }
    }

    /// Check `agent` and terminate it through `cloud` if it should go.
    pub async fn enforce(&self, cloud: &NomadCloud, agent: &Agent, idle: Duration) -> RetentionDecision {
        let decision = self.check(agent, idle);
        if decision == RetentionDecision::Reclaim {
            info!(
                agent = %agent.name(),
                idle_secs = idle.as_secs(),
                limit_minutes = agent.idle_termination_minutes(),
                "Reclaiming idle agent"
            );
            cloud.terminate_agent(agent).await;
        }
        decision
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::template::WorkerTemplate;

    fn agent(idle_minutes: u32) -> Agent {
        let template = WorkerTemplate::new("ci", "", 1, "{}")
            .unwrap()
            .with_idle_termination_minutes(idle_minutes);
        Agent::from_template("ci-1", "nomad", &template)
    }

    #[test]
    fn test_connected_agent_idle_policy() {
        let strategy = RetentionStrategy::new(Duration::from_secs(60));
        let agent = agent(10);
        agent.mark_connected(Utc::now());

        assert_eq!(strategy.check(&agent, Duration::from_secs(600)), RetentionDecision::Keep);
        assert_eq!(strategy.check(&agent, Duration::from_secs(601)), RetentionDecision::Reclaim);
    }

    #[test]
    fn test_never_connected_agent_waits_for_launch_timeout() {
        let strategy = RetentionStrategy::new(Duration::from_secs(60));
        let agent = agent(0);

        assert_eq!(strategy.check(&agent, Duration::from_secs(30)), RetentionDecision::Keep);
        assert_eq!(strategy.check(&agent, Duration::from_secs(61)), RetentionDecision::Reclaim);
    }

    #[test]
    fn test_zero_idle_minutes_reclaims_any_idle_agent() {
        let strategy = RetentionStrategy::new(Duration::from_secs(60));
        let agent = agent(0);
        agent.mark_connected(Utc::now());

        assert_eq!(strategy.check(&agent, Duration::ZERO), RetentionDecision::Keep);
        assert_eq!(strategy.check(&agent, Duration::from_millis(1)), RetentionDecision::Reclaim);
    }
}
