//! Provisioning strategy.
//!
//! Compares queued demand for a label with the capacity that exists or is on
//! its way, and asks clouds for the difference. Capacity in flight is the
//! larger of what the planner already knows about and what the clouds report
//! as pending, so launches are not double counted.

use std::sync::Arc;

use tracing::{debug, info};

use crate::cloud::{Cloud, PlannedAgent};
use crate::label::LabelExpr;

/// Executor counts for one label at one instant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadSnapshot {
    pub available_executors: u32,
    pub connecting_executors: u32,
    pub queue_length: u32,
}

#[derive(Debug, Clone, Default)]
pub struct StrategyState {
    pub label: Option<LabelExpr>,
    pub snapshot: LoadSnapshot,
    /// Executors planned earlier in this planning round.
    pub additional_planned_capacity: u32,
    /// Executors already planned when the round started.
    pub planned_capacity_snapshot: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyDecision {
    /// Demand is covered.
    ProvisioningCompleted,
    /// Other strategies should be consulted.
    ConsultRemainingStrategies,
}

#[derive(Debug)]
pub struct StrategyOutcome {
    pub decision: StrategyDecision,
    pub planned: Vec<PlannedAgent>,
    /// An immediate planner review is worthwhile.
    pub suggest_review: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ProvisioningStrategy;

impl ProvisioningStrategy {
    pub fn new() -> Self {
        Self
    }

    pub async fn apply(&self, state: &StrategyState, clouds: &[Arc<dyn Cloud>]) -> StrategyOutcome {
        let label = state.label.as_ref();
        let capable: Vec<_> = clouds.iter().filter(|c| c.can_provision(label)).collect();

        let demand = u64::from(state.snapshot.queue_length);
        let planned_by_planner =
            u64::from(state.additional_planned_capacity) + u64::from(state.planned_capacity_snapshot);
        let pending: u64 = capable.iter().map(|c| c.pending_executors()).sum();
        let mut capacity = u64::from(state.snapshot.available_executors)
            + u64::from(state.snapshot.connecting_executors)
            + planned_by_planner.max(pending);
        let previous = capacity;

        debug!(
            label = ?label.map(ToString::to_string),
            demand,
            capacity,
            pending,
            "Evaluating provisioning demand"
        );

        let mut planned = Vec::new();
        for cloud in capable {
            if capacity >= demand {
                break;
            }
            let excess = u32::try_from(demand - capacity).unwrap_or(u32::MAX);
            let agents = cloud.provision(label, excess).await;
            let added: u64 = agents.iter().map(|a| u64::from(a.executors)).sum();
            if added > 0 {
                info!(cloud = %cloud.name(), workers = agents.len(), executors = added, "Provisioned capacity");
            }
            capacity += added;
            planned.extend(agents);
        }

        let decision = if capacity >= demand {
            StrategyDecision::ProvisioningCompleted
        } else {
            StrategyDecision::ConsultRemainingStrategies
        };

        StrategyOutcome {
            decision,
            planned,
            suggest_review: capacity > previous && label.is_some(),
        }
    }

    /// Returns true if a queued item for `label` warrants an immediate review.
    pub fn should_review(&self, label: Option<&LabelExpr>, clouds: &[Arc<dyn Cloud>]) -> bool {
        clouds.iter().any(|c| c.can_provision(label))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::error::LaunchError;
    use crate::launch::LaunchState;

    /// Cloud that plans workers of a fixed size without launching anything.
    struct FakeCloud {
        label: &'static str,
        executors: u32,
        pending: u64,
        requests: Mutex<Vec<u32>>,
        counter: AtomicU32,
    }

    impl FakeCloud {
        fn new(label: &'static str, executors: u32, pending: u64) -> Arc<Self> {
            Arc::new(Self {
                label,
                executors,
                pending,
                requests: Mutex::new(Vec::new()),
                counter: AtomicU32::new(0),
            })
        }

        fn requests(&self) -> Vec<u32> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Cloud for FakeCloud {
        fn name(&self) -> &str {
            self.label
        }

        fn can_provision(&self, label: Option<&LabelExpr>) -> bool {
            label.is_some_and(|l| l.matches(&crate::label::label_set(self.label)))
        }

        async fn provision(&self, _label: Option<&LabelExpr>, excess: u32) -> Vec<PlannedAgent> {
            self.requests.lock().unwrap().push(excess);
            let count = excess.div_ceil(self.executors);
            (0..count)
                .map(|_| {
                    let n = self.counter.fetch_add(1, Ordering::SeqCst);
                    PlannedAgent {
                        name: format!("{}-{n}", self.label),
                        executors: self.executors,
                        handle: tokio::spawn(async {
                            Err(LaunchError::Aborted("fake".to_string()))
                        }),
                        state: tokio::sync::watch::channel(LaunchState::Created).1,
                    }
                })
                .collect()
        }

        fn pending_executors(&self) -> u64 {
            self.pending
        }
    }

    fn state(label: &str, available: u32, connecting: u32, queue: u32) -> StrategyState {
        StrategyState {
            label: Some(LabelExpr::parse(label).unwrap()),
            snapshot: LoadSnapshot {
                available_executors: available,
                connecting_executors: connecting,
                queue_length: queue,
            },
            ..StrategyState::default()
        }
    }

    #[tokio::test]
    async fn test_provisions_the_shortfall() {
        let cloud = FakeCloud::new("linux", 2, 0);
        let clouds: Vec<Arc<dyn Cloud>> = vec![cloud.clone()];

        let outcome = ProvisioningStrategy::new()
            .apply(&state("linux", 1, 0, 6), &clouds)
            .await;

        assert_eq!(cloud.requests(), vec![5]);
        assert_eq!(outcome.planned.len(), 3);
        assert_eq!(outcome.decision, StrategyDecision::ProvisioningCompleted);
        assert!(outcome.suggest_review);
    }

    #[tokio::test]
    async fn test_covered_demand_provisions_nothing() {
        let cloud = FakeCloud::new("linux", 1, 0);
        let clouds: Vec<Arc<dyn Cloud>> = vec![cloud.clone()];

        let outcome = ProvisioningStrategy::new()
            .apply(&state("linux", 2, 2, 4), &clouds)
            .await;

        assert!(cloud.requests().is_empty());
        assert!(outcome.planned.is_empty());
        assert_eq!(outcome.decision, StrategyDecision::ProvisioningCompleted);
        assert!(!outcome.suggest_review);
    }

    #[tokio::test]
    async fn test_pending_launches_count_as_capacity() {
        let cloud = FakeCloud::new("linux", 1, 3);
        let clouds: Vec<Arc<dyn Cloud>> = vec![cloud.clone()];

        // planner knows of 1 planned executor, cloud reports 3 pending: use 3
        let mut s = state("linux", 0, 0, 5);
        s.planned_capacity_snapshot = 1;
        ProvisioningStrategy::new().apply(&s, &clouds).await;

        assert_eq!(cloud.requests(), vec![2]);
    }

    #[tokio::test]
    async fn test_no_capable_cloud_defers_to_other_strategies() {
        let cloud = FakeCloud::new("windows", 1, 0);
        let clouds: Vec<Arc<dyn Cloud>> = vec![cloud.clone()];
        let strategy = ProvisioningStrategy::new();

        let outcome = strategy.apply(&state("linux", 0, 0, 2), &clouds).await;

        assert!(cloud.requests().is_empty());
        assert_eq!(outcome.decision, StrategyDecision::ConsultRemainingStrategies);
        assert!(!strategy.should_review(Some(&LabelExpr::parse("linux").unwrap()), &clouds));
        assert!(strategy.should_review(Some(&LabelExpr::parse("windows").unwrap()), &clouds));
    }

    #[tokio::test]
    async fn test_later_clouds_cover_the_remainder() {
        let small = FakeCloud::new("linux", 4, 0);
        let other = FakeCloud::new("linux", 1, 0);
        let clouds: Vec<Arc<dyn Cloud>> = vec![small.clone(), other.clone()];

        let outcome = ProvisioningStrategy::new()
            .apply(&state("linux", 0, 0, 3), &clouds)
            .await;

        assert_eq!(small.requests(), vec![3]);
        assert!(other.requests().is_empty());
        assert_eq!(outcome.planned.len(), 1);
    }
}
