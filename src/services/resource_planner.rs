//! Resource planning for batches.

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{BatchOptions, Goal, ResourcePlan, SchedulerConfig};

/// Derive the concurrency/budget plan for a batch.
///
/// `effective_goal_parallel = min(base_goal_parallel, agent_budget / per_goal_max_parallel)`,
/// never below 1. When the budget is smaller than the per-goal allowance the
/// per-goal allowance is lowered to the budget so the product never exceeds it.
pub fn plan_resources(
    config: &SchedulerConfig,
    options: &BatchOptions,
    goals: &[Goal],
) -> DomainResult<ResourcePlan> {
    let agent_budget = options.agent_budget.or(config.default_agent_budget);
    if agent_budget == Some(0) {
        return Err(DomainError::InvalidConfiguration(
            "agent budget must be at least 1".to_string(),
        ));
    }
    if options.batch_parallel == Some(0) {
        return Err(DomainError::InvalidConfiguration(
            "batch parallel must be at least 1".to_string(),
        ));
    }

    let mut per_goal_max_parallel = options
        .per_goal_max_parallel
        .unwrap_or(config.per_goal_max_parallel)
        .max(1);
    let base_goal_parallel = options
        .batch_parallel
        .unwrap_or(config.default_parallel)
        .clamp(1, config.max_parallel.max(1))
        .min(goals.len().max(1));

    let effective_goal_parallel = match agent_budget {
        Some(budget) => {
            per_goal_max_parallel = per_goal_max_parallel.min(budget);
            base_goal_parallel.min(budget / per_goal_max_parallel).max(1)
        }
        None => base_goal_parallel,
    };

    Ok(ResourcePlan {
        agent_budget,
        base_goal_parallel,
        effective_goal_parallel,
        per_goal_max_parallel,
        scheduling_strategy: options
            .scheduling_strategy
            .unwrap_or(config.scheduling_strategy),
        aging_factor: options.aging_factor.unwrap_or(config.aging_factor),
        complexity_weight_total: goals.iter().map(Goal::weight).sum(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn goals(n: usize) -> Vec<Goal> {
        (0..n).map(|i| Goal::new(format!("goal {i}"))).collect()
    }

    #[test]
    fn test_defaults_are_serial() {
        let plan = plan_resources(&SchedulerConfig::default(), &BatchOptions::default(), &goals(2))
            .expect("plan");
        assert_eq!(plan.effective_goal_parallel, 1);
        assert_eq!(plan.agent_budget, None);
    }

    #[test]
    fn test_budget_caps_parallelism() {
        let options = BatchOptions {
            batch_parallel: Some(8),
            agent_budget: Some(6),
            per_goal_max_parallel: Some(2),
            ..BatchOptions::default()
        };
        let plan = plan_resources(&SchedulerConfig::default(), &options, &goals(10)).expect("plan");
        assert_eq!(plan.base_goal_parallel, 8);
        assert_eq!(plan.effective_goal_parallel, 3);
        assert_eq!(plan.peak_agent_usage(), 6);
    }

    #[test]
    fn test_parallel_clamped_to_goal_count_and_max() {
        let options = BatchOptions {
            batch_parallel: Some(50),
            ..BatchOptions::default()
        };
        let plan = plan_resources(&SchedulerConfig::default(), &options, &goals(3)).expect("plan");
        assert_eq!(plan.effective_goal_parallel, 3);

        let plan = plan_resources(&SchedulerConfig::default(), &options, &goals(40)).expect("plan");
        assert_eq!(plan.effective_goal_parallel, 20);
    }

    #[test]
    fn test_small_budget_lowers_per_goal_allowance() {
        let options = BatchOptions {
            agent_budget: Some(1),
            per_goal_max_parallel: Some(4),
            batch_parallel: Some(2),
            ..BatchOptions::default()
        };
        let plan = plan_resources(&SchedulerConfig::default(), &options, &goals(2)).expect("plan");
        assert_eq!(plan.per_goal_max_parallel, 1);
        assert_eq!(plan.effective_goal_parallel, 1);
    }

    #[test]
    fn test_zero_budget_rejected() {
        let options = BatchOptions {
            agent_budget: Some(0),
            ..BatchOptions::default()
        };
        let err = plan_resources(&SchedulerConfig::default(), &options, &goals(1)).expect_err("invalid");
        assert!(err.is_configuration());
    }
}
