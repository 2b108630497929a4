//! Batch scheduling domain models.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use super::goal::Portfolio;
use super::session::{RecordStatus, SessionHandle};

/// Status of one goal within a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GoalStatus {
    /// Dry run: planned but not executed
    Planned,
    Completed,
    /// The runner reported a failure
    Failed,
    /// The runner could not be invoked or returned an error
    Error,
}

impl GoalStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Planned => "planned",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Error => "error",
        }
    }

    /// Failed or errored goals are eligible for retry.
    pub const fn is_failure(self) -> bool {
        matches!(self, Self::Failed | Self::Error)
    }
}

impl fmt::Display for GoalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one goal within a batch. Retried entries are overwritten in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchResult {
    /// 1-based position in the batch input
    pub index: usize,
    pub goal: String,
    pub status: GoalStatus,
    pub master_spec: Option<String>,
    pub sub_spec_count: usize,
    #[serde(default)]
    pub sub_specs: Vec<String>,
    pub error: Option<String>,
    /// Number of times this goal has been executed
    #[serde(default = "default_attempts")]
    pub attempts: u32,
    /// Index in the batch this one was resumed from, if re-indexed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_index: Option<usize>,
}

const fn default_attempts() -> u32 {
    1
}

impl BatchResult {
    pub fn from_portfolio(
        index: usize,
        goal: impl Into<String>,
        status: GoalStatus,
        portfolio: &Portfolio,
        error: Option<String>,
    ) -> Self {
        Self {
            index,
            goal: goal.into(),
            status,
            master_spec: (!portfolio.master_spec.is_empty()).then(|| portfolio.master_spec.clone()),
            sub_spec_count: portfolio.sub_specs.len(),
            sub_specs: portfolio.sub_specs.clone(),
            error,
            attempts: 1,
            source_index: None,
        }
    }

    pub fn errored(index: usize, goal: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            index,
            goal: goal.into(),
            status: GoalStatus::Error,
            master_spec: None,
            sub_spec_count: 0,
            sub_specs: Vec::new(),
            error: Some(error.into()),
            attempts: 1,
            source_index: None,
        }
    }

    /// Every spec id produced for this goal, master first.
    pub fn spec_ids(&self) -> impl Iterator<Item = &str> {
        self.master_spec
            .iter()
            .map(String::as_str)
            .chain(self.sub_specs.iter().map(String::as_str))
    }
}

/// Ordering of goals within a scheduling round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SchedulingStrategy {
    #[default]
    Fifo,
    ComplexFirst,
}

impl SchedulingStrategy {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Fifo => "fifo",
            Self::ComplexFirst => "complex-first",
        }
    }
}

impl std::str::FromStr for SchedulingStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fifo" => Ok(Self::Fifo),
            "complex-first" | "complex_first" => Ok(Self::ComplexFirst),
            other => Err(format!("unknown scheduling strategy: {other}")),
        }
    }
}

/// Concurrency/budget decision for one batch.
///
/// Invariant: when `agent_budget` is set,
/// `effective_goal_parallel * per_goal_max_parallel <= agent_budget`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourcePlan {
    pub agent_budget: Option<usize>,
    pub base_goal_parallel: usize,
    pub effective_goal_parallel: usize,
    pub per_goal_max_parallel: usize,
    pub scheduling_strategy: SchedulingStrategy,
    pub aging_factor: f64,
    /// Sum of complexity scores over all goals in the batch
    #[serde(default)]
    pub complexity_weight_total: f64,
}

impl ResourcePlan {
    /// Peak agent units the plan can have in flight.
    pub const fn peak_agent_usage(&self) -> usize {
        self.effective_goal_parallel * self.per_goal_max_parallel
    }

    /// Share of the agent budget the plan may occupy, if a budget is set.
    pub fn budget_utilization(&self) -> Option<f64> {
        self.agent_budget
            .filter(|budget| *budget > 0)
            .map(|budget| self.peak_agent_usage() as f64 / budget as f64)
    }
}

/// One retry round as observed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryRoundReport {
    pub round: u32,
    pub attempted: usize,
    pub completed: usize,
    pub failed: usize,
    pub parallel: usize,
}

/// Retry contract for a batch, mutated as rounds execute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchRetry {
    pub enabled: bool,
    pub strategy: String,
    pub until_complete: bool,
    pub configured_rounds: u32,
    pub max_rounds: u32,
    pub performed_rounds: u32,
    pub exhausted: bool,
    #[serde(default)]
    pub rounds: Vec<RetryRoundReport>,
}

impl BatchRetry {
    pub const STRATEGY: &'static str = "adaptive";

    pub fn new(configured_rounds: u32, until_complete: bool, safety_cap: u32) -> Self {
        let max_rounds = if until_complete {
            safety_cap.max(configured_rounds)
        } else {
            configured_rounds
        };
        Self {
            enabled: max_rounds > 0,
            strategy: Self::STRATEGY.to_string(),
            until_complete,
            configured_rounds,
            max_rounds,
            performed_rounds: 0,
            exhausted: false,
            rounds: Vec::new(),
        }
    }
}

/// Caller-supplied knobs for one batch run. Unset values fall back to the
/// scheduler configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_parallel: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_budget: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub per_goal_max_parallel: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduling_strategy: Option<SchedulingStrategy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aging_factor: Option<f64>,
    #[serde(default)]
    pub retry_rounds: u32,
    #[serde(default)]
    pub retry_until_complete: bool,
    #[serde(default)]
    pub continue_on_error: bool,
    #[serde(default)]
    pub dry_run: bool,
}

/// How a resumed batch picks goals from its source summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResumeStrategy {
    /// Goals not yet completed
    #[default]
    Pending,
    /// Goals whose last known status was a failure
    FailedOnly,
}

impl std::str::FromStr for ResumeStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "failed-only" | "failed_only" => Ok(Self::FailedOnly),
            other => Err(format!("unknown resume strategy: {other}")),
        }
    }
}

/// Persisted batch run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub status: RecordStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goals_file: Option<PathBuf>,
    /// Goal texts in input order
    pub goals: Vec<String>,
    pub total_goals: usize,
    pub processed_goals: usize,
    pub completed_goals: usize,
    pub failed_goals: usize,
    pub batch_parallel: usize,
    pub resource_plan: ResourcePlan,
    pub batch_retry: BatchRetry,
    pub results: Vec<BatchResult>,
    pub stopped_early: bool,
    pub dry_run: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resumed_from: Option<SessionHandle>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resume_strategy: Option<ResumeStrategy>,
}

impl BatchSummary {
    /// Recount counters and derive the status from `results`.
    pub fn refresh(&mut self) {
        self.results.sort_by_key(|r| r.index);
        self.processed_goals = self.results.len().min(self.total_goals);
        self.completed_goals = self
            .results
            .iter()
            .filter(|r| r.status == GoalStatus::Completed)
            .count();
        self.failed_goals = self.results.iter().filter(|r| r.status.is_failure()).count();
        self.status = self.derive_status();
    }

    fn derive_status(&self) -> RecordStatus {
        if self.stopped_early {
            RecordStatus::Stopped
        } else if self.dry_run && self.failed_goals == 0 {
            RecordStatus::Planned
        } else if self.failed_goals == 0 && self.processed_goals == self.total_goals {
            RecordStatus::Completed
        } else if self.completed_goals > 0 {
            RecordStatus::PartialFailed
        } else {
            RecordStatus::Failed
        }
    }

    pub fn failed_results(&self) -> impl Iterator<Item = &BatchResult> {
        self.results.iter().filter(|r| r.status.is_failure())
    }

    pub fn total_sub_specs(&self) -> usize {
        self.results.iter().map(|r| r.sub_spec_count).sum()
    }

    /// Master plus sub-specs created (or planned) by this batch.
    pub fn estimated_spec_count(&self) -> usize {
        self.results
            .iter()
            .map(|r| usize::from(r.master_spec.is_some()) + r.sub_spec_count)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan(budget: Option<usize>, effective: usize, per_goal: usize) -> ResourcePlan {
        ResourcePlan {
            agent_budget: budget,
            base_goal_parallel: effective,
            effective_goal_parallel: effective,
            per_goal_max_parallel: per_goal,
            scheduling_strategy: SchedulingStrategy::Fifo,
            aging_factor: 0.5,
            complexity_weight_total: 0.0,
        }
    }

    fn result(index: usize, status: GoalStatus) -> BatchResult {
        BatchResult {
            index,
            goal: format!("goal {index}"),
            status,
            master_spec: Some(format!("{index:02}-00-goal")),
            sub_spec_count: 2,
            sub_specs: vec!["a".into(), "b".into()],
            error: None,
            attempts: 1,
            source_index: None,
        }
    }

    fn summary(results: Vec<BatchResult>, total: usize) -> BatchSummary {
        BatchSummary {
            status: RecordStatus::Running,
            goals_file: None,
            goals: (1..=total).map(|i| format!("goal {i}")).collect(),
            total_goals: total,
            processed_goals: 0,
            completed_goals: 0,
            failed_goals: 0,
            batch_parallel: 1,
            resource_plan: plan(None, 1, 1),
            batch_retry: BatchRetry::new(0, false, 10),
            results,
            stopped_early: false,
            dry_run: false,
            resumed_from: None,
            resume_strategy: None,
        }
    }

    #[test]
    fn test_budget_utilization() {
        assert_eq!(plan(Some(4), 2, 2).budget_utilization(), Some(1.0));
        assert_eq!(plan(None, 2, 2).budget_utilization(), None);
    }

    #[test]
    fn test_retry_until_complete_uses_safety_cap() {
        let retry = BatchRetry::new(2, true, 10);
        assert_eq!(retry.max_rounds, 10);
        assert!(retry.enabled);
        assert_eq!(retry.strategy, "adaptive");

        let disabled = BatchRetry::new(0, false, 10);
        assert!(!disabled.enabled);
    }

    #[test]
    fn test_refresh_statuses() {
        let mut all_ok = summary(vec![result(2, GoalStatus::Completed), result(1, GoalStatus::Completed)], 2);
        all_ok.refresh();
        assert_eq!(all_ok.status, RecordStatus::Completed);
        assert_eq!(all_ok.results[0].index, 1);

        let mut mixed = summary(vec![result(1, GoalStatus::Completed), result(2, GoalStatus::Failed)], 2);
        mixed.refresh();
        assert_eq!(mixed.status, RecordStatus::PartialFailed);
        assert_eq!(mixed.failed_goals, 1);

        let mut failed = summary(vec![result(1, GoalStatus::Error)], 1);
        failed.refresh();
        assert_eq!(failed.status, RecordStatus::Failed);
    }

    #[test]
    fn test_estimated_spec_count() {
        let s = summary(vec![result(1, GoalStatus::Completed), result(2, GoalStatus::Completed)], 2);
        assert_eq!(s.total_sub_specs(), 4);
        assert_eq!(s.estimated_spec_count(), 6);
    }

    #[test]
    fn test_parse_strategies() {
        assert_eq!("complex-first".parse::<SchedulingStrategy>(), Ok(SchedulingStrategy::ComplexFirst));
        assert_eq!("failed-only".parse::<ResumeStrategy>(), Ok(ResumeStrategy::FailedOnly));
        assert!("lifo".parse::<SchedulingStrategy>().is_err());
    }
}
