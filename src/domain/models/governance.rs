//! Governance stabilization loop models.
//!
//! A governance session is a sequence of rounds. Each round observes a program
//! outcome, picks one remediation action from a fixed catalog and records the
//! configuration patch it applied. Rounds are appended and never mutated.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::batch::{BatchOptions, ResourcePlan, SchedulingStrategy};
use super::program::{GateRequest, RiskLevel};
use super::session::{RecordStatus, SessionHandle};

/// How a round produces its next observation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExecutionMode {
    /// Re-run the whole program with a patched configuration
    #[default]
    ProgramReplay,
    /// Re-run only the failed goals of a previous summary
    RecoverCycle,
}

impl ExecutionMode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ProgramReplay => "program-replay",
            Self::RecoverCycle => "recover-cycle",
        }
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ExecutionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "program-replay" | "replay" => Ok(Self::ProgramReplay),
            "recover-cycle" | "recover" => Ok(Self::RecoverCycle),
            other => Err(format!("unknown execution mode: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StopReason {
    TargetRiskReached,
    MaxRoundsExhausted,
    NonMutatingMode,
}

impl StopReason {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TargetRiskReached => "target-risk-reached",
            Self::MaxRoundsExhausted => "max-rounds-exhausted",
            Self::NonMutatingMode => "non-mutating-mode",
        }
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Partial override of batch options, keyed the way operators write them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_retry_until_complete: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_agent_budget: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_parallel: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_retry_rounds: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub continue_on_error: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduling_strategy: Option<SchedulingStrategy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aging_factor: Option<f64>,
}

impl ConfigPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn apply(&self, options: &mut BatchOptions) {
        if let Some(value) = self.batch_retry_until_complete {
            options.retry_until_complete = value;
        }
        if let Some(value) = self.batch_agent_budget {
            options.agent_budget = Some(value);
        }
        if let Some(value) = self.batch_parallel {
            options.batch_parallel = Some(value);
        }
        if let Some(value) = self.batch_retry_rounds {
            options.retry_rounds = value;
        }
        if let Some(value) = self.continue_on_error {
            options.continue_on_error = value;
        }
        if let Some(value) = self.scheduling_strategy {
            options.scheduling_strategy = Some(value);
        }
        if let Some(value) = self.aging_factor {
            options.aging_factor = Some(value);
        }
    }
}

/// Remediation catalog, in declared order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RemediationAction {
    RetryUntilComplete,
    ReduceAgentBudget,
    IncreaseRetryRounds,
    SerializeExecution,
    ComplexFirstScheduling,
}

impl RemediationAction {
    pub const CATALOG: [Self; 5] = [
        Self::RetryUntilComplete,
        Self::ReduceAgentBudget,
        Self::IncreaseRetryRounds,
        Self::SerializeExecution,
        Self::ComplexFirstScheduling,
    ];

    /// Look up an action by its 1-based catalog index.
    pub fn from_index(index: usize) -> Option<Self> {
        index.checked_sub(1).and_then(|i| Self::CATALOG.get(i).copied())
    }

    pub fn from_id(id: &str) -> Option<Self> {
        Self::CATALOG.into_iter().find(|action| action.id() == id)
    }

    /// 1-based catalog index.
    pub const fn index(self) -> usize {
        match self {
            Self::RetryUntilComplete => 1,
            Self::ReduceAgentBudget => 2,
            Self::IncreaseRetryRounds => 3,
            Self::SerializeExecution => 4,
            Self::ComplexFirstScheduling => 5,
        }
    }

    pub const fn id(self) -> &'static str {
        match self {
            Self::RetryUntilComplete => "retry-until-complete",
            Self::ReduceAgentBudget => "reduce-agent-budget",
            Self::IncreaseRetryRounds => "increase-retry-rounds",
            Self::SerializeExecution => "serialize-execution",
            Self::ComplexFirstScheduling => "complex-first-scheduling",
        }
    }

    pub const fn title(self) -> &'static str {
        match self {
            Self::RetryUntilComplete => "Retry failed goals until complete",
            Self::ReduceAgentBudget => "Halve the agent budget",
            Self::IncreaseRetryRounds => "Allow two more retry rounds",
            Self::SerializeExecution => "Run goals one at a time and keep going on errors",
            Self::ComplexFirstScheduling => "Schedule complex goals first with stronger aging",
        }
    }

    /// Patch this action applies on top of `options`, given the last observed plan.
    pub fn patch(self, options: &BatchOptions, observed: &ResourcePlan) -> ConfigPatch {
        match self {
            Self::RetryUntilComplete => ConfigPatch {
                batch_retry_until_complete: Some(true),
                ..ConfigPatch::default()
            },
            Self::ReduceAgentBudget => {
                let current = options
                    .agent_budget
                    .or(observed.agent_budget)
                    .unwrap_or_else(|| observed.peak_agent_usage())
                    .max(1);
                let budget = current.div_ceil(2).max(1);
                let parallel = options
                    .batch_parallel
                    .unwrap_or(observed.effective_goal_parallel)
                    .clamp(1, budget);
                ConfigPatch {
                    batch_agent_budget: Some(budget),
                    batch_parallel: Some(parallel),
                    ..ConfigPatch::default()
                }
            }
            Self::IncreaseRetryRounds => ConfigPatch {
                batch_retry_rounds: Some(options.retry_rounds + 2),
                ..ConfigPatch::default()
            },
            Self::SerializeExecution => ConfigPatch {
                batch_parallel: Some(1),
                continue_on_error: Some(true),
                ..ConfigPatch::default()
            },
            Self::ComplexFirstScheduling => ConfigPatch {
                scheduling_strategy: Some(SchedulingStrategy::ComplexFirst),
                aging_factor: Some(options.aging_factor.unwrap_or(observed.aging_factor) + 0.5),
                ..ConfigPatch::default()
            },
        }
    }
}

impl fmt::Display for RemediationAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// How the action of a round was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SelectionSource {
    /// Round ran without a patch
    Baseline,
    /// Explicit index supplied by the caller
    Pinned,
    RecoveryMemory,
    /// Declared catalog order
    Default,
}

/// One stabilization attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GovernanceRound {
    pub round: u32,
    pub execution_mode: ExecutionMode,
    pub selected_action_index: Option<usize>,
    pub selected_action: Option<String>,
    pub selection_source: SelectionSource,
    pub applied_patch: ConfigPatch,
    pub failure_signature: Option<String>,
    pub program_session: Option<SessionHandle>,
    pub gate_passed: bool,
    pub risk_level: RiskLevel,
    pub failed_goal_count: usize,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AdvisoryKind {
    ResumeLatestController,
    PruneStaleBatchSessions,
    DecayRecoveryMemory,
}

impl AdvisoryKind {
    pub const ALL: [Self; 3] = [
        Self::ResumeLatestController,
        Self::PruneStaleBatchSessions,
        Self::DecayRecoveryMemory,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ResumeLatestController => "resume-latest-controller",
            Self::PruneStaleBatchSessions => "prune-stale-batch-sessions",
            Self::DecayRecoveryMemory => "decay-recovery-memory",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdvisoryStatus {
    Applied,
    Failed,
    Skipped,
}

impl AdvisoryStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Applied => "applied",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvisoryAction {
    pub action: AdvisoryKind,
    pub status: AdvisoryStatus,
    pub detail: String,
}

/// Persisted stabilization loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GovernanceSession {
    pub status: RecordStatus,
    pub execution_mode: ExecutionMode,
    pub target_risk: RiskLevel,
    pub max_rounds: u32,
    pub performed_rounds: u32,
    pub converged: bool,
    pub stop_reason: Option<StopReason>,
    pub history: Vec<GovernanceRound>,
    /// Observe once without patching or re-running
    #[serde(default)]
    pub plan_only: bool,
    #[serde(default)]
    pub advisory: bool,
    #[serde(default)]
    pub execute_advisory: bool,
    #[serde(default)]
    pub advisory_actions: Vec<AdvisoryAction>,
    /// Goals replayed by program-replay rounds
    #[serde(default)]
    pub goals: Vec<String>,
    /// Batch options the next round runs with
    pub options: BatchOptions,
    pub gate: GateRequest,
    /// Summary the loop is currently recovering from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_summary: Option<SessionHandle>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pinned_action_index: Option<usize>,
}

impl GovernanceSession {
    /// Actions that did not reach the target risk earlier in this session.
    pub fn failed_actions(&self) -> Vec<RemediationAction> {
        self.history
            .iter()
            .filter(|round| !(round.gate_passed && round.risk_level <= self.target_risk))
            .filter_map(|round| round.selected_action.as_deref())
            .filter_map(RemediationAction::from_id)
            .collect()
    }

    pub fn remaining_rounds(&self) -> u32 {
        self.max_rounds.saturating_sub(self.performed_rounds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn observed(budget: Option<usize>, parallel: usize) -> ResourcePlan {
        ResourcePlan {
            agent_budget: budget,
            base_goal_parallel: parallel,
            effective_goal_parallel: parallel,
            per_goal_max_parallel: 1,
            scheduling_strategy: SchedulingStrategy::Fifo,
            aging_factor: 0.5,
            complexity_weight_total: 0.0,
        }
    }

    #[test]
    fn test_catalog_indexes_are_one_based() {
        assert_eq!(RemediationAction::from_index(1), Some(RemediationAction::RetryUntilComplete));
        assert_eq!(RemediationAction::from_index(5), Some(RemediationAction::ComplexFirstScheduling));
        assert_eq!(RemediationAction::from_index(0), None);
        assert_eq!(RemediationAction::from_index(6), None);
        for action in RemediationAction::CATALOG {
            assert_eq!(RemediationAction::from_index(action.index()), Some(action));
            assert_eq!(RemediationAction::from_id(action.id()), Some(action));
        }
    }

    #[test]
    fn test_reduce_agent_budget_halves() {
        let options = BatchOptions {
            agent_budget: Some(5),
            batch_parallel: Some(5),
            ..BatchOptions::default()
        };
        let patch = RemediationAction::ReduceAgentBudget.patch(&options, &observed(Some(5), 5));
        assert_eq!(patch.batch_agent_budget, Some(3));
        assert_eq!(patch.batch_parallel, Some(3));
    }

    #[test]
    fn test_patch_serializes_camel_case() {
        let patch = RemediationAction::RetryUntilComplete.patch(&BatchOptions::default(), &observed(None, 1));
        let value = serde_json::to_value(&patch).expect("serialize");
        assert_eq!(value, serde_json::json!({"batchRetryUntilComplete": true}));
    }

    #[test]
    fn test_apply_patch() {
        let mut options = BatchOptions {
            retry_rounds: 1,
            ..BatchOptions::default()
        };
        RemediationAction::IncreaseRetryRounds
            .patch(&options.clone(), &observed(None, 1))
            .apply(&mut options);
        RemediationAction::SerializeExecution
            .patch(&options.clone(), &observed(None, 1))
            .apply(&mut options);
        assert_eq!(options.retry_rounds, 3);
        assert_eq!(options.batch_parallel, Some(1));
        assert!(options.continue_on_error);
    }

    #[test]
    fn test_complex_first_raises_aging() {
        let patch = RemediationAction::ComplexFirstScheduling.patch(&BatchOptions::default(), &observed(None, 2));
        assert_eq!(patch.scheduling_strategy, Some(SchedulingStrategy::ComplexFirst));
        assert_eq!(patch.aging_factor, Some(1.0));
    }

    #[test]
    fn test_stop_reason_strings() {
        assert_eq!(StopReason::TargetRiskReached.as_str(), "target-risk-reached");
        assert_eq!(
            serde_json::to_value(StopReason::MaxRoundsExhausted).expect("serialize"),
            "max-rounds-exhausted"
        );
    }
}
