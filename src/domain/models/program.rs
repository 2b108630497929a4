//! Program-level KPI, diagnostics and gate models.
//!
//! A program is a batch run with master/sub coordination metadata layered on
//! top. Everything here is derived from a finished [`BatchSummary`]; the
//! snapshot is immutable and re-derived after every recovery or governance
//! round.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::batch::{BatchOptions, BatchSummary};
use super::config::RiskThresholds;
use super::session::SessionHandle;

/// Program risk level, ordered from least to most risky.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    #[default]
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    /// One level riskier, saturating at `High`.
    pub const fn escalate(self) -> Self {
        match self {
            Self::Low => Self::Medium,
            Self::Medium | Self::High => Self::High,
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RiskLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(format!("unknown risk level: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConvergenceState {
    /// No failed goals
    Converged,
    /// Some goals completed, some failed
    Partial,
    /// Nothing completed
    Failed,
}

/// Program KPI snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgramKpi {
    pub convergence_state: ConvergenceState,
    pub risk_level: RiskLevel,
    pub completion_rate_percent: f64,
    /// Failed results plus goals an early stop left unprocessed; equals
    /// `failed_goal_count + unprocessed_goal_count` of the diagnostics
    pub failed_goal_count: usize,
    pub total_goals: usize,
    pub budget_utilization_percent: Option<f64>,
    pub retry_rounds_performed: u32,
}

impl ProgramKpi {
    /// Derive the KPI from a finished batch.
    ///
    /// Risk starts from the failed-goal ratio and is escalated one level when
    /// failures coincide with a saturated agent budget or an exhausted retry
    /// policy.
    pub fn derive(batch: &BatchSummary, thresholds: &RiskThresholds) -> Self {
        let total = batch.total_goals;
        let failed = batch.failed_goals + total.saturating_sub(batch.processed_goals);
        let failed_ratio = if total == 0 { 0.0 } else { failed as f64 / total as f64 };
        let utilization = batch.resource_plan.budget_utilization();

        let mut risk_level = if failed == 0 || failed_ratio <= thresholds.medium_failure_ratio {
            RiskLevel::Low
        } else if failed_ratio <= thresholds.high_failure_ratio {
            RiskLevel::Medium
        } else {
            RiskLevel::High
        };

        if failed > 0 {
            let saturated =
                utilization.is_some_and(|u| u >= thresholds.budget_pressure_escalation);
            if saturated || batch.batch_retry.exhausted {
                risk_level = risk_level.escalate();
            }
        }

        let convergence_state = if failed == 0 {
            ConvergenceState::Converged
        } else if batch.completed_goals > 0 {
            ConvergenceState::Partial
        } else {
            ConvergenceState::Failed
        };

        let completion_rate_percent = if total == 0 {
            100.0
        } else {
            round2(batch.completed_goals as f64 * 100.0 / total as f64)
        };

        Self {
            convergence_state,
            risk_level,
            completion_rate_percent,
            failed_goal_count: failed,
            total_goals: total,
            budget_utilization_percent: utilization.map(|u| round2(u * 100.0)),
            retry_rounds_performed: batch.batch_retry.performed_rounds,
        }
    }
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedGoal {
    pub index: usize,
    pub goal: String,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramDiagnostics {
    /// Goals whose result is a failure; the length of `failed_goals`
    pub failed_goal_count: usize,
    pub failed_goals: Vec<FailedGoal>,
    /// Goals an early stop cancelled before they ran
    #[serde(default)]
    pub unprocessed_goal_count: usize,
    pub retry_exhausted: bool,
    pub stopped_early: bool,
}

impl ProgramDiagnostics {
    pub fn derive(batch: &BatchSummary) -> Self {
        let failed_goals: Vec<FailedGoal> = batch
            .failed_results()
            .map(|r| FailedGoal {
                index: r.index,
                goal: r.goal.clone(),
                error: r.error.clone(),
            })
            .collect();
        Self {
            failed_goal_count: failed_goals.len(),
            failed_goals,
            unprocessed_goal_count: batch.total_goals.saturating_sub(batch.processed_goals),
            retry_exhausted: batch.batch_retry.exhausted,
            stopped_early: batch.stopped_early,
        }
    }
}

/// Master/sub topology bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramCoordination {
    pub topology: String,
    pub master_spec_count: usize,
    pub sub_spec_count: usize,
    pub master_specs: Vec<String>,
    pub unresolved_goal_indexes: Vec<usize>,
}

impl ProgramCoordination {
    pub const TOPOLOGY: &'static str = "master-sub";

    pub fn derive(batch: &BatchSummary) -> Self {
        let master_specs: Vec<String> = batch
            .results
            .iter()
            .filter_map(|r| r.master_spec.clone())
            .collect();
        Self {
            topology: Self::TOPOLOGY.to_string(),
            master_spec_count: master_specs.len(),
            sub_spec_count: batch.total_sub_specs(),
            master_specs,
            unresolved_goal_indexes: batch.failed_results().map(|r| r.index).collect(),
        }
    }
}

/// Acceptance thresholds of one gate profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatePolicy {
    pub profile: String,
    pub max_risk_level: RiskLevel,
    pub max_agent_budget: Option<usize>,
}

/// Observed values a gate is evaluated against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateActual {
    pub risk_level: RiskLevel,
    pub agent_budget: Option<usize>,
    pub completion_rate_percent: f64,
    pub failed_goal_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateEvaluation {
    pub passed: bool,
    pub policy: GatePolicy,
    pub actual: GateActual,
    pub reasons: Vec<String>,
}

impl GatePolicy {
    pub fn evaluate(&self, actual: &GateActual) -> GateEvaluation {
        let mut reasons = Vec::new();

        if actual.risk_level > self.max_risk_level {
            reasons.push(format!(
                "risk level {} exceeds {} allowed by profile {}",
                actual.risk_level, self.max_risk_level, self.profile
            ));
        }

        if let (Some(cap), Some(used)) = (self.max_agent_budget, actual.agent_budget) {
            if used > cap {
                reasons.push(format!("agent budget {used} exceeds cap {cap}"));
            }
        }

        GateEvaluation {
            passed: reasons.is_empty(),
            policy: self.clone(),
            actual: actual.clone(),
            reasons,
        }
    }
}

/// Which gate profiles a program is evaluated against.
///
/// Overrides tighten the primary profile only; fallbacks use their own
/// profile definitions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateRequest {
    /// Primary profile; the configured default when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_risk_level: Option<RiskLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_agent_budget: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_profile: Option<String>,
    #[serde(default)]
    pub fallback_chain: Vec<String>,
}

/// Everything a program run needs besides its goals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgramOptions {
    #[serde(default)]
    pub batch: BatchOptions,
    #[serde(default)]
    pub gate: GateRequest,
    #[serde(default)]
    pub auto_recover: bool,
    #[serde(default = "default_auto_recover_rounds")]
    pub auto_recover_max_rounds: u32,
}

const fn default_auto_recover_rounds() -> u32 {
    1
}

impl Default for ProgramOptions {
    fn default() -> Self {
        Self {
            batch: BatchOptions::default(),
            gate: GateRequest::default(),
            auto_recover: false,
            auto_recover_max_rounds: default_auto_recover_rounds(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GateSource {
    Primary,
    FallbackChain,
}

/// Gate outcome after fallbacks were considered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectiveGate {
    pub passed: bool,
    pub source: GateSource,
    /// Fallback profile that passed, if any
    pub fallback_profile: Option<String>,
    pub attempted_fallback_count: usize,
    pub fallback_chain: Vec<String>,
}

/// Post-hoc recovery triggered automatically on gate failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoRecovery {
    pub enabled: bool,
    pub triggered: bool,
    pub converged: bool,
    pub rounds: u32,
    pub actions: Vec<String>,
}

/// Persisted program (or recover) run: batch shape plus governance metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgramSummary {
    #[serde(flatten)]
    pub batch: BatchSummary,
    pub program_kpi: ProgramKpi,
    pub program_diagnostics: ProgramDiagnostics,
    pub program_coordination: ProgramCoordination,
    pub program_gate: GateEvaluation,
    pub program_gate_effective: EffectiveGate,
    #[serde(default)]
    pub program_gate_fallbacks: Vec<GateEvaluation>,
    #[serde(default)]
    pub auto_recovery: AutoRecovery,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recovered_from: Option<SessionHandle>,
}

impl ProgramSummary {
    pub const fn gate_passed(&self) -> bool {
        self.program_gate_effective.passed
    }
}
