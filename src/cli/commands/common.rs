//! Argument groups shared by several commands.

use anyhow::{bail, Context, Result};
use clap::Args;
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::adapters::fs::LineGoalQueue;
use crate::cli::context::AppContext;
use crate::domain::models::{
    BatchOptions, DecompositionPlan, GateRequest, Goal, ProgramOptions, RetentionPolicy, RiskLevel,
    SchedulingStrategy, SessionKind,
};
use crate::domain::ports::GoalQueue;
use crate::services::BatchInput;

/// Where a batch takes its goals from.
#[derive(Args, Debug, Clone, Default)]
pub struct GoalSourceArgs {
    /// Goals, one per argument
    pub goals: Vec<String>,

    /// File with one goal per line, or a JSON array of goals
    #[arg(long, value_name = "PATH", conflicts_with = "goals")]
    pub goals_file: Option<PathBuf>,

    /// Split one broad goal into several goals
    #[arg(long, value_name = "GOAL", conflicts_with_all = ["goals", "goals_file"])]
    pub decompose_goal: Option<String>,

    /// Number of goals to produce with --decompose-goal
    #[arg(long, default_value = "5", requires = "decompose_goal")]
    pub decompose_count: usize,

    /// Fail when the decomposition quality stays below the configured minimum
    #[arg(long, requires = "decompose_goal")]
    pub enforce_quality: bool,
}

impl GoalSourceArgs {
    pub fn is_empty(&self) -> bool {
        self.goals.is_empty() && self.goals_file.is_none() && self.decompose_goal.is_none()
    }

    /// Resolve the goals, returning the decomposition record when one ran.
    pub async fn resolve(&self, ctx: &AppContext) -> Result<(BatchInput, Option<DecompositionPlan>)> {
        if let Some(broad) = &self.decompose_goal {
            let plan = ctx
                .decomposer()
                .decompose(broad, self.decompose_count, self.enforce_quality)?;
            let input = BatchInput::from_goals(Goal::from_texts(&plan.goals));
            return Ok((input, Some(plan)));
        }

        let texts = match &self.goals_file {
            Some(path) => read_goals_file(path).await?,
            None => self.goals.clone(),
        };
        let goals = Goal::from_texts(texts);
        if goals.is_empty() {
            bail!("No goals given. Pass goals, --goals-file or --decompose-goal");
        }
        Ok((
            BatchInput::from_goals(goals).with_goals_file(self.goals_file.clone()),
            None,
        ))
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum GoalsDocument {
    List(Vec<String>),
    Wrapped { goals: Vec<String> },
}

async fn read_goals_file(path: &Path) -> Result<Vec<String>> {
    if path.extension().is_some_and(|ext| ext == "json") {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read goals file {}", path.display()))?;
        let document: GoalsDocument = serde_json::from_str(&content)
            .with_context(|| format!("Goals file {} is not a JSON goal list", path.display()))?;
        return Ok(match document {
            GoalsDocument::List(goals) | GoalsDocument::Wrapped { goals } => goals,
        });
    }
    if !path.exists() {
        bail!("Goals file {} does not exist", path.display());
    }
    Ok(LineGoalQueue::new().pending(path).await?)
}

/// Batch resource and retry flags.
#[derive(Args, Debug, Clone, Default)]
pub struct BatchFlags {
    /// Goals run concurrently (clamped to the configured maximum)
    #[arg(long)]
    pub batch_parallel: Option<usize>,

    /// Total agent units available to the batch
    #[arg(long)]
    pub batch_agent_budget: Option<usize>,

    /// Agent units one goal may use
    #[arg(long)]
    pub per_goal_max_parallel: Option<usize>,

    /// fifo or complex-first
    #[arg(long)]
    pub scheduling_strategy: Option<SchedulingStrategy>,

    /// Priority boost per earlier attempt under complex-first
    #[arg(long)]
    pub aging_factor: Option<f64>,

    /// Retry rounds over failed goals
    #[arg(long, default_value = "0")]
    pub batch_retry_rounds: u32,

    /// Retry until every goal completes (bounded by the configured cap)
    #[arg(long)]
    pub batch_retry_until_complete: bool,

    /// Keep scheduling after a goal fails
    #[arg(long)]
    pub continue_on_error: bool,

    /// Plan goals without side effects
    #[arg(long)]
    pub dry_run: bool,
}

impl BatchFlags {
    pub fn options(&self) -> BatchOptions {
        BatchOptions {
            batch_parallel: self.batch_parallel,
            agent_budget: self.batch_agent_budget,
            per_goal_max_parallel: self.per_goal_max_parallel,
            scheduling_strategy: self.scheduling_strategy,
            aging_factor: self.aging_factor,
            retry_rounds: self.batch_retry_rounds,
            retry_until_complete: self.batch_retry_until_complete,
            continue_on_error: self.continue_on_error,
            dry_run: self.dry_run,
        }
    }
}

/// Program gate and auto-recovery flags.
#[derive(Args, Debug, Clone, Default)]
pub struct GateFlags {
    /// Primary gate profile (default, staging, prod or a configured one)
    #[arg(long = "program-gate-profile")]
    pub profile: Option<String>,

    /// Override the primary profile's maximum risk level
    #[arg(long = "program-max-risk-level")]
    pub max_risk_level: Option<RiskLevel>,

    /// Override the primary profile's maximum agent budget
    #[arg(long = "program-max-agent-budget")]
    pub max_agent_budget: Option<usize>,

    /// Profile evaluated when the primary one fails
    #[arg(long = "program-gate-fallback-profile")]
    pub fallback_profile: Option<String>,

    /// Further fallback profiles, comma-separated, evaluated in order
    #[arg(long = "program-gate-fallback-chain", value_delimiter = ',')]
    pub fallback_chain: Vec<String>,

    /// Run recover cycles when the effective gate fails
    #[arg(long = "program-auto-recover")]
    pub auto_recover: bool,

    /// Recover cycles run by --program-auto-recover
    #[arg(long = "program-auto-recover-max-rounds", default_value = "1")]
    pub auto_recover_max_rounds: u32,
}

impl GateFlags {
    pub fn request(&self) -> GateRequest {
        GateRequest {
            profile: self.profile.clone(),
            max_risk_level: self.max_risk_level,
            max_agent_budget: self.max_agent_budget,
            fallback_profile: self.fallback_profile.clone(),
            fallback_chain: self.fallback_chain.clone(),
        }
    }

    pub fn program_options(&self, batch: &BatchFlags) -> ProgramOptions {
        ProgramOptions {
            batch: batch.options(),
            gate: self.request(),
            auto_recover: self.auto_recover,
            auto_recover_max_rounds: self.auto_recover_max_rounds,
        }
    }
}

/// Retention flags; unset values fall back to the configured policy.
#[derive(Args, Debug, Clone, Default)]
pub struct PruneFlags {
    /// Newest records always kept
    #[arg(long)]
    pub keep: Option<usize>,

    /// Only prune records older than this many days
    #[arg(long)]
    pub older_than_days: Option<u32>,

    /// Records newer than this many days are never pruned
    #[arg(long)]
    pub protect_window_days: Option<u32>,

    /// Prune spec directories even when they are still referenced
    #[arg(long)]
    pub no_protect_active: bool,

    /// Include per-record protection reasons
    #[arg(long)]
    pub show_protection_reasons: bool,

    /// Report candidates without deleting
    #[arg(long)]
    pub dry_run: bool,

    /// Exit non-zero when more deletes than this fail
    #[arg(long)]
    pub hard_fail_threshold: Option<usize>,
}

impl PruneFlags {
    /// Policy for `kind`, or for spec directories when `kind` is None.
    pub fn policy(&self, ctx: &AppContext, kind: Option<SessionKind>) -> RetentionPolicy {
        let mut policy = match kind {
            Some(kind) => ctx.retention.default_policy(kind),
            None => RetentionPolicy::keep(0)
                .protect_window(ctx.config.retention.protect_window_days),
        };
        if let Some(keep) = self.keep {
            policy.keep = keep;
        }
        if let Some(days) = self.older_than_days {
            policy = policy.older_than(days);
        }
        if let Some(days) = self.protect_window_days {
            policy = policy.protect_window(days);
        }
        policy.protect_active = !self.no_protect_active;
        policy.show_protection_reasons = self.show_protection_reasons;
        policy.hard_fail_threshold = self.hard_fail_threshold;
        policy.dry_run(self.dry_run)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::Config;

    #[tokio::test]
    async fn test_goals_file_lines_and_json() {
        let dir = tempfile::tempdir().expect("tempdir");
        let lines = dir.path().join("goals.lines");
        tokio::fs::write(&lines, "# backlog\nship queue\n\nharden retry\n")
            .await
            .expect("write");
        assert_eq!(
            read_goals_file(&lines).await.expect("lines"),
            vec!["ship queue".to_string(), "harden retry".to_string()]
        );

        let json = dir.path().join("goals.json");
        tokio::fs::write(&json, r#"{"goals": ["a", "b", "c"]}"#)
            .await
            .expect("write");
        assert_eq!(read_goals_file(&json).await.expect("json").len(), 3);

        assert!(read_goals_file(&dir.path().join("missing.lines")).await.is_err());
    }

    #[tokio::test]
    async fn test_decompose_source_produces_plan() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ctx = AppContext::new(Config::for_workspace(dir.path()));
        let source = GoalSourceArgs {
            decompose_goal: Some(
                "deliver retry resilience, then quality gate evidence and kpi monitoring".into(),
            ),
            decompose_count: 2,
            ..GoalSourceArgs::default()
        };

        let (input, plan) = source.resolve(&ctx).await.expect("resolve");
        let plan = plan.expect("plan recorded");
        assert_eq!(plan.produced_goal_count, input.goals.len());
        assert!(input.goals.len() <= 2);
    }

    #[test]
    fn test_prune_flags_override_configured_policy() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ctx = AppContext::new(Config::for_workspace(dir.path()));
        let flags = PruneFlags {
            keep: Some(3),
            dry_run: true,
            ..PruneFlags::default()
        };

        let policy = flags.policy(&ctx, Some(SessionKind::BatchSession));
        assert_eq!(policy.keep, 3);
        assert!(policy.dry_run);
        assert!(policy.protect_active);
        assert_eq!(policy.protect_window_days, ctx.config.retention.protect_window_days);

        let configured = PruneFlags::default().policy(&ctx, Some(SessionKind::ControllerSession));
        assert_eq!(configured.keep, ctx.config.retention.controller_keep);
    }
}
