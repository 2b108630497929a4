//! `batch`: run or resume a batch of goals.

use anyhow::{bail, Result};
use clap::Args;
use serde::Serialize;

use super::common::{BatchFlags, GoalSourceArgs};
use crate::cli::context::AppContext;
use crate::cli::display::{count_label, output, truncate_ellipsis, CommandOutput, DetailView};
use crate::cli::output::progress::with_spinner;
use crate::domain::models::{
    BatchSummary, DecompositionPlan, ResumeStrategy, SessionHandle, SessionRecord, SessionRef,
};

#[derive(Args, Debug)]
pub struct BatchArgs {
    #[command(flatten)]
    pub source: GoalSourceArgs,

    #[command(flatten)]
    pub batch: BatchFlags,

    /// Resume a batch-like session by id, path or `latest`
    #[arg(long, value_name = "REF", conflicts_with_all = ["goals", "goals_file", "decompose_goal"])]
    pub resume: Option<String>,

    /// pending or failed-only
    #[arg(long, default_value = "pending", requires = "resume")]
    pub resume_strategy: ResumeStrategy,
}

#[derive(Debug, Serialize)]
pub struct BatchOutput {
    #[serde(flatten)]
    pub record: SessionRecord,
    pub batch_session: SessionHandle,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decomposition: Option<DecompositionPlan>,
}

impl CommandOutput for BatchOutput {
    fn to_human(&self) -> String {
        let title = format!("Batch session {}", self.record.id);
        match self.record.payload.batch() {
            Some(batch) => batch_view(&title, batch).render(),
            None => title,
        }
    }
}

/// Detail view shared by batch-shaped outputs.
pub(crate) fn batch_view(title: &str, batch: &BatchSummary) -> DetailView {
    let plan = &batch.resource_plan;
    let retry = &batch.batch_retry;
    let mut view = DetailView::new(title)
        .field("status", batch.status)
        .field(
            "goals",
            format!(
                "{} processed of {}, {} completed, {} failed",
                batch.processed_goals, batch.total_goals, batch.completed_goals, batch.failed_goals
            ),
        )
        .field(
            "parallel",
            format!(
                "{} goals x {} agents (budget {})",
                plan.effective_goal_parallel,
                plan.per_goal_max_parallel,
                plan.agent_budget.map_or_else(|| "unbounded".to_string(), |b| b.to_string())
            ),
        )
        .field("strategy", plan.scheduling_strategy.as_str())
        .field(
            "retry",
            format!(
                "{}/{} rounds{}",
                retry.performed_rounds,
                retry.max_rounds,
                if retry.exhausted { ", exhausted" } else { "" }
            ),
        )
        .field_opt("resumed from", batch.resumed_from.as_ref().map(|h| &h.id));
    if batch.stopped_early {
        view = view.field("stopped early", "yes");
    }

    view = view.section("Results");
    for result in &batch.results {
        let detail = result
            .error
            .as_deref()
            .or(result.master_spec.as_deref())
            .unwrap_or("-");
        view = view.item(format!(
            "#{} {} {}: {}",
            result.index,
            result.status,
            truncate_ellipsis(&result.goal, 48),
            detail
        ));
    }
    view
}

pub async fn execute(args: BatchArgs, ctx: &AppContext, json_mode: bool) -> Result<()> {
    let options = args.batch.options();

    let (record, decomposition) = match args.resume.as_deref() {
        Some(reference) => {
            let reference = SessionRef::parse(reference);
            let record = with_spinner(
                json_mode,
                "Resuming batch...",
                ctx.scheduler.resume_batch(&reference, args.resume_strategy, &options),
            )
            .await?;
            (record, None)
        }
        None => {
            if args.source.is_empty() {
                bail!("Pass goals, --goals-file, --decompose-goal or --resume");
            }
            let (input, plan) = args.source.resolve(ctx).await?;
            let label = count_label(input.goals.len(), "goal", "goals");
            let record = with_spinner(
                json_mode,
                format!("Running {label}..."),
                ctx.scheduler.run_batch(input, &options),
            )
            .await?;
            (record, plan)
        }
    };

    output(
        &BatchOutput {
            batch_session: record.handle(),
            record,
            decomposition,
        },
        json_mode,
    );
    Ok(())
}
