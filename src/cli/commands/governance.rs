//! `governance`: the stabilization loop.

use anyhow::Result;
use clap::Args;
use serde::Serialize;

use super::common::{BatchFlags, GateFlags};
use crate::cli::context::AppContext;
use crate::cli::display::{output, CommandOutput, DetailView};
use crate::cli::output::progress::with_spinner;
use crate::cli::CommandFailure;
use crate::domain::models::{
    ExecutionMode, GovernanceRound, RecordPayload, RecordStatus, RiskLevel, SessionHandle,
    SessionRecord, SessionRef, StopReason,
};
use crate::services::GovernanceRequest;

#[derive(Args, Debug)]
pub struct GovernanceArgs {
    /// Goals replayed by program-replay rounds
    pub goals: Vec<String>,

    /// program-replay or recover-cycle
    #[arg(long, default_value = "program-replay")]
    pub mode: ExecutionMode,

    /// Batch-like session to start from, by id, path or `latest`
    #[arg(long, value_name = "REF")]
    pub source: Option<String>,

    /// Risk level the loop stabilizes toward
    #[arg(long)]
    pub target_risk: Option<RiskLevel>,

    /// Rounds before the loop gives up
    #[arg(long)]
    pub max_rounds: Option<u32>,

    /// Always apply this remediation action (1-based catalog index)
    #[arg(long)]
    pub action_index: Option<usize>,

    /// Observe one round without patching or re-running
    #[arg(long)]
    pub plan_only: bool,

    /// Propose maintenance actions after the loop
    #[arg(long)]
    pub advisory: bool,

    /// Carry out the proposed maintenance actions
    #[arg(long, requires = "advisory")]
    pub execute_advisory: bool,

    /// Resume a governance session by id, path or `latest`
    #[arg(long, value_name = "REF", conflicts_with_all = ["goals", "source"])]
    pub resume: Option<String>,

    #[command(flatten)]
    pub batch: BatchFlags,

    #[command(flatten)]
    pub gate: GateFlags,
}

#[derive(Debug, Serialize)]
pub struct GovernanceOutput {
    #[serde(flatten)]
    pub record: SessionRecord,
    pub governance_session: SessionHandle,
    pub rounds: Vec<GovernanceRound>,
}

impl CommandOutput for GovernanceOutput {
    fn to_human(&self) -> String {
        let RecordPayload::Governance(session) = &self.record.payload else {
            return format!("Governance session {}", self.record.id);
        };
        let mut view = DetailView::new(&format!("Governance session {}", self.record.id))
            .field("status", session.status)
            .field("mode", session.execution_mode)
            .field("rounds", format!("{}/{}", session.performed_rounds, session.max_rounds))
            .field("target risk", session.target_risk)
            .field("converged", session.converged)
            .field_opt("stop reason", session.stop_reason.map(StopReason::as_str))
            .section("History");
        for round in &session.history {
            view = view.item(format!(
                "#{} {} -> gate {}, risk {}, {} failed",
                round.round,
                round.selected_action.as_deref().unwrap_or("baseline"),
                if round.gate_passed { "passed" } else { "failed" },
                round.risk_level,
                round.failed_goal_count
            ));
        }
        if !session.advisory_actions.is_empty() {
            view = view.section("Advisory actions");
            for action in &session.advisory_actions {
                view = view.item(format!(
                    "{} [{}] {}",
                    action.action.as_str(),
                    action.status.as_str(),
                    action.detail
                ));
            }
        }
        view.render()
    }
}

pub async fn execute(args: GovernanceArgs, ctx: &AppContext, json_mode: bool) -> Result<()> {
    let request = GovernanceRequest {
        execution_mode: args.mode,
        goals: args.goals,
        source: args.source.as_deref().map(SessionRef::parse),
        options: args.gate.program_options(&args.batch),
        target_risk: args.target_risk,
        max_rounds: args.max_rounds,
        pinned_action_index: args.action_index,
        plan_only: args.plan_only,
        advisory: args.advisory,
        execute_advisory: args.execute_advisory,
        resume: args.resume.as_deref().map(SessionRef::parse),
    };

    let governance = ctx.governance();
    let record = with_spinner(json_mode, "Running governance rounds...", governance.run(request)).await?;

    let (exhausted, rounds) = match &record.payload {
        RecordPayload::Governance(session) => (
            session.status == RecordStatus::Exhausted,
            session.history.clone(),
        ),
        _ => (false, Vec::new()),
    };
    output(
        &GovernanceOutput {
            governance_session: record.handle(),
            rounds,
            record,
        },
        json_mode,
    );

    if exhausted {
        return Err(CommandFailure::GateFailed("governance rounds exhausted before the target was met".to_string()).into());
    }
    Ok(())
}
