//! `program`: a batch with master/sub coordination and a governance gate.

use anyhow::{bail, Result};
use clap::Args;
use serde::Serialize;
use std::path::PathBuf;

use super::batch::batch_view;
use super::common::{BatchFlags, GateFlags, GoalSourceArgs};
use crate::cli::context::AppContext;
use crate::cli::display::{count_label, output, CommandOutput, DetailView};
use crate::cli::output::progress::with_spinner;
use crate::cli::CommandFailure;
use crate::domain::models::{
    DecompositionPlan, ProgramSummary, ResumeStrategy, SessionHandle, SessionRecord, SessionRef,
};
use crate::services::{ProgramRun, ProgramSnapshots};

#[derive(Args, Debug)]
pub struct ProgramArgs {
    #[command(flatten)]
    pub source: GoalSourceArgs,

    #[command(flatten)]
    pub batch: BatchFlags,

    #[command(flatten)]
    pub gate: GateFlags,

    /// Resume a batch-like session by id, path or `latest`
    #[arg(long, value_name = "REF", conflicts_with_all = ["goals", "goals_file", "decompose_goal"])]
    pub resume: Option<String>,

    /// pending or failed-only
    #[arg(long, default_value = "pending", requires = "resume")]
    pub resume_strategy: ResumeStrategy,

    /// Write the program KPI snapshot to this file
    #[arg(long, value_name = "PATH")]
    pub program_kpi_out: Option<PathBuf>,

    /// Write the full gate audit payload to this file
    #[arg(long, value_name = "PATH")]
    pub program_audit_out: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
pub struct ProgramOutput {
    #[serde(flatten)]
    pub record: SessionRecord,
    pub program_session: SessionHandle,
    pub recover_sessions: Vec<SessionHandle>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decomposition: Option<DecompositionPlan>,
}

impl ProgramOutput {
    fn from_run(run: ProgramRun, decomposition: Option<DecompositionPlan>) -> Self {
        Self {
            program_session: run.record.handle(),
            recover_sessions: run.recoveries.iter().map(SessionRecord::handle).collect(),
            record: run.record,
            decomposition,
        }
    }
}

/// Gate and KPI lines appended to a program's batch view.
pub(crate) fn program_view(title: &str, program: &ProgramSummary) -> DetailView {
    let kpi = &program.program_kpi;
    let effective = &program.program_gate_effective;
    let mut view = batch_view(title, &program.batch)
        .section("Program")
        .field(
            "risk",
            format!("{} ({:.1}% complete)", kpi.risk_level, kpi.completion_rate_percent),
        )
        .field("gate profile", &program.program_gate.policy.profile)
        .field("gate passed", program.program_gate.passed)
        .field("effective gate", effective.passed)
        .field_opt("passing fallback", effective.fallback_profile.as_deref());
    if effective.attempted_fallback_count > 0 {
        view = view.field("fallbacks tried", effective.attempted_fallback_count);
    }
    if program.auto_recovery.triggered {
        view = view.field(
            "auto-recovery",
            format!(
                "{} rounds, {}",
                program.auto_recovery.rounds,
                if program.auto_recovery.converged { "converged" } else { "not converged" }
            ),
        );
    }
    for reason in &program.program_gate.reasons {
        view = view.item(reason);
    }
    view
}

impl CommandOutput for ProgramOutput {
    fn to_human(&self) -> String {
        let title = format!("Program session {}", self.record.id);
        let mut view = match self.record.payload.program() {
            Some(program) => program_view(&title, program),
            None => DetailView::new(&title),
        };
        if !self.recover_sessions.is_empty() {
            view = view.section("Recover sessions");
            for handle in &self.recover_sessions {
                view = view.item(&handle.id);
            }
        }
        view.render()
    }
}

pub async fn execute(args: ProgramArgs, ctx: &AppContext, json_mode: bool) -> Result<()> {
    let options = args.gate.program_options(&args.batch);
    let snapshots = ProgramSnapshots {
        kpi_out: args.program_kpi_out,
        audit_out: args.program_audit_out,
    };

    let (run, decomposition) = match args.resume.as_deref() {
        Some(reference) => {
            let reference = SessionRef::parse(reference);
            let run = with_spinner(
                json_mode,
                "Resuming program...",
                ctx.coordinator
                    .resume(&reference, args.resume_strategy, &options, &snapshots),
            )
            .await?;
            (run, None)
        }
        None => {
            if args.source.is_empty() {
                bail!("Pass goals, --goals-file, --decompose-goal or --resume");
            }
            let (input, plan) = args.source.resolve(ctx).await?;
            let label = count_label(input.goals.len(), "goal", "goals");
            let run = with_spinner(
                json_mode,
                format!("Running program over {label}..."),
                ctx.coordinator.run(input, &options, &snapshots),
            )
            .await?;
            (run, plan)
        }
    };

    let gate_passed = run.gate_passed();
    let reasons = run
        .summary()
        .map(|program| program.program_gate.reasons.join("; "))
        .unwrap_or_default();
    output(&ProgramOutput::from_run(run, decomposition), json_mode);

    if !gate_passed {
        return Err(CommandFailure::GateFailed(reasons).into());
    }
    Ok(())
}
