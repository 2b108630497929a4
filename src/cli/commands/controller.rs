//! `controller`: drain the goal queue file.

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use std::path::PathBuf;

use super::common::{BatchFlags, GateFlags};
use crate::cli::context::AppContext;
use crate::cli::display::{output, truncate_ellipsis, CommandOutput, DetailView};
use crate::cli::output::progress::with_spinner;
use crate::cli::CommandFailure;
use crate::domain::models::{RecordPayload, SessionHandle, SessionRecord, SessionRef};
use crate::services::ControllerRequest;

#[derive(Args, Debug)]
pub struct ControllerArgs {
    /// Queue file, one goal per line
    #[arg(long, value_name = "PATH")]
    pub queue_file: Option<PathBuf>,

    /// Append a goal to the queue before draining (repeatable)
    #[arg(long, value_name = "GOAL")]
    pub enqueue: Vec<String>,

    /// Goals taken per cycle
    #[arg(long)]
    pub dequeue_limit: Option<usize>,

    /// Cycles run by this invocation
    #[arg(long)]
    pub max_cycles: Option<u32>,

    /// Stop draining after a cycle whose gate failed
    #[arg(long)]
    pub stop_on_gate_failure: bool,

    /// Resume a controller session by id, path or `latest`
    #[arg(long, value_name = "REF", conflicts_with = "queue_file")]
    pub resume: Option<String>,

    #[command(flatten)]
    pub batch: BatchFlags,

    #[command(flatten)]
    pub gate: GateFlags,
}

#[derive(Debug, Serialize)]
pub struct ControllerOutput {
    #[serde(flatten)]
    pub record: SessionRecord,
    pub controller_session: SessionHandle,
}

impl CommandOutput for ControllerOutput {
    fn to_human(&self) -> String {
        let RecordPayload::Controller(session) = &self.record.payload else {
            return format!("Controller session {}", self.record.id);
        };
        let mut view = DetailView::new(&format!("Controller session {}", self.record.id))
            .field("status", session.status)
            .field("queue", session.queue_file.display())
            .field(
                "goals",
                format!(
                    "{} processed, {} completed, {} failed, {} pending",
                    session.processed_goals,
                    session.completed_goals,
                    session.failed_goals,
                    session.pending_goals
                ),
            );
        if session.stopped_on_gate_failure {
            view = view.field("stopped", "gate failure");
        }
        view = view.section("Cycles");
        for cycle in &session.cycles {
            view = view.item(format!(
                "#{} {} ({} goals, gate {}): {}",
                cycle.cycle,
                cycle.status,
                cycle.goals.len(),
                if cycle.gate_passed { "passed" } else { "failed" },
                truncate_ellipsis(&cycle.goals.join(" | "), 60)
            ));
        }
        view.render()
    }
}

pub async fn execute(args: ControllerArgs, ctx: &AppContext, json_mode: bool) -> Result<()> {
    let request = ControllerRequest {
        queue_file: args.queue_file,
        enqueue: args.enqueue,
        dequeue_limit: args.dequeue_limit,
        max_cycles: args.max_cycles,
        stop_on_gate_failure: args.stop_on_gate_failure,
        program: args.gate.program_options(&args.batch),
        resume: args.resume.as_deref().map(SessionRef::parse),
    };

    let controller = ctx.controller();
    let record = with_spinner(json_mode, "Draining goal queue...", controller.drain(request)).await?;

    let stopped = matches!(
        &record.payload,
        RecordPayload::Controller(session) if session.stopped_on_gate_failure
    );
    output(
        &ControllerOutput {
            controller_session: record.handle(),
            record,
        },
        json_mode,
    );

    if stopped {
        return Err(CommandFailure::GateFailed("controller stopped on a failed cycle".to_string()).into());
    }
    Ok(())
}
