//! `plan` and `run`: one goal through the close loop.

use anyhow::{bail, Result};
use clap::Args;
use serde::Serialize;

use crate::cli::context::AppContext;
use crate::cli::display::{output, CommandOutput, DetailView};
use crate::cli::output::progress::with_spinner;
use crate::domain::models::{PruneReport, RecordPayload, RetentionPolicy, SessionRecord, SessionRef};
use crate::services::CloseLoopRequest;

#[derive(Args, Debug)]
pub struct CloseLoopArgs {
    /// Goal text; taken from the resumed session when omitted
    pub goal: Option<String>,

    /// Continue from a session id, path or `latest`
    #[arg(long, value_name = "REF")]
    pub resume: Option<String>,

    /// Prune the session archive to this many records afterwards
    #[arg(long)]
    pub session_keep: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct CloseLoopOutput {
    #[serde(flatten)]
    pub record: SessionRecord,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_retention: Option<PruneReport>,
}

impl CommandOutput for CloseLoopOutput {
    fn to_human(&self) -> String {
        let RecordPayload::Session(session) = &self.record.payload else {
            return format!("Session {}", self.record.id);
        };
        let mut view = DetailView::new(&format!("Close-loop session {}", self.record.id))
            .field("status", session.status)
            .field("goal", &session.goal)
            .field("complexity", session.complexity_score)
            .field("master spec", &session.portfolio.master_spec)
            .field_opt("resumed from", session.resumed_from_session.as_deref())
            .field_opt("error", session.error.as_deref())
            .field("file", self.record.file.display())
            .section(&format!("Sub-specs ({})", session.sub_spec_count));
        for spec in &session.portfolio.sub_specs {
            view = view.item(spec);
        }
        if let Some(report) = &self.session_retention {
            view = view
                .section("Session retention")
                .field("deleted", report.deleted_count)
                .field("errors", report.errors.len());
        }
        view.render()
    }
}

pub async fn execute(args: CloseLoopArgs, dry_run: bool, ctx: &AppContext, json_mode: bool) -> Result<()> {
    if args.goal.is_none() && args.resume.is_none() {
        bail!("Pass a goal or --resume");
    }

    let request = CloseLoopRequest {
        goal: args.goal,
        dry_run,
        resume: args.resume.as_deref().map(SessionRef::parse),
        session_retention: args.session_keep.map(|keep| {
            RetentionPolicy::keep(keep).protect_window(ctx.config.retention.protect_window_days)
        }),
    };

    let message = if dry_run { "Planning goal..." } else { "Running goal..." };
    let outcome = with_spinner(json_mode, message, ctx.close_loop().run(request)).await?;

    output(
        &CloseLoopOutput {
            record: outcome.record,
            session_retention: outcome.retention,
        },
        json_mode,
    );
    Ok(())
}
