//! `maintain`: bulk retention over every archive plus recovery-memory decay.

use anyhow::Result;
use clap::Args;
use serde::Serialize;

use crate::cli::context::AppContext;
use crate::cli::display::{output, CommandOutput, DetailView};
use crate::cli::output::progress::with_spinner;
use crate::cli::CommandFailure;
use crate::domain::models::MaintenanceReport;

#[derive(Args, Debug)]
pub struct MaintainArgs {
    /// Report what would be deleted without deleting
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Debug, Serialize)]
pub struct MaintainOutput {
    #[serde(flatten)]
    pub report: MaintenanceReport,
    pub deleted_total: usize,
}

impl CommandOutput for MaintainOutput {
    fn to_human(&self) -> String {
        let report = &self.report;
        let title = if report.dry_run { "Maintenance (dry run)" } else { "Maintenance" };
        let mut view = DetailView::new(title);
        for archive in &report.archives {
            view = view.field(
                &archive.archive,
                format!(
                    "{} of {} removed, {} protected, {} errors",
                    archive.deleted.len(),
                    archive.total,
                    archive.protected_specs.len(),
                    archive.errors.len()
                ),
            );
        }
        view.field(
            "recovery memory",
            format!(
                "{} signatures decayed, {} remaining",
                report.recovery_memory.removed.len(),
                report.recovery_memory.remaining
            ),
        )
        .render()
    }
}

pub async fn execute(args: MaintainArgs, ctx: &AppContext, json_mode: bool) -> Result<()> {
    let stats = ctx.stats();
    let report = with_spinner(json_mode, "Pruning archives...", stats.maintain(args.dry_run)).await?;

    let exceeded = report.threshold_exceeded();
    output(
        &MaintainOutput {
            deleted_total: report.deleted_total(),
            report,
        },
        json_mode,
    );
    if exceeded {
        return Err(CommandFailure::ThresholdExceeded("maintenance".to_string()).into());
    }
    Ok(())
}
