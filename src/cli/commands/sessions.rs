//! `sessions <kind> list|stats|prune`.

use anyhow::Result;
use clap::{Args, Subcommand};
use serde::Serialize;

use super::common::PruneFlags;
use crate::cli::context::AppContext;
use crate::cli::display::{
    list_table, output, render_list, timestamp, truncate_ellipsis, CommandOutput, DetailView,
};
use crate::cli::CommandFailure;
use crate::domain::models::{
    ArchiveStats, ListQuery, PruneReport, RecordStatus, SessionKind, SessionListing,
};

#[derive(Args, Debug)]
pub struct SessionsArgs {
    /// session, batch, controller or governance
    pub kind: SessionKind,

    #[command(subcommand)]
    pub command: SessionsCommands,
}

#[derive(Subcommand, Debug)]
pub enum SessionsCommands {
    /// List records, newest first
    List {
        /// Only records with this status
        #[arg(short, long)]
        status: Option<RecordStatus>,

        /// Maximum number of records to display
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
    /// Counts by status and the latest records
    Stats,
    /// Delete old records
    Prune(PruneFlags),
}

#[derive(Debug, Serialize)]
pub struct SessionListOutput {
    #[serde(flatten)]
    pub listing: SessionListing,
}

impl CommandOutput for SessionListOutput {
    fn to_human(&self) -> String {
        let mut table = list_table(&["id", "mode", "status", "created", "summary"]);
        for item in &self.listing.items {
            table.add_row(vec![
                item.id.clone(),
                item.mode.clone(),
                item.status.to_string(),
                timestamp(&item.created_at),
                truncate_ellipsis(&item.headline, 50),
            ]);
        }
        render_list(self.listing.kind.as_str(), &table, self.listing.total)
    }
}

#[derive(Debug, Serialize)]
pub struct ArchiveStatsOutput {
    #[serde(flatten)]
    pub stats: ArchiveStats,
}

impl CommandOutput for ArchiveStatsOutput {
    fn to_human(&self) -> String {
        archive_view(&self.stats).render()
    }
}

pub(crate) fn archive_view(stats: &ArchiveStats) -> DetailView {
    let mut view = DetailView::new(&format!("{} archive", stats.kind)).field("total", stats.total);
    for (status, count) in &stats.by_status {
        view = view.field(status, count);
    }
    if !stats.latest.is_empty() {
        view = view.section("Latest");
        for item in &stats.latest {
            view = view.item(format!("{} [{}] {}", item.id, item.status, item.headline));
        }
    }
    view
}

#[derive(Debug, Serialize)]
pub struct PruneOutput {
    #[serde(flatten)]
    pub report: PruneReport,
}

impl CommandOutput for PruneOutput {
    fn to_human(&self) -> String {
        let report = &self.report;
        let deleted_label = if report.dry_run { "would delete" } else { "deleted" };
        let mut view = DetailView::new(&format!("Pruned {}", report.archive))
            .field("total", report.total)
            .field("candidates", report.candidate_count)
            .field(deleted_label, report.deleted.len())
            .field("errors", report.errors.len());
        for (reason, count) in &report.protection_reasons {
            view = view.field(&format!("protected ({reason})"), count);
        }
        if !report.protected_specs.is_empty() {
            view = view.section("Protected");
            for record in &report.protected_specs {
                let reasons: Vec<&str> = record.reasons.iter().map(|r| r.as_str()).collect();
                view = view.item(format!(
                    "{} ({}, {} refs)",
                    record.id,
                    reasons.join(", "),
                    record.reference_count
                ));
            }
        }
        if !report.errors.is_empty() {
            view = view.section("Errors");
            for error in &report.errors {
                view = view.item(format!("{}: {}", error.id, error.error));
            }
        }
        view.render()
    }
}

/// Print a prune report and fail when its threshold was exceeded.
pub(crate) fn finish_prune(report: PruneReport, json_mode: bool) -> Result<()> {
    let exceeded = report.threshold_exceeded;
    let summary = format!("{} delete errors in {}", report.errors.len(), report.archive);
    output(&PruneOutput { report }, json_mode);
    if exceeded {
        return Err(CommandFailure::ThresholdExceeded(summary).into());
    }
    Ok(())
}

pub async fn execute(args: SessionsArgs, ctx: &AppContext, json_mode: bool) -> Result<()> {
    let kind = args.kind;
    match args.command {
        SessionsCommands::List { status, limit } => {
            let listing = ctx
                .retention
                .list_sessions(kind, &ListQuery { status, limit: Some(limit) })
                .await?;
            output(&SessionListOutput { listing }, json_mode);
        }
        SessionsCommands::Stats => {
            let stats = ctx.retention.session_stats(kind).await?;
            output(&ArchiveStatsOutput { stats }, json_mode);
        }
        SessionsCommands::Prune(flags) => {
            let policy = flags.policy(ctx, Some(kind));
            let report = ctx.retention.prune_sessions(kind, &policy).await?;
            finish_prune(report, json_mode)?;
        }
    }
    Ok(())
}
