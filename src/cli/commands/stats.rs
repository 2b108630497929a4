//! `stats`: cross-archive governance statistics.

use anyhow::Result;
use serde::Serialize;

use super::sessions::archive_view;
use crate::cli::context::AppContext;
use crate::cli::display::{output, CommandOutput, DetailView};
use crate::cli::output::progress::with_spinner;
use crate::domain::models::GovernanceStats;

#[derive(Debug, Serialize)]
pub struct StatsOutput {
    #[serde(flatten)]
    pub stats: GovernanceStats,
}

impl CommandOutput for StatsOutput {
    fn to_human(&self) -> String {
        let stats = &self.stats;
        let memory = &stats.recovery_memory;
        let mut sections = vec![DetailView::new("Governance health")
            .field("risk", stats.health.risk_level)
            .field("specs", stats.spec_count)
            .field(
                "recovery memory",
                format!(
                    "{} signatures, {} attempts ({} ok, {} failed)",
                    memory.signatures, memory.attempts, memory.successes, memory.failures
                ),
            )
            .section("Concerns")
            .render()];
        if stats.health.concerns.is_empty() {
            sections.push("  none".to_string());
        }
        for concern in &stats.health.concerns {
            sections.push(format!("  \u{2022} {concern}"));
        }
        for archive in &stats.archives {
            sections.push(String::new());
            sections.push(archive_view(archive).render());
        }
        sections.join("\n")
    }
}

pub async fn execute(ctx: &AppContext, json_mode: bool) -> Result<()> {
    let service = ctx.stats();
    let stats = with_spinner(json_mode, "Reading archives...", service.stats()).await?;
    output(&StatsOutput { stats }, json_mode);
    Ok(())
}
