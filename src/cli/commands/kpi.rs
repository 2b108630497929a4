//! `kpi trend`: period-bucketed success rates over the archives.

use anyhow::Result;
use clap::{Args, Subcommand};
use serde::Serialize;

use crate::cli::context::AppContext;
use crate::cli::display::{output, report_table, CommandOutput, DetailView};
use crate::domain::models::{KpiTrendReport, PeriodUnit, TrendBucket};
use crate::services::TrendQuery;

#[derive(Args, Debug)]
pub struct KpiArgs {
    #[command(subcommand)]
    pub command: KpiCommands,
}

#[derive(Subcommand, Debug)]
pub enum KpiCommands {
    /// Success-rate trend with anomaly flags
    Trend {
        /// Lookback window in days
        #[arg(long)]
        window_days: Option<u32>,

        /// day or week
        #[arg(long, default_value = "week")]
        period: PeriodUnit,

        /// Only runs of this mode (batch, program, recover, controller)
        #[arg(long)]
        mode: Option<String>,

        /// Render periods as a table
        #[arg(long)]
        table: bool,
    },
}

#[derive(Debug, Serialize)]
pub struct TrendOutput {
    #[serde(flatten)]
    pub report: KpiTrendReport,
    #[serde(skip)]
    pub table: bool,
}

fn modes(bucket: &TrendBucket) -> String {
    bucket
        .mode_breakdown
        .iter()
        .map(|(mode, count)| format!("{mode}:{count}"))
        .collect::<Vec<_>>()
        .join(" ")
}

impl TrendOutput {
    fn render_table(&self) -> String {
        let mut table = report_table(&["period", "runs", "success %", "avg sub-specs", "avg specs", "modes"]);
        for bucket in self.report.periods.iter().chain([&self.report.overall]) {
            table.add_row(vec![
                bucket.period.clone(),
                bucket.runs.to_string(),
                format!("{:.1}", bucket.success_rate_percent),
                format!("{:.2}", bucket.average_sub_specs),
                format!("{:.2}", bucket.average_estimated_specs),
                modes(bucket),
            ]);
        }
        table.to_string()
    }
}

impl CommandOutput for TrendOutput {
    fn to_human(&self) -> String {
        let report = &self.report;
        let mut lines = Vec::new();
        if self.table {
            lines.push(self.render_table());
        } else {
            let mut view = DetailView::new(&format!(
                "KPI trend, last {} days by {}",
                report.window_days,
                report.period_unit.as_str()
            ))
            .field("runs", report.total_runs)
            .field("success rate", format!("{:.1}%", report.overall.success_rate_percent))
            .field("modes", modes(&report.overall))
            .section("Periods");
            for bucket in &report.periods {
                view = view.item(format!(
                    "{}: {} runs, {:.1}% success",
                    bucket.period, bucket.runs, bucket.success_rate_percent
                ));
            }
            lines.push(view.render());
        }
        if !report.anomalies.is_empty() {
            lines.push(String::new());
            lines.push("Anomalies:".to_string());
            for anomaly in &report.anomalies {
                lines.push(format!("  ! {}", anomaly.message));
            }
        }
        lines.join("\n")
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(&self.report).unwrap_or_default()
    }
}

pub async fn execute(args: KpiArgs, ctx: &AppContext, json_mode: bool) -> Result<()> {
    match args.command {
        KpiCommands::Trend {
            window_days,
            period,
            mode,
            table,
        } => {
            let query = TrendQuery {
                window_days,
                period_unit: period,
                mode,
            };
            let report = ctx.kpi().trend(&query).await?;
            output(&TrendOutput { report, table }, json_mode);
        }
    }
    Ok(())
}
