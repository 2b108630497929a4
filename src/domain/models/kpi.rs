//! KPI trend and governance statistics models.

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::program::RiskLevel;
use super::prune::PruneReport;
use super::recovery_memory::{DecayReport, RecoveryMemoryTotals};
use super::session::{SessionKind, SessionSummary};

/// Calendar bucket used by trend reports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeriodUnit {
    Day,
    #[default]
    Week,
}

impl PeriodUnit {
    /// Bucket key: `YYYY-MM-DD` for days, ISO `YYYY-Www` for weeks.
    pub fn key(self, at: DateTime<Utc>) -> String {
        match self {
            Self::Day => at.format("%Y-%m-%d").to_string(),
            Self::Week => {
                let week = at.iso_week();
                format!("{}-W{:02}", week.year(), week.week())
            }
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Day => "day",
            Self::Week => "week",
        }
    }
}

impl std::str::FromStr for PeriodUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "day" | "daily" => Ok(Self::Day),
            "week" | "weekly" => Ok(Self::Week),
            other => Err(format!("unknown period unit: {other}")),
        }
    }
}

/// Aggregated figures for one period, or for the whole window.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrendBucket {
    pub period: String,
    pub runs: usize,
    pub successful_runs: usize,
    pub success_rate_percent: f64,
    pub mode_breakdown: BTreeMap<String, usize>,
    pub average_sub_specs: f64,
    pub average_estimated_specs: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AnomalyKind {
    SuccessRateDrop,
    VolumeSpike,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KpiAnomaly {
    pub period: String,
    pub kind: AnomalyKind,
    pub value: f64,
    pub baseline: f64,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KpiTrendReport {
    pub generated_at: DateTime<Utc>,
    pub window_days: u32,
    pub period_unit: PeriodUnit,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode_filter: Option<String>,
    pub total_runs: usize,
    pub mode_breakdown: BTreeMap<String, usize>,
    pub overall: TrendBucket,
    pub periods: Vec<TrendBucket>,
    pub anomalies: Vec<KpiAnomaly>,
}

/// Per-archive figures for governance stats.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveStats {
    pub kind: SessionKind,
    pub total: usize,
    pub by_status: BTreeMap<String, usize>,
    pub latest: Vec<SessionSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GovernanceHealth {
    pub risk_level: RiskLevel,
    pub concerns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GovernanceStats {
    pub generated_at: DateTime<Utc>,
    pub archives: Vec<ArchiveStats>,
    pub spec_count: usize,
    pub recovery_memory: RecoveryMemoryTotals,
    pub health: GovernanceHealth,
}

/// Outcome of one maintenance pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaintenanceReport {
    pub dry_run: bool,
    pub archives: Vec<PruneReport>,
    pub recovery_memory: DecayReport,
}

impl MaintenanceReport {
    pub fn deleted_total(&self) -> usize {
        self.archives.iter().map(|report| report.deleted.len()).sum()
    }

    pub fn threshold_exceeded(&self) -> bool {
        self.archives.iter().any(|report| report.threshold_exceeded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_period_keys() {
        let at = Utc.with_ymd_and_hms(2024, 12, 30, 12, 0, 0).single().expect("valid date");
        assert_eq!(PeriodUnit::Day.key(at), "2024-12-30");
        // 2024-12-30 belongs to ISO week 1 of 2025
        assert_eq!(PeriodUnit::Week.key(at), "2025-W01");
    }

    #[test]
    fn test_parse_period_unit() {
        assert_eq!("Day".parse::<PeriodUnit>(), Ok(PeriodUnit::Day));
        assert!("month".parse::<PeriodUnit>().is_err());
    }
}
