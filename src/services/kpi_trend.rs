//! KPI trend aggregation over the batch and controller archives.

use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    AnomalyKind, KpiAnomaly, KpiConfig, KpiTrendReport, PeriodUnit, RecordPayload, SessionKind,
    SessionRecord, TrendBucket,
};
use crate::domain::ports::SessionRepository;

/// Minimum runs in a period before it can count as a volume spike.
const SPIKE_MIN_RUNS: usize = 3;

#[derive(Debug, Clone, Default)]
pub struct TrendQuery {
    pub window_days: Option<u32>,
    pub period_unit: PeriodUnit,
    /// Only runs of this mode (batch, program, recover, controller)
    pub mode: Option<String>,
}

/// One archived run reduced to what the trend needs.
#[derive(Debug, Clone, PartialEq)]
pub struct TrendRun {
    pub mode: String,
    pub at: DateTime<Utc>,
    pub success: bool,
    pub sub_specs: usize,
    pub estimated_specs: usize,
}

impl TrendRun {
    /// Trend view of a record; `None` for records outside the trend archives.
    pub fn from_record(record: &SessionRecord) -> Option<Self> {
        let (sub_specs, estimated_specs) = match &record.payload {
            RecordPayload::Batch(_) | RecordPayload::Program(_) | RecordPayload::Recover(_) => {
                let batch = record.payload.batch()?;
                (batch.total_sub_specs(), batch.estimated_spec_count())
            }
            RecordPayload::Controller(_) => (0, 0),
            RecordPayload::Session(_) | RecordPayload::Governance(_) => return None,
        };
        Some(Self {
            mode: record.payload.mode().to_string(),
            at: record.created_at,
            success: record.status().is_success(),
            sub_specs,
            estimated_specs,
        })
    }
}

pub struct KpiTrendService {
    sessions: Arc<dyn SessionRepository>,
    config: KpiConfig,
}

impl KpiTrendService {
    pub fn new(sessions: Arc<dyn SessionRepository>, config: KpiConfig) -> Self {
        Self { sessions, config }
    }

    #[instrument(skip(self))]
    pub async fn trend(&self, query: &TrendQuery) -> DomainResult<KpiTrendReport> {
        let mut runs = Vec::new();
        for kind in [SessionKind::BatchSession, SessionKind::ControllerSession] {
            let records = self.sessions.load_all(kind).await?;
            runs.extend(records.iter().filter_map(TrendRun::from_record));
        }
        debug!(runs = runs.len(), "trend runs loaded");
        build_report(&runs, query, &self.config, Utc::now())
    }
}

/// Bucket `runs` into periods within the window ending at `now` and flag
/// anomalies against the trailing periods.
pub fn build_report(
    runs: &[TrendRun],
    query: &TrendQuery,
    config: &KpiConfig,
    now: DateTime<Utc>,
) -> DomainResult<KpiTrendReport> {
    let window_days = query.window_days.unwrap_or(config.window_days);
    if window_days == 0 {
        return Err(DomainError::InvalidConfiguration(
            "kpi window must be at least one day".to_string(),
        ));
    }
    let since = now - Duration::days(i64::from(window_days));

    let selected: Vec<&TrendRun> = runs
        .iter()
        .filter(|run| run.at >= since && run.at <= now)
        .filter(|run| query.mode.as_deref().is_none_or(|mode| run.mode == mode))
        .collect();

    let mut grouped: BTreeMap<String, Vec<&TrendRun>> = BTreeMap::new();
    for run in &selected {
        grouped.entry(query.period_unit.key(run.at)).or_default().push(run);
    }
    let periods: Vec<TrendBucket> = grouped
        .into_iter()
        .map(|(period, runs)| bucket(period, &runs))
        .collect();

    let overall = bucket("overall".to_string(), &selected);
    let anomalies = detect_anomalies(&periods, config);

    Ok(KpiTrendReport {
        generated_at: now,
        window_days,
        period_unit: query.period_unit,
        mode_filter: query.mode.clone(),
        total_runs: selected.len(),
        mode_breakdown: overall.mode_breakdown.clone(),
        overall,
        periods,
        anomalies,
    })
}

fn bucket(period: String, runs: &[&TrendRun]) -> TrendBucket {
    let count = runs.len();
    let successful_runs = runs.iter().filter(|run| run.success).count();
    let mut mode_breakdown = BTreeMap::new();
    for run in runs {
        *mode_breakdown.entry(run.mode.clone()).or_insert(0) += 1;
    }
    let average = |total: usize| {
        if count == 0 {
            0.0
        } else {
            round2(total as f64 / count as f64)
        }
    };
    TrendBucket {
        period,
        runs: count,
        successful_runs,
        success_rate_percent: if count == 0 {
            0.0
        } else {
            round2(successful_runs as f64 * 100.0 / count as f64)
        },
        mode_breakdown,
        average_sub_specs: average(runs.iter().map(|run| run.sub_specs).sum()),
        average_estimated_specs: average(runs.iter().map(|run| run.estimated_specs).sum()),
    }
}

fn detect_anomalies(periods: &[TrendBucket], config: &KpiConfig) -> Vec<KpiAnomaly> {
    let mut anomalies = Vec::new();
    for (i, current) in periods.iter().enumerate() {
        let trailing = &periods[i.saturating_sub(config.trailing_periods)..i];
        if trailing.is_empty() {
            continue;
        }
        let n = trailing.len() as f64;
        let rate_baseline = round2(trailing.iter().map(|p| p.success_rate_percent).sum::<f64>() / n);
        let volume_baseline = round2(trailing.iter().map(|p| p.runs as f64).sum::<f64>() / n);

        if rate_baseline - current.success_rate_percent >= config.anomaly_drop_percent {
            anomalies.push(KpiAnomaly {
                period: current.period.clone(),
                kind: AnomalyKind::SuccessRateDrop,
                value: current.success_rate_percent,
                baseline: rate_baseline,
                message: format!(
                    "success rate {:.1}% is {:.1} points below the trailing average",
                    current.success_rate_percent,
                    rate_baseline - current.success_rate_percent
                ),
            });
        }
        if current.runs >= SPIKE_MIN_RUNS && current.runs as f64 > 2.0 * volume_baseline {
            anomalies.push(KpiAnomaly {
                period: current.period.clone(),
                kind: AnomalyKind::VolumeSpike,
                value: current.runs as f64,
                baseline: volume_baseline,
                message: format!(
                    "{} runs against a trailing average of {volume_baseline:.1}",
                    current.runs
                ),
            });
        }
    }
    anomalies
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
