//! Cross-archive governance statistics and bulk maintenance.

use chrono::Utc;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use super::recovery_memory_service::RecoveryMemoryService;
use super::retention_service::RetentionService;
use crate::domain::errors::DomainResult;
use crate::domain::models::{
    ArchiveStats, GovernanceHealth, GovernanceStats, MaintenanceReport, RecordStatus, RiskLevel,
    SessionKind,
};

/// Share of failed batch-like runs above which health is high risk.
const FAILED_RUN_RATIO_HIGH: f64 = 0.5;

pub struct GovernanceStatsService {
    retention: Arc<RetentionService>,
    memory: Arc<RecoveryMemoryService>,
}

impl GovernanceStatsService {
    pub fn new(retention: Arc<RetentionService>, memory: Arc<RecoveryMemoryService>) -> Self {
        Self { retention, memory }
    }

    #[instrument(skip(self))]
    pub async fn stats(&self) -> DomainResult<GovernanceStats> {
        let mut archives = Vec::with_capacity(SessionKind::ALL.len());
        for kind in SessionKind::ALL {
            archives.push(self.retention.session_stats(kind).await?);
        }
        let spec_count = self.retention.list_specs().await?.total;
        let recovery_memory = self.memory.totals().await?;
        let health = assess_health(&archives);

        Ok(GovernanceStats {
            generated_at: Utc::now(),
            archives,
            spec_count,
            recovery_memory,
            health,
        })
    }

    /// Prune every session archive with its configured keep count, then decay
    /// stale recovery-memory signatures.
    #[instrument(skip(self))]
    pub async fn maintain(&self, dry_run: bool) -> DomainResult<MaintenanceReport> {
        let mut archives = Vec::with_capacity(SessionKind::ALL.len());
        for kind in SessionKind::ALL {
            let policy = self.retention.default_policy(kind).dry_run(dry_run);
            archives.push(self.retention.prune_sessions(kind, &policy).await?);
        }
        let ttl = self.retention.config().recovery_memory_ttl_days;
        let recovery_memory = self.memory.decay(ttl, dry_run).await?;

        let report = MaintenanceReport {
            dry_run,
            archives,
            recovery_memory,
        };
        info!(
            deleted = report.deleted_total(),
            signatures_removed = report.recovery_memory.removed.len(),
            dry_run,
            "maintenance finished"
        );
        Ok(report)
    }
}

fn status_count(stats: &ArchiveStats, status: RecordStatus) -> usize {
    stats.by_status.get(status.as_str()).copied().unwrap_or(0)
}

/// Health summary: each concern carries a severity and the worst one wins.
pub fn assess_health(archives: &[ArchiveStats]) -> GovernanceHealth {
    let mut risk_level = RiskLevel::Low;
    let mut concerns = Vec::new();
    let mut raise = |level: RiskLevel, concern: String| {
        risk_level = risk_level.max(level);
        concerns.push(concern);
    };

    for stats in archives {
        match stats.kind {
            SessionKind::BatchSession if stats.total > 0 => {
                let failed = status_count(stats, RecordStatus::Failed)
                    + status_count(stats, RecordStatus::PartialFailed);
                let ratio = failed as f64 / stats.total as f64;
                if ratio > FAILED_RUN_RATIO_HIGH {
                    raise(
                        RiskLevel::High,
                        format!("{failed} of {} batch runs ended with failures", stats.total),
                    );
                } else if failed > 0 {
                    raise(
                        RiskLevel::Medium,
                        format!("{failed} of {} batch runs ended with failures", stats.total),
                    );
                }
            }
            SessionKind::GovernanceSession => {
                let exhausted = status_count(stats, RecordStatus::Exhausted);
                if exhausted > 0 {
                    raise(
                        RiskLevel::Medium,
                        format!("{exhausted} governance sessions exhausted their rounds"),
                    );
                }
            }
            SessionKind::ControllerSession => {
                let running = status_count(stats, RecordStatus::Running);
                if running > 0 {
                    raise(
                        RiskLevel::Medium,
                        format!("{running} controller sessions still have pending work"),
                    );
                }
            }
            _ => {}
        }
    }

    if risk_level > RiskLevel::Low {
        warn!(risk = %risk_level, concerns = concerns.len(), "governance health degraded");
    }
    GovernanceHealth {
        risk_level,
        concerns,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::fs::{
        FsCollaborationMarkerReader, FsRecoveryMemoryStore, FsSessionRepository, FsSpecArchive,
    };
    use crate::domain::models::{RemediationAction, RetentionConfig};
    use crate::domain::ports::SessionRepository;
    use std::collections::BTreeMap;

    fn archive(kind: SessionKind, counts: &[(RecordStatus, usize)]) -> ArchiveStats {
        let by_status: BTreeMap<String, usize> =
            counts.iter().map(|(s, n)| (s.to_string(), *n)).collect();
        ArchiveStats {
            kind,
            total: counts.iter().map(|(_, n)| n).sum(),
            by_status,
            latest: Vec::new(),
        }
    }

    #[test]
    fn test_healthy_archives() {
        let health = assess_health(&[archive(SessionKind::BatchSession, &[(RecordStatus::Completed, 3)])]);
        assert_eq!(health.risk_level, RiskLevel::Low);
        assert!(health.concerns.is_empty());
    }

    #[test]
    fn test_mostly_failed_batches_are_high_risk() {
        let health = assess_health(&[
            archive(SessionKind::BatchSession, &[(RecordStatus::Failed, 2), (RecordStatus::Completed, 1)]),
            archive(SessionKind::GovernanceSession, &[(RecordStatus::Exhausted, 1)]),
        ]);
        assert_eq!(health.risk_level, RiskLevel::High);
        assert_eq!(health.concerns.len(), 2);
    }

    #[tokio::test]
    async fn test_stats_and_dry_run_maintain() {
        let dir = tempfile::tempdir().expect("tempdir");
        let sessions: Arc<dyn SessionRepository> = Arc::new(FsSessionRepository::new(dir.path().join("auto")));
        let specs = dir.path().join("specs");
        let retention = Arc::new(RetentionService::new(
            sessions,
            Arc::new(FsSpecArchive::new(&specs)),
            Arc::new(FsCollaborationMarkerReader::new(&specs)),
            RetentionConfig::default(),
        ));
        let memory = Arc::new(RecoveryMemoryService::new(
            Arc::new(FsRecoveryMemoryStore::new(dir.path().join("memory.json"))),
            true,
        ));
        memory
            .record("sig", "program", RemediationAction::RetryUntilComplete, true)
            .await
            .expect("record");

        let service = GovernanceStatsService::new(retention, memory);
        let stats = service.stats().await.expect("stats");
        assert_eq!(stats.archives.len(), 4);
        assert_eq!(stats.spec_count, 0);
        assert_eq!(stats.recovery_memory.signatures, 1);
        assert_eq!(stats.health.risk_level, RiskLevel::Low);

        let report = service.maintain(true).await.expect("maintain");
        assert!(report.dry_run);
        assert_eq!(report.archives.len(), 4);
        assert_eq!(report.deleted_total(), 0);
        assert_eq!(report.recovery_memory.remaining, 1);
    }
}
