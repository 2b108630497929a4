//! Retention over session archives and spec directories.

use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use super::program_coordinator::program_of;
use crate::domain::errors::DomainResult;
use crate::domain::models::{
    ArchiveStats, ListQuery, ProtectedRecord, ProtectionReason, PruneReport, RecordPayload,
    RetentionCandidate, RetentionConfig, RetentionPolicy, SessionKind, SessionListing,
    SessionRecord, SessionRef, SpecListing,
};
use crate::domain::ports::{CollaborationMarkerReader, SessionRepository, SpecArchive};

/// Records shown as "latest" in archive stats.
const STATS_LATEST: usize = 5;

/// Apply `policy` to one session archive.
///
/// Running records are protected when the policy says so. A failed delete is
/// recorded and the pass continues.
pub async fn prune_archive(
    repo: &dyn SessionRepository,
    kind: SessionKind,
    policy: &RetentionPolicy,
    now: DateTime<Utc>,
) -> DomainResult<PruneReport> {
    let records = repo.load_all(kind).await?;
    let candidates: Vec<RetentionCandidate> = records
        .iter()
        .map(|record| RetentionCandidate {
            id: record.id.clone(),
            created_at: record.created_at,
            active: record.status().is_active(),
        })
        .collect();

    let mut report = PruneReport::new(kind.as_str(), records.len(), policy.dry_run);
    let selected = policy.select(&candidates, now);
    report.candidate_count = selected.len();

    for candidate in selected {
        if policy.dry_run {
            report.record_deleted(candidate.id.as_str());
            continue;
        }
        match repo.delete(kind, &candidate.id).await {
            Ok(()) => report.record_deleted(candidate.id.as_str()),
            Err(e) => {
                warn!(archive = kind.as_str(), id = %candidate.id, error = %e, "failed to delete session");
                report.record_error(candidate.id.as_str(), e);
            }
        }
    }

    report.finish(policy);
    info!(
        archive = kind.as_str(),
        total = report.total,
        deleted = report.deleted.len(),
        errors = report.errors.len(),
        dry_run = policy.dry_run,
        "session archive pruned"
    );
    Ok(report)
}

pub struct RetentionService {
    sessions: Arc<dyn SessionRepository>,
    specs: Arc<dyn SpecArchive>,
    markers: Arc<dyn CollaborationMarkerReader>,
    config: RetentionConfig,
}

impl RetentionService {
    pub fn new(
        sessions: Arc<dyn SessionRepository>,
        specs: Arc<dyn SpecArchive>,
        markers: Arc<dyn CollaborationMarkerReader>,
        config: RetentionConfig,
    ) -> Self {
        Self {
            sessions,
            specs,
            markers,
            config,
        }
    }

    pub const fn config(&self) -> &RetentionConfig {
        &self.config
    }

    /// Default policy for an archive from configuration.
    pub fn default_policy(&self, kind: SessionKind) -> RetentionPolicy {
        RetentionPolicy::keep(self.config.keep_for(kind)).protect_window(self.config.protect_window_days)
    }

    #[instrument(skip(self, policy), fields(kind = %kind))]
    pub async fn prune_sessions(&self, kind: SessionKind, policy: &RetentionPolicy) -> DomainResult<PruneReport> {
        prune_archive(self.sessions.as_ref(), kind, policy, Utc::now()).await
    }

    pub async fn list_sessions(&self, kind: SessionKind, query: &ListQuery) -> DomainResult<SessionListing> {
        self.sessions.list(kind, query).await
    }

    pub async fn session_stats(&self, kind: SessionKind) -> DomainResult<ArchiveStats> {
        let records = self.sessions.load_all(kind).await?;
        let mut by_status = BTreeMap::new();
        for record in &records {
            *by_status.entry(record.status().to_string()).or_insert(0) += 1;
        }
        Ok(ArchiveStats {
            kind,
            total: records.len(),
            by_status,
            latest: records.iter().take(STATS_LATEST).map(SessionRecord::summary).collect(),
        })
    }

    pub async fn list_specs(&self) -> DomainResult<SpecListing> {
        let specs = self.specs.list().await?;
        Ok(SpecListing {
            total: specs.len(),
            specs,
        })
    }

    /// Prune spec directories.
    ///
    /// A candidate survives when its collaboration marker is active or when a
    /// controller session that is recent or still incomplete references it,
    /// directly through a cycle's program or through the records that program
    /// resumed or recovered from.
    #[instrument(skip_all)]
    pub async fn prune_specs(&self, policy: &RetentionPolicy) -> DomainResult<PruneReport> {
        let now = Utc::now();
        let specs = self.specs.list().await?;
        let candidates: Vec<RetentionCandidate> = specs
            .iter()
            .map(|spec| RetentionCandidate {
                id: spec.id.clone(),
                created_at: spec.modified_at,
                active: false,
            })
            .collect();

        let mut report = PruneReport::new("spec", specs.len(), policy.dry_run);
        let selected = policy.select(&candidates, now);
        report.candidate_count = selected.len();
        if selected.is_empty() {
            report.finish(policy);
            return Ok(report);
        }

        let references = self.controller_references(policy, now).await?;

        for candidate in selected {
            let mut reasons = Vec::new();
            match self.markers.read(&candidate.id).await {
                Ok(Some(marker)) if marker.is_active() => reasons.push(ProtectionReason::CollaborationActive),
                Ok(_) => {}
                Err(e) => {
                    // An unreadable marker protects the spec.
                    warn!(spec = %candidate.id, error = %e, "collaboration marker unreadable");
                    reasons.push(ProtectionReason::CollaborationActive);
                }
            }
            let reference_count = references.get(candidate.id.as_str()).copied().unwrap_or(0);
            if reference_count > 0 {
                reasons.push(ProtectionReason::ControllerSessionRecentOrIncomplete);
            }

            if !reasons.is_empty() {
                debug!(spec = %candidate.id, ?reasons, "spec protected");
                report.record_protected(ProtectedRecord::new(candidate.id.as_str(), reasons, reference_count));
                continue;
            }
            if policy.dry_run {
                report.record_deleted(candidate.id.as_str());
                continue;
            }
            match self.specs.delete(&candidate.id).await {
                Ok(()) => report.record_deleted(candidate.id.as_str()),
                Err(e) => {
                    warn!(spec = %candidate.id, error = %e, "failed to delete spec");
                    report.record_error(candidate.id.as_str(), e);
                }
            }
        }

        report.finish(policy);
        info!(
            total = report.total,
            deleted = report.deleted.len(),
            protected = report.protected_specs.len(),
            errors = report.errors.len(),
            dry_run = policy.dry_run,
            "spec archive pruned"
        );
        Ok(report)
    }

    /// Spec id -> number of protecting controller sessions that reference it.
    ///
    /// A controller counts as recent inside the policy's protect window.
    async fn controller_references(
        &self,
        policy: &RetentionPolicy,
        now: DateTime<Utc>,
    ) -> DomainResult<HashMap<String, usize>> {
        let window = Duration::days(i64::from(policy.protect_window_days));
        let controllers = self.sessions.load_all(SessionKind::ControllerSession).await?;
        let mut cache: HashMap<PathBuf, Vec<String>> = HashMap::new();
        let mut counts: HashMap<String, usize> = HashMap::new();

        for record in &controllers {
            let RecordPayload::Controller(controller) = &record.payload else {
                continue;
            };
            let recent = now - record.updated_at < window;
            let incomplete = controller.status.is_active() || controller.pending_goals > 0;
            if !(recent || incomplete) {
                continue;
            }

            let mut specs: HashSet<String> = HashSet::new();
            for handle in controller.cycles.iter().filter_map(|c| c.program_session.as_ref()) {
                specs.extend(self.specs_of_chain(handle.file.clone(), &mut cache).await);
            }
            for spec in specs {
                *counts.entry(spec).or_insert(0) += 1;
            }
        }
        Ok(counts)
    }

    /// Spec ids of a batch-like record and of every record it resumed or
    /// recovered from. Unreadable links are skipped.
    async fn specs_of_chain(&self, start: PathBuf, cache: &mut HashMap<PathBuf, Vec<String>>) -> Vec<String> {
        if let Some(cached) = cache.get(&start) {
            return cached.clone();
        }
        let mut visited: HashSet<PathBuf> = HashSet::new();
        let mut pending = vec![start.clone()];
        let mut specs = Vec::new();

        while let Some(file) = pending.pop() {
            if !visited.insert(file.clone()) {
                continue;
            }
            let record = match self
                .sessions
                .get(SessionKind::BatchSession, &SessionRef::Path(file.clone()))
                .await
            {
                Ok(record) => record,
                Err(e) => {
                    debug!(file = %file.display(), error = %e, "referenced session unavailable");
                    continue;
                }
            };
            let Some(batch) = record.payload.batch() else {
                continue;
            };

            specs.extend(
                batch
                    .results
                    .iter()
                    .flat_map(|result| result.spec_ids().map(str::to_string)),
            );

            pending.extend(batch.resumed_from.iter().map(|h| h.file.clone()));
            if let Some(program) = program_of(&record) {
                pending.extend(program.recovered_from.iter().map(|h| h.file.clone()));
            }
        }
        cache.insert(start, specs.clone());
        specs
    }
}
