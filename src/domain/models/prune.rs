//! Retention domain models
//!
//! Contains the retention contract shared by every archive (four session kinds
//! plus spec directories) and the report a prune pass produces. Candidate
//! selection is pure; protection predicates that need cross-archive lookups
//! are layered on top by the retention service.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Generic pruning contract, supplied per invocation.
///
/// # Business Rules
///
/// - The `keep` most recently created records are never deleted
/// - Records younger than `protect_window_days` are never deleted
/// - When `older_than_days` is set, only records at least that old are candidates
/// - With `protect_active`, records whose run is still active are never deleted
/// - Dry-run mode selects candidates without deleting anything
///
/// # Examples
///
/// ```rust
/// use sce_closeloop::domain::models::RetentionPolicy;
///
/// let policy = RetentionPolicy::keep(10).older_than(7).dry_run(true);
/// assert_eq!(policy.keep, 10);
/// assert_eq!(policy.older_than_days, Some(7));
/// assert!(policy.dry_run);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    /// Number of newest records always retained.
    pub keep: usize,

    /// Minimum age in days for a record to be a candidate.
    pub older_than_days: Option<u32>,

    /// Records younger than this many days are always retained.
    pub protect_window_days: u32,

    /// Retain records whose run is still active.
    pub protect_active: bool,

    /// Rank protected records by cross-reference count in the report.
    pub show_protection_reasons: bool,

    /// Select candidates only, delete nothing.
    pub dry_run: bool,

    /// Delete failures tolerated before the report is flagged.
    pub hard_fail_threshold: Option<usize>,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            keep: 0,
            older_than_days: None,
            protect_window_days: 0,
            protect_active: true,
            show_protection_reasons: false,
            dry_run: false,
            hard_fail_threshold: None,
        }
    }
}

impl RetentionPolicy {
    pub fn keep(keep: usize) -> Self {
        Self {
            keep,
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn older_than(mut self, days: u32) -> Self {
        self.older_than_days = Some(days);
        self
    }

    #[must_use]
    pub const fn protect_window(mut self, days: u32) -> Self {
        self.protect_window_days = days;
        self
    }

    #[must_use]
    pub const fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Pick deletion candidates.
    ///
    /// `items` may be in any order; the keep window always covers the newest
    /// records by creation time. Returned candidates are oldest first.
    pub fn select<'a>(
        &self,
        items: &'a [RetentionCandidate],
        now: DateTime<Utc>,
    ) -> Vec<&'a RetentionCandidate> {
        let mut ordered: Vec<&RetentionCandidate> = items.iter().collect();
        ordered.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));

        let window_start = now - Duration::days(i64::from(self.protect_window_days));
        let age_cutoff = self
            .older_than_days
            .map(|days| now - Duration::days(i64::from(days)));

        let mut candidates: Vec<&RetentionCandidate> = ordered
            .into_iter()
            .skip(self.keep)
            .filter(|item| self.protect_window_days == 0 || item.created_at < window_start)
            .filter(|item| age_cutoff.is_none_or(|cutoff| item.created_at <= cutoff))
            .filter(|item| !(self.protect_active && item.active))
            .collect();
        candidates.reverse();
        candidates
    }
}

/// Minimal view of a record for candidate selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetentionCandidate {
    pub id: String,
    pub created_at: DateTime<Utc>,
    /// The run is still in progress
    pub active: bool,
}

/// Why a candidate survived pruning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtectionReason {
    /// A collaboration marker reports the spec is being worked on
    CollaborationActive,
    /// A controller session still references the spec and is recent or incomplete
    ControllerSessionRecentOrIncomplete,
}

impl ProtectionReason {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CollaborationActive => "collaboration_active",
            Self::ControllerSessionRecentOrIncomplete => "controller_session_recent_or_incomplete",
        }
    }
}

impl fmt::Display for ProtectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A candidate retained because a protection predicate matched.
///
/// # Examples
///
/// ```rust
/// use sce_closeloop::domain::models::{ProtectedRecord, ProtectionReason};
///
/// let protected = ProtectedRecord::new("01-00-queue", vec![ProtectionReason::CollaborationActive], 1);
/// assert!(protected.has_reason(ProtectionReason::CollaborationActive));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtectedRecord {
    pub id: String,
    pub reasons: Vec<ProtectionReason>,
    /// Number of records referencing this one
    pub reference_count: usize,
}

impl ProtectedRecord {
    pub fn new(id: impl Into<String>, reasons: Vec<ProtectionReason>, reference_count: usize) -> Self {
        Self {
            id: id.into(),
            reasons,
            reference_count,
        }
    }

    pub fn has_reason(&self, reason: ProtectionReason) -> bool {
        self.reasons.contains(&reason)
    }
}

/// A delete that failed; non-fatal for the rest of the pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PruneError {
    pub id: String,
    pub error: String,
}

/// Result of a prune pass over one archive.
///
/// Represents what was (or in dry-run mode would be) deleted, what survived a
/// protection predicate and which deletes failed.
///
/// # Examples
///
/// ```rust
/// use sce_closeloop::domain::models::PruneReport;
///
/// let report = PruneReport::new("batch-session", 12, true);
/// assert!(report.dry_run);
/// assert_eq!(report.deleted_count, 0);
/// assert!(report.is_fully_successful());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PruneReport {
    pub archive: String,

    /// Records in the archive before pruning.
    pub total: usize,

    /// Records selected by the retention policy before protection.
    pub candidate_count: usize,

    /// Records deleted; always 0 in dry-run mode.
    pub deleted_count: usize,

    /// Ids deleted, or that would be deleted in dry-run mode.
    pub deleted: Vec<String>,

    pub errors: Vec<PruneError>,

    pub protected_specs: Vec<ProtectedRecord>,

    /// Count of protected records per reason.
    pub protection_reasons: BTreeMap<String, usize>,

    pub dry_run: bool,

    /// Delete failures exceeded the policy's hard-fail threshold.
    pub threshold_exceeded: bool,
}

impl PruneReport {
    pub fn new(archive: impl Into<String>, total: usize, dry_run: bool) -> Self {
        Self {
            archive: archive.into(),
            total,
            candidate_count: 0,
            deleted_count: 0,
            deleted: Vec::new(),
            errors: Vec::new(),
            protected_specs: Vec::new(),
            protection_reasons: BTreeMap::new(),
            dry_run,
            threshold_exceeded: false,
        }
    }

    pub fn record_deleted(&mut self, id: impl Into<String>) {
        self.deleted.push(id.into());
        if !self.dry_run {
            self.deleted_count += 1;
        }
    }

    pub fn record_error(&mut self, id: impl Into<String>, error: impl ToString) {
        self.errors.push(PruneError {
            id: id.into(),
            error: error.to_string(),
        });
    }

    pub fn record_protected(&mut self, protected: ProtectedRecord) {
        for reason in &protected.reasons {
            *self
                .protection_reasons
                .entry(reason.as_str().to_string())
                .or_insert(0) += 1;
        }
        self.protected_specs.push(protected);
    }

    /// Flag the report when errors exceed `threshold`, and when asked, rank
    /// protected records by reference count (most referenced first).
    pub fn finish(&mut self, policy: &RetentionPolicy) {
        self.threshold_exceeded = policy
            .hard_fail_threshold
            .is_some_and(|threshold| self.errors.len() > threshold);
        if policy.show_protection_reasons {
            self.protected_specs
                .sort_by(|a, b| b.reference_count.cmp(&a.reference_count).then_with(|| a.id.cmp(&b.id)));
        }
    }

    pub fn is_fully_successful(&self) -> bool {
        self.errors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidates(now: DateTime<Utc>, ages_days: &[i64]) -> Vec<RetentionCandidate> {
        ages_days
            .iter()
            .enumerate()
            .map(|(i, age)| RetentionCandidate {
                id: format!("r{i}"),
                created_at: now - Duration::days(*age),
                active: false,
            })
            .collect()
    }

    #[test]
    fn test_keep_newest() {
        let now = Utc::now();
        let items = candidates(now, &[5, 1, 3, 10]);
        let selected = RetentionPolicy::keep(2).select(&items, now);
        let ids: Vec<&str> = selected.iter().map(|c| c.id.as_str()).collect();
        // r1 (1d) and r2 (3d) are kept, oldest candidate first
        assert_eq!(ids, vec!["r3", "r0"]);
    }

    #[test]
    fn test_protect_window_and_age() {
        let now = Utc::now();
        let items = candidates(now, &[0, 2, 8, 20]);
        let selected = RetentionPolicy::keep(0).protect_window(3).select(&items, now);
        assert_eq!(selected.len(), 2);

        let selected = RetentionPolicy::keep(0).older_than(10).select(&items, now);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].id, "r3");
    }

    #[test]
    fn test_active_records_protected() {
        let now = Utc::now();
        let mut items = candidates(now, &[10, 20]);
        items[1].active = true;
        let selected = RetentionPolicy::keep(0).select(&items, now);
        assert_eq!(selected.len(), 1);

        let unprotected = RetentionPolicy {
            protect_active: false,
            ..RetentionPolicy::keep(0)
        };
        assert_eq!(unprotected.select(&items, now).len(), 2);
    }

    #[test]
    fn test_report_threshold_and_ranking() {
        let policy = RetentionPolicy {
            hard_fail_threshold: Some(0),
            show_protection_reasons: true,
            ..RetentionPolicy::keep(0)
        };
        let mut report = PruneReport::new("spec", 3, false);
        report.record_deleted("a");
        report.record_error("b", "permission denied");
        report.record_protected(ProtectedRecord::new("c", vec![ProtectionReason::CollaborationActive], 1));
        report.record_protected(ProtectedRecord::new(
            "d",
            vec![
                ProtectionReason::CollaborationActive,
                ProtectionReason::ControllerSessionRecentOrIncomplete,
            ],
            3,
        ));
        report.finish(&policy);

        assert_eq!(report.deleted_count, 1);
        assert!(report.threshold_exceeded);
        assert_eq!(report.protected_specs[0].id, "d");
        assert_eq!(report.protection_reasons.get("collaboration_active"), Some(&2));
    }

    #[test]
    fn test_dry_run_counts_nothing() {
        let mut report = PruneReport::new("session", 1, true);
        report.record_deleted("a");
        assert_eq!(report.deleted_count, 0);
        assert_eq!(report.deleted, vec!["a".to_string()]);
    }
}
