//! Recovery memory: learned success/failure counts per failure signature and
//! remediation action.
//!
//! The ledger is a bias, never a requirement. Selection on an empty ledger
//! falls back to the declared catalog order.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::governance::RemediationAction;
use super::program::RiskLevel;

/// Words of the normalised error text kept in a signature.
const ERROR_CLASS_WORDS: usize = 6;

/// Build the failure signature of an observed outcome.
///
/// Format: `{mode}|risk:{risk}|failed:{bucket}|error:{class}`.
pub fn failure_signature(
    mode: &str,
    risk: RiskLevel,
    failed_goals: usize,
    first_error: Option<&str>,
) -> String {
    let bucket = match failed_goals {
        0 => "none",
        1 => "one",
        2..=3 => "few",
        _ => "many",
    };
    format!(
        "{mode}|risk:{risk}|failed:{bucket}|error:{}",
        error_class(first_error)
    )
}

fn error_class(error: Option<&str>) -> String {
    let normalised: String = error
        .unwrap_or_default()
        .to_lowercase()
        .chars()
        .filter(|c| !c.is_ascii_digit())
        .collect();
    let class = normalised
        .split(|c: char| !c.is_alphanumeric() && c != '-')
        .filter(|word| !word.is_empty())
        .take(ERROR_CLASS_WORDS)
        .collect::<Vec<_>>()
        .join("-");
    if class.is_empty() {
        "none".to_string()
    } else {
        class
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionStats {
    pub attempts: u32,
    pub successes: u32,
    pub failures: u32,
    pub last_used_at: Option<DateTime<Utc>>,
}

impl ActionStats {
    /// Laplace-smoothed success rate.
    pub fn confidence(&self) -> f64 {
        (f64::from(self.successes) + 1.0) / (f64::from(self.attempts) + 2.0)
    }

    fn record(&mut self, success: bool, now: DateTime<Utc>) {
        self.attempts += 1;
        if success {
            self.successes += 1;
        } else {
            self.failures += 1;
        }
        self.last_used_at = Some(now);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureEntry {
    pub signature: String,
    pub scope: String,
    pub attempts: u32,
    pub successes: u32,
    pub failures: u32,
    #[serde(default)]
    pub actions: BTreeMap<String, ActionStats>,
    pub last_used_at: DateTime<Utc>,
}

/// Outcome of a decay pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecayReport {
    pub removed: Vec<String>,
    pub remaining: usize,
    pub dry_run: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryMemoryTotals {
    pub signatures: usize,
    pub attempts: u32,
    pub successes: u32,
    pub failures: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryMemory {
    #[serde(default)]
    pub signatures: BTreeMap<String, SignatureEntry>,
}

impl RecoveryMemory {
    /// Record one attempt of `action` against `signature`.
    pub fn record(
        &mut self,
        signature: &str,
        scope: &str,
        action: RemediationAction,
        success: bool,
        now: DateTime<Utc>,
    ) {
        let entry = self
            .signatures
            .entry(signature.to_string())
            .or_insert_with(|| SignatureEntry {
                signature: signature.to_string(),
                scope: scope.to_string(),
                attempts: 0,
                successes: 0,
                failures: 0,
                actions: BTreeMap::new(),
                last_used_at: now,
            });
        entry.attempts += 1;
        if success {
            entry.successes += 1;
        } else {
            entry.failures += 1;
        }
        entry.last_used_at = now;
        entry
            .actions
            .entry(action.id().to_string())
            .or_default()
            .record(success, now);
    }

    pub fn get(&self, signature: &str) -> Option<&SignatureEntry> {
        self.signatures.get(signature)
    }

    /// Highest-confidence action for `signature`, ignoring `excluded` when an
    /// alternative exists. `None` when the signature has no usable history.
    pub fn best_action(
        &self,
        signature: &str,
        excluded: &[RemediationAction],
    ) -> Option<RemediationAction> {
        let entry = self.signatures.get(signature)?;
        let ranked: Vec<(RemediationAction, f64)> = RemediationAction::CATALOG
            .into_iter()
            .filter_map(|action| {
                entry
                    .actions
                    .get(action.id())
                    .filter(|stats| stats.attempts > 0)
                    .map(|stats| (action, stats.confidence()))
            })
            .collect();

        let pick = |candidates: &mut dyn Iterator<Item = &(RemediationAction, f64)>| {
            candidates
                .fold(None::<(RemediationAction, f64)>, |best, &(action, score)| match best {
                    Some((_, top)) if top >= score => best,
                    _ => Some((action, score)),
                })
                .map(|(action, _)| action)
        };

        pick(&mut ranked.iter().filter(|(action, _)| !excluded.contains(action)))
            .or_else(|| pick(&mut ranked.iter()))
    }

    /// Remove signatures unused for longer than `ttl_days`.
    pub fn decay(&mut self, ttl_days: u32, now: DateTime<Utc>, dry_run: bool) -> DecayReport {
        let cutoff = now - Duration::days(i64::from(ttl_days));
        let removed: Vec<String> = self
            .signatures
            .values()
            .filter(|entry| entry.last_used_at < cutoff)
            .map(|entry| entry.signature.clone())
            .collect();
        if !dry_run {
            for signature in &removed {
                self.signatures.remove(signature);
            }
        }
        DecayReport {
            remaining: self.signatures.len() - if dry_run { removed.len() } else { 0 },
            removed,
            dry_run,
        }
    }

    pub fn totals(&self) -> RecoveryMemoryTotals {
        self.signatures.values().fold(
            RecoveryMemoryTotals {
                signatures: self.signatures.len(),
                ..RecoveryMemoryTotals::default()
            },
            |mut totals, entry| {
                totals.attempts += entry.attempts;
                totals.successes += entry.successes;
                totals.failures += entry.failures;
                totals
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_format() {
        let signature = failure_signature(
            "program",
            RiskLevel::High,
            2,
            Some("Timeout after 30s waiting for runner 7 to respond quickly"),
        );
        assert_eq!(
            signature,
            "program|risk:high|failed:few|error:timeout-after-s-waiting-for-runner"
        );
        assert_eq!(
            failure_signature("recover", RiskLevel::Low, 0, None),
            "recover|risk:low|failed:none|error:none"
        );
    }

    #[test]
    fn test_cold_store_has_no_preference() {
        let memory = RecoveryMemory::default();
        assert_eq!(memory.best_action("x", &[]), None);
    }

    #[test]
    fn test_prefers_successful_action() {
        let now = Utc::now();
        let mut memory = RecoveryMemory::default();
        memory.record("sig", "program", RemediationAction::RetryUntilComplete, false, now);
        memory.record("sig", "program", RemediationAction::SerializeExecution, true, now);
        memory.record("sig", "program", RemediationAction::SerializeExecution, true, now);

        assert_eq!(memory.best_action("sig", &[]), Some(RemediationAction::SerializeExecution));
        let entry = memory.get("sig").expect("entry");
        assert_eq!(entry.attempts, 3);
        assert_eq!(entry.successes, 2);
    }

    #[test]
    fn test_excluded_action_skipped_when_alternative_exists() {
        let now = Utc::now();
        let mut memory = RecoveryMemory::default();
        memory.record("sig", "program", RemediationAction::SerializeExecution, true, now);
        memory.record("sig", "program", RemediationAction::ReduceAgentBudget, false, now);

        assert_eq!(
            memory.best_action("sig", &[RemediationAction::SerializeExecution]),
            Some(RemediationAction::ReduceAgentBudget)
        );
        // only one candidate left and it is excluded: still returned
        let mut single = RecoveryMemory::default();
        single.record("sig", "program", RemediationAction::SerializeExecution, true, now);
        assert_eq!(
            single.best_action("sig", &[RemediationAction::SerializeExecution]),
            Some(RemediationAction::SerializeExecution)
        );
    }

    #[test]
    fn test_decay_removes_stale_signatures() {
        let now = Utc::now();
        let mut memory = RecoveryMemory::default();
        memory.record("old", "program", RemediationAction::RetryUntilComplete, true, now - Duration::days(40));
        memory.record("new", "program", RemediationAction::RetryUntilComplete, true, now);

        let preview = memory.decay(30, now, true);
        assert_eq!(preview.removed, vec!["old".to_string()]);
        assert_eq!(memory.signatures.len(), 2);

        let report = memory.decay(30, now, false);
        assert_eq!(report.removed.len(), 1);
        assert_eq!(report.remaining, 1);
        assert!(memory.get("old").is_none());
        assert_eq!(memory.totals().attempts, 1);
    }
}
