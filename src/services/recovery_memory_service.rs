//! Recovery memory service: remediation selection and ledger upkeep.

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    failure_signature, DecayReport, ProgramSummary, RecoveryMemory, RecoveryMemoryTotals,
    RemediationAction, SelectionSource,
};
use crate::domain::ports::RecoveryMemoryStore;

/// Failure signature of a program outcome observed in `mode`.
pub fn program_signature(mode: &str, program: &ProgramSummary) -> String {
    let first_error = program
        .program_diagnostics
        .failed_goals
        .first()
        .and_then(|goal| goal.error.as_deref());
    failure_signature(
        mode,
        program.program_kpi.risk_level,
        program.program_kpi.failed_goal_count,
        first_error,
    )
}

pub struct RecoveryMemoryService {
    store: Arc<dyn RecoveryMemoryStore>,
    /// Consult the ledger when selecting; recording always happens
    use_memory: bool,
}

impl RecoveryMemoryService {
    pub fn new(store: Arc<dyn RecoveryMemoryStore>, use_memory: bool) -> Self {
        Self { store, use_memory }
    }

    /// Pick the remediation for `signature`.
    ///
    /// A pinned 1-based index wins. Otherwise the ledger's best action is used
    /// and, on a cold ledger, the first catalog action not in `excluded`.
    pub async fn select(
        &self,
        signature: &str,
        excluded: &[RemediationAction],
        pinned: Option<usize>,
    ) -> DomainResult<(RemediationAction, SelectionSource)> {
        if let Some(index) = pinned {
            let action = RemediationAction::from_index(index).ok_or_else(|| {
                DomainError::InvalidConfiguration(format!(
                    "remediation action index {index} is out of range 1..={}",
                    RemediationAction::CATALOG.len()
                ))
            })?;
            return Ok((action, SelectionSource::Pinned));
        }

        if self.use_memory {
            let memory = self.store.load().await?;
            if let Some(action) = memory.best_action(signature, excluded) {
                debug!(signature, action = action.id(), "action selected from recovery memory");
                return Ok((action, SelectionSource::RecoveryMemory));
            }
        }

        let action = RemediationAction::CATALOG
            .into_iter()
            .find(|action| !excluded.contains(action))
            .unwrap_or(RemediationAction::CATALOG[0]);
        Ok((action, SelectionSource::Default))
    }

    /// Record one attempt of `action` against `signature`.
    pub async fn record(
        &self,
        signature: &str,
        scope: &str,
        action: RemediationAction,
        success: bool,
    ) -> DomainResult<()> {
        let mut memory = self.store.load().await?;
        memory.record(signature, scope, action, success, Utc::now());
        self.store.save(&memory).await?;
        debug!(signature, action = action.id(), success, "recovery memory updated");
        Ok(())
    }

    /// Drop signatures unused for more than `ttl_days`.
    pub async fn decay(&self, ttl_days: u32, dry_run: bool) -> DomainResult<DecayReport> {
        let mut memory = self.store.load().await?;
        let report = memory.decay(ttl_days, Utc::now(), dry_run);
        if !dry_run && !report.removed.is_empty() {
            self.store.save(&memory).await?;
        }
        info!(removed = report.removed.len(), remaining = report.remaining, dry_run, "recovery memory decayed");
        Ok(report)
    }

    pub async fn totals(&self) -> DomainResult<RecoveryMemoryTotals> {
        Ok(self.store.load().await?.totals())
    }

    pub async fn snapshot(&self) -> DomainResult<RecoveryMemory> {
        self.store.load().await
    }
}
