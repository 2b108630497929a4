//! Recover cycle: re-run the failed goals of a summary under a remediation patch.

use std::sync::Arc;
use tracing::{info, instrument};

use super::batch_scheduler::{resume_input, BatchScheduler};
use super::program_coordinator::ProgramAssembler;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    ConfigPatch, ProgramOptions, RecordPayload, RemediationAction, ResumeStrategy, SessionRecord,
};
use crate::domain::ports::SessionRepository;

pub struct RecoveryCycle {
    scheduler: Arc<BatchScheduler>,
    sessions: Arc<dyn SessionRepository>,
    assembler: ProgramAssembler,
}

impl RecoveryCycle {
    pub fn new(
        scheduler: Arc<BatchScheduler>,
        sessions: Arc<dyn SessionRepository>,
        assembler: ProgramAssembler,
    ) -> Self {
        Self {
            scheduler,
            sessions,
            assembler,
        }
    }

    /// Re-run the failed goals of `source` with `action` applied on top of
    /// `options`, persisting a `recover` record.
    ///
    /// Returns the new record and the patch that was applied.
    #[instrument(skip(self, source, options), fields(source = %source.id, action = action.id()))]
    pub async fn recover(
        &self,
        source: &SessionRecord,
        action: RemediationAction,
        options: &ProgramOptions,
    ) -> DomainResult<(SessionRecord, ConfigPatch)> {
        let observed = source.payload.batch().ok_or_else(|| {
            DomainError::InvalidConfiguration(format!(
                "session {} is a {} record and has no summary to recover",
                source.id,
                source.payload.mode()
            ))
        })?;
        let input = resume_input(source, ResumeStrategy::FailedOnly)?;

        let patch = action.patch(&options.batch, &observed.resource_plan);
        let mut batch_options = options.batch.clone();
        patch.apply(&mut batch_options);

        let mut summary = self.scheduler.prepare(&input, &batch_options)?;
        summary.resumed_from = Some(source.handle());
        summary.resume_strategy = Some(ResumeStrategy::FailedOnly);

        let batch = self.scheduler.execute(summary, input, &batch_options, None).await?;
        let mut program = self.assembler.assemble(batch, &options.gate)?;
        program.recovered_from = Some(source.handle());

        let record = self.sessions.create(RecordPayload::Recover(program)).await?;
        info!(session_id = %record.id, "recover cycle finished");
        Ok((record, patch))
    }
}
