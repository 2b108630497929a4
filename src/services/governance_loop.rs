//! Governance stabilization loop.
//!
//! Each round observes the latest program outcome, stops when the gate passes
//! at or below the target risk, and otherwise picks one remediation action,
//! patches the batch options and re-runs. Program-replay rounds re-run the
//! whole goal list; recover-cycle rounds re-run only the failed goals of the
//! last observed summary. The session is saved after every round so it can
//! be resumed by id.

use chrono::Utc;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use super::batch_scheduler::BatchInput;
use super::controller::{ControllerRequest, QueueController};
use super::program_coordinator::{program_of, ProgramCoordinator, ProgramSnapshots};
use super::recovery_memory_service::{program_signature, RecoveryMemoryService};
use super::retention_service::RetentionService;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    AdvisoryAction, AdvisoryKind, AdvisoryStatus, ConfigPatch, ExecutionMode, GovernanceConfig,
    GovernanceRound, GovernanceSession, Goal, ListQuery, ProgramOptions, ProgramSummary,
    RecordPayload, RecordStatus, RemediationAction, RetentionConfig, RetentionPolicy, RiskLevel,
    SelectionSource, SessionHandle, SessionKind, SessionRecord, SessionRef, StopReason,
};
use crate::domain::ports::SessionRepository;

/// One governance invocation.
#[derive(Debug, Clone, Default)]
pub struct GovernanceRequest {
    pub execution_mode: ExecutionMode,
    /// Goals for program-replay; taken from `source` when empty
    pub goals: Vec<String>,
    /// Summary to recover from (recover-cycle) or to take goals from
    pub source: Option<SessionRef>,
    /// Batch options and gate of the first round
    pub options: ProgramOptions,
    pub target_risk: Option<RiskLevel>,
    pub max_rounds: Option<u32>,
    pub pinned_action_index: Option<usize>,
    pub plan_only: bool,
    pub advisory: bool,
    pub execute_advisory: bool,
    /// Continue an existing governance session
    pub resume: Option<SessionRef>,
}

/// Side-effecting collaborators of advisory mode.
pub struct AdvisoryHandlers {
    pub controller: Arc<QueueController>,
    pub retention: Arc<RetentionService>,
    pub retention_config: RetentionConfig,
}

pub struct GovernanceLoop {
    coordinator: Arc<ProgramCoordinator>,
    sessions: Arc<dyn SessionRepository>,
    memory: Arc<RecoveryMemoryService>,
    config: GovernanceConfig,
    advisory: Option<AdvisoryHandlers>,
}

impl GovernanceLoop {
    pub fn new(
        coordinator: Arc<ProgramCoordinator>,
        sessions: Arc<dyn SessionRepository>,
        memory: Arc<RecoveryMemoryService>,
        config: GovernanceConfig,
    ) -> Self {
        Self {
            coordinator,
            sessions,
            memory,
            config,
            advisory: None,
        }
    }

    #[must_use]
    pub fn with_advisory(mut self, handlers: AdvisoryHandlers) -> Self {
        self.advisory = Some(handlers);
        self
    }

    /// Run (or resume) the loop until it converges, exhausts its rounds or
    /// stops after one observational round.
    #[instrument(skip_all, fields(mode = %request.execution_mode))]
    pub async fn run(&self, request: GovernanceRequest) -> DomainResult<SessionRecord> {
        let (mut record, mut session) = match &request.resume {
            Some(reference) => {
                let record = self.sessions.get(SessionKind::GovernanceSession, reference).await?;
                let RecordPayload::Governance(mut session) = record.payload.clone() else {
                    return Err(DomainError::InvalidConfiguration(format!(
                        "session {} is not a governance session",
                        record.id
                    )));
                };
                if session.converged {
                    info!(session_id = %record.id, "governance session already converged");
                    return Ok(record);
                }
                self.apply_resume_overrides(&mut session, &request)?;
                info!(session_id = %record.id, performed = session.performed_rounds, "governance session resumed");
                (record, session)
            }
            None => {
                let session = self.start(&request).await?;
                let record = self
                    .sessions
                    .create(RecordPayload::Governance(session.clone()))
                    .await?;
                info!(session_id = %record.id, max_rounds = session.max_rounds, "governance session created");
                (record, session)
            }
        };

        while session.performed_rounds < session.max_rounds {
            let observed = match &session.source_summary {
                Some(handle) => Some(self.observe(handle, &session).await?),
                None => None,
            };
            if let Some((_, program)) = observed.as_ref().filter(|_| !session.plan_only) {
                if meets_target(program, session.target_risk) {
                    converge(&mut session);
                    break;
                }
            }

            let round = self.run_round(&mut session, observed).await?;
            let passed = round.gate_passed && round.risk_level <= session.target_risk;
            session.source_summary = round.program_session.clone();
            session.history.push(round);
            session.performed_rounds += 1;

            // A planned round proves nothing about the gate.
            if session.plan_only {
                session.stop_reason = Some(StopReason::NonMutatingMode);
                session.status = RecordStatus::Observed;
            } else if passed {
                converge(&mut session);
            }

            record.payload = RecordPayload::Governance(session.clone());
            self.sessions.save(&mut record).await?;
            if session.stop_reason.is_some() {
                break;
            }
        }

        if session.stop_reason.is_none() {
            session.stop_reason = Some(StopReason::MaxRoundsExhausted);
            session.status = RecordStatus::Exhausted;
            warn!(rounds = session.performed_rounds, "governance rounds exhausted");
        }

        if session.advisory {
            let actions = self.run_advisory(&session).await;
            session.advisory_actions.extend(actions);
        }

        record.payload = RecordPayload::Governance(session);
        self.sessions.save(&mut record).await?;
        Ok(record)
    }

    async fn start(&self, request: &GovernanceRequest) -> DomainResult<GovernanceSession> {
        let max_rounds = request.max_rounds.unwrap_or(self.config.max_rounds);
        if max_rounds == 0 {
            return Err(DomainError::InvalidConfiguration(
                "governance max rounds must be at least 1".to_string(),
            ));
        }
        validate_pin(request.pinned_action_index)?;
        self.coordinator.assembler().gate().validate(&request.options.gate)?;

        let source = match (&request.source, request.execution_mode) {
            (Some(reference), _) => Some(self.sessions.get(SessionKind::BatchSession, reference).await?),
            (None, ExecutionMode::RecoverCycle) => Some(
                self.sessions
                    .get(SessionKind::BatchSession, &SessionRef::Latest)
                    .await?,
            ),
            (None, ExecutionMode::ProgramReplay) => None,
        };
        let source_batch = source.as_ref().and_then(|record| record.payload.batch());
        if source.is_some() && source_batch.is_none() {
            return Err(DomainError::InvalidConfiguration(
                "governance source must be a batch, program or recover session".to_string(),
            ));
        }

        let goals = if request.goals.is_empty() {
            source_batch.map(|batch| batch.goals.clone()).unwrap_or_default()
        } else {
            request.goals.clone()
        };
        if request.execution_mode == ExecutionMode::ProgramReplay && goals.is_empty() {
            return Err(DomainError::InvalidConfiguration(
                "program-replay needs goals or a source summary".to_string(),
            ));
        }

        Ok(GovernanceSession {
            status: RecordStatus::Running,
            execution_mode: request.execution_mode,
            target_risk: request.target_risk.unwrap_or(self.config.target_risk),
            max_rounds,
            performed_rounds: 0,
            converged: false,
            stop_reason: None,
            history: Vec::new(),
            plan_only: request.plan_only || request.options.batch.dry_run,
            advisory: request.advisory,
            execute_advisory: request.execute_advisory,
            advisory_actions: Vec::new(),
            goals,
            options: request.options.batch.clone(),
            gate: request.options.gate.clone(),
            source_summary: match request.execution_mode {
                ExecutionMode::RecoverCycle => source.as_ref().map(SessionRecord::handle),
                ExecutionMode::ProgramReplay => None,
            },
            pinned_action_index: request.pinned_action_index,
        })
    }

    fn apply_resume_overrides(
        &self,
        session: &mut GovernanceSession,
        request: &GovernanceRequest,
    ) -> DomainResult<()> {
        if let Some(max_rounds) = request.max_rounds {
            session.max_rounds = max_rounds.max(session.performed_rounds);
        }
        if request.pinned_action_index.is_some() {
            validate_pin(request.pinned_action_index)?;
            session.pinned_action_index = request.pinned_action_index;
        }
        session.execute_advisory |= request.execute_advisory;
        session.advisory |= request.advisory;
        if session.remaining_rounds() > 0 {
            session.stop_reason = None;
            session.status = RecordStatus::Running;
        }
        Ok(())
    }

    /// Load the record behind `handle` as a program view.
    async fn observe(
        &self,
        handle: &SessionHandle,
        session: &GovernanceSession,
    ) -> DomainResult<(SessionRecord, ProgramSummary)> {
        let record = self
            .sessions
            .get(SessionKind::BatchSession, &SessionRef::Path(handle.file.clone()))
            .await?;
        let program = match program_of(&record) {
            Some(program) => program.clone(),
            None => {
                let batch = record.payload.batch().cloned().ok_or_else(|| {
                    DomainError::InvalidConfiguration(format!(
                        "session {} has no batch summary",
                        record.id
                    ))
                })?;
                self.coordinator.assembler().assemble(batch, &session.gate)?
            }
        };
        Ok((record, program))
    }

    async fn run_round(
        &self,
        session: &mut GovernanceSession,
        observed: Option<(SessionRecord, ProgramSummary)>,
    ) -> DomainResult<GovernanceRound> {
        let round_number = session.performed_rounds + 1;
        let mode = session.execution_mode;

        let Some((source, program)) = observed else {
            // Fresh program-replay: the first round runs the baseline.
            let mut options = self.program_options(session);
            options.batch.dry_run = session.plan_only;
            let run = self
                .coordinator
                .run(self.replay_input(session), &options, &ProgramSnapshots::default())
                .await?;
            info!(round = round_number, session_id = %run.record.id, "baseline round finished");
            return round_from(round_number, mode, None, SelectionSource::Baseline, ConfigPatch::default(), None, &run.record);
        };

        let signature = program_signature(mode.as_str(), &program);
        let (action, selection) = self
            .memory
            .select(&signature, &session.failed_actions(), session.pinned_action_index)
            .await?;
        let patch = action.patch(&session.options, &program.batch.resource_plan);
        info!(round = round_number, action = action.id(), selection = ?selection, signature = %signature, "remediation selected");

        if session.plan_only {
            return round_from(round_number, mode, Some(action), selection, patch, Some(signature), &source);
        }

        let before = self.program_options(session);
        patch.apply(&mut session.options);
        let record = match mode {
            ExecutionMode::ProgramReplay => {
                let options = self.program_options(session);
                self.coordinator
                    .run(self.replay_input(session), &options, &ProgramSnapshots::default())
                    .await?
                    .record
            }
            ExecutionMode::RecoverCycle => self.coordinator.recovery().recover(&source, action, &before).await?.0,
        };

        let round = round_from(round_number, mode, Some(action), selection, patch, Some(signature.clone()), &record)?;
        let success = round.gate_passed && round.risk_level <= session.target_risk;
        self.memory.record(&signature, mode.as_str(), action, success).await?;
        Ok(round)
    }

    fn program_options(&self, session: &GovernanceSession) -> ProgramOptions {
        ProgramOptions {
            batch: session.options.clone(),
            gate: session.gate.clone(),
            ..ProgramOptions::default()
        }
    }

    fn replay_input(&self, session: &GovernanceSession) -> BatchInput {
        BatchInput::from_goals(Goal::from_texts(&session.goals))
    }

    async fn run_advisory(&self, session: &GovernanceSession) -> Vec<AdvisoryAction> {
        let mut actions = Vec::with_capacity(AdvisoryKind::ALL.len());
        for kind in AdvisoryKind::ALL {
            let (status, detail) = if !session.execute_advisory {
                (AdvisoryStatus::Skipped, "proposed only; advisory execution is off".to_string())
            } else if let Some(handlers) = &self.advisory {
                match self.apply_advisory(kind, handlers).await {
                    Ok(outcome) => outcome,
                    Err(e) => (AdvisoryStatus::Failed, e.to_string()),
                }
            } else {
                (AdvisoryStatus::Skipped, "no advisory handlers configured".to_string())
            };

            match status {
                AdvisoryStatus::Failed => warn!(action = kind.as_str(), %detail, "advisory action failed"),
                _ => info!(action = kind.as_str(), ?status, %detail, "advisory action"),
            }
            actions.push(AdvisoryAction {
                action: kind,
                status,
                detail,
            });
        }
        actions
    }

    async fn apply_advisory(
        &self,
        kind: AdvisoryKind,
        handlers: &AdvisoryHandlers,
    ) -> DomainResult<(AdvisoryStatus, String)> {
        match kind {
            AdvisoryKind::ResumeLatestController => {
                let running = self
                    .sessions
                    .list(
                        SessionKind::ControllerSession,
                        &ListQuery {
                            status: Some(RecordStatus::Running),
                            limit: Some(1),
                        },
                    )
                    .await?;
                let Some(latest) = running.items.first() else {
                    return Ok((AdvisoryStatus::Skipped, "no running controller session".to_string()));
                };
                let resumed = handlers
                    .controller
                    .drain(ControllerRequest {
                        resume: Some(SessionRef::Id(latest.id.clone())),
                        ..ControllerRequest::default()
                    })
                    .await?;
                Ok((
                    AdvisoryStatus::Applied,
                    format!("resumed controller session {} ({})", resumed.id, resumed.status()),
                ))
            }
            AdvisoryKind::PruneStaleBatchSessions => {
                let policy = RetentionPolicy::keep(handlers.retention_config.batch_keep)
                    .protect_window(handlers.retention_config.protect_window_days);
                let report = handlers
                    .retention
                    .prune_sessions(SessionKind::BatchSession, &policy)
                    .await?;
                Ok((
                    AdvisoryStatus::Applied,
                    format!("deleted {} of {} batch sessions", report.deleted_count, report.total),
                ))
            }
            AdvisoryKind::DecayRecoveryMemory => {
                let report = self
                    .memory
                    .decay(handlers.retention_config.recovery_memory_ttl_days, false)
                    .await?;
                Ok((
                    AdvisoryStatus::Applied,
                    format!("removed {} signatures, {} remain", report.removed.len(), report.remaining),
                ))
            }
        }
    }
}

fn validate_pin(pinned: Option<usize>) -> DomainResult<()> {
    match pinned {
        Some(index) if RemediationAction::from_index(index).is_none() => {
            Err(DomainError::InvalidConfiguration(format!(
                "remediation action index {index} is out of range 1..={}",
                RemediationAction::CATALOG.len()
            )))
        }
        _ => Ok(()),
    }
}

fn meets_target(program: &ProgramSummary, target: RiskLevel) -> bool {
    program.gate_passed() && program.program_kpi.risk_level <= target
}

fn converge(session: &mut GovernanceSession) {
    session.converged = true;
    session.stop_reason = Some(StopReason::TargetRiskReached);
    session.status = RecordStatus::Converged;
}

fn round_from(
    round: u32,
    execution_mode: ExecutionMode,
    action: Option<RemediationAction>,
    selection_source: SelectionSource,
    applied_patch: ConfigPatch,
    failure_signature: Option<String>,
    record: &SessionRecord,
) -> DomainResult<GovernanceRound> {
    let program = program_of(record);
    let batch = record.payload.batch().ok_or_else(|| {
        DomainError::InvalidConfiguration(format!("session {} has no batch summary", record.id))
    })?;
    Ok(GovernanceRound {
        round,
        execution_mode,
        selected_action_index: action.map(RemediationAction::index),
        selected_action: action.map(|a| a.id().to_string()),
        selection_source,
        applied_patch,
        failure_signature,
        program_session: Some(record.handle()),
        gate_passed: program.is_some_and(ProgramSummary::gate_passed),
        risk_level: program.map_or(RiskLevel::High, |p| p.program_kpi.risk_level),
        failed_goal_count: program.map_or(batch.failed_goals, |p| p.program_kpi.failed_goal_count),
        completed_at: Utc::now(),
    })
}
