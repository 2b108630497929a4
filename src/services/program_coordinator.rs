//! Program coordinator.
//!
//! A program is one batch run plus master/sub coordination bookkeeping, a KPI
//! snapshot and a gate verdict. When the gate fails and auto-recovery is on,
//! failed goals are re-run through recover cycles until the gate passes or
//! the recovery rounds are spent.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use super::batch_scheduler::{resume_input, BatchInput, BatchScheduler};
use super::gate_evaluator::GateEvaluator;
use super::recovery_cycle::RecoveryCycle;
use super::recovery_memory_service::{program_signature, RecoveryMemoryService};
use crate::adapters::fs::write_json;
use crate::domain::errors::DomainResult;
use crate::domain::models::{
    AutoRecovery, BatchSummary, EffectiveGate, GateEvaluation, GateRequest, ProgramCoordination,
    ProgramDiagnostics, ProgramKpi, ProgramOptions, ProgramSummary, RecordPayload,
    RemediationAction, ResumeStrategy, RiskThresholds, SessionHandle, SessionKind, SessionRecord,
    SessionRef,
};
use crate::domain::ports::SessionRepository;

/// Builds program summaries from finished batches.
#[derive(Debug, Clone)]
pub struct ProgramAssembler {
    gate: GateEvaluator,
    thresholds: RiskThresholds,
}

impl ProgramAssembler {
    pub const fn new(gate: GateEvaluator, thresholds: RiskThresholds) -> Self {
        Self { gate, thresholds }
    }

    pub const fn gate(&self) -> &GateEvaluator {
        &self.gate
    }

    pub fn assemble(&self, batch: BatchSummary, request: &GateRequest) -> DomainResult<ProgramSummary> {
        let program_kpi = ProgramKpi::derive(&batch, &self.thresholds);
        let gate = self.gate.evaluate(request, &program_kpi, &batch.resource_plan)?;
        Ok(ProgramSummary {
            program_diagnostics: ProgramDiagnostics::derive(&batch),
            program_coordination: ProgramCoordination::derive(&batch),
            program_kpi,
            program_gate: gate.primary,
            program_gate_effective: gate.effective,
            program_gate_fallbacks: gate.fallbacks,
            auto_recovery: AutoRecovery::default(),
            recovered_from: None,
            batch,
        })
    }
}

/// Optional snapshot files written after a program run.
#[derive(Debug, Clone, Default)]
pub struct ProgramSnapshots {
    pub kpi_out: Option<PathBuf>,
    pub audit_out: Option<PathBuf>,
}

/// Audit payload written to `audit_out`.
#[derive(Debug, Serialize)]
struct ProgramAudit<'a> {
    generated_at: DateTime<Utc>,
    program_session: SessionHandle,
    status: String,
    program_kpi: &'a ProgramKpi,
    program_diagnostics: &'a ProgramDiagnostics,
    program_coordination: &'a ProgramCoordination,
    program_gate: &'a GateEvaluation,
    program_gate_effective: &'a EffectiveGate,
    program_gate_fallbacks: &'a [GateEvaluation],
    auto_recovery: &'a AutoRecovery,
    recover_sessions: &'a [SessionHandle],
}

/// A finished program run.
#[derive(Debug, Clone)]
pub struct ProgramRun {
    pub record: SessionRecord,
    /// Recover records created by auto-recovery, in order
    pub recoveries: Vec<SessionRecord>,
}

impl ProgramRun {
    pub const fn summary(&self) -> Option<&ProgramSummary> {
        self.record.payload.program()
    }

    /// Gate verdict after auto-recovery.
    pub fn gate_passed(&self) -> bool {
        self.summary().is_some_and(|program| {
            program.gate_passed() || (program.auto_recovery.triggered && program.auto_recovery.converged)
        })
    }
}

pub struct ProgramCoordinator {
    scheduler: Arc<BatchScheduler>,
    sessions: Arc<dyn SessionRepository>,
    assembler: ProgramAssembler,
    recovery: RecoveryCycle,
    memory: Arc<RecoveryMemoryService>,
}

impl ProgramCoordinator {
    pub fn new(
        scheduler: Arc<BatchScheduler>,
        sessions: Arc<dyn SessionRepository>,
        assembler: ProgramAssembler,
        memory: Arc<RecoveryMemoryService>,
    ) -> Self {
        let recovery = RecoveryCycle::new(scheduler.clone(), sessions.clone(), assembler.clone());
        Self {
            scheduler,
            sessions,
            assembler,
            recovery,
            memory,
        }
    }

    pub const fn recovery(&self) -> &RecoveryCycle {
        &self.recovery
    }

    pub const fn assembler(&self) -> &ProgramAssembler {
        &self.assembler
    }

    /// Run a program over `input`.
    #[instrument(skip_all, fields(goals = input.goals.len()))]
    pub async fn run(
        &self,
        input: BatchInput,
        options: &ProgramOptions,
        snapshots: &ProgramSnapshots,
    ) -> DomainResult<ProgramRun> {
        self.execute(input, options, snapshots, None).await
    }

    /// Resume a persisted batch-like record as a new program run.
    #[instrument(skip(self, options, snapshots), fields(reference = %reference))]
    pub async fn resume(
        &self,
        reference: &SessionRef,
        strategy: ResumeStrategy,
        options: &ProgramOptions,
        snapshots: &ProgramSnapshots,
    ) -> DomainResult<ProgramRun> {
        let source = self.sessions.get(SessionKind::BatchSession, reference).await?;
        let input = resume_input(&source, strategy)?;
        self.execute(input, options, snapshots, Some((source.handle(), strategy)))
            .await
    }

    async fn execute(
        &self,
        input: BatchInput,
        options: &ProgramOptions,
        snapshots: &ProgramSnapshots,
        resumed: Option<(SessionHandle, ResumeStrategy)>,
    ) -> DomainResult<ProgramRun> {
        // Configuration errors surface before any goal runs.
        self.assembler.gate().validate(&options.gate)?;
        let mut summary = self.scheduler.prepare(&input, &options.batch)?;
        if let Some((handle, strategy)) = resumed {
            summary.resumed_from = Some(handle);
            summary.resume_strategy = Some(strategy);
        }

        let batch = self.scheduler.execute(summary, input, &options.batch, None).await?;
        let mut program = self.assembler.assemble(batch, &options.gate)?;
        program.auto_recovery.enabled = options.auto_recover;

        let mut record = self.sessions.create(RecordPayload::Program(program.clone())).await?;
        info!(
            session_id = %record.id,
            risk = %program.program_kpi.risk_level,
            gate_passed = program.gate_passed(),
            "program finished"
        );

        let mut recoveries = Vec::new();
        if !program.gate_passed() && options.auto_recover && !options.batch.dry_run {
            program.auto_recovery.triggered = true;
            recoveries = self.auto_recover(&record, &mut program.auto_recovery, options).await?;
            record.payload = RecordPayload::Program(program.clone());
            self.sessions.save(&mut record).await?;
        }

        let recover_handles: Vec<SessionHandle> = recoveries.iter().map(SessionRecord::handle).collect();
        write_snapshots(snapshots, &record, &program, &recover_handles).await?;
        Ok(ProgramRun { record, recoveries })
    }

    async fn auto_recover(
        &self,
        record: &SessionRecord,
        auto: &mut AutoRecovery,
        options: &ProgramOptions,
    ) -> DomainResult<Vec<SessionRecord>> {
        let mut recoveries: Vec<SessionRecord> = Vec::new();
        let mut excluded: Vec<RemediationAction> = Vec::new();
        let mut current_options = options.clone();

        for round in 1..=options.auto_recover_max_rounds {
            let source = recoveries.last().unwrap_or(record);
            let Some(observed) = program_of(source) else {
                break;
            };
            if observed.program_diagnostics.failed_goal_count == 0 {
                break;
            }
            let signature = program_signature("program", observed);
            let (action, source_kind) = self.memory.select(&signature, &excluded, None).await?;
            info!(round, action = action.id(), selection = ?source_kind, "auto-recovery round");

            let (recovered, patch) = self.recovery.recover(source, action, &current_options).await?;
            patch.apply(&mut current_options.batch);
            let passed = program_of(&recovered).is_some_and(ProgramSummary::gate_passed);
            self.memory.record(&signature, "program", action, passed).await?;

            auto.rounds = round;
            auto.actions.push(action.id().to_string());
            recoveries.push(recovered);
            if passed {
                auto.converged = true;
                break;
            }
            excluded.push(action);
        }

        if !auto.converged {
            warn!(rounds = auto.rounds, "auto-recovery did not converge");
        }
        Ok(recoveries)
    }
}

pub(crate) const fn program_of(record: &SessionRecord) -> Option<&ProgramSummary> {
    record.payload.program()
}

async fn write_snapshots(
    snapshots: &ProgramSnapshots,
    record: &SessionRecord,
    program: &ProgramSummary,
    recover_sessions: &[SessionHandle],
) -> DomainResult<()> {
    if let Some(path) = &snapshots.kpi_out {
        write_json(path, &program.program_kpi).await?;
    }
    if let Some(path) = &snapshots.audit_out {
        let audit = ProgramAudit {
            generated_at: Utc::now(),
            program_session: record.handle(),
            status: program.batch.status.to_string(),
            program_kpi: &program.program_kpi,
            program_diagnostics: &program.program_diagnostics,
            program_coordination: &program.program_coordination,
            program_gate: &program.program_gate,
            program_gate_effective: &program.program_gate_effective,
            program_gate_fallbacks: &program.program_gate_fallbacks,
            auto_recovery: &program.auto_recovery,
            recover_sessions,
        };
        write_json(path, &audit).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::fs::{FsRecoveryMemoryStore, FsSessionRepository};
    use crate::adapters::runners::{ScriptedGoalRunner, ScriptedResponse};
    use crate::domain::models::{
        BatchOptions, ConvergenceState, GateConfig, Goal, GoalStatus, RecordStatus, RiskLevel,
        SchedulerConfig,
    };

    fn coordinator(runner: Arc<ScriptedGoalRunner>, dir: &std::path::Path) -> ProgramCoordinator {
        let sessions: Arc<dyn SessionRepository> = Arc::new(FsSessionRepository::new(dir.join("auto")));
        let scheduler = Arc::new(BatchScheduler::new(runner, sessions.clone(), SchedulerConfig::default()));
        let memory = Arc::new(RecoveryMemoryService::new(
            Arc::new(FsRecoveryMemoryStore::new(dir.join("memory.json"))),
            true,
        ));
        ProgramCoordinator::new(
            scheduler,
            sessions,
            ProgramAssembler::new(GateEvaluator::new(GateConfig::default()), RiskThresholds::default()),
            memory,
        )
    }

    fn input(texts: &[&str]) -> BatchInput {
        BatchInput::from_goals(Goal::from_texts(texts.iter().copied()))
    }

    #[tokio::test]
    async fn test_budget_cap_fails_gate() {
        let dir = tempfile::tempdir().expect("tempdir");
        let options = ProgramOptions {
            batch: BatchOptions {
                agent_budget: Some(4),
                ..BatchOptions::default()
            },
            gate: GateRequest {
                max_agent_budget: Some(2),
                ..GateRequest::default()
            },
            ..ProgramOptions::default()
        };
        let run = coordinator(Arc::new(ScriptedGoalRunner::new()), dir.path())
            .run(input(&["a", "b"]), &options, &ProgramSnapshots::default())
            .await
            .expect("program");

        let program = run.summary().expect("program payload");
        assert!(!program.program_gate.passed);
        assert_eq!(program.program_gate.actual.agent_budget, Some(4));
        assert_eq!(program.program_coordination.topology, "master-sub");
        assert_eq!(program.program_kpi.convergence_state, ConvergenceState::Converged);
        assert!(!run.gate_passed());
    }

    #[tokio::test]
    async fn test_snapshots_written() {
        let dir = tempfile::tempdir().expect("tempdir");
        let snapshots = ProgramSnapshots {
            kpi_out: Some(dir.path().join("out/kpi.json")),
            audit_out: Some(dir.path().join("out/audit.json")),
        };
        let run = coordinator(Arc::new(ScriptedGoalRunner::new()), dir.path())
            .run(input(&["a"]), &ProgramOptions::default(), &snapshots)
            .await
            .expect("program");

        let kpi: serde_json::Value =
            serde_json::from_slice(&std::fs::read(dir.path().join("out/kpi.json")).expect("kpi")).expect("json");
        assert_eq!(kpi["risk_level"], "low");
        let audit: serde_json::Value =
            serde_json::from_slice(&std::fs::read(dir.path().join("out/audit.json")).expect("audit")).expect("json");
        assert_eq!(audit["program_session"]["id"], run.record.id.as_str());
    }

    #[tokio::test]
    async fn test_auto_recovery_converges() {
        let dir = tempfile::tempdir().expect("tempdir");
        let runner = Arc::new(ScriptedGoalRunner::new());
        runner.script("b", vec![ScriptedResponse::failure("flaky")]).await;

        let options = ProgramOptions {
            batch: BatchOptions {
                continue_on_error: true,
                ..BatchOptions::default()
            },
            gate: GateRequest {
                profile: Some("prod".into()),
                ..GateRequest::default()
            },
            auto_recover: true,
            auto_recover_max_rounds: 2,
        };
        let run = coordinator(runner, dir.path())
            .run(input(&["a", "b"]), &options, &ProgramSnapshots::default())
            .await
            .expect("program");

        let program = run.summary().expect("program payload");
        assert!(!program.gate_passed());
        assert_eq!(program.program_kpi.risk_level, RiskLevel::High);
        assert!(program.auto_recovery.triggered);
        assert!(program.auto_recovery.converged);
        assert_eq!(program.auto_recovery.rounds, 1);
        assert_eq!(program.auto_recovery.actions, vec!["retry-until-complete"]);
        assert!(run.gate_passed());

        let recovered = program_of(&run.recoveries[0]).expect("recover payload");
        assert_eq!(run.recoveries[0].payload.mode(), "recover");
        assert_eq!(recovered.batch.results[0].status, GoalStatus::Completed);
        assert_eq!(recovered.batch.results[0].source_index, Some(2));
        assert_eq!(recovered.recovered_from.as_ref().map(|h| h.id.as_str()), Some(run.record.id.as_str()));
    }

    #[tokio::test]
    async fn test_unknown_profile_fails_before_running() {
        let dir = tempfile::tempdir().expect("tempdir");
        let runner = Arc::new(ScriptedGoalRunner::new());
        let options = ProgramOptions {
            gate: GateRequest {
                profile: Some("nightly".into()),
                ..GateRequest::default()
            },
            ..ProgramOptions::default()
        };
        let err = coordinator(runner.clone(), dir.path())
            .run(input(&["a"]), &options, &ProgramSnapshots::default())
            .await
            .expect_err("unknown profile");
        assert!(err.is_configuration());
        assert!(runner.invocations().await.is_empty());
    }

    #[tokio::test]
    async fn test_resume_program_from_batch() {
        let dir = tempfile::tempdir().expect("tempdir");
        let runner = Arc::new(ScriptedGoalRunner::new());
        runner.script("b", vec![ScriptedResponse::failure("flaky")]).await;
        let coordinator = coordinator(runner, dir.path());

        let options = ProgramOptions {
            batch: BatchOptions {
                continue_on_error: true,
                ..BatchOptions::default()
            },
            ..ProgramOptions::default()
        };
        let first = coordinator
            .run(input(&["a", "b"]), &options, &ProgramSnapshots::default())
            .await
            .expect("program");
        assert_eq!(first.summary().expect("payload").batch.status, RecordStatus::PartialFailed);

        let resumed = coordinator
            .resume(&SessionRef::Latest, ResumeStrategy::Pending, &options, &ProgramSnapshots::default())
            .await
            .expect("resume");
        let program = resumed.summary().expect("payload");
        assert_eq!(program.batch.total_goals, 2);
        assert_eq!(program.batch.status, RecordStatus::Completed);
        assert!(program.gate_passed());
    }
}
