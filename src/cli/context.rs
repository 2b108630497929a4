//! Service wiring shared by all commands.

use std::sync::Arc;

use crate::adapters::fs::{
    FsCollaborationMarkerReader, FsRecoveryMemoryStore, FsSessionRepository, FsSpecArchive,
    LineGoalQueue,
};
use crate::adapters::runners::SimulatedGoalRunner;
use crate::domain::models::Config;
use crate::domain::ports::{GoalRunner, SessionRepository};
use crate::services::{
    AdvisoryHandlers, BatchScheduler, CloseLoopService, GateEvaluator, GoalDecomposer,
    GovernanceLoop, GovernanceStatsService, KpiTrendService, ProgramAssembler, ProgramCoordinator,
    QueueController, RecoveryMemoryService, RetentionService,
};

/// File-backed adapters and the services built on them.
pub struct AppContext {
    pub config: Config,
    pub sessions: Arc<dyn SessionRepository>,
    pub runner: Arc<dyn GoalRunner>,
    pub memory: Arc<RecoveryMemoryService>,
    pub scheduler: Arc<BatchScheduler>,
    pub coordinator: Arc<ProgramCoordinator>,
    pub retention: Arc<RetentionService>,
}

impl AppContext {
    /// Wire the workspace at `config.workspace` with the simulated runner.
    pub fn new(config: Config) -> Self {
        let runner: Arc<dyn GoalRunner> =
            Arc::new(SimulatedGoalRunner::new(config.workspace.specs_path()));
        Self::with_runner(config, runner)
    }

    pub fn with_runner(config: Config, runner: Arc<dyn GoalRunner>) -> Self {
        let workspace = &config.workspace;
        let sessions: Arc<dyn SessionRepository> =
            Arc::new(FsSessionRepository::new(workspace.auto_path()));
        let memory = Arc::new(RecoveryMemoryService::new(
            Arc::new(FsRecoveryMemoryStore::new(workspace.recovery_memory_path())),
            config.governance.use_recovery_memory,
        ));
        let scheduler = Arc::new(BatchScheduler::new(
            runner.clone(),
            sessions.clone(),
            config.scheduler.clone(),
        ));
        let assembler = ProgramAssembler::new(
            GateEvaluator::new(config.gate.clone()),
            config.gate.risk.clone(),
        );
        let coordinator = Arc::new(ProgramCoordinator::new(
            scheduler.clone(),
            sessions.clone(),
            assembler,
            memory.clone(),
        ));
        let retention = Arc::new(RetentionService::new(
            sessions.clone(),
            Arc::new(FsSpecArchive::new(workspace.specs_path())),
            Arc::new(FsCollaborationMarkerReader::new(workspace.specs_path())),
            config.retention.clone(),
        ));

        Self {
            config,
            sessions,
            runner,
            memory,
            scheduler,
            coordinator,
            retention,
        }
    }

    pub fn decomposer(&self) -> GoalDecomposer {
        GoalDecomposer::new(self.config.decomposition.clone())
    }

    pub fn close_loop(&self) -> CloseLoopService {
        CloseLoopService::new(self.runner.clone(), self.sessions.clone())
    }

    pub fn controller(&self) -> Arc<QueueController> {
        Arc::new(QueueController::new(
            self.coordinator.clone(),
            self.sessions.clone(),
            Arc::new(LineGoalQueue::new()),
            self.config.controller.clone(),
            self.config.workspace.default_queue_path(),
        ))
    }

    /// Governance loop with advisory actions wired to the controller and
    /// retention service.
    pub fn governance(&self) -> GovernanceLoop {
        GovernanceLoop::new(
            self.coordinator.clone(),
            self.sessions.clone(),
            self.memory.clone(),
            self.config.governance.clone(),
        )
        .with_advisory(AdvisoryHandlers {
            controller: self.controller(),
            retention: self.retention.clone(),
            retention_config: self.config.retention.clone(),
        })
    }

    pub fn kpi(&self) -> KpiTrendService {
        KpiTrendService::new(self.sessions.clone(), self.config.kpi.clone())
    }

    pub fn stats(&self) -> GovernanceStatsService {
        GovernanceStatsService::new(self.retention.clone(), self.memory.clone())
    }
}
