//! Queue controller: drains a goal queue one program per cycle.

use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use super::batch_scheduler::BatchInput;
use super::program_coordinator::{ProgramCoordinator, ProgramSnapshots};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    ControllerConfig, ControllerCycle, ControllerSession, Goal, ProgramOptions, RecordPayload,
    SessionKind, SessionRecord, SessionRef,
};
use crate::domain::ports::{GoalQueue, SessionRepository};

/// One controller invocation.
#[derive(Debug, Clone, Default)]
pub struct ControllerRequest {
    pub queue_file: Option<PathBuf>,
    /// Goals appended to the queue before draining
    pub enqueue: Vec<String>,
    pub dequeue_limit: Option<usize>,
    /// Cycles allowed in this invocation
    pub max_cycles: Option<u32>,
    pub stop_on_gate_failure: bool,
    pub program: ProgramOptions,
    /// Continue an existing controller session with its own options
    pub resume: Option<SessionRef>,
}

pub struct QueueController {
    coordinator: Arc<ProgramCoordinator>,
    sessions: Arc<dyn SessionRepository>,
    queue: Arc<dyn GoalQueue>,
    config: ControllerConfig,
    default_queue: PathBuf,
}

impl QueueController {
    pub fn new(
        coordinator: Arc<ProgramCoordinator>,
        sessions: Arc<dyn SessionRepository>,
        queue: Arc<dyn GoalQueue>,
        config: ControllerConfig,
        default_queue: impl Into<PathBuf>,
    ) -> Self {
        Self {
            coordinator,
            sessions,
            queue,
            config,
            default_queue: default_queue.into(),
        }
    }

    /// Drain the queue until it is empty, the cycle limit is hit or a gate
    /// failure stops the controller.
    ///
    /// Goals leave the queue only after their program has been persisted and
    /// only when they produced a result, so an interrupted cycle or an early
    /// stop leaves them pending.
    #[instrument(skip_all)]
    pub async fn drain(&self, request: ControllerRequest) -> DomainResult<SessionRecord> {
        let (mut record, mut session) = match &request.resume {
            Some(reference) => {
                let record = self.sessions.get(SessionKind::ControllerSession, reference).await?;
                let RecordPayload::Controller(mut session) = record.payload.clone() else {
                    return Err(DomainError::InvalidConfiguration(format!(
                        "session {} is not a controller session",
                        record.id
                    )));
                };
                if let Some(limit) = request.dequeue_limit {
                    session.dequeue_limit = limit;
                }
                if let Some(max_cycles) = request.max_cycles {
                    session.max_cycles = max_cycles;
                }
                session.stop_on_gate_failure |= request.stop_on_gate_failure;
                session.stopped_on_gate_failure = false;
                info!(session_id = %record.id, cycles = session.cycles.len(), "controller session resumed");
                (record, session)
            }
            None => {
                let queue_file = request
                    .queue_file
                    .clone()
                    .or_else(|| self.config.queue_file.clone())
                    .unwrap_or_else(|| self.default_queue.clone());
                let mut session = ControllerSession::new(
                    queue_file,
                    request.dequeue_limit.unwrap_or(self.config.dequeue_limit),
                    request.max_cycles.unwrap_or(self.config.max_cycles),
                    request.program.clone(),
                );
                session.stop_on_gate_failure = request.stop_on_gate_failure;
                if session.dequeue_limit == 0 || session.max_cycles == 0 {
                    return Err(DomainError::InvalidConfiguration(
                        "controller dequeue limit and max cycles must be at least 1".to_string(),
                    ));
                }
                self.coordinator.assembler().gate().validate(&session.program.gate)?;
                let record = self
                    .sessions
                    .create(RecordPayload::Controller(session.clone()))
                    .await?;
                info!(session_id = %record.id, queue = %session.queue_file.display(), "controller session created");
                (record, session)
            }
        };

        if !request.enqueue.is_empty() {
            self.queue.append(&session.queue_file, &request.enqueue).await?;
        }

        for _ in 0..session.max_cycles {
            let pending = self.queue.pending(&session.queue_file).await?;
            if pending.is_empty() {
                break;
            }
            let goals: Vec<String> = pending.into_iter().take(session.dequeue_limit).collect();
            let number = session.next_cycle_number();
            info!(cycle = number, goals = goals.len(), "controller cycle started");

            let run = self
                .coordinator
                .run(
                    BatchInput::from_goals(Goal::from_texts(&goals)),
                    &session.program,
                    &ProgramSnapshots::default(),
                )
                .await?;

            // Goals cancelled by an early stop never ran and stay queued.
            let batch = run.record.payload.batch();
            let ran: Vec<String> = batch
                .map(|batch| batch.results.iter().map(|r| r.goal.clone()).collect())
                .unwrap_or_default();
            let (completed, failed) =
                batch.map_or((0, 0), |batch| (batch.completed_goals, batch.failed_goals));
            if ran.len() < goals.len() {
                warn!(cycle = number, ran = ran.len(), dequeued = goals.len(), "goals left queued after early stop");
            }
            let remaining = self.queue.remove(&session.queue_file, &ran).await?;

            let gate_passed = run.gate_passed();
            session.record_cycle(ControllerCycle {
                cycle: number,
                goals: ran,
                program_session: Some(run.record.handle()),
                status: run.record.status(),
                completed,
                failed,
                gate_passed,
            });
            session.pending_goals = remaining;
            record.payload = RecordPayload::Controller(session.clone());
            self.sessions.save(&mut record).await?;

            if session.stop_on_gate_failure && !gate_passed {
                warn!(cycle = number, "gate failed; controller stopping");
                session.stopped_on_gate_failure = true;
                break;
            }
        }

        let pending = self.queue.pending(&session.queue_file).await?.len();
        session.settle(pending);
        info!(
            processed = session.processed_goals,
            pending,
            status = %session.status,
            "controller finished"
        );
        record.payload = RecordPayload::Controller(session);
        self.sessions.save(&mut record).await?;
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::fs::{FsRecoveryMemoryStore, FsSessionRepository, LineGoalQueue};
    use crate::adapters::runners::{ScriptedGoalRunner, ScriptedResponse};
    use crate::domain::models::{
        BatchOptions, GateConfig, GateRequest, RecordStatus, RiskThresholds, SchedulerConfig,
    };
    use crate::services::batch_scheduler::BatchScheduler;
    use crate::services::gate_evaluator::GateEvaluator;
    use crate::services::program_coordinator::ProgramAssembler;
    use crate::services::recovery_memory_service::RecoveryMemoryService;

    struct Fixture {
        dir: tempfile::TempDir,
        runner: Arc<ScriptedGoalRunner>,
        controller: QueueController,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().expect("tempdir");
        let runner = Arc::new(ScriptedGoalRunner::new());
        let sessions: Arc<dyn SessionRepository> = Arc::new(FsSessionRepository::new(dir.path().join("auto")));
        let scheduler = Arc::new(BatchScheduler::new(runner.clone(), sessions.clone(), SchedulerConfig::default()));
        let coordinator = Arc::new(ProgramCoordinator::new(
            scheduler,
            sessions.clone(),
            ProgramAssembler::new(GateEvaluator::new(GateConfig::default()), RiskThresholds::default()),
            Arc::new(RecoveryMemoryService::new(
                Arc::new(FsRecoveryMemoryStore::new(dir.path().join("memory.json"))),
                true,
            )),
        ));
        let controller = QueueController::new(
            coordinator,
            sessions,
            Arc::new(LineGoalQueue::new()),
            ControllerConfig::default(),
            dir.path().join("queue.lines"),
        );
        Fixture { dir, runner, controller }
    }

    fn session(record: &SessionRecord) -> &ControllerSession {
        match &record.payload {
            RecordPayload::Controller(session) => session,
            other => panic!("unexpected payload {}", other.mode()),
        }
    }

    #[tokio::test]
    async fn test_drains_queue_in_one_cycle() {
        let fx = fixture();
        let queue = fx.dir.path().join("queue.lines");
        tokio::fs::write(&queue, "ship a\nship b\n").await.expect("write");

        let record = fx
            .controller
            .drain(ControllerRequest {
                dequeue_limit: Some(2),
                max_cycles: Some(1),
                ..ControllerRequest::default()
            })
            .await
            .expect("drain");

        let session = session(&record);
        assert_eq!(session.processed_goals, 2);
        assert_eq!(session.pending_goals, 0);
        assert_eq!(session.status, RecordStatus::Completed);
        assert_eq!(session.cycles.len(), 1);
        assert!(session.cycles[0].program_session.is_some());
        assert_eq!(tokio::fs::read_to_string(&queue).await.expect("read"), "");
    }

    #[tokio::test]
    async fn test_cycle_limit_leaves_goals_pending_then_resume() {
        let fx = fixture();
        let record = fx
            .controller
            .drain(ControllerRequest {
                enqueue: vec!["a".into(), "b".into(), "c".into()],
                max_cycles: Some(2),
                ..ControllerRequest::default()
            })
            .await
            .expect("drain");
        let first = session(&record);
        assert_eq!(first.processed_goals, 2);
        assert_eq!(first.pending_goals, 1);
        assert_eq!(first.status, RecordStatus::Running);

        let resumed = fx
            .controller
            .drain(ControllerRequest {
                resume: Some(SessionRef::Latest),
                ..ControllerRequest::default()
            })
            .await
            .expect("resume");
        let session = session(&resumed);
        assert_eq!(resumed.id, record.id);
        assert_eq!(session.processed_goals, 3);
        assert_eq!(session.cycles.last().map(|c| c.cycle), Some(3));
        assert_eq!(session.status, RecordStatus::Completed);
        assert_eq!(fx.runner.invocations().await, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_stop_on_gate_failure() {
        let fx = fixture();
        fx.runner.script("a", vec![ScriptedResponse::failure("boom")]).await;
        let record = fx
            .controller
            .drain(ControllerRequest {
                enqueue: vec!["a".into(), "b".into()],
                stop_on_gate_failure: true,
                program: ProgramOptions {
                    batch: BatchOptions {
                        continue_on_error: true,
                        ..BatchOptions::default()
                    },
                    gate: GateRequest {
                        profile: Some("prod".into()),
                        ..GateRequest::default()
                    },
                    ..ProgramOptions::default()
                },
                ..ControllerRequest::default()
            })
            .await
            .expect("drain");

        let session = session(&record);
        assert!(session.stopped_on_gate_failure);
        assert_eq!(session.cycles.len(), 1);
        assert!(!session.cycles[0].gate_passed);
        assert_eq!(session.pending_goals, 1);
        assert_eq!(session.status, RecordStatus::Running);
    }

    #[tokio::test]
    async fn test_early_stop_keeps_unstarted_goals_queued() {
        let fx = fixture();
        let queue = fx.dir.path().join("queue.lines");
        tokio::fs::write(&queue, "a\nb\n").await.expect("write");
        fx.runner.script("a", vec![ScriptedResponse::failure("boom")]).await;

        let record = fx
            .controller
            .drain(ControllerRequest {
                dequeue_limit: Some(2),
                max_cycles: Some(1),
                ..ControllerRequest::default()
            })
            .await
            .expect("drain");

        let session = session(&record);
        assert_eq!(fx.runner.invocations().await, vec!["a"]);
        assert_eq!(session.cycles[0].goals, vec!["a"]);
        assert_eq!(session.processed_goals, 1);
        assert_eq!(session.failed_goals, 1);
        assert_eq!(session.pending_goals, 1);
        assert_eq!(session.status, RecordStatus::Running);
        assert_eq!(tokio::fs::read_to_string(&queue).await.expect("read"), "b\n");
    }

    #[tokio::test]
    async fn test_empty_queue_completes_immediately() {
        let fx = fixture();
        let record = fx.controller.drain(ControllerRequest::default()).await.expect("drain");
        let session = session(&record);
        assert!(session.cycles.is_empty());
        assert_eq!(session.status, RecordStatus::Completed);
    }
}
