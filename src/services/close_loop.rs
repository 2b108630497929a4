//! Single-goal close loop: plan or execute one goal into a session record.

use std::sync::Arc;
use tracing::{info, instrument, warn};

use super::retention_service::prune_archive;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    CloseLoopSession, Goal, GoalStatus, Portfolio, PruneReport, RecordPayload, RecordStatus,
    RetentionPolicy, SessionKind, SessionRecord, SessionRef,
};
use crate::domain::ports::{GoalRunRequest, GoalRunner, SessionRepository};

/// One close-loop invocation.
#[derive(Debug, Clone, Default)]
pub struct CloseLoopRequest {
    /// Goal text; taken from the resumed session when absent
    pub goal: Option<String>,
    pub dry_run: bool,
    pub resume: Option<SessionRef>,
    /// Keep policy applied to the session archive after the run
    pub session_retention: Option<RetentionPolicy>,
}

#[derive(Debug, Clone)]
pub struct CloseLoopOutcome {
    pub record: SessionRecord,
    pub retention: Option<PruneReport>,
}

pub struct CloseLoopService {
    runner: Arc<dyn GoalRunner>,
    sessions: Arc<dyn SessionRepository>,
}

impl CloseLoopService {
    pub fn new(runner: Arc<dyn GoalRunner>, sessions: Arc<dyn SessionRepository>) -> Self {
        Self { runner, sessions }
    }

    #[instrument(skip(self, request), fields(dry_run = request.dry_run))]
    pub async fn run(&self, request: CloseLoopRequest) -> DomainResult<CloseLoopOutcome> {
        let source = match &request.resume {
            Some(reference) => Some(self.sessions.get(SessionKind::Session, reference).await?),
            None => None,
        };
        let source_session = match source.as_ref().map(|record| &record.payload) {
            Some(RecordPayload::Session(session)) => Some(session),
            Some(other) => {
                return Err(DomainError::InvalidConfiguration(format!(
                    "cannot resume a {} record as a close-loop session",
                    other.mode()
                )))
            }
            None => None,
        };

        let text = request
            .goal
            .clone()
            .or_else(|| source_session.map(|s| s.goal.clone()))
            .filter(|text| !text.trim().is_empty())
            .ok_or_else(|| DomainError::InvalidConfiguration("a goal is required".to_string()))?;
        let goal = Goal::new(text);

        let mut session = CloseLoopSession {
            status: RecordStatus::Running,
            goal: goal.text.clone(),
            complexity_score: goal.complexity.score,
            sub_spec_count: goal.sub_spec_count(),
            portfolio: source_session.map(|s| s.portfolio.clone()).unwrap_or_default(),
            resumed: source.is_some(),
            resumed_from_session: source.as_ref().map(|record| record.id.clone()),
            dry_run: request.dry_run,
            error: None,
        };
        let mut record = self.sessions.create(RecordPayload::Session(session.clone())).await?;
        info!(session_id = %record.id, resumed = session.resumed, "close-loop session created");

        let outcome = self
            .runner
            .run(GoalRunRequest {
                index: 1,
                goal,
                per_goal_max_parallel: 1,
                dry_run: request.dry_run,
                attempt: 1,
            })
            .await;

        match outcome {
            Ok(outcome) => {
                session.status = match outcome.status {
                    GoalStatus::Planned => RecordStatus::Planned,
                    GoalStatus::Completed => RecordStatus::Completed,
                    GoalStatus::Failed | GoalStatus::Error => RecordStatus::Failed,
                };
                session.sub_spec_count = outcome.portfolio.sub_specs.len();
                session.portfolio = merge_portfolio(session.portfolio, outcome.portfolio);
                session.error = outcome.error;
            }
            Err(e) => {
                warn!(session_id = %record.id, error = %e, "goal runner error");
                session.status = RecordStatus::Failed;
                session.error = Some(e.to_string());
            }
        }

        record.payload = RecordPayload::Session(session);
        self.sessions.save(&mut record).await?;

        let retention = match &request.session_retention {
            Some(policy) => Some(
                prune_archive(self.sessions.as_ref(), SessionKind::Session, policy, chrono::Utc::now()).await?,
            ),
            None => None,
        };

        Ok(CloseLoopOutcome { record, retention })
    }
}

/// A resumed run keeps the spec ids it already had when the runner reports none.
fn merge_portfolio(previous: Portfolio, produced: Portfolio) -> Portfolio {
    if produced.master_spec.is_empty() {
        previous
    } else {
        produced
    }
}
