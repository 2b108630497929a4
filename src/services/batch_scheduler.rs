//! Bounded-concurrency batch scheduler with adaptive retry.
//!
//! One pass admits goals in priority order through a semaphore sized to the
//! plan's effective parallelism. After the pass, failed goals are re-run in
//! retry rounds until they complete or the retry budget is spent. A goal's
//! latest result always replaces its earlier one.

use backoff::backoff::Backoff;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use futures::future::join_all;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};

use super::priority_calculator::{PriorityCalculator, ScheduledGoal};
use super::resource_planner::plan_resources;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    BatchOptions, BatchResult, BatchRetry, BatchSummary, Goal, GoalStatus, RecordPayload,
    RecordStatus, ResourcePlan, ResumeStrategy, RetryRoundReport, SchedulerConfig, SessionKind,
    SessionRecord, SessionRef,
};
use crate::domain::ports::{GoalRunRequest, GoalRunner, SessionRepository};

/// Failure ratio of a round at which the next retry round halves parallelism.
const ADAPTIVE_FAILURE_RATIO: f64 = 0.5;

/// Upper bound on the pause between retry rounds.
const MAX_COOLDOWN: Duration = Duration::from_secs(30);

/// Goals a batch (or resumed batch) should run.
#[derive(Debug, Clone)]
pub struct BatchInput {
    pub goals: Vec<ScheduledGoal>,
    /// Results carried over unchanged from a resumed summary
    pub carried: Vec<BatchResult>,
    pub goals_file: Option<PathBuf>,
}

impl BatchInput {
    pub fn from_goals(goals: Vec<Goal>) -> Self {
        Self {
            goals: goals
                .into_iter()
                .enumerate()
                .map(|(i, goal)| ScheduledGoal::new(i + 1, goal))
                .collect(),
            carried: Vec::new(),
            goals_file: None,
        }
    }

    #[must_use]
    pub fn with_goals_file(mut self, goals_file: Option<PathBuf>) -> Self {
        self.goals_file = goals_file;
        self
    }

    fn total(&self) -> usize {
        self.goals.len() + self.carried.len()
    }
}

struct RoundOutcome {
    results: Vec<BatchResult>,
    stopped: bool,
}

pub struct BatchScheduler {
    runner: Arc<dyn GoalRunner>,
    sessions: Arc<dyn SessionRepository>,
    config: SchedulerConfig,
}

impl BatchScheduler {
    pub fn new(
        runner: Arc<dyn GoalRunner>,
        sessions: Arc<dyn SessionRepository>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            runner,
            sessions,
            config,
        }
    }

    pub const fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Run a batch and persist it as a batch session, checkpointing after
    /// every round.
    #[instrument(skip(self, input, options), fields(goals = input.total()))]
    pub async fn run_batch(&self, input: BatchInput, options: &BatchOptions) -> DomainResult<SessionRecord> {
        let summary = self.prepare(&input, options)?;
        let mut record = self.sessions.create(RecordPayload::Batch(summary.clone())).await?;
        info!(session_id = %record.id, "batch session created");

        let summary = self.execute(summary, input, options, Some(&mut record)).await?;
        record.payload = RecordPayload::Batch(summary);
        self.sessions.save(&mut record).await?;
        Ok(record)
    }

    /// Resume a persisted batch-like summary into a new batch session.
    #[instrument(skip(self, options), fields(reference = %reference))]
    pub async fn resume_batch(
        &self,
        reference: &SessionRef,
        strategy: ResumeStrategy,
        options: &BatchOptions,
    ) -> DomainResult<SessionRecord> {
        let source = self.sessions.get(SessionKind::BatchSession, reference).await?;
        let input = resume_input(&source, strategy)?;

        let mut summary = self.prepare(&input, options)?;
        summary.resumed_from = Some(source.handle());
        summary.resume_strategy = Some(strategy);

        let mut record = self.sessions.create(RecordPayload::Batch(summary.clone())).await?;
        info!(session_id = %record.id, source = %source.id, ?strategy, "batch resumed");

        let summary = self.execute(summary, input, options, Some(&mut record)).await?;
        record.payload = RecordPayload::Batch(summary);
        self.sessions.save(&mut record).await?;
        Ok(record)
    }

    /// Initial summary for `input` before any goal runs.
    pub fn prepare(&self, input: &BatchInput, options: &BatchOptions) -> DomainResult<BatchSummary> {
        if input.total() == 0 {
            return Err(DomainError::InvalidConfiguration(
                "batch has no goals".to_string(),
            ));
        }

        let all_goals: Vec<Goal> = input.goals.iter().map(|g| g.goal.clone()).collect();
        let resource_plan = plan_resources(&self.config, options, &all_goals)?;
        let mut goal_texts: Vec<(usize, String)> = input
            .goals
            .iter()
            .map(|g| (g.index, g.goal.text.clone()))
            .chain(input.carried.iter().map(|r| (r.index, r.goal.clone())))
            .collect();
        goal_texts.sort_by_key(|(index, _)| *index);

        let mut summary = BatchSummary {
            status: RecordStatus::Running,
            goals_file: input.goals_file.clone(),
            goals: goal_texts.into_iter().map(|(_, text)| text).collect(),
            total_goals: input.total(),
            processed_goals: 0,
            completed_goals: 0,
            failed_goals: 0,
            batch_parallel: resource_plan.effective_goal_parallel,
            resource_plan,
            batch_retry: BatchRetry::new(
                options.retry_rounds,
                options.retry_until_complete,
                self.config.retry_max_rounds,
            ),
            results: input.carried.clone(),
            stopped_early: false,
            dry_run: options.dry_run,
            resumed_from: None,
            resume_strategy: None,
        };
        summary.refresh();
        summary.status = RecordStatus::Running;
        Ok(summary)
    }

    /// Execute `input` on top of a prepared summary.
    ///
    /// When `checkpoint` is given, the record is rewritten with the summary
    /// after each round.
    pub async fn execute(
        &self,
        mut summary: BatchSummary,
        input: BatchInput,
        options: &BatchOptions,
        mut checkpoint: Option<&mut SessionRecord>,
    ) -> DomainResult<BatchSummary> {
        let plan = summary.resource_plan.clone();
        let calculator = PriorityCalculator::with_weights(1.0, plan.aging_factor);
        let retry_available = summary.batch_retry.max_rounds > 0;

        // Without a retry budget, a failure cancels unstarted goals.
        let cancel_on_failure = !options.continue_on_error && !retry_available;
        let first = self
            .run_round(&calculator, &plan, input.goals, plan.effective_goal_parallel, options.dry_run, cancel_on_failure)
            .await;
        let mut last_ratio = failure_ratio(&first.results);
        merge_results(&mut summary, first.results);

        if first.stopped {
            summary.stopped_early = true;
            summary.refresh();
            warn!(processed = summary.processed_goals, total = summary.total_goals, "batch stopped early");
            return Ok(summary);
        }
        summary.refresh();
        summary.status = RecordStatus::Running;
        self.checkpoint(&summary, checkpoint.as_deref_mut()).await?;

        let mut parallel = plan.effective_goal_parallel;
        let mut cooldown = cooldown_policy(self.config.retry_cooldown_ms);

        while !options.dry_run
            && summary.failed_goals > 0
            && summary.batch_retry.performed_rounds < summary.batch_retry.max_rounds
        {
            let round = summary.batch_retry.performed_rounds + 1;
            if last_ratio >= ADAPTIVE_FAILURE_RATIO {
                parallel = (parallel / 2).max(1);
            }
            if let Some(delay) = cooldown.as_mut().and_then(|b| b.next_backoff()) {
                debug!(round, delay_ms = delay.as_millis() as u64, "retry cooldown");
                tokio::time::sleep(delay).await;
            }

            let retry_goals: Vec<ScheduledGoal> = summary
                .failed_results()
                .map(|result| ScheduledGoal {
                    index: result.index,
                    goal: Goal::new(result.goal.clone()),
                    source_index: result.source_index,
                    attempts: result.attempts,
                })
                .collect();
            let attempted = retry_goals.len();
            info!(round, attempted, parallel, "retrying failed goals");

            let outcome = self
                .run_round(&calculator, &plan, retry_goals, parallel, false, false)
                .await;
            last_ratio = failure_ratio(&outcome.results);
            let failed = outcome.results.iter().filter(|r| r.status.is_failure()).count();
            merge_results(&mut summary, outcome.results);

            summary.batch_retry.performed_rounds = round;
            summary.batch_retry.rounds.push(RetryRoundReport {
                round,
                attempted,
                completed: attempted - failed,
                failed,
                parallel,
            });
            summary.refresh();
            summary.status = RecordStatus::Running;
            self.checkpoint(&summary, checkpoint.as_deref_mut()).await?;
        }

        summary.batch_retry.exhausted = summary.failed_goals > 0
            && summary.batch_retry.enabled
            && summary.batch_retry.performed_rounds >= summary.batch_retry.max_rounds;
        summary.refresh();
        info!(
            status = %summary.status,
            completed = summary.completed_goals,
            failed = summary.failed_goals,
            retry_rounds = summary.batch_retry.performed_rounds,
            "batch finished"
        );
        Ok(summary)
    }

    async fn checkpoint(&self, summary: &BatchSummary, record: Option<&mut SessionRecord>) -> DomainResult<()> {
        if let Some(record) = record {
            record.payload = RecordPayload::Batch(summary.clone());
            self.sessions.save(record).await?;
        }
        Ok(())
    }

    /// Run one pass over `goals` with at most `parallel` in flight.
    async fn run_round(
        &self,
        calculator: &PriorityCalculator,
        plan: &ResourcePlan,
        goals: Vec<ScheduledGoal>,
        parallel: usize,
        dry_run: bool,
        cancel_on_failure: bool,
    ) -> RoundOutcome {
        let ordered = calculator.order(plan.scheduling_strategy, goals);
        let semaphore = Arc::new(Semaphore::new(parallel.max(1)));
        let cancelled = Arc::new(AtomicBool::new(false));
        let mut handles = Vec::with_capacity(ordered.len());
        let mut stopped = false;

        for entry in ordered {
            let Ok(permit) = semaphore.clone().acquire_owned().await else {
                break;
            };
            if cancelled.load(Ordering::SeqCst) {
                stopped = true;
                break;
            }

            let runner = self.runner.clone();
            let cancelled = cancelled.clone();
            let per_goal_max_parallel = plan.per_goal_max_parallel;

            let handle = tokio::spawn(async move {
                let _permit = permit;
                let result = run_goal(runner, entry, per_goal_max_parallel, dry_run).await;
                if cancel_on_failure && result.status.is_failure() {
                    cancelled.store(true, Ordering::SeqCst);
                }
                result
            });
            handles.push(handle);
        }

        let mut results = Vec::with_capacity(handles.len());
        for joined in join_all(handles).await {
            match joined {
                Ok(result) => results.push(result),
                Err(e) => warn!(error = %e, "goal task aborted"),
            }
        }

        RoundOutcome { results, stopped }
    }
}

async fn run_goal(
    runner: Arc<dyn GoalRunner>,
    entry: ScheduledGoal,
    per_goal_max_parallel: usize,
    dry_run: bool,
) -> BatchResult {
    let attempt = entry.attempts + 1;
    let request = GoalRunRequest {
        index: entry.index,
        goal: entry.goal.clone(),
        per_goal_max_parallel,
        dry_run,
        attempt,
    };

    let mut result = match runner.run(request).await {
        Ok(outcome) => {
            BatchResult::from_portfolio(entry.index, &entry.goal.text, outcome.status, &outcome.portfolio, outcome.error)
        }
        Err(e) => {
            warn!(goal_index = entry.index, error = %e, "goal runner error");
            BatchResult::errored(entry.index, &entry.goal.text, e.to_string())
        }
    };
    result.attempts = attempt;
    result.source_index = entry.source_index;
    debug!(goal_index = result.index, status = %result.status, attempt, "goal finished");
    result
}

fn failure_ratio(results: &[BatchResult]) -> f64 {
    if results.is_empty() {
        return 0.0;
    }
    results.iter().filter(|r| r.status.is_failure()).count() as f64 / results.len() as f64
}

/// Replace results by index.
fn merge_results(summary: &mut BatchSummary, results: Vec<BatchResult>) {
    for result in results {
        match summary.results.iter_mut().find(|r| r.index == result.index) {
            Some(existing) => *existing = result,
            None => summary.results.push(result),
        }
    }
}

fn cooldown_policy(initial_ms: u64) -> Option<ExponentialBackoff> {
    (initial_ms > 0).then(|| {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(initial_ms))
            .with_randomization_factor(0.0)
            .with_multiplier(2.0)
            .with_max_interval(MAX_COOLDOWN)
            .with_max_elapsed_time(None)
            .build()
    })
}

/// Derive what a resumed batch runs from a persisted batch-like record.
///
/// `pending` keeps completed results and re-runs everything else, so the
/// total is unchanged. `failed-only` re-runs just the failed goals,
/// re-indexed from 1 with `source_index` pointing back.
pub fn resume_input(source: &SessionRecord, strategy: ResumeStrategy) -> DomainResult<BatchInput> {
    let summary = source.payload.batch().ok_or_else(|| {
        DomainError::InvalidConfiguration(format!(
            "session {} is a {} record and cannot be resumed as a batch",
            source.id,
            source.payload.mode()
        ))
    })?;

    let input = match strategy {
        ResumeStrategy::Pending => {
            let carried: Vec<BatchResult> = summary
                .results
                .iter()
                .filter(|r| r.status == GoalStatus::Completed)
                .cloned()
                .collect();
            let goals = summary
                .goals
                .iter()
                .enumerate()
                .map(|(i, text)| (i + 1, text))
                .filter(|(index, _)| !carried.iter().any(|r| r.index == *index))
                .map(|(index, text)| {
                    let attempts = summary
                        .results
                        .iter()
                        .find(|r| r.index == index)
                        .map_or(0, |r| r.attempts);
                    ScheduledGoal {
                        attempts,
                        ..ScheduledGoal::new(index, Goal::new(text.clone()))
                    }
                })
                .collect();
            BatchInput {
                goals,
                carried,
                goals_file: summary.goals_file.clone(),
            }
        }
        ResumeStrategy::FailedOnly => {
            let goals = summary
                .failed_results()
                .enumerate()
                .map(|(i, result)| ScheduledGoal {
                    source_index: Some(result.source_index.unwrap_or(result.index)),
                    attempts: result.attempts,
                    ..ScheduledGoal::new(i + 1, Goal::new(result.goal.clone()))
                })
                .collect();
            BatchInput {
                goals,
                carried: Vec::new(),
                goals_file: summary.goals_file.clone(),
            }
        }
    };

    if input.goals.is_empty() {
        return Err(DomainError::InvalidConfiguration(format!(
            "session {} has no goals left to resume",
            source.id
        )));
    }
    Ok(input)
}
