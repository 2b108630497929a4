//! Scripted goal runner for tests and rehearsals.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use super::simulated::plan_portfolio;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::ports::{GoalRunOutcome, GoalRunRequest, GoalRunner};

/// Scripted response configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedResponse {
    Complete,
    /// Runner reports a failed goal
    Fail(String),
    /// Runner cannot be invoked
    Error(String),
}

impl ScriptedResponse {
    pub fn failure(error: impl Into<String>) -> Self {
        Self::Fail(error.into())
    }

    pub fn error(error: impl Into<String>) -> Self {
        Self::Error(error.into())
    }
}

/// Runner whose outcome per goal text follows a script.
///
/// Each goal has a queue of responses consumed one per attempt; once the
/// queue is empty the default response applies.
pub struct ScriptedGoalRunner {
    default_response: ScriptedResponse,
    scripts: Arc<RwLock<HashMap<String, VecDeque<ScriptedResponse>>>>,
    invocations: Arc<RwLock<Vec<String>>>,
    delay: Duration,
    sequence: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl ScriptedGoalRunner {
    pub fn new() -> Self {
        Self::with_default_response(ScriptedResponse::Complete)
    }

    pub fn with_default_response(response: ScriptedResponse) -> Self {
        Self {
            default_response: response,
            scripts: Arc::new(RwLock::new(HashMap::new())),
            invocations: Arc::new(RwLock::new(Vec::new())),
            delay: Duration::ZERO,
            sequence: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
    }

    /// Hold each goal for `delay` so concurrency becomes observable.
    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Queue responses for a goal, consumed one per attempt.
    pub async fn script(&self, goal: impl Into<String>, responses: Vec<ScriptedResponse>) {
        let mut scripts = self.scripts.write().await;
        scripts.entry(goal.into()).or_default().extend(responses);
    }

    /// Goal texts in invocation order.
    pub async fn invocations(&self) -> Vec<String> {
        self.invocations.read().await.clone()
    }

    /// Highest number of goals observed running at once.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    async fn next_response(&self, goal: &str) -> ScriptedResponse {
        let mut scripts = self.scripts.write().await;
        scripts
            .get_mut(goal)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| self.default_response.clone())
    }
}

impl Default for ScriptedGoalRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GoalRunner for ScriptedGoalRunner {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn run(&self, request: GoalRunRequest) -> DomainResult<GoalRunOutcome> {
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(running, Ordering::SeqCst);
        self.invocations.write().await.push(request.goal.text.clone());

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let response = self.next_response(&request.goal.text).await;
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let portfolio = plan_portfolio(u32::try_from(sequence).unwrap_or(u32::MAX), &request.goal);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match response {
            ScriptedResponse::Complete if request.dry_run => Ok(GoalRunOutcome::planned(portfolio)),
            ScriptedResponse::Complete => Ok(GoalRunOutcome::completed(portfolio)),
            ScriptedResponse::Fail(error) => Ok(GoalRunOutcome::failed(portfolio, error)),
            ScriptedResponse::Error(error) => Err(DomainError::Runner(error)),
        }
    }
}
