//! Goal runner port - the unit of work that turns one goal into specs.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::errors::DomainResult;
use crate::domain::models::{Goal, GoalStatus, Portfolio};

/// One goal handed to a runner.
#[derive(Debug, Clone)]
pub struct GoalRunRequest {
    /// 1-based position in the batch
    pub index: usize,
    pub goal: Goal,
    /// Concurrent agent units the runner may use for this goal
    pub per_goal_max_parallel: usize,
    /// Plan only, no side effects
    pub dry_run: bool,
    pub attempt: u32,
}

/// What a runner reports back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoalRunOutcome {
    pub status: GoalStatus,
    pub portfolio: Portfolio,
    pub error: Option<String>,
}

impl GoalRunOutcome {
    pub const fn completed(portfolio: Portfolio) -> Self {
        Self {
            status: GoalStatus::Completed,
            portfolio,
            error: None,
        }
    }

    pub const fn planned(portfolio: Portfolio) -> Self {
        Self {
            status: GoalStatus::Planned,
            portfolio,
            error: None,
        }
    }

    pub fn failed(portfolio: Portfolio, error: impl Into<String>) -> Self {
        Self {
            status: GoalStatus::Failed,
            portfolio,
            error: Some(error.into()),
        }
    }
}

/// Executes (or plans) one goal.
///
/// A returned `Err` means the runner could not be invoked; the scheduler
/// records it as an `error` result eligible for retry. Timeouts are the
/// runner's responsibility and surface as failures.
#[async_trait]
pub trait GoalRunner: Send + Sync {
    fn name(&self) -> &'static str;

    async fn run(&self, request: GoalRunRequest) -> DomainResult<GoalRunOutcome>;
}
