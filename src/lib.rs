//! sce-closeloop - Close-loop orchestration and governance engine
//!
//! Turns natural-language goals into master/sub spec portfolios, runs them as
//! bounded-concurrency batches with adaptive retry, evaluates the outcome
//! against governance gates and stabilizes failing programs over rounds of
//! configuration patches. Every run is persisted as a resumable session record.
//!
//! # Architecture
//!
//! This crate follows Clean Architecture / Hexagonal Architecture principles:
//!
//! - **Domain Layer** (`domain`): Session records, gate math, retention policy
//!   and the port traits adapters implement
//! - **Adapter Layer** (`adapters`): File-backed archives and goal runners
//! - **Service Layer** (`services`): Scheduling, program coordination,
//!   governance, controller, retention and analytics
//! - **Infrastructure Layer** (`infrastructure`): Configuration, logging and
//!   workspace setup
//! - **CLI Layer** (`cli`): Command-line interface
//!
//! # Example
//!
//! ```no_run
//! use sce_closeloop::cli::AppContext;
//! use sce_closeloop::domain::models::{BatchOptions, Config, Goal};
//! use sce_closeloop::services::BatchInput;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let ctx = AppContext::new(Config::for_workspace(".sce"));
//! let input = BatchInput::from_goals(Goal::from_texts(["ship the queue", "harden retry"]));
//! let record = ctx.scheduler.run_batch(input, &BatchOptions::default()).await?;
//! println!("{} {}", record.id, record.status());
//! # Ok(())
//! # }
//! ```

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use domain::models::{
    BatchOptions, BatchSummary, Config, GateRequest, Goal, ProgramOptions, ProgramSummary,
    RecordPayload, RecordStatus, RetentionPolicy, RiskLevel, SessionKind, SessionRecord,
    SessionRef,
};
pub use domain::ports::{GoalRunner, SessionRepository};
pub use domain::{DomainError, DomainResult};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{BatchScheduler, GovernanceLoop, ProgramCoordinator, QueueController};
