pub mod batch_scheduler;
pub mod close_loop;
pub mod controller;
pub mod gate_evaluator;
pub mod goal_decomposer;
pub mod governance_loop;
pub mod governance_stats;
pub mod kpi_trend;
pub mod priority_calculator;
pub mod program_coordinator;
pub mod recovery_cycle;
pub mod recovery_memory_service;
pub mod resource_planner;
pub mod retention_service;

pub use batch_scheduler::{BatchInput, BatchScheduler};
pub use close_loop::{CloseLoopOutcome, CloseLoopRequest, CloseLoopService};
pub use controller::{ControllerRequest, QueueController};
pub use gate_evaluator::{GateEvaluator, GateOutcome};
pub use goal_decomposer::GoalDecomposer;
pub use governance_loop::{AdvisoryHandlers, GovernanceLoop, GovernanceRequest};
pub use governance_stats::GovernanceStatsService;
pub use kpi_trend::{KpiTrendService, TrendQuery};
pub use priority_calculator::PriorityCalculator;
pub use program_coordinator::{ProgramAssembler, ProgramCoordinator, ProgramRun, ProgramSnapshots};
pub use recovery_cycle::RecoveryCycle;
pub use recovery_memory_service::RecoveryMemoryService;
pub use resource_planner::plan_resources;
pub use retention_service::{prune_archive, RetentionService};
