pub mod batch;
pub mod config;
pub mod controller;
pub mod goal;
pub mod governance;
pub mod kpi;
pub mod program;
pub mod prune;
pub mod recovery_memory;
pub mod session;

pub use batch::{
    BatchOptions, BatchResult, BatchRetry, BatchSummary, GoalStatus, ResourcePlan, ResumeStrategy,
    RetryRoundReport, SchedulingStrategy,
};
pub use config::{
    Config, ControllerConfig, DecompositionConfig, GateConfig, GateProfile, GovernanceConfig,
    KpiConfig, LoggingConfig, RetentionConfig, RiskThresholds, SchedulerConfig, WorkspaceConfig,
};
pub use controller::{ControllerCycle, ControllerSession};
pub use goal::{
    slugify, split_clauses, ComplexityScore, DecompositionPlan, DecompositionQuality,
    DeliveryCategory, Goal, Portfolio, MAX_SUB_SPECS,
};
pub use governance::{
    AdvisoryAction, AdvisoryKind, AdvisoryStatus, ConfigPatch, ExecutionMode, GovernanceRound,
    GovernanceSession, RemediationAction, SelectionSource, StopReason,
};
pub use kpi::{
    AnomalyKind, ArchiveStats, GovernanceHealth, GovernanceStats, KpiAnomaly, KpiTrendReport,
    MaintenanceReport, PeriodUnit, TrendBucket,
};
pub use program::{
    AutoRecovery, ConvergenceState, EffectiveGate, FailedGoal, GateActual, GateEvaluation,
    GatePolicy, GateRequest, GateSource, ProgramCoordination, ProgramDiagnostics, ProgramKpi,
    ProgramOptions, ProgramSummary, RiskLevel,
};
pub use prune::{
    ProtectedRecord, ProtectionReason, PruneError, PruneReport, RetentionCandidate,
    RetentionPolicy,
};
pub use recovery_memory::{
    failure_signature, ActionStats, DecayReport, RecoveryMemory, RecoveryMemoryTotals,
    SignatureEntry,
};
pub use session::{
    CloseLoopSession, ListQuery, RecordPayload, RecordStatus, SessionHandle, SessionKind,
    SessionListing, SessionRecord, SessionRef, SessionSummary, SpecEntry, SpecListing,
};
