use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use super::batch::SchedulingStrategy;
use super::program::{GatePolicy, RiskLevel};
use super::session::SessionKind;

/// Main configuration structure for the close-loop engine
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Workspace layout
    #[serde(default)]
    pub workspace: WorkspaceConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Batch scheduling and retry defaults
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Gate profiles and risk thresholds
    #[serde(default)]
    pub gate: GateConfig,

    /// Stabilization loop defaults
    #[serde(default)]
    pub governance: GovernanceConfig,

    /// Archive retention defaults
    #[serde(default)]
    pub retention: RetentionConfig,

    /// Goal decomposition quality settings
    #[serde(default)]
    pub decomposition: DecompositionConfig,

    /// Queue controller defaults
    #[serde(default)]
    pub controller: ControllerConfig,

    /// KPI trend settings
    #[serde(default)]
    pub kpi: KpiConfig,
}

impl Config {
    /// Default configuration rooted at `root` instead of `.sce`.
    pub fn for_workspace(root: impl Into<PathBuf>) -> Self {
        Self {
            workspace: WorkspaceConfig {
                root: root.into(),
                ..WorkspaceConfig::default()
            },
            ..Self::default()
        }
    }
}

/// Workspace layout configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct WorkspaceConfig {
    /// Workspace root directory
    #[serde(default = "default_workspace_root")]
    pub root: PathBuf,

    /// Archive directory, relative to the root
    #[serde(default = "default_auto_dir")]
    pub auto_dir: String,

    /// Spec directory, relative to the root
    #[serde(default = "default_specs_dir")]
    pub specs_dir: String,
}

fn default_workspace_root() -> PathBuf {
    PathBuf::from(".sce")
}

fn default_auto_dir() -> String {
    "auto".to_string()
}

fn default_specs_dir() -> String {
    "specs".to_string()
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            root: default_workspace_root(),
            auto_dir: default_auto_dir(),
            specs_dir: default_specs_dir(),
        }
    }
}

impl WorkspaceConfig {
    pub fn auto_path(&self) -> PathBuf {
        self.root.join(&self.auto_dir)
    }

    pub fn specs_path(&self) -> PathBuf {
        self.root.join(&self.specs_dir)
    }

    pub fn archive_path(&self, kind: SessionKind) -> PathBuf {
        self.auto_path().join(kind.dir_name())
    }

    pub fn recovery_memory_path(&self) -> PathBuf {
        self.auto_path().join("recovery-memory.json")
    }

    pub fn default_queue_path(&self) -> PathBuf {
        self.auto_path().join("close-loop-controller-goals.lines")
    }

    pub fn config_path(&self) -> PathBuf {
        self.root.join("closeloop.yaml")
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Directory for rolling JSON log files; console only when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<PathBuf>,

    /// Number of days to retain logs
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

const fn default_retention_days() -> u32 {
    30
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
            retention_days: default_retention_days(),
        }
    }
}

/// Batch scheduling configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SchedulerConfig {
    /// Goal parallelism when none is requested
    #[serde(default = "default_parallel")]
    pub default_parallel: usize,

    /// Upper clamp for requested parallelism
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,

    /// Concurrent agent units one goal may use
    #[serde(default = "default_per_goal_max_parallel")]
    pub per_goal_max_parallel: usize,

    /// Agent budget applied when none is requested
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_agent_budget: Option<usize>,

    #[serde(default)]
    pub scheduling_strategy: SchedulingStrategy,

    /// Priority boost per earlier attempt of a goal
    #[serde(default = "default_aging_factor")]
    pub aging_factor: f64,

    /// Safety cap on retry rounds, also bounds until-complete retries
    #[serde(default = "default_retry_max_rounds")]
    pub retry_max_rounds: u32,

    /// Initial pause between retry rounds in milliseconds (0 disables)
    #[serde(default)]
    pub retry_cooldown_ms: u64,
}

const fn default_parallel() -> usize {
    1
}

const fn default_max_parallel() -> usize {
    20
}

const fn default_per_goal_max_parallel() -> usize {
    1
}

const fn default_aging_factor() -> f64 {
    0.5
}

const fn default_retry_max_rounds() -> u32 {
    10
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            default_parallel: default_parallel(),
            max_parallel: default_max_parallel(),
            per_goal_max_parallel: default_per_goal_max_parallel(),
            default_agent_budget: None,
            scheduling_strategy: SchedulingStrategy::default(),
            aging_factor: default_aging_factor(),
            retry_max_rounds: default_retry_max_rounds(),
            retry_cooldown_ms: 0,
        }
    }
}

/// One named gate profile
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct GateProfile {
    pub max_risk_level: RiskLevel,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_agent_budget: Option<usize>,
}

/// Failure-ratio thresholds that map a program outcome to a risk level
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RiskThresholds {
    /// Failure ratios above this (exclusive) are at least medium
    #[serde(default)]
    pub medium_failure_ratio: f64,

    /// Failure ratios above this are high
    #[serde(default = "default_high_failure_ratio")]
    pub high_failure_ratio: f64,

    /// Budget utilisation at which failures escalate one level
    #[serde(default = "default_budget_pressure_escalation")]
    pub budget_pressure_escalation: f64,
}

const fn default_high_failure_ratio() -> f64 {
    0.3
}

const fn default_budget_pressure_escalation() -> f64 {
    0.9
}

impl Default for RiskThresholds {
    fn default() -> Self {
        Self {
            medium_failure_ratio: 0.0,
            high_failure_ratio: default_high_failure_ratio(),
            budget_pressure_escalation: default_budget_pressure_escalation(),
        }
    }
}

/// Gate configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct GateConfig {
    #[serde(default = "default_gate_profile")]
    pub default_profile: String,

    #[serde(default = "default_gate_profiles")]
    pub profiles: BTreeMap<String, GateProfile>,

    #[serde(default)]
    pub risk: RiskThresholds,
}

fn default_gate_profile() -> String {
    "default".to_string()
}

fn default_gate_profiles() -> BTreeMap<String, GateProfile> {
    [
        ("default", RiskLevel::High),
        ("staging", RiskLevel::Medium),
        ("prod", RiskLevel::Low),
    ]
    .into_iter()
    .map(|(name, max_risk_level)| {
        (
            name.to_string(),
            GateProfile {
                max_risk_level,
                max_agent_budget: None,
            },
        )
    })
    .collect()
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            default_profile: default_gate_profile(),
            profiles: default_gate_profiles(),
            risk: RiskThresholds::default(),
        }
    }
}

impl GateConfig {
    /// Resolve a named profile into a policy.
    pub fn policy(&self, name: &str) -> Option<GatePolicy> {
        self.profiles.get(name).map(|profile| GatePolicy {
            profile: name.to_string(),
            max_risk_level: profile.max_risk_level,
            max_agent_budget: profile.max_agent_budget,
        })
    }
}

/// Governance loop configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct GovernanceConfig {
    #[serde(default = "default_governance_rounds")]
    pub max_rounds: u32,

    #[serde(default)]
    pub target_risk: RiskLevel,

    /// Bias action selection with historical outcomes
    #[serde(default = "default_true")]
    pub use_recovery_memory: bool,
}

const fn default_governance_rounds() -> u32 {
    3
}

const fn default_true() -> bool {
    true
}

impl Default for GovernanceConfig {
    fn default() -> Self {
        Self {
            max_rounds: default_governance_rounds(),
            target_risk: RiskLevel::Low,
            use_recovery_memory: true,
        }
    }
}

/// Retention configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RetentionConfig {
    #[serde(default = "default_session_keep")]
    pub session_keep: usize,

    #[serde(default = "default_session_keep")]
    pub batch_keep: usize,

    #[serde(default = "default_controller_keep")]
    pub controller_keep: usize,

    #[serde(default = "default_controller_keep")]
    pub governance_keep: usize,

    /// Records younger than this are never pruned
    #[serde(default = "default_protect_window_days")]
    pub protect_window_days: u32,

    /// Recovery-memory signatures unused for longer are decayed
    #[serde(default = "default_memory_ttl_days")]
    pub recovery_memory_ttl_days: u32,
}

const fn default_session_keep() -> usize {
    50
}

const fn default_controller_keep() -> usize {
    20
}

const fn default_protect_window_days() -> u32 {
    1
}

const fn default_memory_ttl_days() -> u32 {
    30
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            session_keep: default_session_keep(),
            batch_keep: default_session_keep(),
            controller_keep: default_controller_keep(),
            governance_keep: default_controller_keep(),
            protect_window_days: default_protect_window_days(),
            recovery_memory_ttl_days: default_memory_ttl_days(),
        }
    }
}

impl RetentionConfig {
    pub const fn keep_for(&self, kind: SessionKind) -> usize {
        match kind {
            SessionKind::Session => self.session_keep,
            SessionKind::BatchSession => self.batch_keep,
            SessionKind::ControllerSession => self.controller_keep,
            SessionKind::GovernanceSession => self.governance_keep,
        }
    }
}

/// Decomposition configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DecompositionConfig {
    /// Minimum quality score (0-100)
    #[serde(default = "default_min_quality")]
    pub min_quality_score: f64,

    #[serde(default = "default_refinement_rounds")]
    pub max_refinement_rounds: u32,
}

const fn default_min_quality() -> f64 {
    70.0
}

const fn default_refinement_rounds() -> u32 {
    3
}

impl Default for DecompositionConfig {
    fn default() -> Self {
        Self {
            min_quality_score: default_min_quality(),
            max_refinement_rounds: default_refinement_rounds(),
        }
    }
}

/// Controller configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ControllerConfig {
    /// Queue file; defaults to the archive directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue_file: Option<PathBuf>,

    #[serde(default = "default_dequeue_limit")]
    pub dequeue_limit: usize,

    #[serde(default = "default_max_cycles")]
    pub max_cycles: u32,
}

const fn default_dequeue_limit() -> usize {
    1
}

const fn default_max_cycles() -> u32 {
    10
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            queue_file: None,
            dequeue_limit: default_dequeue_limit(),
            max_cycles: default_max_cycles(),
        }
    }
}

/// KPI trend configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct KpiConfig {
    #[serde(default = "default_window_days")]
    pub window_days: u32,

    /// Success-rate drop (percentage points) flagged as an anomaly
    #[serde(default = "default_anomaly_drop")]
    pub anomaly_drop_percent: f64,

    #[serde(default = "default_trailing_periods")]
    pub trailing_periods: usize,
}

const fn default_window_days() -> u32 {
    56
}

const fn default_anomaly_drop() -> f64 {
    20.0
}

const fn default_trailing_periods() -> usize {
    3
}

impl Default for KpiConfig {
    fn default() -> Self {
        Self {
            window_days: default_window_days(),
            anomaly_drop_percent: default_anomaly_drop(),
            trailing_periods: default_trailing_periods(),
        }
    }
}
