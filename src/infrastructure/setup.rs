//! Workspace setup and initialization
//!
//! Handles `init`:
//! - Archive directory creation (one per session kind)
//! - Spec directory creation
//! - Default config file creation

use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::path::PathBuf;

use crate::domain::models::{SessionKind, WorkspaceConfig};

/// Default configuration template content
const DEFAULT_CONFIG_TEMPLATE: &str = r#"# Close-loop engine configuration
# Override settings by editing this file, adding closeloop.local.yaml next to
# it, or setting environment variables with the SCE_ prefix
#
# Example environment variables:
#   export SCE_LOGGING__LEVEL=debug
#   export SCE_SCHEDULER__DEFAULT_PARALLEL=4
#   export SCE_GATE__DEFAULT_PROFILE=staging

# Logging configuration
logging:
  # Log level: trace, debug, info, warn, error
  level: "info"

  # Console format: json, pretty
  format: "pretty"

  # Rolling JSON log files are written here when set
  # log_dir: ".sce/logs"

  # Rotated log files to keep
  retention_days: 30

# Batch scheduling and retry
scheduler:
  default_parallel: 1
  max_parallel: 20
  per_goal_max_parallel: 1
  # default_agent_budget: 8
  scheduling_strategy: "fifo"
  aging_factor: 0.5
  # Safety cap on retry rounds, including until-complete retries
  retry_max_rounds: 10
  # Initial pause between retry rounds (0 disables)
  retry_cooldown_ms: 0

# Gate profiles
gate:
  default_profile: "default"
  profiles:
    default:
      max_risk_level: "high"
    staging:
      max_risk_level: "medium"
    prod:
      max_risk_level: "low"
  risk:
    medium_failure_ratio: 0.0
    high_failure_ratio: 0.3
    budget_pressure_escalation: 0.9

# Governance stabilization loop
governance:
  max_rounds: 3
  target_risk: "low"
  use_recovery_memory: true

# Archive retention
retention:
  session_keep: 50
  batch_keep: 50
  controller_keep: 20
  governance_keep: 20
  protect_window_days: 1
  recovery_memory_ttl_days: 30

# Goal decomposition
decomposition:
  min_quality_score: 70
  max_refinement_rounds: 3

# Queue controller
controller:
  # queue_file: ".sce/auto/close-loop-controller-goals.lines"
  dequeue_limit: 1
  max_cycles: 10

# KPI trend
kpi:
  window_days: 56
  anomaly_drop_percent: 20
  trailing_periods: 3
"#;

/// What `init` created.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SetupReport {
    pub root: PathBuf,
    pub created_dirs: Vec<PathBuf>,
    pub config_file: PathBuf,
    pub config_written: bool,
}

/// Create the workspace layout under `workspace.root`.
///
/// Existing directories are left alone; the config file is only overwritten
/// with `force`.
pub fn init_workspace(workspace: &WorkspaceConfig, force: bool) -> Result<SetupReport> {
    let mut report = SetupReport {
        root: workspace.root.clone(),
        config_file: workspace.config_path(),
        ..SetupReport::default()
    };

    let dirs = SessionKind::ALL
        .into_iter()
        .map(|kind| workspace.archive_path(kind))
        .chain([workspace.specs_path()]);
    for dir in dirs {
        if dir.is_dir() {
            continue;
        }
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create directory {}", dir.display()))?;
        report.created_dirs.push(dir);
    }

    if force || !report.config_file.exists() {
        fs::write(&report.config_file, DEFAULT_CONFIG_TEMPLATE)
            .with_context(|| format!("Failed to write config file {}", report.config_file.display()))?;
        report.config_written = true;
    }

    Ok(report)
}

/// Whether `init` has run for this workspace.
pub fn is_initialized(workspace: &WorkspaceConfig) -> bool {
    workspace.config_path().exists() && workspace.auto_path().is_dir()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::Config;
    use crate::infrastructure::config::ConfigLoader;

    #[test]
    fn test_init_creates_layout() {
        let dir = tempfile::tempdir().expect("tempdir");
        let workspace = Config::for_workspace(dir.path().join(".sce")).workspace;
        assert!(!is_initialized(&workspace));

        let report = init_workspace(&workspace, false).expect("init");
        assert!(report.config_written);
        assert_eq!(report.created_dirs.len(), 5);
        assert!(workspace.archive_path(SessionKind::GovernanceSession).is_dir());
        assert!(workspace.specs_path().is_dir());
        assert!(is_initialized(&workspace));
    }

    #[test]
    fn test_config_not_overwritten_without_force() {
        let dir = tempfile::tempdir().expect("tempdir");
        let workspace = Config::for_workspace(dir.path()).workspace;
        init_workspace(&workspace, false).expect("init");
        fs::write(workspace.config_path(), "governance:\n  max_rounds: 9\n").expect("write");

        let again = init_workspace(&workspace, false).expect("init");
        assert!(!again.config_written);
        assert!(again.created_dirs.is_empty());

        let forced = init_workspace(&workspace, true).expect("init");
        assert!(forced.config_written);
    }

    #[test]
    fn test_template_is_valid_config() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("closeloop.yaml");
        fs::write(&path, DEFAULT_CONFIG_TEMPLATE).expect("write");
        let config = ConfigLoader::load_from_file(&path).expect("template loads");
        assert_eq!(config, Config::default());
    }
}
