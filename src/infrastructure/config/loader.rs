use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use std::path::Path;
use thiserror::Error;

use crate::domain::models::config::Config;
use crate::infrastructure::logging::{parse_log_level, LogConfig};

/// Default workspace directory holding the project config files.
const WORKSPACE_DIR: &str = ".sce";
const CONFIG_FILE: &str = "closeloop.yaml";
const LOCAL_CONFIG_FILE: &str = "closeloop.local.yaml";
const ENV_PREFIX: &str = "SCE_";

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Invalid parallelism: {0}. Must be at least 1")]
    InvalidParallel(usize),

    #[error("default_parallel ({0}) exceeds max_parallel ({1})")]
    ParallelAboveMax(usize, usize),

    #[error("Invalid aging_factor: {0}. Cannot be negative")]
    InvalidAgingFactor(f64),

    #[error("Invalid retry_max_rounds: 0. Must be at least 1")]
    InvalidRetryMaxRounds,

    #[error("Unknown default gate profile: {0}")]
    UnknownGateProfile(String),

    #[error("Invalid min_quality_score: {0}. Must be between 0 and 100")]
    InvalidQualityScore(f64),

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .sce/closeloop.yaml (project config, created by init)
    /// 3. .sce/closeloop.local.yaml (local overrides, optional)
    /// 4. Environment variables (SCE_* prefix, `__` separates sections)
    pub fn load() -> Result<Config> {
        Self::load_from_dir(WORKSPACE_DIR)
    }

    /// Same layering as [`ConfigLoader::load`] with the config files read from `dir`.
    pub fn load_from_dir(dir: impl AsRef<Path>) -> Result<Config> {
        let dir = dir.as_ref();
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(dir.join(CONFIG_FILE)))
            .merge(Yaml::file(dir.join(LOCAL_CONFIG_FILE)))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .extract()
            .context(format!(
                "Failed to load config from {}",
                path.as_ref().display()
            ))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        if parse_log_level(&config.logging.level).is_err() {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }
        if LogConfig::try_from(&config.logging).is_err() {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        let scheduler = &config.scheduler;
        if scheduler.default_parallel == 0 {
            return Err(ConfigError::InvalidParallel(scheduler.default_parallel));
        }
        if scheduler.per_goal_max_parallel == 0 {
            return Err(ConfigError::InvalidParallel(scheduler.per_goal_max_parallel));
        }
        if scheduler.default_parallel > scheduler.max_parallel {
            return Err(ConfigError::ParallelAboveMax(
                scheduler.default_parallel,
                scheduler.max_parallel,
            ));
        }
        if scheduler.aging_factor < 0.0 {
            return Err(ConfigError::InvalidAgingFactor(scheduler.aging_factor));
        }
        if scheduler.retry_max_rounds == 0 {
            return Err(ConfigError::InvalidRetryMaxRounds);
        }

        if config.gate.policy(&config.gate.default_profile).is_none() {
            return Err(ConfigError::UnknownGateProfile(
                config.gate.default_profile.clone(),
            ));
        }

        if config.governance.max_rounds == 0 {
            return Err(ConfigError::ValidationFailed(
                "governance.max_rounds must be at least 1".to_string(),
            ));
        }

        let quality = config.decomposition.min_quality_score;
        if !(0.0..=100.0).contains(&quality) {
            return Err(ConfigError::InvalidQualityScore(quality));
        }

        if config.controller.dequeue_limit == 0 || config.controller.max_cycles == 0 {
            return Err(ConfigError::ValidationFailed(
                "controller.dequeue_limit and controller.max_cycles must be at least 1".to_string(),
            ));
        }

        if config.kpi.window_days == 0 {
            return Err(ConfigError::ValidationFailed(
                "kpi.window_days must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::RiskLevel;
    use std::io::Write;
    use std::path::PathBuf;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.workspace.root, PathBuf::from(".sce"));
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.scheduler.retry_max_rounds, 10);
        assert_eq!(config.governance.max_rounds, 3);
        assert_eq!(config.kpi.window_days, 56);
        ConfigLoader::validate(&config).expect("Default config should be valid");
    }

    #[test]
    fn test_yaml_parsing() {
        let yaml = r"
logging:
  level: debug
  format: json
scheduler:
  default_parallel: 4
  scheduling_strategy: complex-first
gate:
  default_profile: staging
governance:
  target_risk: medium
retention:
  batch_keep: 5
";

        let config: Config = serde_yaml::from_str(yaml).expect("YAML should parse");

        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.scheduler.default_parallel, 4);
        assert_eq!(config.scheduler.max_parallel, 20);
        assert_eq!(config.gate.default_profile, "staging");
        assert_eq!(config.gate.profiles.len(), 3);
        assert_eq!(config.governance.target_risk, RiskLevel::Medium);
        assert_eq!(config.retention.batch_keep, 5);
        assert_eq!(config.retention.session_keep, 50);

        ConfigLoader::validate(&config).expect("Parsed config should be valid");
    }

    #[test]
    fn test_validate_invalid_log_level() {
        let mut config = Config::default();
        config.logging.level = "invalid".to_string();

        match ConfigLoader::validate(&config) {
            Err(ConfigError::InvalidLogLevel(level)) => assert_eq!(level, "invalid"),
            other => panic!("Expected InvalidLogLevel error, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_invalid_log_format() {
        let mut config = Config::default();
        config.logging.format = "xml".to_string();

        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidLogFormat(_))
        ));
    }

    #[test]
    fn test_validate_parallelism() {
        let mut config = Config::default();
        config.scheduler.default_parallel = 0;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidParallel(0))
        ));

        let mut config = Config::default();
        config.scheduler.default_parallel = 30;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::ParallelAboveMax(30, 20))
        ));
    }

    #[test]
    fn test_validate_negative_aging_factor() {
        let mut config = Config::default();
        config.scheduler.aging_factor = -0.5;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidAgingFactor(_))
        ));
    }

    #[test]
    fn test_validate_unknown_gate_profile() {
        let mut config = Config::default();
        config.gate.default_profile = "nightly".to_string();
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::UnknownGateProfile(name)) if name == "nightly"
        ));
    }

    #[test]
    fn test_validate_quality_and_controller() {
        let mut config = Config::default();
        config.decomposition.min_quality_score = 120.0;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidQualityScore(_))
        ));

        let mut config = Config::default();
        config.controller.dequeue_limit = 0;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::ValidationFailed(_))
        ));

        let mut config = Config::default();
        config.kpi.window_days = 0;
        assert!(ConfigLoader::validate(&config).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "governance:\n  max_rounds: 7").expect("write");
        file.flush().expect("flush");

        let config = ConfigLoader::load_from_file(file.path()).expect("load");
        assert_eq!(config.governance.max_rounds, 7);
        assert!(config.governance.use_recovery_memory);
    }

    #[test]
    fn test_local_file_overrides_project_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            "logging:\n  level: info\n  format: json\nretention:\n  batch_keep: 9\n",
        )
        .expect("write");
        std::fs::write(dir.path().join(LOCAL_CONFIG_FILE), "logging:\n  level: debug\n").expect("write");

        let config = ConfigLoader::load_from_dir(dir.path()).expect("load");
        assert_eq!(config.logging.level, "debug", "Override should win");
        assert_eq!(config.logging.format, "json", "Base value should persist");
        assert_eq!(config.retention.batch_keep, 9);
    }

    #[test]
    fn test_env_override() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join(CONFIG_FILE), "scheduler:\n  default_parallel: 2\n").expect("write");

        temp_env::with_vars(
            [
                ("SCE_SCHEDULER__DEFAULT_PARALLEL", Some("6")),
                ("SCE_LOGGING__LEVEL", Some("warn")),
            ],
            || {
                let config = ConfigLoader::load_from_dir(dir.path()).expect("load");
                assert_eq!(config.scheduler.default_parallel, 6);
                assert_eq!(config.logging.level, "warn");
            },
        );
    }

    #[test]
    fn test_invalid_env_value_fails_validation() {
        let dir = tempfile::tempdir().expect("tempdir");
        temp_env::with_var("SCE_GOVERNANCE__MAX_ROUNDS", Some("0"), || {
            assert!(ConfigLoader::load_from_dir(dir.path()).is_err());
        });
    }
}
