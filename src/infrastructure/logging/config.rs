use anyhow::{bail, Result};
use std::path::PathBuf;
use tracing::Level;

use crate::domain::models::LoggingConfig;

/// Console rendering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    #[default]
    Pretty,
}

/// Resolved logger settings.
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: Level,
    pub format: LogFormat,
    /// Rolling JSON files are written here when set
    pub log_dir: Option<PathBuf>,
    pub enable_console: bool,
    /// Daily files kept on disk
    pub max_files: usize,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: LogFormat::default(),
            log_dir: None,
            enable_console: true,
            max_files: 30,
        }
    }
}

impl TryFrom<&LoggingConfig> for LogConfig {
    type Error = anyhow::Error;

    fn try_from(config: &LoggingConfig) -> Result<Self> {
        let format = match config.format.to_lowercase().as_str() {
            "json" => LogFormat::Json,
            "pretty" => LogFormat::Pretty,
            other => bail!("Invalid log format: {other}"),
        };
        Ok(Self {
            level: parse_log_level(&config.level)?,
            format,
            log_dir: config.log_dir.clone(),
            enable_console: true,
            max_files: usize::try_from(config.retention_days.max(1)).unwrap_or(usize::MAX),
        })
    }
}

/// Parse a level name, case-insensitively.
pub fn parse_log_level(level: &str) -> Result<Level> {
    match level.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        _ => bail!("Invalid log level: {level}"),
    }
}
