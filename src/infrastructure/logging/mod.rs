//! Structured logging: console output on stderr plus optional rolling JSON
//! files through a non-blocking writer.
pub mod config;
pub mod logger;

pub use config::{parse_log_level, LogConfig, LogFormat};
pub use logger::LoggerImpl;
