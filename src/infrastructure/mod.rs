//! Infrastructure layer module
//!
//! - Configuration management (figment)
//! - Logging infrastructure (tracing)
//! - Workspace setup

pub mod config;
pub mod logging;
pub mod setup;
