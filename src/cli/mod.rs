//! Command-line front-end: argument parsing and output only.

pub mod commands;
pub mod context;
pub mod display;
pub mod output;
pub mod types;

pub use context::AppContext;
pub use types::{Cli, Commands};

use thiserror::Error;

/// A command ran to completion but its outcome must fail the invocation.
///
/// The result has already been printed and persisted when this is returned.
#[derive(Debug, Error)]
pub enum CommandFailure {
    #[error("effective gate failed: {0}")]
    GateFailed(String),

    #[error("delete failures exceeded the hard-fail threshold: {0}")]
    ThresholdExceeded(String),
}

impl CommandFailure {
    pub const fn exit_code(&self) -> i32 {
        2
    }
}

/// Report `err` and exit: 2 for failed gates and thresholds, 1 otherwise.
pub fn handle_error(err: anyhow::Error, json_mode: bool) -> ! {
    if let Some(failure) = err.downcast_ref::<CommandFailure>() {
        eprintln!("{failure}");
        std::process::exit(failure.exit_code());
    }

    if json_mode {
        let payload = serde_json::json!({ "success": false, "error": format!("{err:#}") });
        println!("{}", serde_json::to_string_pretty(&payload).unwrap_or_default());
    } else {
        eprintln!("Error: {err:#}");
    }
    std::process::exit(1)
}
