//! Common test utilities for integration tests
//!
//! Provides a throwaway workspace wired the same way the CLI wires one.

use std::sync::Arc;

use sce_closeloop::adapters::runners::ScriptedGoalRunner;
use sce_closeloop::cli::AppContext;
use sce_closeloop::domain::models::Config;
use tempfile::TempDir;

/// A workspace rooted in a temp directory.
///
/// The directory is removed when the fixture is dropped.
pub struct TestWorkspace {
    pub dir: TempDir,
    pub ctx: AppContext,
}

impl TestWorkspace {
    /// Workspace running the simulated runner.
    pub fn simulated() -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let ctx = AppContext::new(config_for(&dir));
        Self { dir, ctx }
    }

    /// Workspace running a scripted runner the test can steer.
    #[allow(dead_code)]
    pub fn scripted(runner: Arc<ScriptedGoalRunner>) -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let ctx = AppContext::with_runner(config_for(&dir), runner);
        Self { dir, ctx }
    }
}

fn config_for(dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.workspace.root = dir.path().join(".sce");
    config.scheduler.retry_cooldown_ms = 0;
    config
}

/// Setup test logging
///
/// Initializes tracing subscriber for test output.
/// Call this at the beginning of tests that need logging.
#[allow(dead_code)]
pub fn setup_test_logging() {
    use tracing_subscriber::fmt;

    let _ = fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}
