//! Implementation of the `sce-closeloop init` command.

use anyhow::Result;
use clap::Args;
use serde::Serialize;

use crate::cli::display::{output, CommandOutput};
use crate::domain::models::Config;
use crate::infrastructure::setup::{init_workspace, is_initialized, SetupReport};

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Overwrite an existing configuration file
    #[arg(long, short)]
    pub force: bool,
}

#[derive(Debug, Serialize)]
pub struct InitOutput {
    pub success: bool,
    pub message: String,
    pub already_initialized: bool,
    #[serde(flatten)]
    pub report: SetupReport,
}

impl CommandOutput for InitOutput {
    fn to_human(&self) -> String {
        let mut lines = vec![self.message.clone()];
        if !self.report.created_dirs.is_empty() {
            lines.push("\nCreated directories:".to_string());
            for dir in &self.report.created_dirs {
                lines.push(format!("  - {}", dir.display()));
            }
        }
        if self.report.config_written {
            lines.push(format!("\nWrote {}", self.report.config_file.display()));
        }
        lines.join("\n")
    }
}

pub fn execute(args: InitArgs, config: &Config, json_mode: bool) -> Result<()> {
    let workspace = &config.workspace;
    let already_initialized = is_initialized(workspace);
    let report = init_workspace(workspace, args.force)?;

    let message = if already_initialized && !report.config_written {
        "Workspace already initialized. Use --force to rewrite the configuration.".to_string()
    } else {
        format!("Initialized workspace at {}", workspace.root.display())
    };

    output(
        &InitOutput {
            success: true,
            message,
            already_initialized,
            report,
        },
        json_mode,
    );
    Ok(())
}
