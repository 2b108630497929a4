//! CLI type definitions
//!
//! This module contains clap command structures that define the CLI interface.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use super::commands::{
    batch::BatchArgs, close_loop::CloseLoopArgs, controller::ControllerArgs,
    governance::GovernanceArgs, init::InitArgs, kpi::KpiArgs, maintain::MaintainArgs,
    program::ProgramArgs, sessions::SessionsArgs, specs::SpecsArgs,
};

#[derive(Parser, Debug)]
#[command(name = "sce-closeloop")]
#[command(about = "Close-loop orchestration and governance engine", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,

    /// Load configuration from this file instead of .sce/closeloop.yaml
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the workspace layout and default configuration
    Init(InitArgs),

    /// Plan one goal into a spec portfolio without side effects
    Plan(CloseLoopArgs),

    /// Plan and execute one goal
    Run(CloseLoopArgs),

    /// Run or resume a batch of goals
    Batch(BatchArgs),

    /// Run or resume a program: a batch evaluated against a gate
    Program(ProgramArgs),

    /// Drain the goal queue across bounded cycles
    Controller(ControllerArgs),

    /// Run or resume the governance stabilization loop
    Governance(GovernanceArgs),

    /// List, summarize or prune a session archive
    Sessions(SessionsArgs),

    /// List or prune spec directories
    Specs(SpecsArgs),

    /// KPI reports over the session archives
    Kpi(KpiArgs),

    /// Cross-archive governance statistics and health
    Stats,

    /// Prune every archive and decay stale recovery memory
    Maintain(MaintainArgs),
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_program_flags() {
        let cli = Cli::try_parse_from([
            "sce-closeloop",
            "--json",
            "program",
            "goal one",
            "goal two",
            "--batch-agent-budget",
            "4",
            "--program-max-agent-budget",
            "2",
            "--program-gate-fallback-chain",
            "staging,prod",
        ])
        .expect("parse");

        assert!(cli.json);
        let Commands::Program(args) = cli.command else {
            panic!("expected program command");
        };
        assert_eq!(args.source.goals.len(), 2);
        assert_eq!(args.batch.batch_agent_budget, Some(4));
        assert_eq!(args.gate.max_agent_budget, Some(2));
        assert_eq!(args.gate.fallback_chain, vec!["staging".to_string(), "prod".to_string()]);
    }

    #[test]
    fn test_parse_sessions_prune() {
        let cli = Cli::try_parse_from([
            "sce-closeloop",
            "sessions",
            "controller",
            "prune",
            "--keep",
            "3",
            "--dry-run",
        ])
        .expect("parse");
        assert!(matches!(cli.command, Commands::Sessions(_)));
    }

    #[test]
    fn test_goals_conflict_with_goals_file() {
        let parsed = Cli::try_parse_from([
            "sce-closeloop",
            "batch",
            "goal",
            "--goals-file",
            "goals.lines",
        ]);
        assert!(parsed.is_err());
    }
}
