//! sce-closeloop CLI entry point.

use anyhow::Context;
use clap::Parser;

use sce_closeloop::cli::commands;
use sce_closeloop::cli::{handle_error, AppContext, Cli, Commands};
use sce_closeloop::infrastructure::config::ConfigLoader;
use sce_closeloop::infrastructure::logging::{LogConfig, LoggerImpl};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let json = cli.json;
    if let Err(err) = run(cli).await {
        handle_error(err, json);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = match &cli.config {
        Some(path) => ConfigLoader::load_from_file(path)?,
        None => ConfigLoader::load()?,
    };
    let _logger = LoggerImpl::init(&LogConfig::try_from(&config.logging)?)
        .context("Failed to initialize logging")?;

    let ctx = AppContext::new(config);
    match cli.command {
        Commands::Init(args) => commands::init::execute(args, &ctx.config, cli.json),
        Commands::Plan(args) => commands::close_loop::execute(args, true, &ctx, cli.json).await,
        Commands::Run(args) => commands::close_loop::execute(args, false, &ctx, cli.json).await,
        Commands::Batch(args) => commands::batch::execute(args, &ctx, cli.json).await,
        Commands::Program(args) => commands::program::execute(args, &ctx, cli.json).await,
        Commands::Controller(args) => commands::controller::execute(args, &ctx, cli.json).await,
        Commands::Governance(args) => commands::governance::execute(args, &ctx, cli.json).await,
        Commands::Sessions(args) => commands::sessions::execute(args, &ctx, cli.json).await,
        Commands::Specs(args) => commands::specs::execute(args, &ctx, cli.json).await,
        Commands::Kpi(args) => commands::kpi::execute(args, &ctx, cli.json).await,
        Commands::Stats => commands::stats::execute(&ctx, cli.json).await,
        Commands::Maintain(args) => commands::maintain::execute(args, &ctx, cli.json).await,
    }
}
