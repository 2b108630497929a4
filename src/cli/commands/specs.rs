//! `specs list|prune`: the spec-directory archive.

use anyhow::Result;
use clap::{Args, Subcommand};
use serde::Serialize;

use super::common::PruneFlags;
use super::sessions::finish_prune;
use crate::cli::context::AppContext;
use crate::cli::display::{list_table, output, render_list, timestamp, CommandOutput};
use crate::domain::models::SpecListing;

#[derive(Args, Debug)]
pub struct SpecsArgs {
    #[command(subcommand)]
    pub command: SpecsCommands,
}

#[derive(Subcommand, Debug)]
pub enum SpecsCommands {
    /// List spec directories, newest first
    List {
        /// Maximum number of specs to display
        #[arg(short, long, default_value = "50")]
        limit: usize,
    },
    /// Delete old spec directories that nothing protects
    Prune(PruneFlags),
}

#[derive(Debug, Serialize)]
pub struct SpecListOutput {
    #[serde(flatten)]
    pub listing: SpecListing,
}

impl CommandOutput for SpecListOutput {
    fn to_human(&self) -> String {
        let mut table = list_table(&["id", "modified", "path"]);
        for spec in &self.listing.specs {
            table.add_row(vec![
                spec.id.clone(),
                timestamp(&spec.modified_at),
                spec.path.display().to_string(),
            ]);
        }
        render_list("spec", &table, self.listing.total)
    }
}

pub async fn execute(args: SpecsArgs, ctx: &AppContext, json_mode: bool) -> Result<()> {
    match args.command {
        SpecsCommands::List { limit } => {
            let mut listing = ctx.retention.list_specs().await?;
            listing.specs.truncate(limit);
            output(&SpecListOutput { listing }, json_mode);
        }
        SpecsCommands::Prune(flags) => {
            let policy = flags.policy(ctx, None);
            let report = ctx.retention.prune_specs(&policy).await?;
            finish_prune(report, json_mode)?;
        }
    }
    Ok(())
}
