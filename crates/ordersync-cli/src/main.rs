//! ordersync CLI - operator tooling for the order sync engine
//!
//! Replays captured client batches and inspects the conflict-resolution audit
//! trail of a local order store.

mod cli;
mod commands;
mod error;

#[cfg(test)]
mod tests;

use clap::Parser;

use crate::cli::{Cli, Commands};
use crate::commands::common::resolve_db_path;
use crate::commands::completions::run_completions;
use crate::commands::resolutions::run_resolutions;
use crate::commands::show::run_show;
use crate::commands::stats::run_stats;
use crate::commands::sync::{run_sync, SyncArgs};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    let mut filter = tracing_subscriber::EnvFilter::from_default_env();
    if let Ok(directive) = "ordersync_core=warn".parse() {
        filter = filter.add_directive(directive);
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let db_path = resolve_db_path(cli.db_path);

    match cli.command {
        Commands::Sync {
            file,
            business,
            actor,
            dry_run,
            json,
        } => {
            let args = SyncArgs {
                file: &file,
                business: &business,
                actor: &actor,
                dry_run,
                json,
            };
            run_sync(&args, &db_path).await?;
        }
        Commands::Show {
            client_id,
            business,
            json,
        } => run_show(&client_id, &business, json, &db_path).await?,
        Commands::Resolutions {
            client_id,
            business,
            limit,
            json,
        } => run_resolutions(&client_id, &business, limit, json, &db_path).await?,
        Commands::Stats {
            business,
            since,
            until,
            json,
        } => run_stats(&business, since, until, json, &db_path).await?,
        Commands::Completions { shell, output } => {
            run_completions(shell, output.as_deref())?;
        }
    }

    Ok(())
}
