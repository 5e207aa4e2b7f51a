use std::path::Path;
use std::sync::Arc;

use ordersync_core::db::{InMemoryOrderGateway, OrderGateway};
use ordersync_core::models::SyncRequest;
use ordersync_core::sync::{SyncConfig, SyncCoordinator, SyncReport, SyncScope};

use crate::commands::common::{format_report_lines, open_gateway, read_batch_file};
use crate::error::CliError;

pub struct SyncArgs<'a> {
    pub file: &'a Path,
    pub business: &'a str,
    pub actor: &'a str,
    pub dry_run: bool,
    pub json: bool,
}

pub async fn run_sync(args: &SyncArgs<'_>, db_path: &Path) -> Result<(), CliError> {
    let request = read_batch_file(args.file)?;
    let scope = SyncScope::new(args.business, args.actor)?;

    let report = if args.dry_run {
        tracing::info!("Dry run: reconciling against an empty in-memory store");
        sync_with(InMemoryOrderGateway::new(), &scope, request).await?
    } else {
        sync_with(open_gateway(db_path).await?, &scope, request).await?
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for line in format_report_lines(&report) {
            println!("{line}");
        }
    }
    Ok(())
}

pub async fn sync_with<G: OrderGateway + 'static>(
    gateway: G,
    scope: &SyncScope,
    request: SyncRequest,
) -> Result<SyncReport, CliError> {
    let coordinator = SyncCoordinator::new(Arc::new(gateway), SyncConfig::default());
    Ok(coordinator.sync_batch(scope, request).await?)
}
