use std::path::Path;

use ordersync_core::db::OrderGateway;
use ordersync_core::ConflictResolution;

use crate::commands::common::{find_order, format_resolution_lines, open_gateway};
use crate::error::CliError;

pub async fn list_order_resolutions(
    gateway: &impl OrderGateway,
    business: &str,
    client_id: &str,
    limit: usize,
) -> Result<Vec<ConflictResolution>, CliError> {
    if limit == 0 {
        return Err(CliError::InvalidLimit);
    }
    let order = find_order(gateway, business, client_id).await?;
    Ok(gateway.list_resolutions(&order.id, limit).await?)
}

pub async fn run_resolutions(
    client_id: &str,
    business: &str,
    limit: usize,
    as_json: bool,
    db_path: &Path,
) -> Result<(), CliError> {
    let gateway = open_gateway(db_path).await?;
    let resolutions = list_order_resolutions(&gateway, business, client_id, limit).await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&resolutions)?);
        return Ok(());
    }

    if resolutions.is_empty() {
        println!("No conflict resolutions recorded.");
        return Ok(());
    }

    for line in format_resolution_lines(&resolutions) {
        println!("{line}");
    }
    Ok(())
}
