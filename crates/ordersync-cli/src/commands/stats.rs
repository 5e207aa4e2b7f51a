use std::path::Path;

use chrono::{DateTime, Utc};
use ordersync_core::db::OrderGateway;

use crate::commands::common::{format_stats_lines, open_gateway, stats_window};
use crate::error::CliError;

pub async fn run_stats(
    business: &str,
    since: Option<DateTime<Utc>>,
    until: Option<DateTime<Utc>>,
    as_json: bool,
    db_path: &Path,
) -> Result<(), CliError> {
    let window = stats_window(since, until)?;
    let gateway = open_gateway(db_path).await?;
    let stats = gateway.resolution_stats(business, window).await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        for line in format_stats_lines(&stats) {
            println!("{line}");
        }
    }
    Ok(())
}
