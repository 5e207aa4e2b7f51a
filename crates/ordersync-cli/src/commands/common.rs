use std::collections::BTreeSet;
use std::env;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use ordersync_core::db::{LibSqlOrderGateway, OrderGateway};
use ordersync_core::models::{ConflictField, ResolutionStats, SyncRequest, TimeWindow};
use ordersync_core::sync::SyncReport;
use ordersync_core::{ConflictResolution, Order};
use serde_json::Value;

use crate::error::CliError;

pub const DB_PATH_ENV: &str = "ORDERSYNC_DB_PATH";

pub fn resolve_db_path(cli_db_path: Option<PathBuf>) -> PathBuf {
    cli_db_path
        .or_else(|| env::var_os(DB_PATH_ENV).map(PathBuf::from))
        .unwrap_or_else(default_db_path)
}

pub fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ordersync")
        .join("orders.db")
}

pub async fn open_gateway(path: &Path) -> Result<LibSqlOrderGateway, CliError> {
    Ok(LibSqlOrderGateway::open(path).await?)
}

pub async fn find_order(
    gateway: &impl OrderGateway,
    business_id: &str,
    client_id: &str,
) -> Result<Order, CliError> {
    gateway
        .find_by_client_generated_id(business_id, client_id)
        .await?
        .ok_or_else(|| CliError::OrderNotFound(client_id.to_string()))
}

/// Parse a captured batch: either a sync request object or a bare array
pub fn parse_batch(text: &str) -> Result<SyncRequest, CliError> {
    let value: Value = serde_json::from_str(text)?;
    match value {
        Value::Array(orders) => Ok(SyncRequest::new(orders)),
        Value::Object(_) => Ok(serde_json::from_value(value)?),
        _ => Err(CliError::InvalidBatchFile(
            "expected an object with `orders` or an array of orders".to_string(),
        )),
    }
}

pub fn read_batch_file(path: &Path) -> Result<SyncRequest, CliError> {
    let text = std::fs::read_to_string(path)?;
    parse_batch(&text)
}

pub fn stats_window(
    since: Option<DateTime<Utc>>,
    until: Option<DateTime<Utc>>,
) -> Result<TimeWindow, CliError> {
    if since.is_none() && until.is_none() {
        return Ok(TimeWindow::trailing(Duration::hours(24)));
    }
    let until = until.unwrap_or_else(Utc::now);
    let since = since.unwrap_or(until - Duration::hours(24));
    Ok(TimeWindow::new(since, until)?)
}

pub fn format_timestamp(instant: DateTime<Utc>) -> String {
    instant.format("%Y-%m-%d %H:%M:%S%.3f UTC").to_string()
}

pub fn format_fields(fields: &BTreeSet<ConflictField>) -> String {
    if fields.is_empty() {
        return "-".to_string();
    }
    fields
        .iter()
        .map(|field| field.as_str())
        .collect::<Vec<_>>()
        .join(",")
}

pub fn format_order_lines(order: &Order) -> Vec<String> {
    let version = &order.version;
    let mut lines = vec![
        format!("{}  ({})", order.client_generated_id, order.id),
        format!("  client    {}", version.client_name),
        format!("  status    {}", version.status.as_str()),
        format!("  total     {:.2}", version.total),
        format!(
            "  delivery  {} {}",
            version.delivery_date,
            version.delivery_time.as_deref().unwrap_or("")
        ),
        format!("  modified  {}", format_timestamp(version.last_modified_at)),
    ];
    for item in &version.items {
        lines.push(format!(
            "  - {} x{} @ {:.2}",
            item.product_name, item.quantity, item.unit_price
        ));
    }
    lines
}

pub fn format_resolution_lines(resolutions: &[ConflictResolution]) -> Vec<String> {
    resolutions
        .iter()
        .map(|resolution| {
            let entry = &resolution.entry;
            format!(
                "{}  {:<11}  by={}  fields={}  {}",
                format_timestamp(entry.resolved_at),
                entry.resolution_action.as_str(),
                entry.resolved_by,
                format_fields(&entry.conflict_fields),
                entry.resolution_message
            )
        })
        .collect()
}

pub fn format_report_lines(report: &SyncReport) -> Vec<String> {
    let mut lines = vec![report.message.clone()];
    for conflict in &report.conflicts {
        let audit = conflict
            .audit_id
            .map_or_else(|| "unrecorded".to_string(), |id| format!("#{id}"));
        lines.push(format!(
            "conflict  {}  {}  fields={}  audit={audit}",
            conflict.client_generated_id,
            conflict.resolution.resolution_action.as_str(),
            format_fields(&conflict.resolution.conflict_fields)
        ));
    }
    for error in &report.errors {
        let client_id = error
            .item
            .get("client_generated_id")
            .and_then(Value::as_str)
            .unwrap_or("?");
        let retry = if error.retryable { "retryable" } else { "permanent" };
        lines.push(format!("error     {client_id}  {retry}  {}", error.error));
    }
    lines
}

pub fn format_stats_lines(stats: &ResolutionStats) -> Vec<String> {
    vec![
        format!(
            "{} .. {}",
            format_timestamp(stats.window.since),
            format_timestamp(stats.window.until)
        ),
        format!("local_wins       {}", stats.local_wins),
        format!("server_wins      {}", stats.server_wins),
        format!("merge_required   {}", stats.merge_required),
        format!("no field changes {}", stats.without_field_changes),
        format!("total            {}", stats.total()),
    ]
}
