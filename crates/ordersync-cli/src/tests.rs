use std::path::PathBuf;

use clap::{CommandFactory, Parser};
use ordersync_core::sync::SyncScope;
use ordersync_core::ResolutionAction;
use serde_json::{json, Value};

use crate::cli::{Cli, Commands, CompletionShell};
use crate::commands::common::{
    find_order, format_report_lines, open_gateway, parse_batch, resolve_db_path, stats_window,
};
use crate::commands::completions::{render_completions, run_completions};
use crate::commands::resolutions::list_order_resolutions;
use crate::commands::sync::{run_sync, sync_with, SyncArgs};
use crate::error::CliError;

fn order(client_id: &str, total: f64, last_modified_at: &str) -> Value {
    json!({
        "client_generated_id": client_id,
        "client_name": "Ana Souza",
        "total": total,
        "delivery_date": "2024-06-03",
        "delivery_time": "14:30",
        "status": "pending",
        "last_modified_at": last_modified_at,
        "items": [{ "product_name": "Chocolate cake", "quantity": 1, "unit_price": total }]
    })
}

fn scope() -> SyncScope {
    SyncScope::new("bakery-1", "ordersync-cli").unwrap()
}

#[test]
fn cli_definition_is_consistent() {
    Cli::command().debug_assert();
}

#[test]
fn sync_command_defaults_actor() {
    let cli = Cli::try_parse_from([
        "ordersync",
        "sync",
        "--file",
        "batch.json",
        "--business",
        "bakery-1",
    ])
    .unwrap();
    match cli.command {
        Commands::Sync {
            actor, dry_run, ..
        } => {
            assert_eq!(actor, "ordersync-cli");
            assert!(!dry_run);
        }
        _ => panic!("expected sync command"),
    }
}

#[test]
fn resolve_db_path_prefers_flag() {
    let path = resolve_db_path(Some(PathBuf::from("/tmp/explicit.db")));
    assert_eq!(path, PathBuf::from("/tmp/explicit.db"));
}

#[test]
fn parse_batch_accepts_object_or_array() {
    let wrapped = json!({ "orders": [order("abc", 10.0, "2024-06-01T12:00:00Z")] }).to_string();
    assert_eq!(parse_batch(&wrapped).unwrap().into_items().unwrap().len(), 1);

    let bare = json!([order("a", 1.0, "2024-06-01T12:00:00Z"), order("b", 2.0, "2024-06-01T12:00:00Z")])
        .to_string();
    assert_eq!(parse_batch(&bare).unwrap().into_items().unwrap().len(), 2);

    assert!(matches!(parse_batch("42"), Err(CliError::InvalidBatchFile(_))));
    assert!(matches!(parse_batch("{"), Err(CliError::Serialization(_))));
}

#[test]
fn stats_window_defaults_to_trailing_day() {
    let window = stats_window(None, None).unwrap();
    assert_eq!((window.until - window.since).num_hours(), 24);
    assert!(stats_window(Some(window.until), Some(window.since)).is_err());
}

#[tokio::test(flavor = "current_thread")]
async fn sync_replay_records_resolutions_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("orders.db");

    let first = parse_batch(&json!([order("abc", 120.0, "2024-06-01T12:00:05Z")]).to_string())
        .unwrap();
    let report = sync_with(open_gateway(&db_path).await.unwrap(), &scope(), first)
        .await
        .unwrap();
    assert_eq!(report.synced.len(), 1);

    let second = parse_batch(&json!([order("abc", 150.0, "2024-06-01T12:00:10Z")]).to_string())
        .unwrap();
    let report = sync_with(open_gateway(&db_path).await.unwrap(), &scope(), second)
        .await
        .unwrap();
    let lines = format_report_lines(&report);
    assert_eq!(lines[0], "1 orders synced, 0 errors, 1 conflicts resolved");
    assert!(lines[1].starts_with("conflict  abc  local_wins  fields=total"));

    let gateway = open_gateway(&db_path).await.unwrap();
    let stored = find_order(&gateway, "bakery-1", "abc").await.unwrap();
    assert!((stored.version.total - 150.0).abs() < f64::EPSILON);

    let resolutions = list_order_resolutions(&gateway, "bakery-1", "abc", 10)
        .await
        .unwrap();
    assert_eq!(resolutions.len(), 1);
    assert_eq!(resolutions[0].entry.resolution_action, ResolutionAction::LocalWins);
}

#[tokio::test(flavor = "current_thread")]
async fn resolutions_reject_unknown_order_and_zero_limit() {
    let dir = tempfile::tempdir().unwrap();
    let gateway = open_gateway(&dir.path().join("orders.db")).await.unwrap();

    assert!(matches!(
        list_order_resolutions(&gateway, "bakery-1", "missing", 10).await,
        Err(CliError::OrderNotFound(_))
    ));
    assert!(matches!(
        list_order_resolutions(&gateway, "bakery-1", "missing", 0).await,
        Err(CliError::InvalidLimit)
    ));
}

#[tokio::test(flavor = "current_thread")]
async fn dry_run_leaves_database_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let batch_path = dir.path().join("batch.json");
    let db_path = dir.path().join("orders.db");
    std::fs::write(
        &batch_path,
        json!({ "orders": [order("abc", 120.0, "2024-06-01T12:00:05Z")] }).to_string(),
    )
    .unwrap();

    let args = SyncArgs {
        file: &batch_path,
        business: "bakery-1",
        actor: "ordersync-cli",
        dry_run: true,
        json: true,
    };
    run_sync(&args, &db_path).await.unwrap();
    assert!(!db_path.exists());
}

#[test]
fn completions_render_for_every_shell() {
    for shell in [CompletionShell::Bash, CompletionShell::Zsh, CompletionShell::Fish] {
        let script = String::from_utf8(render_completions(shell)).unwrap();
        assert!(script.contains("ordersync"));
    }

    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("ordersync.bash");
    run_completions(CompletionShell::Bash, Some(&output)).unwrap();
    assert!(std::fs::read_to_string(output).unwrap().contains("resolutions"));
}
