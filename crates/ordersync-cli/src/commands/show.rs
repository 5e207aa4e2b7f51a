use std::path::Path;

use crate::commands::common::{find_order, format_order_lines, open_gateway};
use crate::error::CliError;

pub async fn run_show(
    client_id: &str,
    business: &str,
    as_json: bool,
    db_path: &Path,
) -> Result<(), CliError> {
    let gateway = open_gateway(db_path).await?;
    let order = find_order(&gateway, business, client_id).await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&order)?);
    } else {
        for line in format_order_lines(&order) {
            println!("{line}");
        }
    }
    Ok(())
}
