use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] ordersync_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Order not found for client id: {0}")]
    OrderNotFound(String),
    #[error("Invalid batch file: {0}")]
    InvalidBatchFile(String),
    #[error("Limit must be greater than zero")]
    InvalidLimit,
}
