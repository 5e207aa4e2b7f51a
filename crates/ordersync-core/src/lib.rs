//! ordersync-core - Core library for ordersync
//!
//! This crate contains the order models, the persistence gateway, and the
//! last-write-wins reconciliation pipeline used by the API server and the
//! operator CLI.

pub mod db;
pub mod error;
pub mod models;
pub mod sync;
pub mod util;

pub use error::{Error, Result};
pub use models::{ConflictResolution, Order, OrderId, ResolutionAction};
