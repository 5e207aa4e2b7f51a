//! Persistence gateway contract used by the reconciliation pipeline

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::{
    ConflictResolution, NewConflictResolution, Order, OrderId, ResolutionStats, TimeWindow,
};

/// Read/write access to the order-of-record store and the resolution audit store
///
/// Implementations must enforce that `(business_id, client_generated_id)` is
/// unique and must never let an update lower an order's `last_modified_at`.
#[async_trait]
pub trait OrderGateway: Send + Sync {
    /// Find the order of record for a client-generated id within a business
    async fn find_by_client_generated_id(
        &self,
        business_id: &str,
        client_generated_id: &str,
    ) -> Result<Option<Order>>;

    /// Find an order by its server-assigned id
    async fn find_by_id(&self, id: &OrderId) -> Result<Option<Order>>;

    /// Insert a first-seen order
    ///
    /// Fails with [`crate::Error::DuplicateClientId`] when another order
    /// already holds the same client-generated id in the same business.
    async fn insert(&self, order: &Order) -> Result<Order>;

    /// Replace an existing order's version and items
    ///
    /// The write only happens while the stored `last_modified_at` still
    /// equals `expected_last_modified_at`; otherwise `Ok(None)` is returned
    /// and nothing changes.
    async fn upsert(
        &self,
        order: &Order,
        expected_last_modified_at: DateTime<Utc>,
    ) -> Result<Option<Order>>;

    /// Append one resolution record to the audit store
    async fn append_audit_entry(&self, entry: &NewConflictResolution)
        -> Result<ConflictResolution>;

    /// The `limit` most recent resolutions recorded for an order, newest first
    async fn list_resolutions(
        &self,
        order_id: &OrderId,
        limit: usize,
    ) -> Result<Vec<ConflictResolution>>;

    /// Resolution counts by action for a business within a time window
    async fn resolution_stats(
        &self,
        business_id: &str,
        window: TimeWindow,
    ) -> Result<ResolutionStats>;
}
