//! libSQL implementation of the persistence gateway

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use libsql::params::IntoParams;
use libsql::{Connection, Row};
use tokio::sync::Mutex;

use super::{Database, OrderGateway};
use crate::error::{Error, Result};
use crate::models::{
    ConflictField, ConflictResolution, LineItem, NewConflictResolution, Order, OrderId,
    OrderVersion, ResolutionAction, ResolutionStats, TimeWindow,
};
use crate::util::{from_micros, to_micros};

const ORDER_COLUMNS: &str = "id, business_id, client_generated_id, client_name, client_phone,
    total, delivery_date, delivery_time, status, notes, last_modified_at, sync_status,
    created_at, updated_at";

const RESOLUTION_COLUMNS: &str = "id, order_id, business_id, client_generated_id,
    resolution_action, resolution_message, resolved_by, resolved_at, local_timestamp,
    server_timestamp, conflict_fields";

/// Gateway over a single libSQL connection shared behind an async mutex
#[derive(Clone)]
pub struct LibSqlOrderGateway {
    db: Arc<Mutex<Database>>,
}

impl LibSqlOrderGateway {
    pub fn new(db: Database) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
        }
    }

    /// Open (and migrate) a local database file
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(Database::open(path).await?))
    }

    /// Open an in-memory database (primarily for tests).
    pub async fn open_in_memory() -> Result<Self> {
        Ok(Self::new(Database::open_in_memory().await?))
    }

    async fn query_order(
        conn: &Connection,
        sql: &str,
        params: impl IntoParams,
    ) -> Result<Option<Order>> {
        let mut rows = conn.query(sql, params).await?;
        let Some(row) = rows.next().await? else {
            return Ok(None);
        };
        let mut order = Self::parse_order(&row)?;
        drop(rows);

        order.version.items = Self::load_items(conn, &order.id).await?;
        Ok(Some(order))
    }

    async fn load_items(conn: &Connection, order_id: &OrderId) -> Result<Vec<LineItem>> {
        let mut rows = conn
            .query(
                "SELECT product_name, quantity, unit_price, notes
                 FROM order_items
                 WHERE order_id = ?
                 ORDER BY position ASC",
                libsql::params![order_id.as_str()],
            )
            .await?;

        let mut items = Vec::new();
        while let Some(row) = rows.next().await? {
            let quantity: i64 = row.get(1)?;
            items.push(LineItem {
                product_name: row.get(0)?,
                quantity: u32::try_from(quantity)
                    .map_err(|_| Error::Database(format!("invalid item quantity: {quantity}")))?,
                unit_price: row.get(2)?,
                notes: row.get(3)?,
            });
        }
        Ok(items)
    }

    async fn write_items(conn: &Connection, order: &Order) -> Result<()> {
        conn.execute(
            "DELETE FROM order_items WHERE order_id = ?",
            libsql::params![order.id.as_str()],
        )
        .await?;

        for (position, item) in order.version.items.iter().enumerate() {
            let position = i64::try_from(position)
                .map_err(|_| Error::InvalidInput("too many order items".to_string()))?;
            conn.execute(
                "INSERT INTO order_items (order_id, position, product_name, quantity, unit_price, notes)
                 VALUES (?, ?, ?, ?, ?, ?)",
                libsql::params![
                    order.id.as_str(),
                    position,
                    item.product_name.as_str(),
                    i64::from(item.quantity),
                    item.unit_price,
                    item.notes.clone()
                ],
            )
            .await?;
        }
        Ok(())
    }

    async fn write_new_order(conn: &Connection, order: &Order) -> Result<()> {
        let version = &order.version;
        conn.execute(
            "INSERT INTO orders (id, business_id, client_generated_id, client_name, client_phone,
                total, delivery_date, delivery_time, status, notes, last_modified_at, sync_status,
                created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            libsql::params![
                order.id.as_str(),
                order.business_id.as_str(),
                order.client_generated_id.as_str(),
                version.client_name.as_str(),
                version.client_phone.clone(),
                version.total,
                version.delivery_date.format("%Y-%m-%d").to_string(),
                version.delivery_time.clone(),
                version.status.as_str(),
                version.notes.clone(),
                to_micros(version.last_modified_at),
                order.sync_status.as_str(),
                to_micros(order.created_at),
                to_micros(order.updated_at)
            ],
        )
        .await
        .map_err(|error| {
            let error = Error::from(error);
            if error.is_unique_violation() {
                Error::DuplicateClientId(order.client_generated_id.clone())
            } else {
                error
            }
        })?;

        Self::write_items(conn, order).await
    }

    /// Returns `false` when the compare-and-swap on `last_modified_at` missed
    async fn write_replacement(
        conn: &Connection,
        order: &Order,
        expected_last_modified_at: DateTime<Utc>,
    ) -> Result<bool> {
        let version = &order.version;
        let changed = conn
            .execute(
                "UPDATE orders SET client_name = ?, client_phone = ?, total = ?, delivery_date = ?,
                    delivery_time = ?, status = ?, notes = ?, last_modified_at = ?,
                    sync_status = ?, updated_at = ?
                 WHERE id = ? AND last_modified_at = ?",
                libsql::params![
                    version.client_name.as_str(),
                    version.client_phone.clone(),
                    version.total,
                    version.delivery_date.format("%Y-%m-%d").to_string(),
                    version.delivery_time.clone(),
                    version.status.as_str(),
                    version.notes.clone(),
                    to_micros(version.last_modified_at),
                    order.sync_status.as_str(),
                    to_micros(order.updated_at),
                    order.id.as_str(),
                    to_micros(expected_last_modified_at)
                ],
            )
            .await?;

        if changed == 0 {
            return Ok(false);
        }

        Self::write_items(conn, order).await?;
        Ok(true)
    }

    /// Commit on success, roll back on failure
    async fn finish<T>(conn: &Connection, result: Result<T>) -> Result<T> {
        match result {
            Ok(value) => {
                if let Err(error) = conn.execute("COMMIT", ()).await {
                    conn.execute("ROLLBACK", ()).await.ok();
                    return Err(error.into());
                }
                Ok(value)
            }
            Err(error) => {
                conn.execute("ROLLBACK", ()).await.ok();
                Err(error)
            }
        }
    }

    /// Parse an order (without items) from a database row
    fn parse_order(row: &Row) -> Result<Order> {
        let id: String = row.get(0)?;
        let delivery_date: String = row.get(6)?;
        let status: String = row.get(8)?;
        let sync_status: String = row.get(11)?;

        Ok(Order {
            id: id
                .parse()
                .map_err(|_| Error::Database(format!("invalid order id: {id}")))?,
            business_id: row.get(1)?,
            client_generated_id: row.get(2)?,
            version: OrderVersion {
                client_name: row.get(3)?,
                client_phone: row.get(4)?,
                total: row.get(5)?,
                delivery_date: NaiveDate::parse_from_str(&delivery_date, "%Y-%m-%d").map_err(
                    |_| Error::Database(format!("invalid delivery date: {delivery_date}")),
                )?,
                delivery_time: row.get(7)?,
                status: status.parse()?,
                notes: row.get(9)?,
                items: Vec::new(),
                last_modified_at: from_micros(row.get(10)?)?,
            },
            sync_status: sync_status.parse()?,
            created_at: from_micros(row.get(12)?)?,
            updated_at: from_micros(row.get(13)?)?,
        })
    }

    fn parse_resolution(row: &Row) -> Result<ConflictResolution> {
        let order_id: String = row.get(1)?;
        let action: String = row.get(4)?;
        let conflict_fields: String = row.get(10)?;

        Ok(ConflictResolution::new(
            row.get(0)?,
            NewConflictResolution {
                order_id: order_id
                    .parse()
                    .map_err(|_| Error::Database(format!("invalid order id: {order_id}")))?,
                business_id: row.get(2)?,
                client_generated_id: row.get(3)?,
                resolution_action: action.parse()?,
                resolution_message: row.get(5)?,
                resolved_by: row.get(6)?,
                resolved_at: from_micros(row.get(7)?)?,
                local_timestamp: from_micros(row.get(8)?)?,
                server_timestamp: from_micros(row.get(9)?)?,
                conflict_fields: serde_json::from_str::<BTreeSet<ConflictField>>(
                    &conflict_fields,
                )?,
            },
        ))
    }
}

#[async_trait]
impl OrderGateway for LibSqlOrderGateway {
    async fn find_by_client_generated_id(
        &self,
        business_id: &str,
        client_generated_id: &str,
    ) -> Result<Option<Order>> {
        let db = self.db.lock().await;
        Self::query_order(
            db.connection(),
            &format!(
                "SELECT {ORDER_COLUMNS} FROM orders WHERE business_id = ? AND client_generated_id = ?"
            ),
            libsql::params![business_id, client_generated_id],
        )
        .await
    }

    async fn find_by_id(&self, id: &OrderId) -> Result<Option<Order>> {
        let db = self.db.lock().await;
        Self::query_order(
            db.connection(),
            &format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = ?"),
            libsql::params![id.as_str()],
        )
        .await
    }

    async fn insert(&self, order: &Order) -> Result<Order> {
        let db = self.db.lock().await;
        let conn = db.connection();

        conn.execute("BEGIN IMMEDIATE", ()).await?;
        let result = Self::write_new_order(conn, order).await;
        Self::finish(conn, result).await?;
        Ok(order.clone())
    }

    async fn upsert(
        &self,
        order: &Order,
        expected_last_modified_at: DateTime<Utc>,
    ) -> Result<Option<Order>> {
        let db = self.db.lock().await;
        let conn = db.connection();

        conn.execute("BEGIN IMMEDIATE", ()).await?;
        match Self::write_replacement(conn, order, expected_last_modified_at).await {
            Ok(true) => {
                Self::finish(conn, Ok(())).await?;
                Ok(Some(order.clone()))
            }
            Ok(false) => {
                conn.execute("ROLLBACK", ()).await.ok();
                Ok(None)
            }
            Err(error) => Self::finish(conn, Err(error)).await,
        }
    }

    async fn append_audit_entry(
        &self,
        entry: &NewConflictResolution,
    ) -> Result<ConflictResolution> {
        let conflict_fields = serde_json::to_string(&entry.conflict_fields)?;
        let db = self.db.lock().await;
        let conn = db.connection();

        conn.execute(
            "INSERT INTO conflict_resolutions (order_id, business_id, client_generated_id,
                resolution_action, resolution_message, resolved_by, resolved_at,
                local_timestamp, server_timestamp, conflict_fields)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            libsql::params![
                entry.order_id.as_str(),
                entry.business_id.as_str(),
                entry.client_generated_id.as_str(),
                entry.resolution_action.as_str(),
                entry.resolution_message.as_str(),
                entry.resolved_by.as_str(),
                to_micros(entry.resolved_at),
                to_micros(entry.local_timestamp),
                to_micros(entry.server_timestamp),
                conflict_fields
            ],
        )
        .await?;

        Ok(ConflictResolution::new(conn.last_insert_rowid(), entry.clone()))
    }

    async fn list_resolutions(
        &self,
        order_id: &OrderId,
        limit: usize,
    ) -> Result<Vec<ConflictResolution>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let db = self.db.lock().await;
        let mut rows = db
            .connection()
            .query(
                &format!(
                    "SELECT {RESOLUTION_COLUMNS} FROM conflict_resolutions
                     WHERE order_id = ?
                     ORDER BY id DESC
                     LIMIT ?"
                ),
                libsql::params![order_id.as_str(), limit],
            )
            .await?;

        let mut resolutions = Vec::new();
        while let Some(row) = rows.next().await? {
            resolutions.push(Self::parse_resolution(&row)?);
        }
        Ok(resolutions)
    }

    async fn resolution_stats(
        &self,
        business_id: &str,
        window: TimeWindow,
    ) -> Result<ResolutionStats> {
        let db = self.db.lock().await;
        let mut rows = db
            .connection()
            .query(
                "SELECT resolution_action,
                        COUNT(*),
                        SUM(CASE WHEN conflict_fields = '[]' THEN 1 ELSE 0 END)
                 FROM conflict_resolutions
                 WHERE business_id = ? AND resolved_at >= ? AND resolved_at < ?
                 GROUP BY resolution_action",
                libsql::params![
                    business_id,
                    to_micros(window.since),
                    to_micros(window.until)
                ],
            )
            .await?;

        let mut stats = ResolutionStats::empty(window);
        while let Some(row) = rows.next().await? {
            let action: String = row.get(0)?;
            let count: i64 = row.get(1)?;
            let unchanged: i64 = row.get(2)?;
            stats.record(
                action.parse::<ResolutionAction>()?,
                u64::try_from(count).unwrap_or_default(),
            );
            stats.without_field_changes += u64::try_from(unchanged).unwrap_or_default();
        }
        Ok(stats)
    }
}
