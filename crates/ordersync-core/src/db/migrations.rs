//! Database migrations

use crate::error::Result;
use libsql::Connection;

/// Current schema version
const CURRENT_VERSION: i32 = 2;

/// Run all pending migrations
pub async fn run(conn: &Connection) -> Result<()> {
    let version = get_version(conn).await?;

    if version < 1 {
        apply(conn, 1, &V1_STATEMENTS).await?;
    }
    if version < 2 {
        apply(conn, 2, &V2_STATEMENTS).await?;
    }

    Ok(())
}

/// Get the current schema version
async fn get_version(conn: &Connection) -> Result<i32> {
    let mut rows = conn
        .query(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
            (),
        )
        .await?;

    let exists: bool = if let Some(row) = rows.next().await? {
        row.get::<i32>(0)? != 0
    } else {
        false
    };

    if !exists {
        return Ok(0);
    }

    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM schema_version", ())
        .await?;

    let version: i32 = if let Some(row) = rows.next().await? {
        row.get(0)?
    } else {
        0
    };

    Ok(version)
}

/// Version 1: orders of record, their items, and the resolution audit log
const V1_STATEMENTS: [&str; 8] = [
    "CREATE TABLE IF NOT EXISTS schema_version (
        version INTEGER PRIMARY KEY
    )",
    "CREATE TABLE IF NOT EXISTS orders (
        id TEXT PRIMARY KEY,
        business_id TEXT NOT NULL,
        client_generated_id TEXT NOT NULL,
        client_name TEXT NOT NULL,
        client_phone TEXT,
        total REAL NOT NULL,
        delivery_date TEXT NOT NULL,
        delivery_time TEXT,
        status TEXT NOT NULL,
        notes TEXT,
        last_modified_at INTEGER NOT NULL,
        sync_status TEXT NOT NULL,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL,
        UNIQUE (business_id, client_generated_id)
    )",
    "CREATE TABLE IF NOT EXISTS order_items (
        order_id TEXT NOT NULL REFERENCES orders(id) ON DELETE CASCADE,
        position INTEGER NOT NULL,
        product_name TEXT NOT NULL,
        quantity INTEGER NOT NULL,
        unit_price REAL NOT NULL,
        notes TEXT,
        PRIMARY KEY (order_id, position)
    )",
    "CREATE TABLE IF NOT EXISTS conflict_resolutions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        order_id TEXT NOT NULL,
        business_id TEXT NOT NULL,
        client_generated_id TEXT NOT NULL,
        resolution_action TEXT NOT NULL,
        resolution_message TEXT NOT NULL,
        resolved_by TEXT NOT NULL,
        resolved_at INTEGER NOT NULL,
        local_timestamp INTEGER NOT NULL,
        server_timestamp INTEGER NOT NULL,
        conflict_fields TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_conflict_resolutions_order ON conflict_resolutions(order_id, id)",
    "CREATE INDEX IF NOT EXISTS idx_conflict_resolutions_business_time
        ON conflict_resolutions(business_id, resolved_at)",
    "CREATE INDEX IF NOT EXISTS idx_orders_business_modified ON orders(business_id, last_modified_at DESC)",
    "INSERT INTO schema_version (version) VALUES (1)",
];

/// Version 2: storage-level guard so an older version never overwrites a newer one
const V2_STATEMENTS: [&str; 2] = [
    "CREATE TRIGGER IF NOT EXISTS orders_lww_guard BEFORE UPDATE ON orders
     FOR EACH ROW
     WHEN NEW.last_modified_at < OLD.last_modified_at
     BEGIN
         SELECT RAISE(IGNORE);
     END",
    "INSERT INTO schema_version (version) VALUES (2)",
];

/// Apply one migration's statements atomically
async fn apply(conn: &Connection, version: i32, statements: &[&str]) -> Result<()> {
    // libsql doesn't have execute_batch, so we run each statement separately
    conn.execute("BEGIN TRANSACTION", ()).await?;

    for stmt in statements {
        if let Err(e) = conn.execute(stmt, ()).await {
            conn.execute("ROLLBACK", ()).await.ok();
            return Err(e.into());
        }
    }

    if let Err(e) = conn.execute("COMMIT", ()).await {
        conn.execute("ROLLBACK", ()).await.ok();
        return Err(e.into());
    }

    tracing::info!("Migrated database to version {version}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use libsql::Builder;

    async fn setup() -> Connection {
        let db = Builder::new_local(":memory:").build().await.unwrap();
        db.connect().unwrap()
    }

    async fn table_exists(conn: &Connection, kind: &str, name: &str) -> bool {
        let mut rows = conn
            .query(
                "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = ? AND name = ?)",
                libsql::params![kind, name],
            )
            .await
            .unwrap();
        rows.next()
            .await
            .unwrap()
            .is_some_and(|row| row.get::<i32>(0).unwrap() != 0)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_migrations() {
        let conn = setup().await;
        run(&conn).await.unwrap();

        let version = get_version(&conn).await.unwrap();
        assert_eq!(version, CURRENT_VERSION);
        assert!(table_exists(&conn, "table", "orders").await);
        assert!(table_exists(&conn, "table", "order_items").await);
        assert!(table_exists(&conn, "table", "conflict_resolutions").await);
        assert!(table_exists(&conn, "trigger", "orders_lww_guard").await);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_migrations_idempotent() {
        let conn = setup().await;
        run(&conn).await.unwrap();
        run(&conn).await.unwrap(); // Should not fail

        let version = get_version(&conn).await.unwrap();
        assert_eq!(version, CURRENT_VERSION);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_lww_guard_ignores_older_updates() {
        let conn = setup().await;
        run(&conn).await.unwrap();

        conn.execute(
            "INSERT INTO orders (id, business_id, client_generated_id, client_name, total,
                delivery_date, status, last_modified_at, sync_status, created_at, updated_at)
             VALUES ('o1', 'b1', 'abc', 'Ana', 120.0, '2024-06-03', 'pending', 200, 'synced', 1, 1)",
            (),
        )
        .await
        .unwrap();

        let changed = conn
            .execute(
                "UPDATE orders SET total = 99.0, last_modified_at = 100 WHERE id = 'o1'",
                (),
            )
            .await
            .unwrap();
        assert_eq!(changed, 0);

        let mut rows = conn
            .query("SELECT total FROM orders WHERE id = 'o1'", ())
            .await
            .unwrap();
        let total: f64 = rows.next().await.unwrap().unwrap().get(0).unwrap();
        assert!((total - 120.0).abs() < f64::EPSILON);
    }
}
