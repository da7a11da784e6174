use anyhow::Result;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};
use std::str::FromStr;
use std::time::Duration;

use super::types::{DatabaseError, TableName};

/// SQLite expression for the current UTC time with millisecond precision.
pub(crate) const NOW_EXPR: &str = "strftime('%Y-%m-%d %H:%M:%f', 'now')";

// ============================================================================
// Database
// ============================================================================

/// Handle to the record store.
///
/// A run opens it once, performs its single bulk write, and closes it on
/// every exit path with [`Database::close`].
#[derive(Clone)]
pub struct Database {
    pub(crate) pool: SqlitePool,
}

impl Database {
    /// Open a database connection
    ///
    /// `":memory:"` opens a throwaway in-memory store.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::Locked` if another process has the database
    /// locked, `DatabaseError::Other` for other connection errors.
    pub async fn open(path: &str) -> Result<Self, DatabaseError> {
        let url = format!("sqlite:{}?mode=rwc", path);

        // busy_timeout=5000: SQLite waits up to 5 seconds for locks to release
        // before returning SQLITE_BUSY. Every pooled connection inherits it.
        let options = SqliteConnectOptions::from_str(&url)
            .map_err(DatabaseError::from_sqlx)?
            .pragma("busy_timeout", "5000");
        // One collection run issues one write; a single connection is enough
        // and keeps an in-memory store on one connection.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await
            .map_err(DatabaseError::from_sqlx)?;

        tracing::debug!(path = %path, "Database opened");
        Ok(Self { pool })
    }

    /// Close the pool, waiting for the connection to be released.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }

    /// Create the record table and its index if missing.
    ///
    /// Both statements run in one transaction; re-running on an existing
    /// database is a no-op.
    pub async fn ensure_table(&self, table: &TableName) -> Result<(), DatabaseError> {
        self.migrate(table).await.map_err(|e| {
            let error_string = e.to_string().to_lowercase();
            if error_string.contains("database is locked")
                || error_string.contains("sqlite_busy")
            {
                DatabaseError::Locked
            } else {
                DatabaseError::Migration(e.to_string())
            }
        })
    }

    async fn migrate(&self, table: &TableName) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table} (
                unique_id INTEGER PRIMARY KEY,
                title TEXT NOT NULL,
                link TEXT NOT NULL,
                creator TEXT NOT NULL,
                written_at TEXT NOT NULL,
                description TEXT NOT NULL,
                category TEXT NOT NULL,
                saved_at TEXT NOT NULL DEFAULT ({NOW_EXPR})
            )
        "#
        ))
        .execute(&mut *tx)
        .await?;

        sqlx::query(&format!(
            "CREATE INDEX IF NOT EXISTS idx_{table}_category_written ON {table}(category, written_at DESC)"
        ))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        tracing::debug!(table = %table, "Record table ready");
        Ok(())
    }
}
