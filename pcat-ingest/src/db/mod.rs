//! Product store database access

pub mod products;

pub use products::ProductStore;

use pcat_common::{Error, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Open (creating if needed) the product database and ensure its tables exist
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let path = db_path
        .to_str()
        .ok_or_else(|| Error::Config(format!("Invalid database path: {}", db_path.display())))?;
    tracing::debug!("Connecting to database: {}", path);

    let options = SqliteConnectOptions::from_str(path)?
        .busy_timeout(Duration::from_millis(5000))
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(4)
        .connect_with(options)
        .await?;

    init_tables(&pool).await?;
    Ok(pool)
}

/// Create the products table if it does not exist
pub async fn init_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS products (
            identifier TEXT PRIMARY KEY,
            name TEXT NOT NULL DEFAULT '',
            brand TEXT NOT NULL DEFAULT '',
            weight TEXT NOT NULL DEFAULT '',
            price TEXT NOT NULL DEFAULT '',
            images TEXT NOT NULL DEFAULT '[]',
            category TEXT NOT NULL DEFAULT '',
            product_type TEXT NOT NULL DEFAULT '',
            product_on_pages TEXT NOT NULL DEFAULT '',
            special_order INTEGER NOT NULL DEFAULT 0,
            disabled INTEGER NOT NULL DEFAULT 0,
            cross_sell TEXT NOT NULL DEFAULT '[]',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    tracing::info!("Database tables initialized (products)");
    Ok(())
}
