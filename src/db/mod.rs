mod models;
mod store;

pub use models::*;
pub use store::{now_timestamp, SignupError, Store};

use anyhow::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

use crate::config::DatabaseConfig;

pub type DbPool = SqlitePool;

pub async fn init(data_dir: &Path, database: &DatabaseConfig) -> Result<Store> {
    let db_path = data_dir.join(&database.file);
    let db_url = format!("sqlite:{}?mode=rwc", db_path.display());

    info!("Initializing database at {}", db_path.display());

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&db_url)
        .await?;

    // WAL mode for better concurrency under overlapping requests
    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA synchronous = NORMAL")
        .execute(&pool)
        .await?;

    let store = Store::new(pool, database);
    store.create_schema().await?;

    info!("Database initialized successfully");
    Ok(store)
}
