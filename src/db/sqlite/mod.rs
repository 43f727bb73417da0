pub mod db;

pub mod club;
pub mod devices;
pub mod idempotency;
pub mod inventory;
pub mod orders;
pub mod products;
pub mod redemptions;

use std::env;

pub use db::SqliteDatabase;
use log::info;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};

use crate::db::traits::StorageError;

const SQLITE_DB_URL: &str = "sqlite://data/fulfillment.db";

pub fn db_url() -> String {
    let result = env::var("OFE_DATABASE_URL").unwrap_or_else(|_| {
        info!("OFE_DATABASE_URL is not set. Using the default.");
        SQLITE_DB_URL.to_string()
    });
    info!("Using database URL: {result}");
    result
}

pub async fn new_pool(url: &str, max_connections: u32) -> Result<SqlitePool, StorageError> {
    let pool = SqlitePoolOptions::new().max_connections(max_connections).connect(url).await?;
    Ok(pool)
}
