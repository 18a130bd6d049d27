//! SQLite implementation of the collaborator traits.
pub mod accounts;
pub mod catalog;
mod db;
mod errors;
pub mod orders;

use std::{str::FromStr, time::Duration};

pub use db::SqliteStore;
pub use errors::SqliteStoreError;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};

/// How long a connection waits for another connection's write lock before giving up with `SQLITE_BUSY`.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Opens a connection pool, creating the database file if it does not exist yet.
pub async fn new_pool(url: &str, max_connections: u32) -> Result<SqlitePool, SqliteStoreError> {
    let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true).foreign_keys(true).busy_timeout(BUSY_TIMEOUT);
    let pool = SqlitePoolOptions::new().max_connections(max_connections).connect_with(options).await?;
    Ok(pool)
}
