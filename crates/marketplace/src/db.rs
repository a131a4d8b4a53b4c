//! Browser session database.
//!
//! Cookie sessions (the client context id and the cart) are stored in SQLite
//! so a browser keeps its cart across restarts of the marketplace.
//!
//! ## Tables
//!
//! - `tower_sessions` - Session records, created by [`migrate`]
//!
//! Expired records are removed by the task started with
//! [`spawn_expired_deletion`].

use std::str::FromStr;
use std::time::Duration;

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tokio::task::JoinHandle;
use tower_sessions::ExpiredDeletion;
use tower_sessions_sqlx_store::SqliteStore;

/// Create a SQLite connection pool, creating the database file if missing.
///
/// # Errors
///
/// Returns `sqlx::Error` if the URL is invalid or the database cannot be
/// opened.
pub async fn create_pool(database_url: &str) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
    SqlitePoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(10))
        .connect_with(options)
        .await
}

/// Create the session table if it does not exist yet.
///
/// # Errors
///
/// Returns `sqlx::Error` if the schema cannot be created.
pub async fn migrate(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    SqliteStore::new(pool.clone()).migrate().await
}

/// Delete expired session records every `period` until the task is aborted.
pub fn spawn_expired_deletion(pool: SqlitePool, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let store = SqliteStore::new(pool);
        if let Err(e) = store.continuously_delete_expired(period).await {
            tracing::error!(error = %e, "Expired session deletion stopped");
        }
    })
}
