//! Session middleware configuration.
//!
//! Cookie sessions persisted in the SQLite session database. A session holds
//! the id of the browser's client context and its cart.

use sqlx::SqlitePool;
use tower_sessions::{Expiry, SessionManagerLayer};
use tower_sessions_sqlx_store::SqliteStore;

use crate::config::MarketplaceConfig;

/// Session cookie name.
pub const SESSION_COOKIE_NAME: &str = "rg_session";

/// Create the session layer over the session database.
///
/// The `tower_sessions` table must exist; see [`crate::db::migrate`].
#[must_use]
pub fn create_session_layer(
    pool: &SqlitePool,
    config: &MarketplaceConfig,
) -> SessionManagerLayer<SqliteStore> {
    let session_store = SqliteStore::new(pool.clone());
    let is_secure = config.base_url.starts_with("https://");
    let idle = i64::try_from(config.session_idle.as_secs()).unwrap_or(i64::MAX);

    SessionManagerLayer::new(session_store)
        .with_name(SESSION_COOKIE_NAME)
        .with_expiry(Expiry::OnInactivity(
            tower_sessions::cookie::time::Duration::seconds(idle),
        ))
        .with_secure(is_secure)
        .with_same_site(tower_sessions::cookie::SameSite::Lax)
        .with_http_only(true)
        .with_path("/")
}
