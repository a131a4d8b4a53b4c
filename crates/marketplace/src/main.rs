//! Rural Grow Marketplace - farmer-to-buyer produce marketplace.
//!
//! This binary serves the marketplace web tier on port 3000.
//!
//! # Architecture
//!
//! - Axum web framework with JSON views and redirects
//! - Backend-as-a-Service for auth, data (row-level security), edge functions
//!   and object storage
//! - One client context (auth client, session store, wishlist) per browser
//!   session, kept in memory with idle expiry
//! - Cookie sessions (client id and cart) persisted in SQLite, with expired
//!   records deleted in the background
//!
//! # Security
//!
//! This binary only holds the public (anon) key. Every data call carries the
//! signed-in user's token, so access control is enforced by the BaaS. The
//! service-role key is used by the CLI only.

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::time::Duration;

use rural_grow_marketplace::db;
use rural_grow_marketplace::config::MarketplaceConfig;
use rural_grow_marketplace::state::AppState;
use sentry::integrations::tracing as sentry_tracing;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// How often expired session records are deleted.
const SESSION_CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &MarketplaceConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    tracing::info!("Sentry initialized");
    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration from environment (needed for Sentry init)
    let config = MarketplaceConfig::from_env()?;

    // Initialize Sentry (must be done before tracing subscriber)
    let _sentry_guard = init_sentry(&config);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "rural_grow_marketplace=info,tower_http=debug".into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();

    // Session database; the table is created on first start
    let pool = db::create_pool(&config.session_database_url).await?;
    db::migrate(&pool).await?;
    let _expired_deletion = db::spawn_expired_deletion(pool.clone(), SESSION_CLEANUP_INTERVAL);
    tracing::info!("Session database ready");

    let addr = config.socket_addr();
    let state = AppState::new(config, pool)?;
    let app = rural_grow_marketplace::app(state);

    tracing::info!("marketplace listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}
