//! Application state shared across handlers.

use std::sync::Arc;

use sqlx::SqlitePool;

use crate::baas::{BaasClient, BaasError, Backend};
use crate::config::MarketplaceConfig;
use crate::context::ClientRegistry;
use crate::services::{Catalog, CheckoutService, Notifier, Payouts, RoleDirectory, Sales};

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to the
/// BaaS-backed services, the per-browser client contexts, the session
/// database and configuration.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: MarketplaceConfig,
    pool: SqlitePool,
    roles: RoleDirectory,
    checkout: CheckoutService,
    catalog: Catalog,
    sales: Sales,
    payouts: Payouts,
    clients: ClientRegistry,
}

impl AppState {
    /// Create application state talking to the configured BaaS over HTTP.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: MarketplaceConfig, pool: SqlitePool) -> Result<Self, BaasError> {
        let client = BaasClient::new(&config.baas)?;
        Ok(Self::with_backend(
            config,
            pool,
            Backend::from_service(client),
        ))
    }

    /// Create application state over an arbitrary backend.
    #[must_use]
    pub fn with_backend(config: MarketplaceConfig, pool: SqlitePool, backend: Backend) -> Self {
        let roles = RoleDirectory::new(Arc::clone(&backend.data));
        let notifier = Notifier::new(Arc::clone(&backend.functions));
        let checkout = CheckoutService::new(
            Arc::clone(&backend.functions),
            notifier.clone(),
            &config.base_url,
        );
        let sales = Sales::new(Arc::clone(&backend.data), notifier);
        let payouts = Payouts::new(Arc::clone(&backend.data));
        let catalog = Catalog::new(
            Arc::clone(&backend.data),
            Arc::clone(&backend.storage),
            &config.product_image_bucket,
        );
        let clients = ClientRegistry::new(
            backend,
            roles.clone(),
            config.role_fetch_timeout,
            config.session_idle,
        );

        Self {
            inner: Arc::new(AppStateInner {
                config,
                pool,
                roles,
                checkout,
                catalog,
                sales,
                payouts,
                clients,
            }),
        }
    }

    /// Get a reference to the marketplace configuration.
    #[must_use]
    pub fn config(&self) -> &MarketplaceConfig {
        &self.inner.config
    }

    /// Get a reference to the session database pool.
    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.inner.pool
    }

    /// Get a reference to the role directory.
    #[must_use]
    pub fn roles(&self) -> &RoleDirectory {
        &self.inner.roles
    }

    /// Get a reference to the checkout service.
    #[must_use]
    pub fn checkout(&self) -> &CheckoutService {
        &self.inner.checkout
    }

    /// Get a reference to the catalog.
    #[must_use]
    pub fn catalog(&self) -> &Catalog {
        &self.inner.catalog
    }

    /// Get a reference to the order and purchase request service.
    #[must_use]
    pub fn sales(&self) -> &Sales {
        &self.inner.sales
    }

    /// Get a reference to the payout service.
    #[must_use]
    pub fn payouts(&self) -> &Payouts {
        &self.inner.payouts
    }

    /// Get a reference to the per-browser client contexts.
    #[must_use]
    pub fn clients(&self) -> &ClientRegistry {
        &self.inner.clients
    }
}
