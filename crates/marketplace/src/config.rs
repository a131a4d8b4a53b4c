//! Marketplace configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `BAAS_URL` - Base URL of the BaaS project (e.g., `https://abc.supabase.co`)
//! - `BAAS_ANON_KEY` - Public (anon) API key; row-level security applies
//!
//! ## Optional
//! - `MARKETPLACE_HOST` - Bind address (default: 127.0.0.1)
//! - `MARKETPLACE_PORT` - Listen port (default: 3000)
//! - `MARKETPLACE_BASE_URL` - Public URL, used for payment return links
//!   (default: `http://{host}:{port}`)
//! - `ROLE_FETCH_TIMEOUT_SECS` - Deadline for one role lookup (default: 10)
//! - `SESSION_IDLE_MINUTES` - Idle expiry of browser sessions (default: 10080)
//! - `SESSION_DATABASE_URL` - SQLite database holding browser sessions
//!   (default: `sqlite://rural-grow-sessions.db`)
//! - `PRODUCT_IMAGE_BUCKET` - Storage bucket for product images
//!   (default: product-images)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//!
//! ## Operator tooling only
//! - `BAAS_SERVICE_ROLE_KEY` - Service-role key that bypasses row-level security

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;
use url::Url;

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "put-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Marketplace application configuration.
#[derive(Debug, Clone)]
pub struct MarketplaceConfig {
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Public base URL for the marketplace
    pub base_url: String,
    /// BaaS connection
    pub baas: BaasConfig,
    /// Deadline for a single role lookup
    pub role_fetch_timeout: Duration,
    /// Idle expiry for browser sessions and their client contexts
    pub session_idle: Duration,
    /// SQLite URL of the browser session database
    pub session_database_url: String,
    /// Storage bucket for product images
    pub product_image_bucket: String,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
}

/// BaaS project connection.
///
/// Implements `Debug` manually to redact the key.
#[derive(Clone)]
pub struct BaasConfig {
    /// Project base URL
    pub url: Url,
    /// API key sent as `apikey` and as the default bearer token
    pub api_key: SecretString,
}

impl std::fmt::Debug for BaasConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BaasConfig")
            .field("url", &self.url.as_str())
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

impl MarketplaceConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid, or
    /// if the API key looks like a placeholder.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let host = parse_env("MARKETPLACE_HOST", "127.0.0.1")?;
        let port: u16 = parse_env("MARKETPLACE_PORT", "3000")?;
        let base_url = get_optional_env("MARKETPLACE_BASE_URL")
            .unwrap_or_else(|| format!("http://{host}:{port}"));
        let baas = BaasConfig::from_env("BAAS_ANON_KEY")?;
        let role_fetch_timeout =
            Duration::from_secs(parse_env("ROLE_FETCH_TIMEOUT_SECS", "10")?);
        let session_idle =
            Duration::from_secs(parse_env::<u64>("SESSION_IDLE_MINUTES", "10080")? * 60);
        let session_database_url =
            get_env_or_default("SESSION_DATABASE_URL", "sqlite://rural-grow-sessions.db");
        let product_image_bucket = get_env_or_default("PRODUCT_IMAGE_BUCKET", "product-images");
        let sentry_dsn = get_optional_env("SENTRY_DSN");

        Ok(Self {
            host,
            port,
            base_url,
            baas,
            role_fetch_timeout,
            session_idle,
            session_database_url,
            product_image_bucket,
            sentry_dsn,
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

impl BaasConfig {
    /// Load the project URL and the key named by `key_var`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if either variable is missing or invalid.
    pub fn from_env(key_var: &str) -> Result<Self, ConfigError> {
        let raw_url = get_required_env("BAAS_URL")?;
        let url = Url::parse(&raw_url)
            .map_err(|e| ConfigError::InvalidEnvVar("BAAS_URL".to_string(), e.to_string()))?;
        let api_key = get_validated_secret(key_var)?;
        Ok(Self { url, api_key })
    }

    /// Load the service-role connection used by operator tooling.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if `BAAS_URL` or `BAAS_SERVICE_ROLE_KEY` is
    /// missing or invalid.
    pub fn service_role_from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_env("BAAS_SERVICE_ROLE_KEY")
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse an environment variable, falling back to `default`.
fn parse_env<T>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    get_env_or_default(key, default)
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

/// Validate that a key is not a placeholder.
fn validate_secret(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    if secret.trim().is_empty() {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            "is empty".to_string(),
        ));
    }

    let lower = secret.to_lowercase();
    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }
    Ok(())
}

/// Load and validate a secret from environment.
fn get_validated_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    validate_secret(&value, key)?;
    Ok(SecretString::from(value))
}
