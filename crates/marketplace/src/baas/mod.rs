//! Backend-as-a-Service (Supabase-style) client.
//!
//! # Architecture
//!
//! - The BaaS is the source of truth for identities, rows, files and payment
//!   state. Nothing is synced locally.
//! - Each capability sits behind an `async_trait` seam ([`AuthApi`],
//!   [`DataApi`], [`FunctionsApi`], [`StorageApi`]) so services can be exercised
//!   against the in-memory backend in tests.
//! - [`BaasClient`] implements all four over HTTP with `reqwest`.
//!
//! # Endpoints
//!
//! - `auth/v1` - password sign-in, sign-up, token refresh, user, logout
//! - `rest/v1` - `PostgREST` table access
//! - `rest/v1/rpc/{name}` - database functions
//! - `functions/v1/{name}` - serverless functions (JSON in, JSON out)
//! - `storage/v1/object` - file upload and public URLs
//!
//! Row-level security is enforced remotely, so every call carries either the
//! signed-in user's access token or, when `None`, the configured API key.

mod client;
#[cfg(any(test, feature = "test-support"))]
pub mod memory;
pub mod query;
pub mod types;

use std::sync::Arc;

use async_trait::async_trait;
use rural_grow_core::Email;
use secrecy::SecretString;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

pub use client::BaasClient;
pub use query::{Order, Query};
pub use types::*;

/// `PostgREST` error code for "`.single()` matched zero rows".
pub const NO_ROWS_CODE: &str = "PGRST116";

/// Errors that can occur when talking to the BaaS.
#[derive(Debug, Error)]
pub enum BaasError {
    /// HTTP request failed before a response arrived.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The service answered with an error status.
    #[error("API error: {status} - {message}")]
    Api {
        status: u16,
        /// `PostgREST` / auth error code, when the body carried one.
        code: Option<String>,
        message: String,
    },

    /// Response body did not match the expected shape.
    #[error("Decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// Email/password rejected by the auth service.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// Access token missing, expired or revoked.
    #[error("session expired")]
    SessionExpired,

    /// A call did not complete within its deadline.
    #[error("timed out: {0}")]
    Timeout(&'static str),

    /// Invalid configuration (e.g. malformed base URL).
    #[error("configuration error: {0}")]
    Config(String),
}

impl BaasError {
    /// Returns `true` for failures worth retrying: transport errors, timeouts,
    /// rate limits and server-side errors.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::Http(_) | Self::Timeout(_) => true,
            Self::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    /// The `PostgREST` error code, if any.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Api { code, .. } => code.as_deref(),
            _ => None,
        }
    }
}

/// Authentication service.
#[async_trait]
pub trait AuthApi: Send + Sync {
    /// Exchange email and password for a session.
    async fn sign_in_with_password(
        &self,
        email: &Email,
        password: &SecretString,
    ) -> Result<AuthSession, BaasError>;

    /// Create an account. `metadata` is stored as user metadata.
    async fn sign_up(
        &self,
        email: &Email,
        password: &SecretString,
        metadata: Value,
    ) -> Result<SignUp, BaasError>;

    /// Exchange a refresh token for a new session.
    async fn refresh_session(&self, refresh_token: &SecretString)
    -> Result<AuthSession, BaasError>;

    /// Resolve the identity behind an access token.
    async fn get_user(&self, token: &AccessToken) -> Result<Identity, BaasError>;

    /// Revoke the session behind an access token.
    async fn sign_out(&self, token: &AccessToken) -> Result<(), BaasError>;
}

/// Row-level table access.
#[async_trait]
pub trait DataApi: Send + Sync {
    /// Select rows matching the query.
    async fn select(&self, query: &Query, token: Option<&AccessToken>)
    -> Result<Vec<Value>, BaasError>;

    /// Insert rows, returning the stored representation.
    async fn insert(
        &self,
        table: &str,
        rows: Vec<Value>,
        token: Option<&AccessToken>,
    ) -> Result<Vec<Value>, BaasError>;

    /// Patch rows matching the query's filters, returning the updated rows.
    async fn update(
        &self,
        query: &Query,
        patch: Value,
        token: Option<&AccessToken>,
    ) -> Result<Vec<Value>, BaasError>;

    /// Delete rows matching the query's filters.
    async fn delete(&self, query: &Query, token: Option<&AccessToken>) -> Result<(), BaasError>;

    /// Call a database function with named arguments.
    async fn rpc(
        &self,
        function: &str,
        args: Value,
        token: Option<&AccessToken>,
    ) -> Result<Value, BaasError>;
}

impl dyn DataApi {
    /// Select rows and decode them into `T`.
    ///
    /// # Errors
    ///
    /// Returns `BaasError::Decode` if a row does not match `T`.
    pub async fn select_as<T: DeserializeOwned>(
        &self,
        query: &Query,
        token: Option<&AccessToken>,
    ) -> Result<Vec<T>, BaasError> {
        let rows = self.select(query, token).await?;
        rows.into_iter()
            .map(|row| serde_json::from_value(row).map_err(BaasError::from))
            .collect()
    }
}

/// Serverless function invocation.
#[async_trait]
pub trait FunctionsApi: Send + Sync {
    /// Invoke a function by name with a JSON body.
    ///
    /// A JSON body of the form `{"error": "..."}` is surfaced as
    /// `BaasError::Api` even when the HTTP status is 2xx.
    async fn invoke(
        &self,
        name: &str,
        body: Value,
        token: Option<&AccessToken>,
    ) -> Result<Value, BaasError>;
}

/// Object storage.
#[async_trait]
pub trait StorageApi: Send + Sync {
    /// Upload (or overwrite) an object.
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
        token: Option<&AccessToken>,
    ) -> Result<(), BaasError>;

    /// Public URL of an object in a public bucket.
    fn public_url(&self, bucket: &str, path: &str) -> String;
}

/// The four BaaS capabilities, shareable across tasks.
#[derive(Clone)]
pub struct Backend {
    pub auth: Arc<dyn AuthApi>,
    pub data: Arc<dyn DataApi>,
    pub functions: Arc<dyn FunctionsApi>,
    pub storage: Arc<dyn StorageApi>,
}

impl Backend {
    /// Use one value for every capability.
    pub fn from_service<T>(service: T) -> Self
    where
        T: AuthApi + DataApi + FunctionsApi + StorageApi + 'static,
    {
        let service = Arc::new(service);
        Self {
            auth: service.clone(),
            data: service.clone(),
            functions: service.clone(),
            storage: service,
        }
    }
}

/// Extract the `{"error": ...}` message from a function response, if present.
pub(crate) fn function_error(body: &Value) -> Option<String> {
    match body.get("error")? {
        Value::Null => None,
        Value::String(message) => Some(message.clone()),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        let server = BaasError::Api {
            status: 503,
            code: None,
            message: "unavailable".to_owned(),
        };
        let client = BaasError::Api {
            status: 400,
            code: Some("22P02".to_owned()),
            message: "bad uuid".to_owned(),
        };
        assert!(server.is_transient());
        assert!(!client.is_transient());
        assert!(BaasError::Timeout("role lookup").is_transient());
        assert!(!BaasError::InvalidCredentials.is_transient());
        assert_eq!(client.code(), Some("22P02"));
    }

    #[test]
    fn test_function_error_body() {
        assert_eq!(
            function_error(&serde_json::json!({"error": "Missing required fields"})),
            Some("Missing required fields".to_owned())
        );
        assert_eq!(function_error(&serde_json::json!({"success": true})), None);
        assert_eq!(function_error(&serde_json::json!({"error": null})), None);
    }
}
