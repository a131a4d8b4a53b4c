//! Unified error handling with Sentry integration.
//!
//! Provides a unified `AppError` type that captures errors to Sentry before
//! responding to the client. All route handlers should return `Result<T, AppError>`.
//! Failures of the Backend-as-a-Service are surfaced as `502 Bad Gateway`
//! rather than swallowed.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::baas::BaasError;
use crate::services::{
    AuthError, CatalogError, CheckoutError, PayoutError, SalesError, WishlistError,
};

/// Application-level error type for the marketplace.
#[derive(Debug, Error)]
pub enum AppError {
    /// Authentication operation failed.
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    /// Wishlist operation failed.
    #[error("Wishlist error: {0}")]
    Wishlist(#[from] WishlistError),

    /// Checkout operation failed.
    #[error("Checkout error: {0}")]
    Checkout(#[from] CheckoutError),

    /// Catalog operation failed.
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// Order or purchase request operation failed.
    #[error("Sales error: {0}")]
    Sales(#[from] SalesError),

    /// Payout operation failed.
    #[error("Payout error: {0}")]
    Payout(#[from] PayoutError),

    /// BaaS call failed.
    #[error("Backend error: {0}")]
    Baas(#[from] BaasError),

    /// Cookie session could not be read or written.
    #[error("Session error: {0}")]
    Session(#[from] tower_sessions::session::Error),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Bad request from client.
    #[error("Bad request: {0}")]
    BadRequest(String),
}

impl AppError {
    /// Returns `true` for failures of a remote dependency.
    fn is_remote(&self) -> bool {
        match self {
            Self::Baas(_)
            | Self::Auth(AuthError::Baas(_))
            | Self::Wishlist(WishlistError::Baas(_) | WishlistError::Auth(AuthError::Baas(_)))
            | Self::Checkout(CheckoutError::Baas(_) | CheckoutError::MissingRedirect(_))
            | Self::Catalog(CatalogError::Baas(_))
            | Self::Sales(SalesError::Baas(_))
            | Self::Payout(PayoutError::Baas(_)) => true,
            _ => false,
        }
    }

    fn status(&self) -> StatusCode {
        if self.is_remote() {
            return StatusCode::BAD_GATEWAY;
        }
        match self {
            Self::Session(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Auth(err) | Self::Wishlist(WishlistError::Auth(err)) => match err {
                AuthError::InvalidCredentials | AuthError::NotSignedIn => StatusCode::UNAUTHORIZED,
                AuthError::UserAlreadyExists => StatusCode::CONFLICT,
                AuthError::RoleNotSelfAssignable(_) => StatusCode::FORBIDDEN,
                AuthError::WeakPassword(_)
                | AuthError::InvalidEmail(_)
                | AuthError::EmailRejected(_) => StatusCode::BAD_REQUEST,
                AuthError::Baas(_) => StatusCode::BAD_GATEWAY,
            },
            Self::Checkout(CheckoutError::EmptyCart)
            | Self::Catalog(CatalogError::Invalid(_))
            | Self::Payout(PayoutError::Invalid(_) | PayoutError::InsufficientBalance { .. })
            | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Catalog(CatalogError::NotFound(_))
            | Self::Sales(SalesError::NotFound(_))
            | Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Sales(SalesError::AlreadyDecided(_)) => StatusCode::CONFLICT,
            _ => StatusCode::BAD_GATEWAY,
        }
    }

    fn public_message(&self) -> String {
        if self.is_remote() {
            return "External service error".to_string();
        }
        match self {
            Self::Session(_) => "Internal server error".to_string(),
            Self::Auth(err) | Self::Wishlist(WishlistError::Auth(err)) => match err {
                AuthError::InvalidCredentials => "Invalid credentials".to_string(),
                AuthError::NotSignedIn => "Please sign in".to_string(),
                AuthError::UserAlreadyExists => {
                    "An account with this email already exists".to_string()
                }
                AuthError::WeakPassword(msg) => msg.clone(),
                AuthError::InvalidEmail(_) | AuthError::EmailRejected(_) => {
                    "Invalid email address".to_string()
                }
                AuthError::RoleNotSelfAssignable(role) => {
                    format!("The {role} role cannot be chosen at sign-up")
                }
                AuthError::Baas(_) => "External service error".to_string(),
            },
            Self::Checkout(CheckoutError::EmptyCart) => "Your cart is empty".to_string(),
            Self::Catalog(CatalogError::Invalid(msg)) => msg.clone(),
            Self::Catalog(CatalogError::NotFound(what)) | Self::Sales(SalesError::NotFound(what)) => {
                format!("Not found: {what}")
            }
            Self::Sales(SalesError::AlreadyDecided(status)) => {
                format!("This request was already {status}")
            }
            Self::Payout(PayoutError::Invalid(msg)) => msg.clone(),
            Self::Payout(PayoutError::InsufficientBalance { available, .. }) => {
                format!("Amount exceeds your available balance of {available}")
            }
            _ => self.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Capture server and gateway errors to Sentry
        if status.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        }

        (status, Json(json!({ "error": self.public_message() }))).into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Set the Sentry user context from a user ID.
///
/// Call this after successful authentication to associate errors with users.
pub fn set_sentry_user(user_id: &impl ToString, email: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            email: email.map(String::from),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context.
///
/// Call this on sign-out to stop associating errors with the user.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}

/// Add a breadcrumb for user actions.
///
/// Breadcrumbs appear in Sentry error reports to show the trail of user actions
/// leading up to an error.
///
/// # Example
///
/// ```rust,ignore
/// add_breadcrumb("cart", "Added to cart", Some(&[("product_id", "123")]));
/// ```
pub fn add_breadcrumb(category: &str, message: &str, data: Option<&[(&str, &str)]>) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    if let Some(pairs) = data {
        for (key, value) in pairs {
            breadcrumb.data.insert(
                (*key).to_string(),
                serde_json::Value::String((*value).to_string()),
            );
        }
    }

    sentry::add_breadcrumb(breadcrumb);
}
