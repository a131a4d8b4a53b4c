//! Authentication error types.

use rural_grow_core::Role;
use thiserror::Error;

use crate::baas::BaasError;

/// Errors that can occur during authentication operations.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Invalid email format.
    #[error("invalid email: {0}")]
    InvalidEmail(#[from] rural_grow_core::EmailError),

    /// The auth service refused the email address.
    #[error("email rejected: {0}")]
    EmailRejected(String),

    /// Invalid credentials (wrong password or unknown email).
    #[error("invalid credentials")]
    InvalidCredentials,

    /// An account already exists for the email.
    #[error("user already exists")]
    UserAlreadyExists,

    /// Password too weak or invalid.
    #[error("password validation failed: {0}")]
    WeakPassword(String),

    /// The role cannot be chosen at sign-up.
    #[error("role {0} cannot be self-assigned")]
    RoleNotSelfAssignable(Role),

    /// No session, or the session could not be refreshed.
    #[error("not signed in")]
    NotSignedIn,

    /// BaaS call failed.
    #[error("auth service error: {0}")]
    Baas(#[from] BaasError),
}
