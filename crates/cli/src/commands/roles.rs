//! Role management commands.
//!
//! Admins cannot be created through sign-up, so the first admin (and any role
//! repair) goes through here with the service-role key.
//!
//! # Usage
//!
//! ```bash
//! rg-cli roles grant -u 6f1c...e2 -r admin
//! rg-cli roles show -u 6f1c...e2
//! rg-cli roles revoke -u 6f1c...e2
//! rg-cli roles list
//! ```
//!
//! # Environment Variables
//!
//! - `BAAS_URL` - Base URL of the BaaS project
//! - `BAAS_SERVICE_ROLE_KEY` - Service-role key (bypasses row-level security)

use std::sync::Arc;

use rural_grow_core::{Role, UserId};
use rural_grow_marketplace::baas::{BaasClient, BaasError, RoleAssignment};
use rural_grow_marketplace::config::{BaasConfig, ConfigError};
use rural_grow_marketplace::services::RoleDirectory;
use thiserror::Error;

/// Errors that can occur during role operations.
#[derive(Debug, Error)]
pub enum RolesError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("BaaS error: {0}")]
    Baas(#[from] BaasError),
}

/// Connect to the BaaS with the service-role key.
///
/// # Errors
///
/// Returns `RolesError` if the configuration is missing or the client cannot
/// be built.
pub fn connect() -> Result<RoleDirectory, RolesError> {
    let config = BaasConfig::service_role_from_env()?;
    tracing::info!(url = %config.url, "Connecting to BaaS");
    let client = BaasClient::new(&config)?;
    Ok(RoleDirectory::new(Arc::new(client)))
}

/// Make `role` the only role of `user`.
///
/// # Errors
///
/// Returns `RolesError::Baas` if the change fails.
pub async fn grant(roles: &RoleDirectory, user: UserId, role: Role) -> Result<(), RolesError> {
    roles.assign(user, role, None).await?;
    tracing::info!(user_id = %user, %role, "Role granted");
    Ok(())
}

/// Remove every role of `user`.
///
/// # Errors
///
/// Returns `RolesError::Baas` if the delete fails.
pub async fn revoke(roles: &RoleDirectory, user: UserId) -> Result<(), RolesError> {
    roles.revoke(user, None).await?;
    tracing::info!(user_id = %user, "Roles revoked");
    Ok(())
}

/// The role a session of `user` would resolve to.
///
/// # Errors
///
/// Returns `RolesError::Baas` if the lookup fails.
pub async fn show(roles: &RoleDirectory, user: UserId) -> Result<Option<Role>, RolesError> {
    let role = roles.resolve(user, None).await?;
    match role {
        Some(role) => tracing::info!(user_id = %user, %role, "Current role"),
        None => tracing::info!(user_id = %user, "No role assigned"),
    }
    Ok(role)
}

/// Every role assignment, newest first.
///
/// # Errors
///
/// Returns `RolesError::Baas` if the lookup fails.
pub async fn list(roles: &RoleDirectory) -> Result<Vec<RoleAssignment>, RolesError> {
    let assignments = roles.list(None).await?;
    for assignment in &assignments {
        tracing::info!(user_id = %assignment.user_id, role = %assignment.role, "Assignment");
    }
    tracing::info!(count = assignments.len(), "Role assignments listed");
    Ok(assignments)
}
