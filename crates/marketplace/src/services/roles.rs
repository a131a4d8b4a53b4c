//! Role assignments (`user_roles`).
//!
//! An identity holds a single active role. The table itself allows several
//! rows per user, so reads take the newest row and writes replace every
//! existing row.

use std::str::FromStr;
use std::sync::Arc;

use rural_grow_core::{Role, UserId};
use serde::Deserialize;
use tracing::{instrument, warn};

use crate::baas::{AccessToken, BaasError, DataApi, Order, Query, RoleAssignment};

const TABLE: &str = "user_roles";

#[derive(Deserialize)]
struct RoleRow {
    role: String,
}

/// Reads and writes role assignments.
#[derive(Clone)]
pub struct RoleDirectory {
    data: Arc<dyn DataApi>,
}

impl RoleDirectory {
    #[must_use]
    pub fn new(data: Arc<dyn DataApi>) -> Self {
        Self { data }
    }

    /// The active role of `user`, or `None` if no usable row exists.
    ///
    /// # Errors
    ///
    /// Returns `BaasError` if the lookup fails.
    #[instrument(skip(self, token))]
    pub async fn resolve(
        &self,
        user: UserId,
        token: Option<&AccessToken>,
    ) -> Result<Option<Role>, BaasError> {
        let query = Query::table(TABLE)
            .select("role,created_at")
            .eq("user_id", user)
            .order("created_at", Order::Desc);
        let rows: Vec<RoleRow> = self.data.select_as(&query, token).await?;

        if rows.len() > 1 {
            warn!(%user, count = rows.len(), "Multiple role assignments; using the newest");
        }

        Ok(rows.into_iter().find_map(|row| match Role::from_str(&row.role) {
            Ok(role) => Some(role),
            Err(e) => {
                warn!(%user, error = %e, "Ignoring unknown role");
                None
            }
        }))
    }

    /// Make `role` the only role of `user`.
    ///
    /// # Errors
    ///
    /// Returns `BaasError` if either the delete or the insert fails.
    #[instrument(skip(self, token))]
    pub async fn assign(
        &self,
        user: UserId,
        role: Role,
        token: Option<&AccessToken>,
    ) -> Result<(), BaasError> {
        self.revoke(user, token).await?;
        self.data
            .insert(
                TABLE,
                vec![serde_json::json!({ "user_id": user, "role": role })],
                token,
            )
            .await?;
        Ok(())
    }

    /// Remove every role of `user`.
    ///
    /// # Errors
    ///
    /// Returns `BaasError` if the delete fails.
    #[instrument(skip(self, token))]
    pub async fn revoke(&self, user: UserId, token: Option<&AccessToken>) -> Result<(), BaasError> {
        self.data
            .delete(&Query::table(TABLE).eq("user_id", user), token)
            .await
    }

    /// Every assignment, newest first.
    ///
    /// # Errors
    ///
    /// Returns `BaasError` if the lookup fails.
    pub async fn list(&self, token: Option<&AccessToken>) -> Result<Vec<RoleAssignment>, BaasError> {
        let query = Query::table(TABLE)
            .select("user_id,role,created_at")
            .order("created_at", Order::Desc);
        self.data.select_as(&query, token).await
    }
}
