//! Administration: users, their roles and profiles, and product moderation.

use std::collections::HashMap;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use rural_grow_core::{ProductId, Role, UserId};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::baas::{Product, Profile, ProfileUpdate};
use crate::routes::farmer::Availability;
use crate::error::Result;
use crate::middleware::Client;
use crate::models::Viewer;
use crate::state::AppState;

/// A user as shown to administrators.
#[derive(Debug, Serialize)]
pub struct UserView {
    #[serde(flatten)]
    pub profile: Profile,
    pub role: Option<Role>,
}

/// Role change request body.
#[derive(Debug, Deserialize)]
pub struct RoleChange {
    pub role: Role,
}

/// Every user with their current role, newest first.
#[instrument(skip_all)]
pub async fn users(
    State(state): State<AppState>,
    Client(client): Client,
) -> Result<Json<Vec<UserView>>> {
    let token = client.auth.access_token().await?;
    let profiles = state.catalog().profiles(token.as_ref()).await?;

    // Newest assignment wins, matching how a session resolves its role
    let mut roles: HashMap<UserId, Role> = HashMap::new();
    for assignment in state.roles().list(token.as_ref()).await? {
        roles.entry(assignment.user_id).or_insert(assignment.role);
    }

    let users = profiles
        .into_iter()
        .map(|profile| UserView {
            role: roles.get(&profile.user_id).copied(),
            profile,
        })
        .collect();
    Ok(Json(users))
}

/// Replace the role of a user.
#[instrument(skip(state, viewer, client), fields(admin_id = %viewer.id()))]
pub async fn update_role(
    State(state): State<AppState>,
    viewer: Viewer,
    Client(client): Client,
    Path(user_id): Path<UserId>,
    Json(body): Json<RoleChange>,
) -> Result<StatusCode> {
    let token = client.auth.access_token().await?;
    state
        .roles()
        .assign(user_id, body.role, token.as_ref())
        .await?;
    info!(%user_id, role = %body.role, "Role updated");
    Ok(StatusCode::NO_CONTENT)
}

/// Edit the profile of any user.
#[instrument(skip(state, viewer, client, update), fields(admin_id = %viewer.id()))]
pub async fn update_profile(
    State(state): State<AppState>,
    viewer: Viewer,
    Client(client): Client,
    Path(user_id): Path<UserId>,
    Json(update): Json<ProfileUpdate>,
) -> Result<Json<Profile>> {
    let token = client.auth.access_token().await?;
    let profile = state
        .catalog()
        .update_profile(user_id, &update, token.as_ref())
        .await?;
    info!(%user_id, "Profile edited by admin");
    Ok(Json(profile))
}

/// Delete the profile of a user.
#[instrument(skip(state, viewer, client), fields(admin_id = %viewer.id()))]
pub async fn delete_user(
    State(state): State<AppState>,
    viewer: Viewer,
    Client(client): Client,
    Path(user_id): Path<UserId>,
) -> Result<StatusCode> {
    let token = client.auth.access_token().await?;
    state.catalog().delete_profile(user_id, token.as_ref()).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Every product, listed or not.
#[instrument(skip_all)]
pub async fn products(
    State(state): State<AppState>,
    Client(client): Client,
) -> Result<Json<Vec<Product>>> {
    let token = client.auth.access_token().await?;
    Ok(Json(state.catalog().all_products(token.as_ref()).await?))
}

/// Open or close any product for purchase.
#[instrument(skip(state, viewer, client, form), fields(admin_id = %viewer.id()))]
pub async fn set_product_availability(
    State(state): State<AppState>,
    viewer: Viewer,
    Client(client): Client,
    Path(product_id): Path<ProductId>,
    Json(form): Json<Availability>,
) -> Result<Json<Product>> {
    let token = client.auth.access_token().await?;
    let product = state
        .catalog()
        .set_availability(product_id, form.is_available, None, token.as_ref())
        .await?;
    Ok(Json(product))
}

/// Delete any product.
#[instrument(skip(state, viewer, client), fields(admin_id = %viewer.id()))]
pub async fn delete_product(
    State(state): State<AppState>,
    viewer: Viewer,
    Client(client): Client,
    Path(product_id): Path<ProductId>,
) -> Result<StatusCode> {
    let token = client.auth.access_token().await?;
    state
        .catalog()
        .delete_product(product_id, None, token.as_ref())
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
