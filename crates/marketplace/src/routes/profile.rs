//! The viewer's own profile.

use axum::{Json, extract::State};
use tracing::instrument;

use crate::baas::{Profile, ProfileUpdate};
use crate::error::Result;
use crate::middleware::Client;
use crate::models::Viewer;
use crate::state::AppState;

/// Show the viewer's profile.
#[instrument(skip_all, fields(user_id = %viewer.id()))]
pub async fn show(
    State(state): State<AppState>,
    viewer: Viewer,
    Client(client): Client,
) -> Result<Json<Profile>> {
    let token = client.auth.access_token().await?;
    let profile = state.catalog().profile(viewer.id(), token.as_ref()).await?;
    Ok(Json(profile))
}

/// Update the viewer's profile.
#[instrument(skip_all, fields(user_id = %viewer.id()))]
pub async fn update(
    State(state): State<AppState>,
    viewer: Viewer,
    Client(client): Client,
    Json(update): Json<ProfileUpdate>,
) -> Result<Json<Profile>> {
    let token = client.auth.access_token().await?;
    let profile = state
        .catalog()
        .update_profile(viewer.id(), &update, token.as_ref())
        .await?;
    Ok(Json(profile))
}
