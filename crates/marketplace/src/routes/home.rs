//! Landing page and health check.

use axum::{Json, extract::State, response::IntoResponse};
use serde::Serialize;
use tower_sessions::Session;
use tracing::instrument;

use crate::error::Result;
use crate::services::SessionState;
use crate::state::AppState;

/// Landing page data.
#[derive(Debug, Serialize)]
pub struct LandingView {
    pub name: &'static str,
    pub session: SessionState,
}

/// Public landing page.
#[instrument(skip(state, session))]
pub async fn landing(State(state): State<AppState>, session: Session) -> Result<Json<LandingView>> {
    let session = state
        .clients()
        .find(&session)
        .await?
        .map_or_else(SessionState::unauthenticated, |client| client.session.state());

    Ok(Json(LandingView {
        name: "Rural Grow",
        session,
    }))
}

/// Liveness check.
pub async fn health() -> impl IntoResponse {
    "ok"
}
