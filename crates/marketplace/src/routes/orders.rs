//! Buyer order history.

use axum::{Json, extract::State};
use tracing::instrument;

use crate::baas::OrderRecord;
use crate::error::Result;
use crate::middleware::Client;
use crate::models::Viewer;
use crate::state::AppState;

/// The buyer's orders, newest first.
#[instrument(skip_all, fields(user_id = %viewer.id()))]
pub async fn index(
    State(state): State<AppState>,
    viewer: Viewer,
    Client(client): Client,
) -> Result<Json<Vec<OrderRecord>>> {
    let token = client.auth.access_token().await?;
    let orders = state
        .sales()
        .buyer_orders(viewer.id(), token.as_ref())
        .await?;
    Ok(Json(orders))
}
