//! Checkout and payment confirmation.

use axum::{
    Json,
    extract::{Query, State},
    response::{IntoResponse, Redirect, Response},
};
use serde::{Deserialize, Serialize};
use tower_sessions::Session;
use tracing::{info, instrument};

use super::cart::open_cart;
use crate::error::{AppError, Result};
use crate::middleware::Client;
use crate::models::Viewer;
use crate::services::{CheckoutError, PaymentVerification};
use crate::state::AppState;

/// Query string the payment provider returns with.
#[derive(Debug, Deserialize)]
pub struct PaymentReturn {
    #[serde(default)]
    pub session_id: Option<String>,
}

/// Payment confirmation data.
#[derive(Debug, Serialize)]
pub struct PaymentView {
    #[serde(flatten)]
    pub verification: PaymentVerification,
    pub cart_cleared: bool,
}

/// Start a checkout for the cart and redirect to the hosted payment page.
#[instrument(skip_all, fields(user_id = %viewer.id()))]
pub async fn start(
    State(state): State<AppState>,
    viewer: Viewer,
    Client(client): Client,
    session: Session,
) -> Result<Response> {
    let store = open_cart(session).await;
    let token = client.auth.access_token().await?;

    let checkout = state
        .checkout()
        .start(store.cart(), &viewer.identity, token.as_ref())
        .await?;
    let url = checkout
        .url
        .ok_or(CheckoutError::MissingRedirect(checkout.session_id))?;

    Ok(Redirect::to(&url).into_response())
}

/// Verify the payment the provider redirected back with; clear the cart if
/// it was paid.
#[instrument(skip(state, client, session))]
pub async fn payment_success(
    State(state): State<AppState>,
    Client(client): Client,
    session: Session,
    Query(query): Query<PaymentReturn>,
) -> Result<Json<PaymentView>> {
    let session_id = query
        .session_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| AppError::BadRequest("missing session_id".to_string()))?;

    let token = client.auth.access_token().await?;
    let verification = state.checkout().verify(&session_id, token.as_ref()).await?;

    let cart_cleared = verification.success;
    if cart_cleared {
        open_cart(session).await.clear().await;
        info!(session_id = %session_id, "Payment confirmed; cart cleared");
    }

    Ok(Json(PaymentView {
        verification,
        cart_cleared,
    }))
}
