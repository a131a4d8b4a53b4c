//! Checkout through the hosted payment provider.
//!
//! The cart never leaves the browser until checkout: [`CheckoutService::start`]
//! hands its lines to the `create-checkout` function, which creates the
//! provider session and returns the hosted payment page. After payment the
//! provider redirects back with the session id, and
//! [`CheckoutService::verify`] asks `verify-payment` for the outcome.

use std::sync::Arc;

use rural_grow_core::{Cart, NotificationKind, PaymentStatus, Price};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::{info, instrument, warn};

use super::notifications::{Notification, Notifier};
use crate::baas::{AccessToken, BaasError, FunctionsApi, Identity};

/// Errors that can occur during checkout.
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// Nothing to pay for.
    #[error("cart is empty")]
    EmptyCart,

    /// The provider session came back without a payment page.
    #[error("checkout session {0} has no redirect URL")]
    MissingRedirect(String),

    /// BaaS function call failed.
    #[error("checkout service error: {0}")]
    Baas(#[from] BaasError),
}

/// A provider checkout session.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutSession {
    pub session_id: String,
    #[serde(default)]
    pub url: Option<String>,
}

/// Outcome reported by `verify-payment`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentVerification {
    pub success: bool,
    pub status: PaymentStatus,
    #[serde(default)]
    pub amount: Option<Price>,
}

/// Starts and verifies checkouts.
#[derive(Clone)]
pub struct CheckoutService {
    functions: Arc<dyn FunctionsApi>,
    notifier: Notifier,
    base_url: String,
}

impl CheckoutService {
    /// `base_url` is the public marketplace URL the provider returns to.
    #[must_use]
    pub fn new(functions: Arc<dyn FunctionsApi>, notifier: Notifier, base_url: &str) -> Self {
        Self {
            functions,
            notifier,
            base_url: base_url.trim_end_matches('/').to_owned(),
        }
    }

    /// Create a checkout session for `cart` and notify every farmer in it.
    ///
    /// Returns the session; redirect the buyer to its `url`. Notification
    /// failures are logged and do not fail the checkout.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::EmptyCart` without any remote call if the cart
    /// is empty, `CheckoutError::MissingRedirect` if the provider returned no
    /// payment page, or `CheckoutError::Baas` if the function call fails.
    #[instrument(skip(self, cart, buyer, token), fields(buyer_id = %buyer.id, items = cart.items().len()))]
    pub async fn start(
        &self,
        cart: &Cart,
        buyer: &Identity,
        token: Option<&AccessToken>,
    ) -> Result<CheckoutSession, CheckoutError> {
        if cart.is_empty() {
            return Err(CheckoutError::EmptyCart);
        }

        let body = json!({
            "items": cart.items(),
            "buyerId": buyer.id,
            "successUrl": format!("{}/payment-success?session_id={{CHECKOUT_SESSION_ID}}", self.base_url),
            "cancelUrl": format!("{}/cart", self.base_url),
        });
        let response = self.functions.invoke("create-checkout", body, token).await?;
        let session: CheckoutSession = serde_json::from_value(response).map_err(BaasError::from)?;
        if session.url.is_none() {
            return Err(CheckoutError::MissingRedirect(session.session_id));
        }

        for farmer in cart.farmers() {
            let lines = cart
                .items()
                .iter()
                .filter(|item| item.farmer_id == Some(farmer))
                .count();
            let notification = Notification {
                recipient: farmer,
                title: "New purchase request".to_owned(),
                message: format!("{} is buying {lines} item(s) from you", buyer.email),
                kind: NotificationKind::Request,
                related_id: Some(session.session_id.clone()),
            };
            if let Err(e) = self.notifier.send(&notification, token).await {
                warn!(farmer_id = %farmer, error = %e, "Failed to notify farmer");
            }
        }

        info!(session_id = %session.session_id, total = %cart.total_price(), "Checkout started");
        Ok(session)
    }

    /// Ask the provider whether a checkout session was paid.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::Baas` if the function call fails or the session
    /// is unknown.
    #[instrument(skip(self, token))]
    pub async fn verify(
        &self,
        session_id: &str,
        token: Option<&AccessToken>,
    ) -> Result<PaymentVerification, CheckoutError> {
        let response = self
            .functions
            .invoke("verify-payment", json!({ "sessionId": session_id }), token)
            .await?;
        let verification: PaymentVerification =
            serde_json::from_value(response).map_err(BaasError::from)?;
        info!(success = verification.success, status = ?verification.status, "Payment verified");
        Ok(verification)
    }
}
