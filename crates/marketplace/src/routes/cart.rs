//! Cart route handlers.
//!
//! The cart belongs to the browser, not the account: it is persisted in the
//! cookie session under the cart storage key and survives sign-out.

use std::num::NonZeroU32;

use async_trait::async_trait;
use axum::{Json, extract::State};
use rural_grow_core::{CartItem, Price, ProductId};
use serde::{Deserialize, Serialize};
use tower_sessions::Session;
use tracing::instrument;

use crate::error::{AppError, Result, add_breadcrumb};
use crate::middleware::Client;
use crate::services::{CartStorage, CartStore, StorageError};
use crate::state::AppState;

/// Cart storage backed by the cookie session.
#[derive(Debug, Clone)]
pub struct SessionCartStorage(pub Session);

#[async_trait]
impl CartStorage for SessionCartStorage {
    async fn load(&self, key: &str) -> std::result::Result<Option<String>, StorageError> {
        self.0
            .get::<String>(key)
            .await
            .map_err(|e| StorageError(e.to_string()))
    }

    async fn save(&self, key: &str, value: &str) -> std::result::Result<(), StorageError> {
        self.0
            .insert(key, value)
            .await
            .map_err(|e| StorageError(e.to_string()))
    }
}

/// Open the cart of the browser behind `session`.
pub async fn open_cart(session: Session) -> CartStore<SessionCartStorage> {
    CartStore::open(SessionCartStorage(session)).await
}

/// Cart display data.
#[derive(Debug, Serialize)]
pub struct CartView {
    pub items: Vec<CartItem>,
    pub total_items: u64,
    pub total_price: Price,
}

impl<S: CartStorage> From<&CartStore<S>> for CartView {
    fn from(store: &CartStore<S>) -> Self {
        Self {
            items: store.cart().items().to_vec(),
            total_items: store.total_items(),
            total_price: store.total_price(),
        }
    }
}

/// Add to cart request body. A zero quantity is rejected at deserialization.
#[derive(Debug, Deserialize)]
pub struct AddToCart {
    pub product_id: ProductId,
    #[serde(default)]
    pub quantity: Option<NonZeroU32>,
}

/// Update quantity request body.
#[derive(Debug, Deserialize)]
pub struct UpdateQuantity {
    pub product_id: ProductId,
    pub quantity: i64,
}

/// Remove from cart request body.
#[derive(Debug, Deserialize)]
pub struct RemoveFromCart {
    pub product_id: ProductId,
}

/// Show the cart with its totals.
#[instrument(skip_all)]
pub async fn show(session: Session) -> Json<CartView> {
    Json(CartView::from(&open_cart(session).await))
}

/// Add a product, merging with an existing line.
#[instrument(skip(state, client, session))]
pub async fn add(
    State(state): State<AppState>,
    Client(client): Client,
    session: Session,
    Json(body): Json<AddToCart>,
) -> Result<Json<CartView>> {
    let token = client.auth.access_token().await?;
    let product = state.catalog().product(body.product_id, token.as_ref()).await?;
    if !product.is_available {
        return Err(AppError::BadRequest(format!(
            "{} is not available",
            product.name
        )));
    }

    let mut store = open_cart(session).await;
    store
        .add_item(product.to_cart_product(), body.quantity.unwrap_or(NonZeroU32::MIN))
        .await;
    let product_id = product.id.to_string();
    add_breadcrumb("cart", "Added to cart", Some(&[("product_id", product_id.as_str())]));
    Ok(Json(CartView::from(&store)))
}

/// Set the quantity of a line (clamped to at least 1).
#[instrument(skip(session))]
pub async fn update(session: Session, Json(body): Json<UpdateQuantity>) -> Json<CartView> {
    let mut store = open_cart(session).await;
    store.update_quantity(body.product_id, body.quantity).await;
    Json(CartView::from(&store))
}

/// Remove a line.
#[instrument(skip(session))]
pub async fn remove(session: Session, Json(body): Json<RemoveFromCart>) -> Json<CartView> {
    let mut store = open_cart(session).await;
    store.remove_item(body.product_id).await;
    Json(CartView::from(&store))
}

/// Empty the cart.
#[instrument(skip_all)]
pub async fn clear(session: Session) -> Json<CartView> {
    let mut store = open_cart(session).await;
    store.clear().await;
    Json(CartView::from(&store))
}
