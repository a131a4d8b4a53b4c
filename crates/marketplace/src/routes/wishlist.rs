//! Wishlist route handlers.
//!
//! Every mutation answers with the reloaded snapshot.

use axum::Json;
use rural_grow_core::ProductId;
use serde::Deserialize;
use tracing::instrument;

use crate::baas::WishlistEntry;
use crate::error::Result;
use crate::middleware::Client;

/// Wishlist mutation request body.
#[derive(Debug, Deserialize)]
pub struct WishlistChange {
    pub product_id: ProductId,
}

/// The wishlist, newest first.
#[instrument(skip_all)]
pub async fn show(Client(client): Client) -> Result<Json<Vec<WishlistEntry>>> {
    client.wishlist.refetch().await?;
    Ok(Json(client.wishlist.items().await))
}

/// Save a product.
#[instrument(skip(client))]
pub async fn add(
    Client(client): Client,
    Json(body): Json<WishlistChange>,
) -> Result<Json<Vec<WishlistEntry>>> {
    client.wishlist.add_to_wishlist(body.product_id).await?;
    Ok(Json(client.wishlist.items().await))
}

/// Remove a saved product.
#[instrument(skip(client))]
pub async fn remove(
    Client(client): Client,
    Json(body): Json<WishlistChange>,
) -> Result<Json<Vec<WishlistEntry>>> {
    client.wishlist.remove_from_wishlist(body.product_id).await?;
    Ok(Json(client.wishlist.items().await))
}
