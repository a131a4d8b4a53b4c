//! Product browsing for buyers.

use axum::{Json, extract::State};
use serde::Serialize;
use tracing::{instrument, warn};

use crate::baas::Product;
use crate::error::Result;
use crate::middleware::Client;
use crate::state::AppState;

/// A product as shown in the buyer's listing.
#[derive(Debug, Serialize)]
pub struct ProductCard {
    #[serde(flatten)]
    pub product: Product,
    pub in_wishlist: bool,
}

/// Available products, newest first.
#[instrument(skip_all)]
pub async fn index(
    State(state): State<AppState>,
    Client(client): Client,
) -> Result<Json<Vec<ProductCard>>> {
    let token = client.auth.access_token().await?;
    let products = state.catalog().available_products(token.as_ref()).await?;
    if let Err(e) = client.wishlist.refetch().await {
        warn!(error = %e, "Listing products without wishlist flags");
    }

    let mut cards = Vec::with_capacity(products.len());
    for product in products {
        let in_wishlist = client.wishlist.is_in_wishlist(product.id).await;
        cards.push(ProductCard {
            product,
            in_wishlist,
        });
    }
    Ok(Json(cards))
}
