//! Role dispatcher.
//!
//! `/dashboard` mounts exactly one dashboard for the viewer's role. A viewer
//! whose role is unresolved is sent back to sign-in.

use axum::{
    Json,
    extract::State,
    response::{IntoResponse, Redirect, Response},
};
use rural_grow_core::{Dashboard, Dispatch};
use serde::Serialize;
use tracing::instrument;

use crate::baas::{Identity, Product, WishlistEntry};
use crate::error::Result;
use crate::middleware::Client;
use crate::models::Viewer;
use crate::state::AppState;

/// Dashboard data for the viewer's role.
#[derive(Debug, Serialize)]
#[serde(tag = "dashboard", rename_all = "snake_case")]
pub enum DashboardView {
    Farmer {
        user: Identity,
        products: Vec<Product>,
    },
    Buyer {
        user: Identity,
        featured: Vec<Product>,
        wishlist: Vec<WishlistEntry>,
    },
    Admin {
        user: Identity,
        users: usize,
        products: usize,
    },
}

/// Number of products featured on the buyer dashboard.
const FEATURED: usize = 6;

/// Mount the dashboard for the viewer's role.
#[instrument(skip_all, fields(user_id = %viewer.id()))]
pub async fn show(
    State(state): State<AppState>,
    viewer: Viewer,
    Client(client): Client,
) -> Result<Response> {
    let dashboard = match Dashboard::dispatch(viewer.role) {
        Dispatch::Mount(dashboard) => dashboard,
        Dispatch::Redirect(route) => return Ok(Redirect::to(route.path()).into_response()),
    };
    let token = client.auth.access_token().await?;
    let token = token.as_ref();
    let user = viewer.identity;

    let view = match dashboard {
        Dashboard::Farmer => DashboardView::Farmer {
            products: state.catalog().farmer_products(user.id, token).await?,
            user,
        },
        Dashboard::Buyer => {
            let mut featured = state.catalog().available_products(token).await?;
            featured.truncate(FEATURED);
            client.wishlist.refetch().await?;
            DashboardView::Buyer {
                featured,
                wishlist: client.wishlist.items().await,
                user,
            }
        }
        Dashboard::Admin => DashboardView::Admin {
            users: state.catalog().profiles(token).await?.len(),
            products: state.catalog().available_products(token).await?.len(),
            user,
        },
    };

    Ok(Json(view).into_response())
}
