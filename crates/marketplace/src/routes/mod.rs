//! HTTP route handlers for the marketplace.
//!
//! # Route Structure
//!
//! ```text
//! GET  /                       - Landing page
//! GET  /health                 - Health check
//!
//! # Auth (sign-in and sign-up are rate limited)
//! GET  /auth                   - Sign-in page
//! POST /auth/sign-in           - Sign in, redirect to /dashboard
//! POST /auth/sign-up           - Sign up as farmer or buyer
//! POST /auth/sign-out          - Sign out, redirect to /
//!
//! # Any signed-in user
//! GET  /dashboard              - Role dispatcher
//! GET  /payment-success        - Verify payment, clear cart when paid
//! GET  /profile                - Own profile
//! POST /profile                - Update own profile
//!
//! # Buyers (seller role)
//! GET  /products               - Available products
//! GET  /cart                   - Cart with totals
//! POST /cart/add               - Add to cart
//! POST /cart/update            - Set line quantity
//! POST /cart/remove            - Remove line
//! POST /cart/clear             - Empty cart
//! POST /checkout               - Start checkout, redirect to payment page
//! GET  /orders                 - Own order history
//! GET  /wishlist               - Wishlist
//! POST /wishlist/add           - Save product
//! POST /wishlist/remove        - Remove saved product
//!
//! # Farmers
//! GET  /farmer/products        - Own products
//! POST /farmer/products        - List a product
//! POST /farmer/products/{id}/image - Upload product image
//! POST /farmer/products/{id}/availability - Open or close for purchase
//! POST /farmer/products/{id}/delete - Delete product
//! GET  /farmer/orders          - Orders for own produce
//! POST /farmer/orders/{id}/status - Move an order along
//! GET  /farmer/requests        - Purchase requests
//! POST /farmer/requests/{id}/decision - Accept or reject, notifying the buyer
//! GET  /farmer/earnings        - Earnings summary and payout history
//! POST /farmer/payouts         - Request a payout
//!
//! # Admins
//! GET  /admin/users            - Users and roles
//! POST /admin/users/{id}/role  - Replace a user's role
//! POST /admin/users/{id}/profile - Edit a user's profile
//! POST /admin/users/{id}/delete - Delete a user's profile
//! GET  /admin/products         - Every product
//! POST /admin/products/{id}/availability - Open or close any product
//! POST /admin/products/{id}/delete - Delete any product
//! ```

pub mod admin;
pub mod auth;
pub mod cart;
pub mod checkout;
pub mod dashboard;
pub mod farmer;
pub mod home;
pub mod orders;
pub mod products;
pub mod profile;
pub mod wishlist;

use axum::{
    Router, middleware,
    routing::{get, post},
};
use rural_grow_core::{Role, RouteGuard};

use crate::middleware::{GuardState, auth_rate_limiter, enforce};
use crate::state::AppState;

/// Put `router` behind a route guard.
fn guarded(router: Router<AppState>, state: &AppState, guard: RouteGuard) -> Router<AppState> {
    router.route_layer(middleware::from_fn_with_state(
        GuardState::new(state.clone(), guard),
        enforce,
    ))
}

/// Create the auth routes router.
pub fn auth_routes() -> Router<AppState> {
    let limited = Router::new()
        .route("/sign-in", post(auth::sign_in))
        .route("/sign-up", post(auth::sign_up))
        .layer(auth_rate_limiter());

    Router::new()
        .route("/", get(auth::page))
        .route("/sign-out", post(auth::sign_out))
        .merge(limited)
}

/// Routes open to any signed-in user.
pub fn member_routes(state: &AppState) -> Router<AppState> {
    let router = Router::new()
        .route("/dashboard", get(dashboard::show))
        .route("/payment-success", get(checkout::payment_success))
        .route("/profile", get(profile::show).post(profile::update));
    guarded(router, state, RouteGuard::Authenticated)
}

/// Routes for buyers.
pub fn buyer_routes(state: &AppState) -> Router<AppState> {
    let router = Router::new()
        .route("/products", get(products::index))
        .route("/cart", get(cart::show))
        .route("/cart/add", post(cart::add))
        .route("/cart/update", post(cart::update))
        .route("/cart/remove", post(cart::remove))
        .route("/cart/clear", post(cart::clear))
        .route("/checkout", post(checkout::start))
        .route("/orders", get(orders::index))
        .route("/wishlist", get(wishlist::show))
        .route("/wishlist/add", post(wishlist::add))
        .route("/wishlist/remove", post(wishlist::remove));
    guarded(router, state, RouteGuard::allow([Role::Seller]))
}

/// Routes for farmers.
pub fn farmer_routes(state: &AppState) -> Router<AppState> {
    let router = Router::new()
        .route("/products", get(farmer::index).post(farmer::create))
        .route("/products/{id}/image", post(farmer::upload_image))
        .route("/products/{id}/availability", post(farmer::set_availability))
        .route("/products/{id}/delete", post(farmer::delete))
        .route("/orders", get(farmer::orders))
        .route("/orders/{id}/status", post(farmer::update_order_status))
        .route("/requests", get(farmer::requests))
        .route("/requests/{id}/decision", post(farmer::decide_request))
        .route("/earnings", get(farmer::earnings))
        .route("/payouts", post(farmer::request_payout));
    guarded(router, state, RouteGuard::require(Role::Farmer))
}

/// Routes for admins.
pub fn admin_routes(state: &AppState) -> Router<AppState> {
    let router = Router::new()
        .route("/users", get(admin::users))
        .route("/users/{id}/role", post(admin::update_role))
        .route("/users/{id}/profile", post(admin::update_profile))
        .route("/users/{id}/delete", post(admin::delete_user))
        .route("/products", get(admin::products))
        .route("/products/{id}/availability", post(admin::set_product_availability))
        .route("/products/{id}/delete", post(admin::delete_product));
    guarded(router, state, RouteGuard::require(Role::Admin))
}

/// Create all routes for the marketplace.
pub fn routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/", get(home::landing))
        .route("/health", get(home::health))
        .nest("/auth", auth_routes())
        .merge(member_routes(state))
        .merge(buyer_routes(state))
        .nest("/farmer", farmer_routes(state))
        .nest("/admin", admin_routes(state))
}
