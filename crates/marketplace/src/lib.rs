//! Rural Grow Marketplace library.
//!
//! The web tier and Backend-as-a-Service client as a library, so the router
//! can be driven in-process by tests.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod baas;
pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;

use axum::{Router, body::Body, http::Request, middleware as axum_middleware};
use tower_http::trace::TraceLayer;
use tracing::info_span;

use state::AppState;

/// Build the full application: routes, sessions, request ids, tracing and
/// Sentry.
pub fn app(state: AppState) -> Router {
    let session_layer = middleware::create_session_layer(state.pool(), state.config());

    Router::new()
        .merge(routes::routes(&state))
        .layer(session_layer)
        .layer(axum_middleware::from_fn(middleware::request_id_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                info_span!(
                    "http_request",
                    method = %request.method(),
                    path = %request.uri().path(),
                    request_id = tracing::field::Empty,
                )
            }),
        )
        .with_state(state)
        // Sentry layers (outermost for full request coverage)
        .layer(sentry_tower::NewSentryLayer::new_from_top())
        .layer(sentry_tower::SentryHttpLayer::new().enable_transaction())
}
