//! Route guard middleware and extractors.
//!
//! The guard reads the browser's session store and applies a [`RouteGuard`]
//! before the handler runs:
//!
//! - still loading: `202 Accepted` with a neutral waiting body, no redirect
//! - no identity: redirect to `/auth`
//! - role requirement not met (or role unresolved): redirect to `/dashboard`
//! - otherwise the request proceeds with [`Viewer`] and [`Client`] available
//!   as extractors
//!
//! # Example
//!
//! ```rust,ignore
//! Router::new()
//!     .route("/farmer/products", get(list))
//!     .route_layer(middleware::from_fn_with_state(
//!         GuardState::new(state.clone(), RouteGuard::require(Role::Farmer)),
//!         enforce,
//!     ))
//! ```

use std::sync::Arc;

use axum::{
    Json,
    extract::{FromRequestParts, Request, State},
    http::{HeaderValue, StatusCode, header, request::Parts},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use rural_grow_core::{AuthPhase, GuardDecision, Route, RouteGuard};
use serde_json::json;
use tower_sessions::Session;
use tracing::debug;

use crate::context::ClientContext;
use crate::error::AppError;
use crate::models::Viewer;
use crate::services::SessionState;
use crate::state::AppState;

/// State of one guard layer: the app and the requirement it enforces.
#[derive(Clone)]
pub struct GuardState {
    app: AppState,
    guard: RouteGuard,
}

impl GuardState {
    #[must_use]
    pub fn new(app: AppState, guard: RouteGuard) -> Self {
        Self { app, guard }
    }
}

/// Response shown while the session is still settling.
fn waiting() -> Response {
    let mut response = (
        StatusCode::ACCEPTED,
        Json(json!({ "status": "loading" })),
    )
        .into_response();
    response
        .headers_mut()
        .insert(header::RETRY_AFTER, HeaderValue::from_static("1"));
    response
}

/// Guard middleware; see the module docs.
pub async fn enforce(
    State(guard): State<GuardState>,
    session: Session,
    mut request: Request,
    next: Next,
) -> Response {
    let context = match guard.app.clients().find(&session).await {
        Ok(context) => context,
        Err(e) => return AppError::from(e).into_response(),
    };
    let state = context
        .as_ref()
        .map_or_else(SessionState::unauthenticated, |c| c.session.state());

    let decision = guard.guard.check(state.phase);
    debug!(path = %request.uri().path(), phase = ?state.phase, ?decision, "Route guard");

    match decision {
        GuardDecision::Wait => waiting(),
        GuardDecision::Redirect(route) => Redirect::to(route.path()).into_response(),
        GuardDecision::Render => {
            let (Some(context), Some(identity), AuthPhase::Authenticated(role)) =
                (context, state.identity, state.phase)
            else {
                return Redirect::to(Route::SignIn.path()).into_response();
            };
            request.extensions_mut().insert(Viewer { identity, role });
            request.extensions_mut().insert(Client(context));
            next.run(request).await
        }
    }
}

/// Rejection for handlers mounted without the guard.
#[derive(Debug)]
pub struct NotSignedIn;

impl IntoResponse for NotSignedIn {
    fn into_response(self) -> Response {
        Redirect::to(Route::SignIn.path()).into_response()
    }
}

impl<S> FromRequestParts<S> for Viewer
where
    S: Send + Sync,
{
    type Rejection = NotSignedIn;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<Self>().cloned().ok_or(NotSignedIn)
    }
}

/// Extractor for the guarded request's client context.
#[derive(Clone)]
pub struct Client(pub Arc<ClientContext>);

impl<S> FromRequestParts<S> for Client
where
    S: Send + Sync,
{
    type Rejection = NotSignedIn;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<Self>().cloned().ok_or(NotSignedIn)
    }
}
