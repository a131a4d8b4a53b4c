//! Authentication route handlers.
//!
//! Sign-in and sign-up run against the browser's own auth client. Both wait
//! for the session store to settle on the new identity before redirecting, so
//! the dashboard the browser lands on already knows the role.

use std::time::Duration;

use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use rural_grow_core::{Role, Route, UserId};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use tower_sessions::Session;
use tracing::{info, instrument, warn};

use crate::context::ClientContext;
use crate::error::{Result, clear_sentry_user, set_sentry_user};
use crate::services::{SessionState, SignUpOutcome};
use crate::state::AppState;

/// Extra time on top of the role lookup deadline before giving up on settling.
const SETTLE_SLACK: Duration = Duration::from_secs(1);

/// Sign-in request body.
#[derive(Deserialize)]
pub struct SignInRequest {
    pub email: String,
    pub password: String,
}

/// Sign-up request body.
#[derive(Deserialize)]
pub struct SignUpRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub full_name: Option<String>,
    pub role: Role,
}

/// Sign-in page data.
#[derive(Debug, Serialize)]
pub struct SignInView {
    pub view: &'static str,
    pub session: SessionState,
}

/// Body returned when sign-up needs email confirmation first.
#[derive(Debug, Serialize)]
pub struct ConfirmationRequired {
    pub confirmation_required: bool,
    pub email: String,
}

/// Sign-in page.
#[instrument(skip(state, session))]
pub async fn page(State(state): State<AppState>, session: Session) -> Result<Json<SignInView>> {
    let session = state
        .clients()
        .find(&session)
        .await?
        .map_or_else(SessionState::unauthenticated, |client| client.session.state());

    Ok(Json(SignInView {
        view: "sign_in",
        session,
    }))
}

/// Sign in with email and password, then go to the dashboard.
#[instrument(skip(state, session, body), fields(email = %body.email))]
pub async fn sign_in(
    State(state): State<AppState>,
    session: Session,
    Json(body): Json<SignInRequest>,
) -> Result<Response> {
    let client = state.clients().find_or_start(&session).await?;
    let identity = client
        .auth
        .sign_in(&body.email, &SecretString::from(body.password))
        .await?;

    settle(&client, identity.id, state.config().role_fetch_timeout).await;
    set_sentry_user(&identity.id, Some(identity.email.as_str()));

    Ok(Redirect::to(Route::Dashboard.path()).into_response())
}

/// Create an account as a farmer or a buyer.
///
/// When the auth service signs the account in right away this behaves like
/// sign-in; otherwise it answers `201 Created` and the browser stays signed
/// out until the email is confirmed.
#[instrument(skip(state, session, body), fields(email = %body.email, role = %body.role))]
pub async fn sign_up(
    State(state): State<AppState>,
    session: Session,
    Json(body): Json<SignUpRequest>,
) -> Result<Response> {
    let client = state.clients().find_or_start(&session).await?;
    let outcome = client
        .auth
        .sign_up(
            &body.email,
            &SecretString::from(body.password),
            body.full_name.as_deref(),
            body.role,
        )
        .await?;

    match outcome {
        SignUpOutcome::SignedIn(identity) => {
            settle(&client, identity.id, state.config().role_fetch_timeout).await;
            set_sentry_user(&identity.id, Some(identity.email.as_str()));
            Ok(Redirect::to(Route::Dashboard.path()).into_response())
        }
        SignUpOutcome::ConfirmationRequired(identity) => Ok((
            StatusCode::CREATED,
            Json(ConfirmationRequired {
                confirmation_required: true,
                email: identity.email.to_string(),
            }),
        )
            .into_response()),
    }
}

/// Sign out and go to the landing page.
///
/// The cookie session survives so the cart stays with the browser.
#[instrument(skip(state, session))]
pub async fn sign_out(State(state): State<AppState>, session: Session) -> Result<Response> {
    let route = match state.clients().find(&session).await? {
        Some(client) => client.session.sign_out().await,
        None => Route::Landing,
    };
    clear_sentry_user();
    info!("Signed out");

    Ok(Redirect::to(route.path()).into_response())
}

/// Wait until the session store has settled on `user`.
async fn settle(client: &ClientContext, user: UserId, role_timeout: Duration) -> SessionState {
    let settled = client.session.wait_until(|state| {
        state.phase.is_settled() && state.identity.as_ref().map(|i| i.id) == Some(user)
    });

    match tokio::time::timeout(role_timeout + SETTLE_SLACK, settled).await {
        Ok(state) => state,
        Err(_) => {
            warn!(user_id = %user, "Session did not settle after sign-in");
            client.session.state()
        }
    }
}
