//! Authentication client.
//!
//! Owns the current [`AuthSession`] of one browser and publishes an
//! [`AuthEvent`] for every change, the way the BaaS JavaScript client's
//! `onAuthStateChange` does. Dependents (the session store) subscribe to the
//! event stream instead of polling.

mod error;

pub use error::AuthError;

use std::sync::Arc;

use rural_grow_core::{Email, Role};
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use tokio::sync::{RwLock, broadcast};
use tracing::{info, instrument, warn};

use crate::baas::{AccessToken, AuthApi, AuthSession, BaasError, DataApi, Identity};

/// Minimum password length accepted by the auth service.
const MIN_PASSWORD_LENGTH: usize = 6;

/// Buffered events per subscriber before the slowest one lags.
const EVENT_CAPACITY: usize = 16;

/// Access tokens this close to expiry are refreshed before use.
const REFRESH_LEEWAY_SECS: i64 = 60;

/// A change of the authentication session.
#[derive(Debug, Clone)]
pub enum AuthEvent {
    /// The session present when a subscriber starts listening.
    InitialSession(Option<AuthSession>),
    SignedIn(AuthSession),
    SignedOut,
    TokenRefreshed(AuthSession),
}

/// Result of a successful sign-up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignUpOutcome {
    /// Account created and signed in.
    SignedIn(Identity),
    /// Account created; the email must be confirmed before signing in.
    ConfirmationRequired(Identity),
}

/// Authentication client for one browser session.
pub struct AuthClient {
    api: Arc<dyn AuthApi>,
    data: Arc<dyn DataApi>,
    session: RwLock<Option<AuthSession>>,
    events: broadcast::Sender<AuthEvent>,
}

impl std::fmt::Debug for AuthClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthClient")
            .field("subscribers", &self.events.receiver_count())
            .finish_non_exhaustive()
    }
}

impl AuthClient {
    /// Create a signed-out client.
    #[must_use]
    pub fn new(api: Arc<dyn AuthApi>, data: Arc<dyn DataApi>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            api,
            data,
            session: RwLock::new(None),
            events,
        }
    }

    /// Subscribe to session changes.
    ///
    /// Events sent before the call are not replayed; read [`Self::session`]
    /// after subscribing to learn the starting point.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }

    /// The current session, if signed in.
    pub async fn session(&self) -> Option<AuthSession> {
        self.session.read().await.clone()
    }

    /// The current identity, if signed in.
    pub async fn identity(&self) -> Option<Identity> {
        self.session.read().await.as_ref().map(|s| s.user.clone())
    }

    fn emit(&self, event: AuthEvent) {
        // No subscribers is fine; nothing depends on this client yet
        let _ = self.events.send(event);
    }

    async fn store(&self, session: AuthSession) {
        *self.session.write().await = Some(session);
    }

    /// Sign in with email and password.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidEmail` if the email is malformed,
    /// `AuthError::InvalidCredentials` if the auth service rejects the pair, or
    /// `AuthError::Baas` if the service is unreachable.
    #[instrument(skip(self, password))]
    pub async fn sign_in(&self, email: &str, password: &SecretString) -> Result<Identity, AuthError> {
        let email = Email::parse(email)?;
        let session = self
            .api
            .sign_in_with_password(&email, password)
            .await
            .map_err(|e| match e {
                BaasError::InvalidCredentials => AuthError::InvalidCredentials,
                other => AuthError::Baas(other),
            })?;

        let user = session.user.clone();
        self.store(session.clone()).await;
        self.emit(AuthEvent::SignedIn(session));

        info!(user_id = %user.id, "Signed in");
        Ok(user)
    }

    /// Create an account and, when the service signs it in right away, the
    /// profile row and the initial role assignment.
    ///
    /// Only [`Role::Farmer`] and [`Role::Seller`] can be chosen.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::RoleNotSelfAssignable` for `Role::Admin`,
    /// `AuthError::WeakPassword` for short or service-rejected passwords,
    /// `AuthError::UserAlreadyExists` if the email is taken,
    /// `AuthError::EmailRejected` if the service refuses the address, or
    /// `AuthError::Baas` if a remote call fails.
    #[instrument(skip(self, password, full_name))]
    pub async fn sign_up(
        &self,
        email: &str,
        password: &SecretString,
        full_name: Option<&str>,
        role: Role,
    ) -> Result<SignUpOutcome, AuthError> {
        if role == Role::Admin {
            return Err(AuthError::RoleNotSelfAssignable(role));
        }
        let email = Email::parse(email)?;
        validate_password(password)?;

        let metadata = json!({ "full_name": full_name, "role": role });
        let signed_up = self
            .api
            .sign_up(&email, password, metadata)
            .await
            .map_err(sign_up_error)?;

        let Some(session) = signed_up.session else {
            info!(user_id = %signed_up.user.id, "Signed up, awaiting email confirmation");
            return Ok(SignUpOutcome::ConfirmationRequired(signed_up.user));
        };

        let user = session.user.clone();
        let token = Some(&session.access_token);
        self.data
            .insert(
                "profiles",
                vec![json!({
                    "user_id": user.id,
                    "email": user.email.as_str(),
                    "full_name": full_name,
                })],
                token,
            )
            .await?;
        self.data
            .insert(
                "user_roles",
                vec![json!({ "user_id": user.id, "role": role })],
                token,
            )
            .await?;

        self.store(session.clone()).await;
        self.emit(AuthEvent::SignedIn(session));

        info!(user_id = %user.id, %role, "Signed up");
        Ok(SignUpOutcome::SignedIn(user))
    }

    /// Sign out. Local state is cleared even if the remote revocation fails.
    #[instrument(skip(self))]
    pub async fn sign_out(&self) {
        let previous = self.session.write().await.take();
        if let Some(session) = previous {
            if let Err(e) = self.api.sign_out(&session.access_token).await {
                warn!(error = %e, "Remote sign-out failed; session cleared locally");
            }
            info!(user_id = %session.user.id, "Signed out");
        }
        self.emit(AuthEvent::SignedOut);
    }

    /// Exchange the refresh token for a new session.
    ///
    /// An expired refresh token signs the client out.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::NotSignedIn` if there is no session or it can no
    /// longer be refreshed, or `AuthError::Baas` for other failures.
    #[instrument(skip(self))]
    pub async fn refresh(&self) -> Result<AuthSession, AuthError> {
        let refresh_token = self
            .session
            .read()
            .await
            .as_ref()
            .map(|s| SecretString::from(s.refresh_token.expose_secret()))
            .ok_or(AuthError::NotSignedIn)?;

        match self.api.refresh_session(&refresh_token).await {
            Ok(session) => {
                self.store(session.clone()).await;
                self.emit(AuthEvent::TokenRefreshed(session.clone()));
                Ok(session)
            }
            Err(BaasError::SessionExpired | BaasError::InvalidCredentials) => {
                warn!("Refresh token rejected; signing out");
                self.session.write().await.take();
                self.emit(AuthEvent::SignedOut);
                Err(AuthError::NotSignedIn)
            }
            Err(e) => Err(AuthError::Baas(e)),
        }
    }

    /// A usable access token, refreshing first if it is about to expire.
    ///
    /// Returns `Ok(None)` when signed out.
    ///
    /// # Errors
    ///
    /// Returns an error if a needed refresh fails.
    pub async fn access_token(&self) -> Result<Option<AccessToken>, AuthError> {
        let current = self.session.read().await.clone();
        match current {
            None => Ok(None),
            Some(session)
                if !session.expires_within(chrono::Duration::seconds(REFRESH_LEEWAY_SECS)) =>
            {
                Ok(Some(session.access_token))
            }
            Some(_) => self.refresh().await.map(|s| Some(s.access_token)),
        }
    }
}

/// Validate password requirements.
fn validate_password(password: &SecretString) -> Result<(), AuthError> {
    if password.expose_secret().chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AuthError::WeakPassword(format!(
            "Password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }
    Ok(())
}

/// Classify a rejected sign-up by the auth service's error code.
fn sign_up_error(error: BaasError) -> AuthError {
    match error.code() {
        Some("user_already_exists" | "email_exists") => AuthError::UserAlreadyExists,
        Some("weak_password") => AuthError::WeakPassword(match &error {
            BaasError::Api { message, .. } => message.clone(),
            other => other.to_string(),
        }),
        Some("email_address_invalid" | "validation_failed") => {
            AuthError::EmailRejected(error.to_string())
        }
        _ => AuthError::Baas(error),
    }
}
