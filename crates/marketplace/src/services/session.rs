//! Session/role store.
//!
//! Tracks the current identity and its role for one browser session.
//!
//! # State machine
//!
//! ```text
//! uninitialized -> loading -> authenticated(resolved role)
//!                          -> authenticated(unresolved role)
//!                          -> unauthenticated
//! ```
//!
//! Every [`AuthEvent`] moves the store back to `loading` (for sign-in and
//! token refresh) or straight to `unauthenticated` (for sign-out), then one
//! role lookup settles it. Each event bumps an epoch; a lookup that finishes
//! after a newer event or after [`SessionStore::sign_out`] sees a different
//! epoch and its result is dropped.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rural_grow_core::{AuthPhase, Role, Route, SessionRole};
use serde::Serialize;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, info, info_span, warn};

use super::auth::{AuthClient, AuthEvent};
use super::roles::RoleDirectory;
use crate::baas::{AuthSession, Identity};

/// Snapshot of the store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionState {
    pub phase: AuthPhase,
    pub identity: Option<Identity>,
}

impl SessionState {
    /// The state of a browser with no identity.
    #[must_use]
    pub const fn unauthenticated() -> Self {
        Self {
            phase: AuthPhase::Unauthenticated,
            identity: None,
        }
    }
}

/// Shared between the store, its listener task and in-flight role lookups.
#[derive(Clone)]
struct Shared {
    state: Arc<watch::Sender<SessionState>>,
    epoch: Arc<AtomicU64>,
    roles: RoleDirectory,
    role_timeout: Duration,
}

impl Shared {
    fn advance(&self) -> u64 {
        self.epoch.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn handle(&self, event: AuthEvent) {
        let epoch = self.advance();
        match event {
            AuthEvent::InitialSession(None) | AuthEvent::SignedOut => {
                debug!(epoch, "No session");
                self.state.send_replace(SessionState::unauthenticated());
            }
            AuthEvent::InitialSession(Some(session))
            | AuthEvent::SignedIn(session)
            | AuthEvent::TokenRefreshed(session) => {
                self.state.send_replace(SessionState {
                    phase: AuthPhase::Loading,
                    identity: Some(session.user.clone()),
                });
                let shared = self.clone();
                let span = info_span!("role_lookup", user_id = %session.user.id, epoch);
                tokio::spawn(async move { shared.resolve_role(session, epoch).await }.instrument(span));
            }
        }
    }

    /// One bounded lookup, no retries. Any failure settles as unresolved.
    async fn resolve_role(&self, session: AuthSession, epoch: u64) {
        let lookup = self
            .roles
            .resolve(session.user.id, Some(&session.access_token));
        let role = match tokio::time::timeout(self.role_timeout, lookup).await {
            Ok(Ok(Some(role))) => SessionRole::Resolved(role),
            Ok(Ok(None)) => {
                info!("No role assignment");
                SessionRole::Unresolved
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Role lookup failed");
                SessionRole::Unresolved
            }
            Err(_) => {
                warn!(timeout_secs = self.role_timeout.as_secs(), "Role lookup timed out");
                SessionRole::Unresolved
            }
        };

        let applied = self.state.send_if_modified(|state| {
            if self.epoch.load(Ordering::SeqCst) != epoch {
                return false;
            }
            state.phase = AuthPhase::Authenticated(role);
            true
        });
        if applied {
            debug!(?role, "Role settled");
        } else {
            debug!("Discarding stale role lookup");
        }
    }
}

/// Session/role store for one browser session.
pub struct SessionStore {
    auth: Arc<AuthClient>,
    shared: Shared,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("state", &*self.shared.state.borrow())
            .finish_non_exhaustive()
    }
}

impl SessionStore {
    /// Create an uninitialized store.
    #[must_use]
    pub fn new(auth: Arc<AuthClient>, roles: RoleDirectory, role_timeout: Duration) -> Self {
        let (state, _) = watch::channel(SessionState::default());
        Self {
            auth,
            shared: Shared {
                state: Arc::new(state),
                epoch: Arc::new(AtomicU64::new(0)),
                roles,
                role_timeout,
            },
            listener: Mutex::new(None),
        }
    }

    /// Start listening to the auth client. Calling it again is a no-op.
    pub async fn initialize(&self) {
        if self.is_listening() {
            return;
        }

        self.shared.state.send_modify(|state| state.phase = AuthPhase::Loading);
        let events = self.auth.subscribe();
        let initial = self.auth.session().await;

        let shared = self.shared.clone();
        let handle = tokio::spawn(
            async move {
                shared.handle(AuthEvent::InitialSession(initial));
                listen(shared, events).await;
            }
            .instrument(info_span!("session_listener")),
        );

        let mut slot = self
            .listener
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        match slot.as_ref() {
            // Lost a race with a concurrent initialize
            Some(_) => handle.abort(),
            None => *slot = Some(handle),
        }
    }

    fn is_listening(&self) -> bool {
        self.listener
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .is_some()
    }

    /// The current identity. Never blocks.
    #[must_use]
    pub fn current_identity(&self) -> Option<Identity> {
        self.shared.state.borrow().identity.clone()
    }

    /// The current role; `Unresolved` while loading, signed out, or after a
    /// failed lookup.
    #[must_use]
    pub fn current_role(&self) -> SessionRole {
        match self.shared.state.borrow().phase {
            AuthPhase::Authenticated(role) => role,
            _ => SessionRole::Unresolved,
        }
    }

    /// The current phase.
    #[must_use]
    pub fn phase(&self) -> AuthPhase {
        self.shared.state.borrow().phase
    }

    /// A snapshot of the whole state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.shared.state.borrow().clone()
    }

    /// Returns `true` if the settled role is `role`.
    #[must_use]
    pub fn has_role(&self, role: Role) -> bool {
        self.current_role().is(role)
    }

    /// Receiver notified on every state change.
    #[must_use]
    pub fn changes(&self) -> watch::Receiver<SessionState> {
        self.shared.state.subscribe()
    }

    /// Wait until the state satisfies `predicate`, returning that state.
    pub async fn wait_until(&self, mut predicate: impl FnMut(&SessionState) -> bool) -> SessionState {
        let mut rx = self.shared.state.subscribe();
        match rx.wait_for(|state| predicate(state)).await {
            Ok(state) => state.clone(),
            // The sender lives in `self`, so this only happens during teardown
            Err(_) => self.state(),
        }
    }

    /// Wait for the next terminal state.
    pub async fn settled(&self) -> SessionState {
        self.wait_until(|state| state.phase.is_settled()).await
    }

    /// Sign out: revoke the remote session, clear local state, and return the
    /// route to navigate to.
    ///
    /// The auth client is cleared before the signed-out state is published, so
    /// subscribers woken by it never see the previous identity there.
    pub async fn sign_out(&self) -> Route {
        // Invalidate in-flight lookups before anything can await
        self.shared.advance();
        self.auth.sign_out().await;
        self.shared.state.send_replace(SessionState::unauthenticated());
        Route::Landing
    }

    /// Stop listening to the auth client.
    pub fn dispose(&self) {
        if let Some(handle) = self
            .listener
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
    }
}

impl Drop for SessionStore {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Process auth events in order until the auth client goes away.
async fn listen(shared: Shared, mut events: broadcast::Receiver<AuthEvent>) {
    loop {
        match events.recv().await {
            Ok(event) => shared.handle(event),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "Auth events dropped; waiting for the next one");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rural_grow_core::UserId;
    use secrecy::SecretString;

    use super::*;
    use crate::baas::memory::MemoryBackend;

    const TIMEOUT: Duration = Duration::from_secs(2);

    struct Fixture {
        backend: MemoryBackend,
        auth: Arc<AuthClient>,
        store: SessionStore,
    }

    fn fixture_with_timeout(role_timeout: Duration) -> Fixture {
        let backend = MemoryBackend::new();
        let auth = Arc::new(AuthClient::new(
            Arc::new(backend.clone()),
            Arc::new(backend.clone()),
        ));
        let store = SessionStore::new(
            auth.clone(),
            RoleDirectory::new(Arc::new(backend.clone())),
            role_timeout,
        );
        Fixture {
            backend,
            auth,
            store,
        }
    }

    fn fixture() -> Fixture {
        fixture_with_timeout(TIMEOUT)
    }

    async fn sign_in(fx: &Fixture, email: &str) -> UserId {
        fx.auth
            .sign_in(email, &SecretString::from("harvest-2025"))
            .await
            .unwrap()
            .id
    }

    async fn settled_for(store: &SessionStore, user: UserId) -> SessionState {
        tokio::time::timeout(
            TIMEOUT,
            store.wait_until(|s| {
                s.phase.is_settled() && s.identity.as_ref().map(|i| i.id) == Some(user)
            }),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_starts_uninitialized_then_settles_unauthenticated() {
        let fx = fixture();
        assert_eq!(fx.store.phase(), AuthPhase::Uninitialized);

        fx.store.initialize().await;
        let state = tokio::time::timeout(TIMEOUT, fx.store.settled()).await.unwrap();

        assert_eq!(state.phase, AuthPhase::Unauthenticated);
        assert_eq!(fx.store.current_identity(), None);
        assert_eq!(fx.store.current_role(), SessionRole::Unresolved);
    }

    #[tokio::test]
    async fn test_sign_in_resolves_role() {
        let fx = fixture();
        fx.backend
            .add_user_with_role("kamau@farm.test", "harvest-2025", Some(Role::Farmer));
        fx.store.initialize().await;

        let user = sign_in(&fx, "kamau@farm.test").await;
        let state = settled_for(&fx.store, user).await;

        assert_eq!(
            state.phase,
            AuthPhase::Authenticated(SessionRole::Resolved(Role::Farmer))
        );
        assert!(fx.store.has_role(Role::Farmer));
    }

    #[tokio::test]
    async fn test_initial_session_is_picked_up() {
        let fx = fixture();
        fx.backend
            .add_user_with_role("kamau@farm.test", "harvest-2025", Some(Role::Seller));
        let user = sign_in(&fx, "kamau@farm.test").await;

        fx.store.initialize().await;
        let state = settled_for(&fx.store, user).await;

        assert_eq!(
            state.phase,
            AuthPhase::Authenticated(SessionRole::Resolved(Role::Seller))
        );
    }

    #[tokio::test]
    async fn test_missing_role_settles_unresolved() {
        let fx = fixture();
        fx.backend
            .add_user_with_role("new@farm.test", "harvest-2025", None);
        fx.store.initialize().await;

        let user = sign_in(&fx, "new@farm.test").await;
        let state = settled_for(&fx.store, user).await;

        assert_eq!(state.phase, AuthPhase::Authenticated(SessionRole::Unresolved));
        assert!(fx.store.current_identity().is_some());
    }

    #[tokio::test]
    async fn test_lookup_failure_settles_unresolved() {
        let fx = fixture();
        fx.backend
            .add_user_with_role("kamau@farm.test", "harvest-2025", Some(Role::Admin));
        fx.backend.fail_table("user_roles", 1);
        fx.store.initialize().await;

        let user = sign_in(&fx, "kamau@farm.test").await;
        let state = settled_for(&fx.store, user).await;

        assert_eq!(state.phase, AuthPhase::Authenticated(SessionRole::Unresolved));
    }

    #[tokio::test]
    async fn test_slow_lookup_times_out() {
        let fx = fixture_with_timeout(Duration::from_millis(50));
        fx.backend
            .add_user_with_role("kamau@farm.test", "harvest-2025", Some(Role::Admin));
        fx.backend.delay_table("user_roles", Duration::from_millis(500));
        fx.store.initialize().await;

        let user = sign_in(&fx, "kamau@farm.test").await;
        let state = settled_for(&fx.store, user).await;

        assert_eq!(state.phase, AuthPhase::Authenticated(SessionRole::Unresolved));
    }

    #[tokio::test]
    async fn test_sign_out_discards_in_flight_lookup() {
        let fx = fixture();
        fx.backend
            .add_user_with_role("kamau@farm.test", "harvest-2025", Some(Role::Admin));
        fx.backend.delay_table("user_roles", Duration::from_millis(200));
        fx.store.initialize().await;

        sign_in(&fx, "kamau@farm.test").await;
        tokio::time::timeout(TIMEOUT, fx.store.wait_until(|s| {
            s.phase == AuthPhase::Loading && s.identity.is_some()
        }))
            .await
            .unwrap();

        assert_eq!(fx.store.sign_out().await, Route::Landing);
        tokio::time::sleep(Duration::from_millis(400)).await;

        assert_eq!(fx.store.phase(), AuthPhase::Unauthenticated);
        assert_eq!(fx.store.current_role(), SessionRole::Unresolved);
        assert_eq!(fx.store.current_identity(), None);
    }

    #[tokio::test]
    async fn test_dispose_stops_listening() {
        let fx = fixture();
        fx.backend
            .add_user_with_role("kamau@farm.test", "harvest-2025", Some(Role::Farmer));
        fx.store.initialize().await;
        tokio::time::timeout(TIMEOUT, fx.store.settled()).await.unwrap();

        fx.store.dispose();
        sign_in(&fx, "kamau@farm.test").await;
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(fx.store.phase(), AuthPhase::Unauthenticated);
    }
}
