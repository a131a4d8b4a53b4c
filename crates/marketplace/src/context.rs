//! Per-browser client contexts.
//!
//! Every browser session gets its own auth client, session store and wishlist
//! store, so one visitor's sign-in never leaks into another's. Contexts live in
//! a `moka` cache keyed by an id stored in the cookie session, and are evicted
//! after the same idle period as the cookie itself.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use tokio::task::JoinHandle;
use tower_sessions::Session;
use uuid::Uuid;

use crate::baas::Backend;
use crate::models::session_keys;
use crate::services::{AuthClient, RoleDirectory, SessionStore, WishlistStore};

/// The client-side stores of one browser session.
pub struct ClientContext {
    pub auth: Arc<AuthClient>,
    pub session: SessionStore,
    pub wishlist: Arc<WishlistStore>,
    follower: JoinHandle<()>,
}

impl std::fmt::Debug for ClientContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientContext")
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

impl ClientContext {
    /// Build and start the stores of a new context.
    pub async fn start(backend: &Backend, roles: RoleDirectory, role_timeout: Duration) -> Self {
        let auth = Arc::new(AuthClient::new(
            Arc::clone(&backend.auth),
            Arc::clone(&backend.data),
        ));
        let session = SessionStore::new(Arc::clone(&auth), roles, role_timeout);
        session.initialize().await;

        let wishlist = Arc::new(WishlistStore::new(
            Arc::clone(&backend.data),
            Arc::clone(&auth),
        ));
        let follower = wishlist.follow(session.changes());

        Self {
            auth,
            session,
            wishlist,
            follower,
        }
    }
}

impl Drop for ClientContext {
    fn drop(&mut self) {
        self.follower.abort();
        self.session.dispose();
    }
}

/// Client contexts by id.
#[derive(Clone)]
pub struct ClientRegistry {
    contexts: Cache<Uuid, Arc<ClientContext>>,
    backend: Backend,
    roles: RoleDirectory,
    role_timeout: Duration,
}

impl ClientRegistry {
    #[must_use]
    pub fn new(
        backend: Backend,
        roles: RoleDirectory,
        role_timeout: Duration,
        idle: Duration,
    ) -> Self {
        Self {
            contexts: Cache::builder().time_to_idle(idle).build(),
            backend,
            roles,
            role_timeout,
        }
    }

    /// The context bound to `session`, if it has one that is still alive.
    ///
    /// # Errors
    ///
    /// Returns an error if the cookie session cannot be read.
    pub async fn find(
        &self,
        session: &Session,
    ) -> Result<Option<Arc<ClientContext>>, tower_sessions::session::Error> {
        let Some(id) = session.get::<Uuid>(session_keys::CLIENT_ID).await? else {
            return Ok(None);
        };
        Ok(self.contexts.get(&id).await)
    }

    /// The context bound to `session`, starting a new one if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the cookie session cannot be read or written.
    pub async fn find_or_start(
        &self,
        session: &Session,
    ) -> Result<Arc<ClientContext>, tower_sessions::session::Error> {
        if let Some(context) = self.find(session).await? {
            return Ok(context);
        }

        let id = Uuid::new_v4();
        let context = Arc::new(
            ClientContext::start(&self.backend, self.roles.clone(), self.role_timeout).await,
        );
        self.contexts.insert(id, Arc::clone(&context)).await;
        session.insert(session_keys::CLIENT_ID, id).await?;
        Ok(context)
    }

    /// Drop the context bound to `session`.
    ///
    /// # Errors
    ///
    /// Returns an error if the cookie session cannot be modified.
    pub async fn forget(&self, session: &Session) -> Result<(), tower_sessions::session::Error> {
        if let Some(id) = session.remove::<Uuid>(session_keys::CLIENT_ID).await? {
            self.contexts.invalidate(&id).await;
        }
        Ok(())
    }

    /// Number of live contexts.
    pub async fn live_count(&self) -> u64 {
        self.contexts.run_pending_tasks().await;
        self.contexts.entry_count()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rural_grow_core::AuthPhase;
    use tower_sessions::MemoryStore;

    use super::*;
    use crate::baas::memory::MemoryBackend;

    fn registry() -> ClientRegistry {
        let backend = MemoryBackend::new();
        ClientRegistry::new(
            Backend::from_service(backend.clone()),
            RoleDirectory::new(Arc::new(backend)),
            Duration::from_secs(1),
            Duration::from_secs(60),
        )
    }

    fn cookie_session() -> Session {
        Session::new(None, Arc::new(MemoryStore::default()), None)
    }

    #[tokio::test]
    async fn test_context_is_reused_per_session() {
        let registry = registry();
        let session = cookie_session();

        let first = registry.find_or_start(&session).await.unwrap();
        let second = registry.find_or_start(&session).await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.live_count().await, 1);
    }

    #[tokio::test]
    async fn test_sessions_get_separate_contexts() {
        let registry = registry();

        let first = registry.find_or_start(&cookie_session()).await.unwrap();
        let second = registry.find_or_start(&cookie_session()).await.unwrap();

        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(registry.live_count().await, 2);
    }

    #[tokio::test]
    async fn test_new_context_settles_signed_out() {
        let registry = registry();
        let context = registry.find_or_start(&cookie_session()).await.unwrap();

        let state = context.session.settled().await;

        assert_eq!(state.phase, AuthPhase::Unauthenticated);
    }

    #[tokio::test]
    async fn test_forget_drops_context() {
        let registry = registry();
        let session = cookie_session();
        registry.find_or_start(&session).await.unwrap();

        registry.forget(&session).await.unwrap();

        assert!(registry.find(&session).await.unwrap().is_none());
        assert_eq!(registry.live_count().await, 0);
    }
}
