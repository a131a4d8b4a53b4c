//! Wishlist store.
//!
//! Remote-backed list of saved products for the signed-in identity. Every
//! mutation is followed by a full reload, so the snapshot always reflects what
//! the `wishlist` table holds rather than an optimistic local guess.
//!
//! The snapshot remembers whose wishlist it is. Reads compare that owner with
//! the auth client's current identity and see nothing on a mismatch, so a
//! previous user's entries are never shown after sign-out or a user switch.

use std::sync::Arc;

use rural_grow_core::{ProductId, UserId};
use thiserror::Error;
use tokio::sync::{RwLock, watch};
use tokio::task::JoinHandle;
use tracing::{debug, instrument, warn};

use super::auth::{AuthClient, AuthError};
use super::session::SessionState;
use crate::baas::{BaasError, DataApi, Order, Query, WishlistEntry};

const TABLE: &str = "wishlist";

/// Columns selected for the snapshot, with the product embedded.
const SNAPSHOT_COLUMNS: &str = "id,product_id,created_at,\
    products(id,name,price,unit,image_url,stock_quantity,is_available,farmer_id)";

/// Errors returned by wishlist operations.
#[derive(Debug, Error)]
pub enum WishlistError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Baas(#[from] BaasError),
}

/// Loaded entries and the identity they belong to.
#[derive(Debug, Default)]
struct Snapshot {
    owner: Option<UserId>,
    entries: Vec<WishlistEntry>,
}

impl Snapshot {
    /// The entries, if they belong to `viewer`.
    fn visible_to(&self, viewer: Option<UserId>) -> &[WishlistEntry] {
        match (self.owner, viewer) {
            (Some(owner), Some(viewer)) if owner == viewer => &self.entries,
            _ => &[],
        }
    }
}

/// Wishlist of one browser session.
pub struct WishlistStore {
    data: Arc<dyn DataApi>,
    auth: Arc<AuthClient>,
    snapshot: RwLock<Snapshot>,
}

impl std::fmt::Debug for WishlistStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WishlistStore").finish_non_exhaustive()
    }
}

impl WishlistStore {
    #[must_use]
    pub fn new(data: Arc<dyn DataApi>, auth: Arc<AuthClient>) -> Self {
        Self {
            data,
            auth,
            snapshot: RwLock::new(Snapshot::default()),
        }
    }

    /// The last loaded snapshot, newest first. Empty unless it was loaded
    /// for the identity that is signed in now.
    pub async fn items(&self) -> Vec<WishlistEntry> {
        let viewer = self.viewer().await;
        self.snapshot.read().await.visible_to(viewer).to_vec()
    }

    /// Returns `true` if the last snapshot of the signed-in identity contains
    /// `product_id`.
    pub async fn is_in_wishlist(&self, product_id: ProductId) -> bool {
        let viewer = self.viewer().await;
        self.snapshot
            .read()
            .await
            .visible_to(viewer)
            .iter()
            .any(|entry| entry.product_id == product_id)
    }

    /// Reload the snapshot for the signed-in identity. Signed out, the
    /// snapshot is emptied.
    ///
    /// # Errors
    ///
    /// Returns `WishlistError` if the token or the lookup fails; the previous
    /// snapshot is kept.
    #[instrument(skip(self))]
    pub async fn refetch(&self) -> Result<(), WishlistError> {
        let viewer = self.viewer().await;
        self.load(viewer).await
    }

    async fn viewer(&self) -> Option<UserId> {
        self.auth.identity().await.map(|identity| identity.id)
    }

    /// Load the entries of `user`, or empty the snapshot for `None`.
    async fn load(&self, user: Option<UserId>) -> Result<(), WishlistError> {
        let Some(user) = user else {
            *self.snapshot.write().await = Snapshot::default();
            return Ok(());
        };
        let token = self.auth.access_token().await?;

        let query = Query::table(TABLE)
            .select(SNAPSHOT_COLUMNS)
            .eq("user_id", user)
            .order("created_at", Order::Desc);
        let entries = self
            .data
            .select_as::<WishlistEntry>(&query, token.as_ref())
            .await
            .inspect_err(|e| warn!(user_id = %user, error = %e, "Failed to load wishlist"))?;

        debug!(count = entries.len(), "Wishlist loaded");
        *self.snapshot.write().await = Snapshot {
            owner: Some(user),
            entries,
        };
        Ok(())
    }

    /// Bring the snapshot in line with a session state carrying `identity`.
    ///
    /// The state is trusted for sign-out: `None` clears without asking the
    /// auth client. A new identity is loaded only while the auth client still
    /// agrees, since the state may already be outdated.
    async fn sync(&self, identity: Option<UserId>) {
        let result = match identity {
            None => self.load(None).await,
            Some(user) if self.viewer().await == Some(user) => self.load(Some(user)).await,
            Some(user) => {
                debug!(user_id = %user, "Skipping wishlist load for outdated identity");
                Ok(())
            }
        };
        // Failures are logged by load; the next change retries
        let _ = result;
    }

    /// Save a product. Already-saved products and signed-out callers are
    /// no-ops.
    ///
    /// # Errors
    ///
    /// Returns `WishlistError` if a remote call fails.
    #[instrument(skip(self))]
    pub async fn add_to_wishlist(&self, product_id: ProductId) -> Result<(), WishlistError> {
        let Some(user) = self.auth.identity().await else {
            return Ok(());
        };
        let token = self.auth.access_token().await?;

        let existing = Query::table(TABLE)
            .select("id")
            .eq("user_id", user.id)
            .eq("product_id", product_id)
            .limit(1);
        let found = self
            .data
            .select(&existing, token.as_ref())
            .await
            .inspect_err(|e| warn!(error = %e, "Failed to check wishlist"))?;
        if !found.is_empty() {
            debug!("Already in wishlist");
            return Ok(());
        }

        self.data
            .insert(TABLE, vec![row(user.id, product_id)], token.as_ref())
            .await
            .inspect_err(|e| warn!(error = %e, "Failed to add to wishlist"))?;
        self.refetch().await
    }

    /// Remove a product. Absent products and signed-out callers are no-ops.
    ///
    /// # Errors
    ///
    /// Returns `WishlistError` if a remote call fails.
    #[instrument(skip(self))]
    pub async fn remove_from_wishlist(&self, product_id: ProductId) -> Result<(), WishlistError> {
        let Some(user) = self.auth.identity().await else {
            return Ok(());
        };
        let token = self.auth.access_token().await?;

        let query = Query::table(TABLE)
            .eq("user_id", user.id)
            .eq("product_id", product_id);
        self.data
            .delete(&query, token.as_ref())
            .await
            .inspect_err(|e| warn!(error = %e, "Failed to remove from wishlist"))?;
        self.refetch().await
    }

    /// Reload whenever the session's identity changes, until the session
    /// store goes away.
    #[must_use]
    pub fn follow(self: &Arc<Self>, mut changes: watch::Receiver<SessionState>) -> JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let mut current = identity_of(&changes.borrow_and_update());
            if current.is_some() {
                store.sync(current).await;
            }
            while changes.changed().await.is_ok() {
                let next = identity_of(&changes.borrow_and_update());
                if next != current {
                    current = next;
                    store.sync(next).await;
                }
            }
        })
    }
}

fn identity_of(state: &SessionState) -> Option<UserId> {
    state.identity.as_ref().map(|identity| identity.id)
}

fn row(user: UserId, product: ProductId) -> serde_json::Value {
    serde_json::json!({ "user_id": user, "product_id": product })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use std::time::Duration;

    use secrecy::SecretString;
    use serde_json::json;

    use super::*;
    use crate::baas::memory::MemoryBackend;

    struct Fixture {
        backend: MemoryBackend,
        auth: Arc<AuthClient>,
        wishlist: Arc<WishlistStore>,
    }

    fn fixture() -> Fixture {
        let backend = MemoryBackend::new();
        let auth = Arc::new(AuthClient::new(
            Arc::new(backend.clone()),
            Arc::new(backend.clone()),
        ));
        let wishlist = Arc::new(WishlistStore::new(Arc::new(backend.clone()), auth.clone()));
        Fixture {
            backend,
            auth,
            wishlist,
        }
    }

    fn product(backend: &MemoryBackend, name: &str) -> ProductId {
        let id = ProductId::generate();
        backend.insert_row(
            "products",
            json!({
                "id": id,
                "farmer_id": UserId::generate(),
                "name": name,
                "price": 20,
                "unit": "piece",
                "stock_quantity": 300,
            }),
        );
        id
    }

    async fn signed_in(fx: &Fixture) -> UserId {
        fx.backend.add_user("achieng@buyers.test", "passion-fruit");
        fx.auth
            .sign_in("achieng@buyers.test", &SecretString::from("passion-fruit"))
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn test_add_is_idempotent() {
        let fx = fixture();
        signed_in(&fx).await;
        let avocado = product(&fx.backend, "Avocado");

        fx.wishlist.add_to_wishlist(avocado).await.unwrap();
        fx.wishlist.add_to_wishlist(avocado).await.unwrap();

        assert_eq!(fx.backend.rows(TABLE).len(), 1);
        assert!(fx.wishlist.is_in_wishlist(avocado).await);
        let items = fx.wishlist.items().await;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].product.as_ref().unwrap().name, "Avocado");
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let fx = fixture();
        signed_in(&fx).await;
        let avocado = product(&fx.backend, "Avocado");
        fx.wishlist.add_to_wishlist(avocado).await.unwrap();

        fx.wishlist.remove_from_wishlist(avocado).await.unwrap();
        fx.wishlist.remove_from_wishlist(avocado).await.unwrap();

        assert!(!fx.wishlist.is_in_wishlist(avocado).await);
        assert!(fx.backend.rows(TABLE).is_empty());
    }

    #[tokio::test]
    async fn test_signed_out_is_noop() {
        let fx = fixture();
        let avocado = product(&fx.backend, "Avocado");

        fx.wishlist.add_to_wishlist(avocado).await.unwrap();

        assert!(fx.backend.rows(TABLE).is_empty());
        assert!(fx.wishlist.items().await.is_empty());
    }

    #[tokio::test]
    async fn test_remote_failure_is_returned_and_snapshot_kept() {
        let fx = fixture();
        signed_in(&fx).await;
        let avocado = product(&fx.backend, "Avocado");
        fx.wishlist.add_to_wishlist(avocado).await.unwrap();

        fx.backend.fail_table(TABLE, 1);
        let err = fx.wishlist.refetch().await.unwrap_err();

        assert!(matches!(err, WishlistError::Baas(_)));
        assert!(fx.wishlist.is_in_wishlist(avocado).await);
    }

    #[tokio::test]
    async fn test_only_own_entries_are_loaded() {
        let fx = fixture();
        let user = signed_in(&fx).await;
        let avocado = product(&fx.backend, "Avocado");
        let mango = product(&fx.backend, "Mango");
        fx.backend.insert_row(TABLE, row(UserId::generate(), mango));
        fx.backend.insert_row(TABLE, row(user, avocado));

        fx.wishlist.refetch().await.unwrap();

        assert!(fx.wishlist.is_in_wishlist(avocado).await);
        assert!(!fx.wishlist.is_in_wishlist(mango).await);
    }

    #[tokio::test]
    async fn test_snapshot_of_previous_user_is_hidden() {
        let fx = fixture();
        let user = signed_in(&fx).await;
        let avocado = product(&fx.backend, "Avocado");
        fx.backend.insert_row(TABLE, row(user, avocado));
        fx.wishlist.refetch().await.unwrap();

        fx.backend.add_user("baraka@buyers.test", "sugar-cane");
        fx.auth
            .sign_in("baraka@buyers.test", &SecretString::from("sugar-cane"))
            .await
            .unwrap();

        // Not reloaded yet, but the entries belong to someone else
        assert!(!fx.wishlist.is_in_wishlist(avocado).await);
        assert!(fx.wishlist.items().await.is_empty());

        fx.wishlist.refetch().await.unwrap();
        assert!(fx.wishlist.items().await.is_empty());
    }

    #[tokio::test]
    async fn test_sign_out_hides_wishlist_at_once() {
        let fx = fixture();
        let roles = crate::services::RoleDirectory::new(Arc::new(fx.backend.clone()));
        let session = crate::services::SessionStore::new(
            Arc::clone(&fx.auth),
            roles,
            Duration::from_secs(1),
        );
        session.initialize().await;
        let follower = fx.wishlist.follow(session.changes());

        let user = fx.backend.add_user("achieng@buyers.test", "passion-fruit");
        let avocado = product(&fx.backend, "Avocado");
        fx.backend.insert_row(TABLE, row(user, avocado));
        fx.auth
            .sign_in("achieng@buyers.test", &SecretString::from("passion-fruit"))
            .await
            .unwrap();
        tokio::time::timeout(Duration::from_secs(2), async {
            while !fx.wishlist.is_in_wishlist(avocado).await {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        session.sign_out().await;

        assert!(!fx.wishlist.is_in_wishlist(avocado).await);
        assert!(fx.wishlist.items().await.is_empty());

        session.dispose();
        follower.abort();
    }

    #[tokio::test]
    async fn test_sync_skips_identity_auth_no_longer_holds() {
        let fx = fixture();
        let user = signed_in(&fx).await;
        let avocado = product(&fx.backend, "Avocado");
        fx.backend.insert_row(TABLE, row(user, avocado));
        fx.auth.sign_out().await;

        fx.wishlist.sync(Some(user)).await;

        assert!(fx.wishlist.snapshot.read().await.owner.is_none());
    }

    #[tokio::test]
    async fn test_follow_reloads_on_identity_change() {
        let fx = fixture();
        let user = signed_in(&fx).await;
        let avocado = product(&fx.backend, "Avocado");
        fx.backend.insert_row(TABLE, row(user, avocado));

        let (tx, rx) = watch::channel(SessionState::default());
        let follower = fx.wishlist.follow(rx);
        tx.send_replace(SessionState {
            phase: rural_grow_core::AuthPhase::Loading,
            identity: fx.auth.identity().await,
        });

        tokio::time::timeout(Duration::from_secs(2), async {
            while !fx.wishlist.is_in_wishlist(avocado).await {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        drop(tx);
        tokio::time::timeout(Duration::from_secs(2), follower)
            .await
            .unwrap()
            .unwrap();
    }
}
