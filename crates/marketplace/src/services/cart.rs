//! Cart store.
//!
//! Wraps the pure [`Cart`] with durable per-browser storage: the cart is
//! restored once when the store opens and written back after every mutation.
//! Storage failures never fail a cart operation; they are logged and the
//! in-memory cart stays authoritative for the rest of the request.

use std::num::NonZeroU32;

use async_trait::async_trait;
use rural_grow_core::{CART_STORAGE_KEY, Cart, CartProduct, Price, ProductId};
use thiserror::Error;
use tracing::warn;

/// Error reading or writing the cart's durable storage.
#[derive(Debug, Error)]
#[error("cart storage error: {0}")]
pub struct StorageError(pub String);

/// Durable key-value storage scoped to one browser.
#[async_trait]
pub trait CartStorage: Send + Sync {
    /// Read the value stored under `key`.
    async fn load(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Replace the value stored under `key`.
    async fn save(&self, key: &str, value: &str) -> Result<(), StorageError>;
}

/// Cart bound to its storage.
#[derive(Debug)]
pub struct CartStore<S> {
    storage: S,
    cart: Cart,
}

impl<S: CartStorage> CartStore<S> {
    /// Open the cart, restoring whatever the storage holds.
    ///
    /// Unreadable storage and corrupt values both yield an empty cart.
    pub async fn open(storage: S) -> Self {
        let raw = match storage.load(CART_STORAGE_KEY).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "Failed to load cart; starting empty");
                None
            }
        };
        let cart = Cart::restore(raw.as_deref());
        Self { storage, cart }
    }

    /// The current cart.
    #[must_use]
    pub const fn cart(&self) -> &Cart {
        &self.cart
    }

    /// Add `quantity` of a product, merging with an existing line.
    pub async fn add_item(&mut self, product: CartProduct, quantity: NonZeroU32) {
        self.cart.add_item(product, quantity);
        self.persist().await;
    }

    /// Set a line's quantity (clamped to at least 1).
    pub async fn update_quantity(&mut self, id: ProductId, quantity: i64) {
        self.cart.update_quantity(id, quantity);
        self.persist().await;
    }

    /// Remove a line. Removing an absent product is a no-op.
    pub async fn remove_item(&mut self, id: ProductId) {
        self.cart.remove_item(id);
        self.persist().await;
    }

    /// Empty the cart.
    pub async fn clear(&mut self) {
        self.cart.clear();
        self.persist().await;
    }

    #[must_use]
    pub fn total_items(&self) -> u64 {
        self.cart.total_items()
    }

    #[must_use]
    pub fn total_price(&self) -> Price {
        self.cart.total_price()
    }

    async fn persist(&self) {
        if let Err(e) = self
            .storage
            .save(CART_STORAGE_KEY, &self.cart.persist())
            .await
        {
            warn!(error = %e, items = self.cart.items().len(), "Failed to persist cart");
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use memory::MemoryCartStorage;

#[cfg(any(test, feature = "test-support"))]
mod memory {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;

    use super::{CartStorage, StorageError};

    /// In-memory cart storage with switchable write failures.
    #[derive(Debug, Clone, Default)]
    pub struct MemoryCartStorage {
        values: Arc<Mutex<HashMap<String, String>>>,
        fail_writes: Arc<AtomicBool>,
    }

    impl MemoryCartStorage {
        /// Storage pre-filled with `value` under `key`.
        #[must_use]
        pub fn with_value(key: &str, value: &str) -> Self {
            let storage = Self::default();
            storage
                .values
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .insert(key.to_owned(), value.to_owned());
            storage
        }

        /// Make every subsequent write fail (or succeed again).
        pub fn fail_writes(&self, fail: bool) {
            self.fail_writes.store(fail, Ordering::SeqCst);
        }

        /// The raw stored value.
        #[must_use]
        pub fn get(&self, key: &str) -> Option<String> {
            self.values
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .get(key)
                .cloned()
        }
    }

    #[async_trait]
    impl CartStorage for MemoryCartStorage {
        async fn load(&self, key: &str) -> Result<Option<String>, StorageError> {
            Ok(self.get(key))
        }

        async fn save(&self, key: &str, value: &str) -> Result<(), StorageError> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(StorageError("quota exceeded".to_owned()));
            }
            self.values
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .insert(key.to_owned(), value.to_owned());
            Ok(())
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rural_grow_core::UserId;

    use super::*;

    fn qty(n: u32) -> NonZeroU32 {
        NonZeroU32::new(n).unwrap()
    }

    fn avocado() -> CartProduct {
        CartProduct {
            id: ProductId::generate(),
            name: "Avocado".to_owned(),
            price: Price::from_units(1500),
            unit: "kg".to_owned(),
            image_url: None,
            farmer_id: Some(UserId::generate()),
        }
    }

    #[tokio::test]
    async fn test_mutations_are_persisted() {
        let storage = MemoryCartStorage::default();
        let mut store = CartStore::open(storage.clone()).await;
        let product = avocado();

        store.add_item(product.clone(), qty(2)).await;
        store.add_item(product.clone(), qty(1)).await;

        assert_eq!(store.total_items(), 3);
        assert_eq!(store.total_price(), Price::from_units(4500));

        let reopened = CartStore::open(storage.clone()).await;
        assert_eq!(reopened.cart(), store.cart());
    }

    #[tokio::test]
    async fn test_corrupt_storage_opens_empty() {
        let storage = MemoryCartStorage::with_value(CART_STORAGE_KEY, "{not json");
        let store = CartStore::open(storage).await;
        assert!(store.cart().is_empty());
    }

    #[tokio::test]
    async fn test_write_failure_keeps_mutation() {
        let storage = MemoryCartStorage::default();
        let mut store = CartStore::open(storage.clone()).await;
        storage.fail_writes(true);

        store.add_item(avocado(), qty(4)).await;

        assert_eq!(store.total_items(), 4);
        assert_eq!(storage.get(CART_STORAGE_KEY), None);
    }

    #[tokio::test]
    async fn test_update_remove_clear() {
        let storage = MemoryCartStorage::default();
        let mut store = CartStore::open(storage.clone()).await;
        let product = avocado();
        store.add_item(product.clone(), qty(5)).await;

        store.update_quantity(product.id, 0).await;
        assert_eq!(store.cart().get(product.id).unwrap().quantity, 1);

        store.remove_item(product.id).await;
        store.remove_item(product.id).await;
        assert!(store.cart().is_empty());

        store.add_item(product, qty(1)).await;
        store.clear().await;
        assert_eq!(storage.get(CART_STORAGE_KEY).as_deref(), Some("[]"));
    }
}
