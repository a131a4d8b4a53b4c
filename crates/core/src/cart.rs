//! Local shopping cart.
//!
//! The cart is kept per browser profile, never synced to the BaaS. It is an
//! ordered list of line items, unique by product id; adding a product that is
//! already present merges quantities. Totals are computed on read from the
//! line items so they cannot drift.
//!
//! # Persisted format
//!
//! The whole cart is stored as a JSON array under [`CART_STORAGE_KEY`]:
//!
//! ```json
//! [{"id":"…","name":"Tomatoes","price":1500.0,"unit":"kg",
//!   "image_url":null,"quantity":3,"farmer_id":"…"}]
//! ```
//!
//! [`Cart::restore`] never fails: a missing or corrupt value yields an empty
//! cart.

use std::num::NonZeroU32;

use serde::{Deserialize, Serialize};

use crate::types::{Price, ProductId, UserId};

/// Fixed storage key for the serialized cart.
pub const CART_STORAGE_KEY: &str = "rural-grow-cart-v1";

/// Product fields captured when a product is put in the cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartProduct {
    pub id: ProductId,
    pub name: String,
    pub price: Price,
    pub unit: String,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub farmer_id: Option<UserId>,
}

/// A cart line: a product snapshot plus a quantity of at least 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub id: ProductId,
    pub name: String,
    pub price: Price,
    pub unit: String,
    #[serde(default)]
    pub image_url: Option<String>,
    pub quantity: u32,
    #[serde(default)]
    pub farmer_id: Option<UserId>,
}

impl CartItem {
    fn new(product: CartProduct, quantity: u32) -> Self {
        Self {
            id: product.id,
            name: product.name,
            price: product.price,
            unit: product.unit,
            image_url: product.image_url,
            quantity,
            farmer_id: product.farmer_id,
        }
    }

    /// `price × quantity` for this line.
    #[must_use]
    pub fn line_total(&self) -> Price {
        self.price * self.quantity
    }
}

/// An ordered collection of cart lines.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cart {
    items: Vec<CartItem>,
}

impl Cart {
    /// Create an empty cart.
    #[must_use]
    pub const fn new() -> Self {
        Self { items: Vec::new() }
    }

    /// Restore a cart from its persisted value.
    ///
    /// `None`, unparsable JSON, or JSON of the wrong shape all yield an empty
    /// cart. Lines that violate the cart invariants (duplicate ids, zero
    /// quantity) are repaired rather than rejected.
    #[must_use]
    pub fn restore(raw: Option<&str>) -> Self {
        let Some(raw) = raw else {
            return Self::new();
        };

        let Ok(items) = serde_json::from_str::<Vec<CartItem>>(raw) else {
            return Self::new();
        };

        let mut cart = Self::new();
        for item in items {
            let quantity = item.quantity.max(1);
            match cart.items.iter_mut().find(|i| i.id == item.id) {
                Some(existing) => existing.quantity = existing.quantity.saturating_add(quantity),
                None => cart.items.push(CartItem { quantity, ..item }),
            }
        }
        cart
    }

    /// Serialize the cart to its persisted value.
    #[must_use]
    pub fn persist(&self) -> String {
        // A Vec of plain structs with string keys always serializes.
        serde_json::to_string(&self.items).unwrap_or_else(|_| "[]".to_owned())
    }

    /// The line items in insertion order.
    #[must_use]
    pub fn items(&self) -> &[CartItem] {
        &self.items
    }

    /// Look up a line by product id.
    #[must_use]
    pub fn get(&self, id: ProductId) -> Option<&CartItem> {
        self.items.iter().find(|i| i.id == id)
    }

    /// Returns `true` if the cart has no lines.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Add `quantity` of a product.
    ///
    /// If the product is already in the cart its quantity is increased,
    /// otherwise a new line is appended. No stock limit is enforced here.
    pub fn add_item(&mut self, product: CartProduct, quantity: NonZeroU32) {
        let quantity = quantity.get();
        match self.items.iter_mut().find(|i| i.id == product.id) {
            Some(existing) => existing.quantity = existing.quantity.saturating_add(quantity),
            None => self.items.push(CartItem::new(product, quantity)),
        }
    }

    /// Set the quantity of a line, clamped to at least 1.
    ///
    /// Removal is a separate operation; unknown ids are ignored.
    pub fn update_quantity(&mut self, id: ProductId, quantity: i64) {
        let clamped = u32::try_from(quantity.max(1)).unwrap_or(u32::MAX);
        if let Some(item) = self.items.iter_mut().find(|i| i.id == id) {
            item.quantity = clamped;
        }
    }

    /// Remove a line. Removing an absent id is a no-op.
    pub fn remove_item(&mut self, id: ProductId) {
        self.items.retain(|i| i.id != id);
    }

    /// Remove every line.
    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Sum of all line quantities.
    #[must_use]
    pub fn total_items(&self) -> u64 {
        self.items.iter().map(|i| u64::from(i.quantity)).sum()
    }

    /// Sum of `price × quantity` over all lines.
    #[must_use]
    pub fn total_price(&self) -> Price {
        self.items.iter().map(CartItem::line_total).sum()
    }

    /// Distinct farmers supplying the lines, in first-seen order.
    #[must_use]
    pub fn farmers(&self) -> Vec<UserId> {
        let mut farmers: Vec<UserId> = Vec::new();
        for farmer in self.items.iter().filter_map(|i| i.farmer_id) {
            if !farmers.contains(&farmer) {
                farmers.push(farmer);
            }
        }
        farmers
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    fn qty(n: u32) -> NonZeroU32 {
        NonZeroU32::new(n).unwrap()
    }

    fn product(price: i64) -> CartProduct {
        CartProduct {
            id: ProductId::generate(),
            name: "Sukuma wiki".to_owned(),
            price: Price::from_units(price),
            unit: "bunch".to_owned(),
            image_url: None,
            farmer_id: Some(UserId::generate()),
        }
    }

    #[test]
    fn test_re_adding_merges_quantities() {
        let mut cart = Cart::new();
        let tomatoes = product(1500);

        cart.add_item(tomatoes.clone(), qty(2));
        cart.add_item(tomatoes.clone(), qty(1));

        assert_eq!(cart.items().len(), 1);
        assert_eq!(cart.get(tomatoes.id).unwrap().quantity, 3);
        assert_eq!(cart.total_price(), Price::from_units(4500));
    }

    #[test]
    fn test_many_adds_sum_to_one_line() {
        let mut cart = Cart::new();
        let beans = product(80);
        let quantities = [1, 4, 2, 7, 1];
        for q in quantities {
            cart.add_item(beans.clone(), qty(q));
        }
        assert_eq!(cart.items().len(), 1);
        assert_eq!(cart.items()[0].quantity, quantities.iter().sum::<u32>());
    }

    #[test]
    fn test_update_quantity_clamps_to_one() {
        let mut cart = Cart::new();
        let maize = product(50);
        cart.add_item(maize.clone(), qty(5));

        for q in [0, -1, -1000, i64::MIN] {
            cart.update_quantity(maize.id, q);
            assert_eq!(cart.get(maize.id).unwrap().quantity, 1);
        }

        cart.update_quantity(maize.id, 12);
        assert_eq!(cart.get(maize.id).unwrap().quantity, 12);
    }

    #[test]
    fn test_update_unknown_id_is_ignored() {
        let mut cart = Cart::new();
        cart.add_item(product(10), qty(1));
        let before = cart.clone();
        cart.update_quantity(ProductId::generate(), 9);
        assert_eq!(cart, before);
    }

    #[test]
    fn test_remove_is_idempotent() {
        let mut cart = Cart::new();
        let kale = product(30);
        cart.add_item(kale.clone(), qty(1));
        cart.remove_item(kale.id);
        cart.remove_item(kale.id);
        assert!(cart.is_empty());
    }

    #[test]
    fn test_totals_follow_lines() {
        let mut cart = Cart::new();
        let a = product(100);
        let b = product(250);
        cart.add_item(a.clone(), qty(2));
        cart.add_item(b.clone(), qty(3));
        assert_eq!(cart.total_items(), 5);
        assert_eq!(cart.total_price(), Price::from_units(950));

        cart.update_quantity(b.id, 1);
        assert_eq!(cart.total_items(), 3);
        assert_eq!(cart.total_price(), Price::from_units(450));

        cart.clear();
        assert_eq!(cart.total_items(), 0);
        assert_eq!(cart.total_price(), Price::ZERO);
    }

    #[test]
    fn test_persist_clear_restore() {
        let mut cart = Cart::new();
        cart.add_item(product(1500), qty(2));
        let mut decimal = product(0);
        decimal.price = Price::new(rust_decimal::Decimal::new(1299, 2));
        decimal.image_url = Some("products/abc.jpg".to_owned());
        cart.add_item(decimal, qty(1));

        let raw = cart.persist();
        let original = cart.clone();
        cart.clear();
        assert!(cart.is_empty());

        assert_eq!(Cart::restore(Some(&raw)), original);
    }

    #[test]
    fn test_corrupt_value_restores_empty() {
        assert!(Cart::restore(None).is_empty());
        assert!(Cart::restore(Some("")).is_empty());
        assert!(Cart::restore(Some("{not json")).is_empty());
        assert!(Cart::restore(Some("{\"id\": 1}")).is_empty());
        assert!(Cart::restore(Some("[{\"id\": \"x\"}]")).is_empty());
    }

    #[test]
    fn test_restore_repairs_invariants() {
        let id = ProductId::generate();
        let raw = format!(
            r#"[{{"id":"{id}","name":"Eggs","price":15,"unit":"tray","quantity":0}},
                {{"id":"{id}","name":"Eggs","price":15,"unit":"tray","quantity":2}}]"#
        );
        let cart = Cart::restore(Some(&raw));
        assert_eq!(cart.items().len(), 1);
        assert_eq!(cart.items()[0].quantity, 3);
    }

    #[test]
    fn test_farmers_are_distinct() {
        let mut cart = Cart::new();
        let farmer = UserId::generate();
        let mut a = product(1);
        a.farmer_id = Some(farmer);
        let mut b = product(2);
        b.farmer_id = Some(farmer);
        let mut c = product(3);
        c.farmer_id = None;
        cart.add_item(a, qty(1));
        cart.add_item(b, qty(1));
        cart.add_item(c, qty(1));
        assert_eq!(cart.farmers(), vec![farmer]);
    }
}
