//! Types exchanged with the BaaS.

use chrono::{DateTime, Utc};
use rural_grow_core::{
    CartProduct, Email, OrderId, OrderStatus, PayoutRequestId, PayoutStatus, Price, ProductId,
    PurchaseRequestId, RequestStatus, Role, UserId, WishlistEntryId,
};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

/// A user access token (JWT). Redacted in `Debug`.
#[derive(Debug, Clone)]
pub struct AccessToken(SecretString);

impl AccessToken {
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(SecretString::from(token.into()))
    }

    /// The raw token, for the `Authorization` header.
    #[must_use]
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }
}

/// The authenticated principal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: UserId,
    pub email: Email,
}

/// A signed-in session issued by the auth service.
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub access_token: AccessToken,
    pub refresh_token: SecretString,
    pub expires_at: DateTime<Utc>,
    pub user: Identity,
}

impl AuthSession {
    /// Returns `true` if the access token expires within `leeway`.
    #[must_use]
    pub fn expires_within(&self, leeway: chrono::Duration) -> bool {
        self.expires_at - leeway <= Utc::now()
    }
}

/// Result of a sign-up.
///
/// `session` is `None` when the project requires email confirmation before
/// the first sign-in.
#[derive(Debug, Clone)]
pub struct SignUp {
    pub user: Identity,
    pub session: Option<AuthSession>,
}

/// Row of `user_roles`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleAssignment {
    pub user_id: UserId,
    pub role: Role,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Row of `profiles`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub user_id: UserId,
    pub email: String,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub zip_code: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

/// Editable profile fields; `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zip_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

impl ProfileUpdate {
    /// Returns `true` if no field would change.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.full_name.is_none()
            && self.phone.is_none()
            && self.address.is_none()
            && self.city.is_none()
            && self.state.is_none()
            && self.zip_code.is_none()
            && self.bio.is_none()
            && self.avatar_url.is_none()
    }
}

/// Row of `products`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub farmer_id: UserId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    pub price: Price,
    pub unit: String,
    #[serde(default)]
    pub stock_quantity: i64,
    #[serde(default = "default_true")]
    pub is_available: bool,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

const fn default_true() -> bool {
    true
}

impl Product {
    /// Snapshot of the fields a cart line keeps.
    #[must_use]
    pub fn to_cart_product(&self) -> CartProduct {
        CartProduct {
            id: self.id,
            name: self.name.clone(),
            price: self.price,
            unit: self.unit.clone(),
            image_url: self.image_url.clone(),
            farmer_id: Some(self.farmer_id),
        }
    }
}

/// Fields for a new product listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProduct {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    pub price: Price,
    pub unit: String,
    #[serde(default)]
    pub stock_quantity: i64,
}

/// Product fields embedded in a wishlist row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductSummary {
    pub id: ProductId,
    pub name: String,
    pub price: Price,
    pub unit: String,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub stock_quantity: i64,
    #[serde(default = "default_true")]
    pub is_available: bool,
    pub farmer_id: UserId,
}

/// Row of `wishlist`, with the embedded product when selected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WishlistEntry {
    pub id: WishlistEntryId,
    pub product_id: ProductId,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, rename = "products", skip_serializing_if = "Option::is_none")]
    pub product: Option<ProductSummary>,
}

/// Product fields embedded in order and purchase request rows.
///
/// Which columns arrive depends on the select, so all but name and price are
/// optional.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRef {
    #[serde(default)]
    pub id: Option<ProductId>,
    pub name: String,
    pub price: Price,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
}

/// Row of `orders`, with the embedded product when selected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub id: OrderId,
    pub buyer_id: UserId,
    pub farmer_id: UserId,
    #[serde(default)]
    pub product_id: Option<ProductId>,
    #[serde(default)]
    pub quantity: i64,
    pub total_price: Price,
    pub status: OrderStatus,
    #[serde(default)]
    pub tracking_number: Option<String>,
    #[serde(default)]
    pub estimated_delivery: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, rename = "products", skip_serializing_if = "Option::is_none")]
    pub product: Option<ProductRef>,
}

/// Row of `purchase_requests`, with the embedded product when selected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseRequest {
    pub id: PurchaseRequestId,
    pub buyer_id: UserId,
    pub farmer_id: UserId,
    #[serde(default)]
    pub product_id: Option<ProductId>,
    #[serde(default)]
    pub quantity: i64,
    pub status: RequestStatus,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub total_amount: Option<Price>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, rename = "products", skip_serializing_if = "Option::is_none")]
    pub product: Option<ProductRef>,
}

/// Where a payout is sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PaymentMethod {
    BankTransfer {
        account_name: String,
        account_number: String,
        bank_name: String,
    },
}

/// Row of `payout_requests`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutRequest {
    pub id: PayoutRequestId,
    pub farmer_id: UserId,
    pub amount: Price,
    #[serde(default)]
    pub status: PayoutStatus,
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Result of the `get_farmer_earnings` database function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EarningsSummary {
    pub total_earnings: Price,
    pub available_balance: Price,
    pub pending_balance: Price,
}
