//! Business logic services for the marketplace.
//!
//! # Services
//!
//! - `auth` - Sign-in, sign-up, sign-out and token refresh, publishing auth events
//! - `session` - Session/role store fed by auth events
//! - `roles` - Role assignments
//! - `cart` - Cart store over per-browser durable storage
//! - `wishlist` - Remote-backed wishlist with reload-after-write
//! - `notifications` - At-least-once user notifications
//! - `checkout` - Hosted checkout and payment verification
//! - `catalog` - Products, product images and profiles
//! - `sales` - Orders and purchase requests
//! - `payouts` - Farmer earnings and payout requests

pub mod auth;
pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod notifications;
pub mod payouts;
pub mod roles;
pub mod sales;
pub mod session;
pub mod wishlist;

pub use auth::{AuthClient, AuthError, AuthEvent, SignUpOutcome};
pub use cart::{CartStorage, CartStore, StorageError};
pub use catalog::{Catalog, CatalogError};
pub use checkout::{CheckoutError, CheckoutService, CheckoutSession, PaymentVerification};
pub use notifications::{Notification, NotificationError, Notifier, RetryPolicy};
pub use payouts::{PayoutError, Payouts};
pub use roles::RoleDirectory;
pub use sales::{Sales, SalesError};
pub use session::{SessionState, SessionStore};
pub use wishlist::{WishlistError, WishlistStore};
