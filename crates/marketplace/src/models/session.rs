//! Session-related types.
//!
//! The cookie session holds only the id of the browser's client context and
//! the persisted cart; identity and role live in the context's session store.

use rural_grow_core::{Role, SessionRole, UserId};
use serde::Serialize;

use crate::baas::Identity;

/// The signed-in viewer of a guarded request.
///
/// Inserted into request extensions by the route guard once the session has
/// settled and the route's role requirement is met.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Viewer {
    pub identity: Identity,
    pub role: SessionRole,
}

impl Viewer {
    #[must_use]
    pub const fn id(&self) -> UserId {
        self.identity.id
    }

    /// The resolved role, if any.
    #[must_use]
    pub const fn role(&self) -> Option<Role> {
        self.role.role()
    }
}

/// Session keys for marketplace data.
pub mod keys {
    /// Key for the id of the browser's client context.
    pub const CLIENT_ID: &str = "client_id";

    /// Key for the persisted cart.
    pub use rural_grow_core::CART_STORAGE_KEY as CART;
}
