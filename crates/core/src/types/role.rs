//! Marketplace roles.
//!
//! The `user_roles` table stores one of a closed set of role strings. Inside
//! the application a role is always one of these variants, and the state "we do
//! not know the role" is a separate, explicit [`SessionRole::Unresolved`] rather
//! than a missing or unexpected string.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

/// A role assigned to an identity (`app_role` enum in the database).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Platform operator.
    Admin,
    /// Lists produce and fulfils purchase requests.
    Farmer,
    /// Buys produce (shown as "buyer" in the UI).
    Seller,
}

impl Role {
    /// All roles, in display order.
    pub const ALL: [Self; 3] = [Self::Admin, Self::Farmer, Self::Seller];

    /// The database string for this role.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Farmer => "farmer",
            Self::Seller => "seller",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string is not a known role.
#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown role: {0} (expected admin, farmer or seller)")]
pub struct RoleParseError(pub String);

impl FromStr for Role {
    type Err = RoleParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Self::Admin),
            "farmer" => Ok(Self::Farmer),
            "seller" | "buyer" => Ok(Self::Seller),
            _ => Err(RoleParseError(s.to_owned())),
        }
    }
}

/// The role of the current session as far as access decisions are concerned.
///
/// `Unresolved` covers both "still being fetched" and "fetch failed or no row";
/// access checks treat it as not holding any role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "state", content = "role")]
pub enum SessionRole {
    /// A role assignment was loaded.
    Resolved(Role),
    /// No role is known.
    #[default]
    Unresolved,
}

impl SessionRole {
    /// The resolved role, if any.
    #[must_use]
    pub const fn role(&self) -> Option<Role> {
        match self {
            Self::Resolved(role) => Some(*role),
            Self::Unresolved => None,
        }
    }

    /// Returns `true` only when the resolved role equals `role`.
    #[must_use]
    pub fn is(&self, role: Role) -> bool {
        self.role() == Some(role)
    }
}

impl From<Option<Role>> for SessionRole {
    fn from(role: Option<Role>) -> Self {
        role.map_or(Self::Unresolved, Self::Resolved)
    }
}
