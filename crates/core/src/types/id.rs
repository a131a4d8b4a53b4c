//! Newtype IDs for type-safe entity references.
//!
//! Every row in the BaaS database is keyed by a UUID. Use the `define_id!`
//! macro to create wrappers that prevent accidentally mixing IDs from
//! different tables (a product id is never a user id).

/// Macro to define a type-safe UUID wrapper.
///
/// Creates a newtype wrapper around [`uuid::Uuid`] with:
/// - `Serialize`/`Deserialize` with `#[serde(transparent)]` (a JSON string)
/// - `Debug`, `Clone`, `Copy`, `PartialEq`, `Eq`, `Hash`
/// - `new()`, `generate()`, `as_uuid()`
/// - `Display` and `FromStr`
///
/// # Example
///
/// ```rust
/// # use rural_grow_core::define_id;
/// define_id!(FarmId);
/// define_id!(FieldId);
///
/// let farm = FarmId::generate();
/// let parsed: FarmId = farm.to_string().parse().unwrap();
/// assert_eq!(farm, parsed);
///
/// // These are different types, so this won't compile:
/// // let _: FieldId = farm;
/// ```
#[macro_export]
macro_rules! define_id {
    ($name:ident) => {
        #[derive(
            Debug,
            Clone,
            Copy,
            PartialEq,
            Eq,
            Hash,
            PartialOrd,
            Ord,
            ::serde::Serialize,
            ::serde::Deserialize
        )]
        #[serde(transparent)]
        pub struct $name(::uuid::Uuid);

        impl $name {
            /// Wrap an existing UUID.
            #[must_use]
            pub const fn new(id: ::uuid::Uuid) -> Self {
                Self(id)
            }

            /// Generate a fresh random (v4) id.
            #[must_use]
            pub fn generate() -> Self {
                Self(::uuid::Uuid::new_v4())
            }

            /// Get the underlying UUID.
            #[must_use]
            pub const fn as_uuid(&self) -> ::uuid::Uuid {
                self.0
            }
        }

        impl ::core::fmt::Display for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl ::core::str::FromStr for $name {
            type Err = ::uuid::Error;

            fn from_str(s: &str) -> ::core::result::Result<Self, Self::Err> {
                ::uuid::Uuid::parse_str(s).map(Self)
            }
        }

        impl From<::uuid::Uuid> for $name {
            fn from(id: ::uuid::Uuid) -> Self {
                Self(id)
            }
        }

        impl From<$name> for ::uuid::Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

// Identity and table keys
define_id!(UserId);
define_id!(ProductId);
define_id!(WishlistEntryId);
define_id!(OrderId);
define_id!(PurchaseRequestId);
define_id!(PayoutRequestId);
