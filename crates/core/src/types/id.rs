//! Shopify resource IDs.
//!
//! Shopify webhooks carry numeric IDs while the Admin GraphQL API expects
//! global IDs (`gid://shopify/Order/123`). The `define_shopify_id!` macro
//! creates newtypes that render both forms.

/// Macro to define a Shopify resource ID wrapper.
///
/// Creates a newtype wrapper around `u64` with:
/// - `Serialize`/`Deserialize` with `#[serde(transparent)]`
/// - `Debug`, `Clone`, `Copy`, `PartialEq`, `Eq`, `Hash`
/// - `new()`, `as_u64()` and `to_gid()`
/// - `Display` of the numeric form
///
/// # Example
///
/// ```rust
/// # use plateshield_core::define_shopify_id;
/// define_shopify_id!(CustomerId, "Customer");
///
/// let id = CustomerId::new(42);
/// assert_eq!(id.to_gid(), "gid://shopify/Customer/42");
/// ```
#[macro_export]
macro_rules! define_shopify_id {
    ($name:ident, $resource:literal) => {
        #[derive(
            Debug,
            Clone,
            Copy,
            PartialEq,
            Eq,
            Hash,
            ::serde::Serialize,
            ::serde::Deserialize
        )]
        #[serde(transparent)]
        pub struct $name(u64);

        impl $name {
            /// Shopify resource name used in global IDs.
            pub const RESOURCE: &'static str = $resource;

            /// Create a new ID from its numeric value.
            #[must_use]
            pub const fn new(id: u64) -> Self {
                Self(id)
            }

            /// Get the underlying numeric value.
            #[must_use]
            pub const fn as_u64(&self) -> u64 {
                self.0
            }

            /// Format as an Admin API global ID.
            #[must_use]
            pub fn to_gid(&self) -> String {
                format!("gid://shopify/{}/{}", Self::RESOURCE, self.0)
            }
        }

        impl ::core::fmt::Display for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(id: u64) -> Self {
                Self(id)
            }
        }

        impl From<$name> for u64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

define_shopify_id!(OrderId, "Order");
