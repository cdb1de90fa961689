//! Address newtypes for the entities the store tracks.
//!
//! Addresses are opaque strings here; their human-readable encoding is the
//! concern of the layer that produced them. Distinct newtypes keep the
//! store's key-building code honest about which kind of entity it is
//! handling.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Generates a string-backed address newtype.
macro_rules! define_address {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates an address from its string form.
            pub fn new(address: impl Into<String>) -> Self {
                Self(address.into())
            }

            /// Returns the address as a string slice.
            #[inline]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Returns the address bytes used in storage keys.
            #[inline]
            pub fn as_bytes(&self) -> &[u8] {
                self.0.as_bytes()
            }
        }

        impl From<&str> for $name {
            fn from(address: &str) -> Self {
                Self(address.to_string())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

define_address!(
    /// A ledger account holding resources.
    AccountAddress
);

define_address!(
    /// A fungible or non-fungible resource.
    ResourceAddress
);

define_address!(
    /// A network validator.
    ValidatorAddress
);

define_address!(
    /// Any addressable ledger entity (used for metadata facts).
    EntityAddress
);
