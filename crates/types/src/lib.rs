//! Leaf value types for the Tidemark versioned history store.
//!
//! This crate holds everything the store persists but that does not itself
//! touch storage:
//!
//! - `StateVersion` — the store's logical clock
//! - `TokenAmount` — deterministic fixed-point amounts (18 decimal places)
//! - Address newtypes for accounts, resources, validators, and entities
//! - Fact value types (metadata, supply, preferences, depositor badges)
//! - The postcard codec shared by every relation

#![deny(unsafe_code)]

mod address;
mod amount;
mod codec;
mod facts;
mod version;

pub use address::{AccountAddress, EntityAddress, ResourceAddress, ValidatorAddress};
pub use amount::{AmountError, TokenAmount, SUBUNITS_PER_UNIT};
pub use codec::{decode, encode, CodecError};
pub use facts::{DepositorBadge, MetadataValue, ResourcePreference, ResourceSupply, SupplyDelta};
pub use version::{LedgerStateSelector, StateVersion};
