//! Fact value types.
//!
//! Each fact kind the store versions is a concrete type here. Kinds with
//! multiple cases are closed enums; serde writes their discriminant
//! explicitly, so the stored form never depends on framework-managed
//! polymorphism.

use serde::{Deserialize, Serialize};

use crate::address::ResourceAddress;
use crate::amount::TokenAmount;

/// A single metadata entry's value for one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataValue {
    /// Raw metadata bytes as produced by the ledger.
    pub bytes: Vec<u8>,
    /// Whether the entry was locked against further updates.
    pub locked: bool,
}

/// Running supply totals for one resource.
///
/// Maintained exclusively through the incremental fold: each committed
/// transaction contributes a [`SupplyDelta`], and the stored row is always
/// the running sum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSupply {
    /// Net circulating supply: minted minus burnt.
    pub total: TokenAmount,
    /// Cumulative minted amount.
    pub minted: TokenAmount,
    /// Cumulative burnt amount.
    pub burnt: TokenAmount,
}

impl ResourceSupply {
    /// The supply of a resource nothing has happened to yet.
    pub const ZERO: Self = Self {
        total: TokenAmount::ZERO,
        minted: TokenAmount::ZERO,
        burnt: TokenAmount::ZERO,
    };

    /// Applies one transaction's mint/burn contribution.
    pub fn apply(&self, delta: &SupplyDelta) -> Self {
        Self {
            total: self.total + delta.minted - delta.burnt,
            minted: self.minted + delta.minted,
            burnt: self.burnt + delta.burnt,
        }
    }
}

/// One committed transaction's contribution to a resource's supply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupplyDelta {
    /// Amount minted by the transaction.
    pub minted: TokenAmount,
    /// Amount burnt by the transaction.
    pub burnt: TokenAmount,
}

impl SupplyDelta {
    /// A delta that changes nothing.
    pub const ZERO: Self = Self { minted: TokenAmount::ZERO, burnt: TokenAmount::ZERO };

    /// A pure mint.
    pub fn mint(amount: TokenAmount) -> Self {
        Self { minted: amount, burnt: TokenAmount::ZERO }
    }

    /// A pure burn.
    pub fn burn(amount: TokenAmount) -> Self {
        Self { minted: TokenAmount::ZERO, burnt: amount }
    }

    /// True if applying this delta would change nothing.
    pub fn is_zero(&self) -> bool {
        self.minted.is_zero() && self.burnt.is_zero()
    }
}

/// An account's deposit rule for one resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResourcePreference {
    /// Deposits of the resource are accepted.
    Allowed,
    /// Deposits of the resource are rejected.
    Disallowed,
}

/// A badge granting deposit authorization on an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DepositorBadge {
    /// Holding any amount of the resource authorizes deposits.
    Resource {
        /// The badge resource.
        resource: ResourceAddress,
    },
    /// Holding one specific non-fungible authorizes deposits.
    NonFungible {
        /// The badge resource.
        resource: ResourceAddress,
        /// The non-fungible local id within the resource.
        local_id: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supply_apply_accumulates() {
        let supply = ResourceSupply::ZERO
            .apply(&SupplyDelta::mint(TokenAmount::from_units(100)))
            .apply(&SupplyDelta::burn(TokenAmount::from_units(30)));

        assert_eq!(supply.total, TokenAmount::from_units(70));
        assert_eq!(supply.minted, TokenAmount::from_units(100));
        assert_eq!(supply.burnt, TokenAmount::from_units(30));
    }

    #[test]
    fn test_zero_delta_detection() {
        assert!(SupplyDelta::ZERO.is_zero());
        assert!(!SupplyDelta::mint(TokenAmount::from_units(1)).is_zero());
        // A NaN contribution is not "zero" and must reach the fold.
        assert!(!SupplyDelta::mint(TokenAmount::NAN).is_zero());
    }
}
