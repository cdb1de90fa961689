//! Key encoding for the versioned relations.
//!
//! History rows are keyed `{natural_key}{inverted_from_version:8BE}` where
//! `inverted = u64::MAX - from_version`. A lexicographic scan starting at
//! `{natural_key}{inverted(v)}` therefore visits the key's entries in
//! descending `from_version` order, beginning with the newest entry at or
//! below `v` — the point-in-time lookup is "first matching row wins".
//!
//! Composite natural keys put a 2-byte big-endian length before the owner
//! component so `(account, resource)` pairs cannot collide across accounts.
//! Addresses are expected to stay far below the 64 KiB length limit.

use tidemark_types::{
    decode, encode, AccountAddress, DepositorBadge, EntityAddress, ResourceAddress, StateVersion,
    ValidatorAddress,
};

/// Appends the inverted-version suffix to a natural key.
pub fn versioned_key(natural_key: &[u8], from: StateVersion) -> Vec<u8> {
    let inverted = u64::MAX - from.value();
    let mut key = Vec::with_capacity(natural_key.len() + 8);
    key.extend_from_slice(natural_key);
    key.extend_from_slice(&inverted.to_be_bytes());
    key
}

/// Splits a history row key into its natural key and `from_version`.
///
/// Returns `None` if the key is too short to carry a version suffix.
pub fn split_versioned_key(row_key: &[u8]) -> Option<(&[u8], StateVersion)> {
    if row_key.len() < 8 {
        return None;
    }
    let (natural, suffix) = row_key.split_at(row_key.len() - 8);
    let inverted = u64::from_be_bytes(suffix.try_into().ok()?);
    Some((natural, StateVersion::new(u64::MAX - inverted)))
}

/// Prefixes `rest` with a length-delimited owner component.
fn scoped(owner: &[u8], rest: &[u8]) -> Vec<u8> {
    debug_assert!(owner.len() <= u16::MAX as usize);
    let mut key = Vec::with_capacity(2 + owner.len() + rest.len());
    key.extend_from_slice(&(owner.len() as u16).to_be_bytes());
    key.extend_from_slice(owner);
    key.extend_from_slice(rest);
    key
}

/// Splits a scoped key into its owner and remainder components.
fn split_scoped(key: &[u8]) -> Option<(&[u8], &[u8])> {
    if key.len() < 2 {
        return None;
    }
    let len = u16::from_be_bytes(key[..2].try_into().ok()?) as usize;
    if key.len() < 2 + len {
        return None;
    }
    let (owner, rest) = key[2..].split_at(len);
    Some((owner, rest))
}

/// Natural key of a metadata entry: `(entity, name)`.
pub fn metadata_key(entity: &EntityAddress, name: &str) -> Vec<u8> {
    scoped(entity.as_bytes(), name.as_bytes())
}

/// Natural key of a validator stake fact.
pub fn stake_key(validator: &ValidatorAddress) -> Vec<u8> {
    validator.as_bytes().to_vec()
}

/// Natural key of a resource supply fact.
pub fn supply_key(resource: &ResourceAddress) -> Vec<u8> {
    resource.as_bytes().to_vec()
}

/// Member id of an account balance entry: `(account, resource)`.
pub fn balance_key(account: &AccountAddress, resource: &ResourceAddress) -> Vec<u8> {
    scoped(account.as_bytes(), resource.as_bytes())
}

/// Member id of a resource preference entry: `(account, resource)`.
pub fn preference_key(account: &AccountAddress, resource: &ResourceAddress) -> Vec<u8> {
    scoped(account.as_bytes(), resource.as_bytes())
}

/// Member id of an authorized depositor entry: `(account, badge)`.
///
/// The badge component is its postcard encoding, which is deterministic for
/// a closed enum.
pub fn depositor_key(account: &AccountAddress, badge: &DepositorBadge) -> Vec<u8> {
    let badge_bytes = encode(badge).unwrap_or_default();
    scoped(account.as_bytes(), &badge_bytes)
}

/// Aggregate owner key for an account's collections.
pub fn owner_key(account: &AccountAddress) -> Vec<u8> {
    account.as_bytes().to_vec()
}

/// Recovers the resource component of a balance or preference member id.
pub fn member_resource(member_id: &[u8]) -> Option<ResourceAddress> {
    let (_, rest) = split_scoped(member_id)?;
    let address = std::str::from_utf8(rest).ok()?;
    Some(ResourceAddress::new(address))
}

/// Recovers the badge component of a depositor member id.
pub fn member_badge(member_id: &[u8]) -> Option<DepositorBadge> {
    let (_, rest) = split_scoped(member_id)?;
    decode(rest).ok()
}
