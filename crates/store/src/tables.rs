//! Table definitions for the versioned relations.
//!
//! Every fact relation persists as two tables: a `*_history` table holding
//! one row per history entry (key `{natural_key}{inverted_from_version:8BE}`)
//! and a `*_head` table holding only the open entry per key — the
//! equivalent of a unique filtered index on "current" rows, giving O(1)
//! current-value lookup.
//!
//! Aggregate tables hold full membership snapshots per owning entity, keyed
//! the same way (`{owner}{inverted_from_version:8BE}`). Key encoding lives
//! in the [`crate::keys`] module.

use redb::TableDefinition;

/// Shorthand for the byte-keyed, byte-valued table shape every relation uses.
pub type FactTable = TableDefinition<'static, &'static [u8], &'static [u8]>;

/// Meta key holding the last ingested state version.
pub const TIP_KEY: &str = "tip";

/// Meta key holding the first ingested state version.
pub const GENESIS_KEY: &str = "genesis";

/// Table definitions for the history store.
pub struct Tables;

impl Tables {
    // =========================================================================
    // Single-valued fact relations (History Ledger)
    // =========================================================================

    /// Entity metadata entries: key = (entity, name).
    pub const METADATA_HISTORY: FactTable = TableDefinition::new("metadata_history");
    /// Open metadata entries.
    pub const METADATA_HEAD: FactTable = TableDefinition::new("metadata_head");

    /// Validator stakes: key = (validator).
    pub const VALIDATOR_STAKE_HISTORY: FactTable =
        TableDefinition::new("validator_stake_history");
    /// Open validator stake entries.
    pub const VALIDATOR_STAKE_HEAD: FactTable = TableDefinition::new("validator_stake_head");

    /// Resource supply running totals: key = (resource). Written only by the fold.
    pub const RESOURCE_SUPPLY_HISTORY: FactTable =
        TableDefinition::new("resource_supply_history");
    /// Open resource supply entries.
    pub const RESOURCE_SUPPLY_HEAD: FactTable = TableDefinition::new("resource_supply_head");

    // =========================================================================
    // Entry relations (collection members, keyed by member id alone)
    // =========================================================================

    /// Account balances: key = (account, resource).
    pub const ACCOUNT_BALANCE_HISTORY: FactTable =
        TableDefinition::new("account_balance_history");
    /// Open account balance entries.
    pub const ACCOUNT_BALANCE_HEAD: FactTable = TableDefinition::new("account_balance_head");

    /// Resource deposit preferences: key = (account, resource).
    pub const RESOURCE_PREFERENCE_HISTORY: FactTable =
        TableDefinition::new("resource_preference_history");
    /// Open resource preference entries.
    pub const RESOURCE_PREFERENCE_HEAD: FactTable =
        TableDefinition::new("resource_preference_head");

    /// Authorized depositor badges: key = (account, badge).
    pub const AUTHORIZED_DEPOSITOR_HISTORY: FactTable =
        TableDefinition::new("authorized_depositor_history");
    /// Open authorized depositor entries.
    pub const AUTHORIZED_DEPOSITOR_HEAD: FactTable =
        TableDefinition::new("authorized_depositor_head");

    // =========================================================================
    // Aggregate relations (membership snapshots per owner)
    // =========================================================================

    /// Resources ever held by an account, in insertion order.
    pub const ACCOUNT_RESOURCE_AGGREGATE: FactTable =
        TableDefinition::new("account_resource_aggregate");

    /// An account's resource preference list membership.
    pub const RESOURCE_PREFERENCE_AGGREGATE: FactTable =
        TableDefinition::new("resource_preference_aggregate");

    /// An account's authorized depositor list membership.
    pub const AUTHORIZED_DEPOSITOR_AGGREGATE: FactTable =
        TableDefinition::new("authorized_depositor_aggregate");

    // =========================================================================
    // Store metadata
    // =========================================================================

    /// Store-wide counters: `tip`, `genesis`.
    pub const STORE_META: TableDefinition<'static, &'static str, u64> =
        TableDefinition::new("store_meta");

    /// All byte-keyed relation tables, for bootstrap, snapshot, and rollback.
    pub const ALL_FACT_TABLES: [FactTable; 15] = [
        Self::METADATA_HISTORY,
        Self::METADATA_HEAD,
        Self::VALIDATOR_STAKE_HISTORY,
        Self::VALIDATOR_STAKE_HEAD,
        Self::RESOURCE_SUPPLY_HISTORY,
        Self::RESOURCE_SUPPLY_HEAD,
        Self::ACCOUNT_BALANCE_HISTORY,
        Self::ACCOUNT_BALANCE_HEAD,
        Self::RESOURCE_PREFERENCE_HISTORY,
        Self::RESOURCE_PREFERENCE_HEAD,
        Self::AUTHORIZED_DEPOSITOR_HISTORY,
        Self::AUTHORIZED_DEPOSITOR_HEAD,
        Self::ACCOUNT_RESOURCE_AGGREGATE,
        Self::RESOURCE_PREFERENCE_AGGREGATE,
        Self::AUTHORIZED_DEPOSITOR_AGGREGATE,
    ];
}
