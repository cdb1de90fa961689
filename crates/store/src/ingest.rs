//! The ingestion pipeline: the store's single writer.
//!
//! The upstream transaction source delivers committed ledger transactions
//! one at a time, each carrying `state_version = previous + 1` and the fact
//! changes it produced. Everything one transaction changes is applied
//! inside one write transaction, so readers never observe a transaction
//! half-ingested.
//!
//! Ordering rules:
//! - a version at or below the tip is a re-delivery: warned, ignored;
//! - a version beyond `tip + 1` is a gap: fatal, the pipeline must never
//!   skip a version;
//! - the first delivered version becomes the store's genesis.

use serde::{Deserialize, Serialize};
use snafu::{ensure, ResultExt};
use tracing::{debug, warn};

use tidemark_types::{
    AccountAddress, DepositorBadge, EntityAddress, MetadataValue, ResourceAddress,
    ResourcePreference, ResourceSupply, StateVersion, SupplyDelta, TokenAmount, ValidatorAddress,
};

use crate::aggregation::fold;
use crate::collection::Aggregates;
use crate::error::{
    CommitSnafu, InvalidStateVersionSnafu, Result, StorageSnafu, TableSnafu, TransactionSnafu,
    VersionGapSnafu,
};
use crate::history::{FactTableMut, History};
use crate::keys;
use crate::store::LedgerStore;
use crate::tables::{Tables, GENESIS_KEY, TIP_KEY};
use crate::StoreError;

/// One committed ledger transaction, as delivered by the transaction source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommittedTransaction {
    /// The transaction's state version, assigned upstream.
    pub state_version: StateVersion,
    /// Every fact change the transaction produced.
    pub changes: Vec<FactChange>,
}

/// One derived fact change within a committed transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FactChange {
    /// A metadata entry was written.
    Metadata {
        /// The entity the entry belongs to.
        entity: EntityAddress,
        /// The entry name.
        name: String,
        /// The new value.
        value: MetadataValue,
    },
    /// A validator's stake changed.
    ValidatorStake {
        /// The validator.
        validator: ValidatorAddress,
        /// The new total stake.
        staked: TokenAmount,
    },
    /// A resource was minted and/or burnt.
    Supply {
        /// The resource.
        resource: ResourceAddress,
        /// The transaction's mint/burn contribution.
        delta: SupplyDelta,
    },
    /// An account's balance of a resource changed.
    Balance {
        /// The account.
        account: AccountAddress,
        /// The resource.
        resource: ResourceAddress,
        /// The new balance.
        amount: TokenAmount,
    },
    /// An account set a deposit preference for a resource.
    PreferenceSet {
        /// The account.
        account: AccountAddress,
        /// The resource.
        resource: ResourceAddress,
        /// The new preference.
        preference: ResourcePreference,
    },
    /// An account removed its deposit preference for a resource.
    PreferenceRemoved {
        /// The account.
        account: AccountAddress,
        /// The resource.
        resource: ResourceAddress,
    },
    /// An account authorized a depositor badge.
    DepositorAdded {
        /// The account.
        account: AccountAddress,
        /// The badge.
        badge: DepositorBadge,
    },
    /// An account revoked a depositor badge.
    DepositorRemoved {
        /// The account.
        account: AccountAddress,
        /// The badge.
        badge: DepositorBadge,
    },
}

/// Outcome of delivering one committed transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// The transaction was applied and the tip advanced.
    Committed,
    /// The version was already ingested; nothing changed.
    AlreadyIngested,
}

/// Every relation's write handle for one ingestion transaction.
struct RelationTables<'txn> {
    metadata_rows: FactTableMut<'txn>,
    metadata_head: FactTableMut<'txn>,
    stake_rows: FactTableMut<'txn>,
    stake_head: FactTableMut<'txn>,
    supply_rows: FactTableMut<'txn>,
    supply_head: FactTableMut<'txn>,
    balance_rows: FactTableMut<'txn>,
    balance_head: FactTableMut<'txn>,
    preference_rows: FactTableMut<'txn>,
    preference_head: FactTableMut<'txn>,
    depositor_rows: FactTableMut<'txn>,
    depositor_head: FactTableMut<'txn>,
    account_resources: FactTableMut<'txn>,
    preference_members: FactTableMut<'txn>,
    depositor_members: FactTableMut<'txn>,
    meta: redb::Table<'txn, &'static str, u64>,
}

impl<'txn> RelationTables<'txn> {
    fn open(txn: &'txn redb::WriteTransaction) -> Result<Self> {
        Ok(Self {
            metadata_rows: txn.open_table(Tables::METADATA_HISTORY).context(TableSnafu)?,
            metadata_head: txn.open_table(Tables::METADATA_HEAD).context(TableSnafu)?,
            stake_rows: txn.open_table(Tables::VALIDATOR_STAKE_HISTORY).context(TableSnafu)?,
            stake_head: txn.open_table(Tables::VALIDATOR_STAKE_HEAD).context(TableSnafu)?,
            supply_rows: txn.open_table(Tables::RESOURCE_SUPPLY_HISTORY).context(TableSnafu)?,
            supply_head: txn.open_table(Tables::RESOURCE_SUPPLY_HEAD).context(TableSnafu)?,
            balance_rows: txn.open_table(Tables::ACCOUNT_BALANCE_HISTORY).context(TableSnafu)?,
            balance_head: txn.open_table(Tables::ACCOUNT_BALANCE_HEAD).context(TableSnafu)?,
            preference_rows: txn
                .open_table(Tables::RESOURCE_PREFERENCE_HISTORY)
                .context(TableSnafu)?,
            preference_head: txn
                .open_table(Tables::RESOURCE_PREFERENCE_HEAD)
                .context(TableSnafu)?,
            depositor_rows: txn
                .open_table(Tables::AUTHORIZED_DEPOSITOR_HISTORY)
                .context(TableSnafu)?,
            depositor_head: txn
                .open_table(Tables::AUTHORIZED_DEPOSITOR_HEAD)
                .context(TableSnafu)?,
            account_resources: txn
                .open_table(Tables::ACCOUNT_RESOURCE_AGGREGATE)
                .context(TableSnafu)?,
            preference_members: txn
                .open_table(Tables::RESOURCE_PREFERENCE_AGGREGATE)
                .context(TableSnafu)?,
            depositor_members: txn
                .open_table(Tables::AUTHORIZED_DEPOSITOR_AGGREGATE)
                .context(TableSnafu)?,
            meta: txn.open_table(Tables::STORE_META).context(TableSnafu)?,
        })
    }
}

impl LedgerStore {
    /// Applies one committed transaction atomically and advances the tip.
    ///
    /// # Errors
    ///
    /// Fatal ordering violations (`VersionGap`, `OutOfOrderAppend`,
    /// `InvalidStateVersion`, a recurring `ConcurrencyConflict`) must abort
    /// the caller's pipeline; see [`StoreError::is_fatal`].
    pub fn commit_transaction(
        &self,
        transaction: &CommittedTransaction,
    ) -> Result<IngestOutcome> {
        let _writer = self.write_gate.lock();

        let version = transaction.state_version;
        ensure!(version.value() >= 1, InvalidStateVersionSnafu { got: version.value() });

        let tip = self.tip()?;
        if let Some(tip) = tip {
            if version <= tip {
                warn!(
                    state_version = version.value(),
                    tip = tip.value(),
                    "state version already ingested; ignoring re-delivery"
                );
                return Ok(IngestOutcome::AlreadyIngested);
            }
            ensure!(
                version == tip.next(),
                VersionGapSnafu { expected: tip.next(), got: version }
            );
        }

        let txn = self.db.begin_write().context(TransactionSnafu)?;
        {
            let mut tables = RelationTables::open(&txn)?;

            for change in &transaction.changes {
                if let Err(error) = apply_change(&mut tables, change, version) {
                    if matches!(error, StoreError::ConcurrencyConflict { .. }) {
                        warn!(
                            state_version = version.value(),
                            "close step affected no open entry; retrying once"
                        );
                        apply_change(&mut tables, change, version)?;
                    } else {
                        return Err(error);
                    }
                }
            }

            tables.meta.insert(TIP_KEY, version.value()).context(StorageSnafu)?;
            if tip.is_none() {
                tables.meta.insert(GENESIS_KEY, version.value()).context(StorageSnafu)?;
            }
        }
        txn.commit().context(CommitSnafu)?;

        debug!(
            state_version = version.value(),
            changes = transaction.changes.len(),
            "ledger transaction ingested"
        );
        Ok(IngestOutcome::Committed)
    }
}

fn apply_change(
    tables: &mut RelationTables<'_>,
    change: &FactChange,
    at: StateVersion,
) -> Result<()> {
    match change {
        FactChange::Metadata { entity, name, value } => History::append(
            &mut tables.metadata_rows,
            &mut tables.metadata_head,
            &keys::metadata_key(entity, name),
            value,
            at,
        ),
        FactChange::ValidatorStake { validator, staked } => History::append(
            &mut tables.stake_rows,
            &mut tables.stake_head,
            &keys::stake_key(validator),
            staked,
            at,
        ),
        FactChange::Supply { resource, delta } => {
            fold::<ResourceSupply>(
                &mut tables.supply_rows,
                &mut tables.supply_head,
                &keys::supply_key(resource),
                delta,
                at,
            )?;
            Ok(())
        },
        FactChange::Balance { account, resource, amount } => {
            let member_id = keys::balance_key(account, resource);
            History::append(
                &mut tables.balance_rows,
                &mut tables.balance_head,
                &member_id,
                amount,
                at,
            )?;
            // Owned-resource membership is add-only: a balance dropping to
            // zero stays listed.
            ensure_member(
                &mut tables.account_resources,
                &keys::owner_key(account),
                &member_id,
                at,
            )
        },
        FactChange::PreferenceSet { account, resource, preference } => {
            let member_id = keys::preference_key(account, resource);
            History::append(
                &mut tables.preference_rows,
                &mut tables.preference_head,
                &member_id,
                preference,
                at,
            )?;
            ensure_member(
                &mut tables.preference_members,
                &keys::owner_key(account),
                &member_id,
                at,
            )
        },
        FactChange::PreferenceRemoved { account, resource } => remove_member(
            &mut tables.preference_members,
            &keys::owner_key(account),
            &keys::preference_key(account, resource),
            at,
        ),
        FactChange::DepositorAdded { account, badge } => {
            let member_id = keys::depositor_key(account, badge);
            History::append(
                &mut tables.depositor_rows,
                &mut tables.depositor_head,
                &member_id,
                badge,
                at,
            )?;
            ensure_member(
                &mut tables.depositor_members,
                &keys::owner_key(account),
                &member_id,
                at,
            )
        },
        FactChange::DepositorRemoved { account, badge } => remove_member(
            &mut tables.depositor_members,
            &keys::owner_key(account),
            &keys::depositor_key(account, badge),
            at,
        ),
    }
}

/// Extends `owner`'s membership snapshot with `member_id` if absent.
fn ensure_member(
    aggregate: &mut FactTableMut<'_>,
    owner: &[u8],
    member_id: &[u8],
    at: StateVersion,
) -> Result<()> {
    let current = Aggregates::read_current(aggregate, owner)?;
    let mut snapshot = current.map(|(_, snapshot)| snapshot).unwrap_or_default();
    if snapshot.contains(member_id) {
        return Ok(());
    }
    snapshot.member_ids.push(member_id.to_vec());
    Aggregates::record(aggregate, owner, &snapshot, at)
}

/// Drops `member_id` from `owner`'s membership snapshot if present.
///
/// The member's entry history is left untouched; its frozen value stays
/// reachable through older snapshots.
fn remove_member(
    aggregate: &mut FactTableMut<'_>,
    owner: &[u8],
    member_id: &[u8],
    at: StateVersion,
) -> Result<()> {
    let Some((_, mut snapshot)) = Aggregates::read_current(aggregate, owner)? else {
        return Ok(());
    };
    if !snapshot.contains(member_id) {
        return Ok(());
    }
    snapshot.member_ids.retain(|m| m != member_id);
    Aggregates::record(aggregate, owner, &snapshot, at)
}
