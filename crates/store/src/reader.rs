//! The read API.
//!
//! [`LedgerReader`] serves the query layer. Every call runs inside one
//! snapshot-isolated read transaction: a page read that touches the
//! aggregate, the entry history, and the meta table sees one consistent
//! committed state, regardless of concurrent ingestion.
//!
//! Paged reads hand back an opaque cursor. All pages of one pagination are
//! read at the version pinned when the first page was served, so a moving
//! "latest" never makes a pagination inconsistent with itself.

use std::sync::Arc;

use redb::{Database, ReadTransaction};
use snafu::{OptionExt, ResultExt};
use tidemark_types::{
    AccountAddress, DepositorBadge, EntityAddress, LedgerStateSelector, MetadataValue,
    ResourceAddress, ResourcePreference, ResourceSupply, StateVersion, TokenAmount,
    ValidatorAddress,
};

use crate::collection::page_members;
use crate::config::StoreConfig;
use crate::cursor::{Cursor, CursorCodec};
use crate::error::{
    InconsistentCollectionSnafu, MalformedCursorSnafu, Result, StorageSnafu, TableSnafu,
    TransactionSnafu,
};
use crate::history::{History, HistoryEntry};
use crate::keys;
use crate::tables::{FactTable, Tables, TIP_KEY};

/// Collection tags baked into cursor context hashes.
const OWNED_RESOURCES: &str = "owned_resources";
const RESOURCE_PREFERENCES: &str = "resource_preferences";
const AUTHORIZED_DEPOSITORS: &str = "authorized_depositors";

/// Read-side handle to the store. Cheap to clone.
#[derive(Clone)]
pub struct LedgerReader {
    pub(crate) db: Arc<Database>,
    pub(crate) config: StoreConfig,
    pub(crate) cursors: Arc<CursorCodec>,
}

/// How a paged read is addressed: a fresh pagination or a continuation.
#[derive(Debug, Clone)]
pub enum PageRequest {
    /// Start a new pagination pinned at the resolved selector version.
    First {
        /// Which committed state to pin.
        selector: LedgerStateSelector,
        /// Requested page size; `0` means the configured default, larger
        /// values are clamped to the configured maximum.
        limit: usize,
    },
    /// Continue a pagination from a previously issued cursor.
    Continue {
        /// The opaque cursor from the previous page.
        cursor: String,
    },
}

/// One page of a collection read.
#[derive(Debug, Clone)]
pub struct Page<T> {
    /// Items in snapshot order.
    pub items: Vec<T>,
    /// Total membership at the pinned version.
    pub total_count: u64,
    /// The version every page of this pagination reads.
    pub at_version: StateVersion,
    /// Cursor for the next page, absent on the last page.
    pub next_cursor: Option<String>,
}

/// One resource an account holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnedResource {
    /// The resource.
    pub resource: ResourceAddress,
    /// Balance at the pinned version.
    pub balance: TokenAmount,
    /// Version at which the balance last changed.
    pub updated_at: StateVersion,
}

/// One entry of an account's resource preference list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreferenceItem {
    /// The resource the preference applies to.
    pub resource: ResourceAddress,
    /// The preference at the pinned version.
    pub preference: ResourcePreference,
    /// Version at which the preference last changed.
    pub updated_at: StateVersion,
}

/// One entry of an account's authorized depositor list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizedDepositorItem {
    /// The authorizing badge.
    pub badge: DepositorBadge,
    /// Version at which the badge was recorded.
    pub added_at: StateVersion,
}

impl LedgerReader {
    /// Resolves a selector to a concrete state version.
    ///
    /// `None` means the selector cannot be satisfied: the store is empty,
    /// or an explicit version lies beyond the tip.
    pub fn state_version(&self, selector: LedgerStateSelector) -> Result<Option<StateVersion>> {
        let txn = self.begin_read()?;
        self.resolve_in(&txn, selector)
    }

    /// Reads a metadata entry as of the selected state.
    pub fn metadata(
        &self,
        entity: &EntityAddress,
        name: &str,
        selector: LedgerStateSelector,
    ) -> Result<Option<HistoryEntry<MetadataValue>>> {
        self.point_read(Tables::METADATA_HISTORY, keys::metadata_key(entity, name), selector)
    }

    /// Reads a validator's stake as of the selected state.
    pub fn validator_stake(
        &self,
        validator: &ValidatorAddress,
        selector: LedgerStateSelector,
    ) -> Result<Option<HistoryEntry<TokenAmount>>> {
        self.point_read(Tables::VALIDATOR_STAKE_HISTORY, keys::stake_key(validator), selector)
    }

    /// Reads a resource's supply totals as of the selected state.
    pub fn resource_supply(
        &self,
        resource: &ResourceAddress,
        selector: LedgerStateSelector,
    ) -> Result<Option<HistoryEntry<ResourceSupply>>> {
        self.point_read(Tables::RESOURCE_SUPPLY_HISTORY, keys::supply_key(resource), selector)
    }

    /// Reads an account's balance of one resource as of the selected state.
    pub fn balance(
        &self,
        account: &AccountAddress,
        resource: &ResourceAddress,
        selector: LedgerStateSelector,
    ) -> Result<Option<HistoryEntry<TokenAmount>>> {
        self.point_read(
            Tables::ACCOUNT_BALANCE_HISTORY,
            keys::balance_key(account, resource),
            selector,
        )
    }

    /// Pages through the resources an account holds.
    pub fn owned_resources(
        &self,
        account: &AccountAddress,
        request: &PageRequest,
    ) -> Result<Option<Page<OwnedResource>>> {
        self.page_collection::<TokenAmount, _>(
            OWNED_RESOURCES,
            Tables::ACCOUNT_RESOURCE_AGGREGATE,
            Tables::ACCOUNT_BALANCE_HISTORY,
            &keys::owner_key(account),
            request,
            |member_id, entry| {
                let resource = keys::member_resource(member_id).context(
                    InconsistentCollectionSnafu { reason: "undecodable balance member id" },
                )?;
                Ok(OwnedResource {
                    resource,
                    balance: entry.value,
                    updated_at: entry.from_version,
                })
            },
        )
    }

    /// Pages through an account's resource preference list.
    pub fn resource_preferences(
        &self,
        account: &AccountAddress,
        request: &PageRequest,
    ) -> Result<Option<Page<PreferenceItem>>> {
        self.page_collection::<ResourcePreference, _>(
            RESOURCE_PREFERENCES,
            Tables::RESOURCE_PREFERENCE_AGGREGATE,
            Tables::RESOURCE_PREFERENCE_HISTORY,
            &keys::owner_key(account),
            request,
            |member_id, entry| {
                let resource = keys::member_resource(member_id).context(
                    InconsistentCollectionSnafu { reason: "undecodable preference member id" },
                )?;
                Ok(PreferenceItem {
                    resource,
                    preference: entry.value,
                    updated_at: entry.from_version,
                })
            },
        )
    }

    /// Pages through an account's authorized depositor list.
    pub fn authorized_depositors(
        &self,
        account: &AccountAddress,
        request: &PageRequest,
    ) -> Result<Option<Page<AuthorizedDepositorItem>>> {
        self.page_collection::<DepositorBadge, _>(
            AUTHORIZED_DEPOSITORS,
            Tables::AUTHORIZED_DEPOSITOR_AGGREGATE,
            Tables::AUTHORIZED_DEPOSITOR_HISTORY,
            &keys::owner_key(account),
            request,
            |_, entry| {
                Ok(AuthorizedDepositorItem { badge: entry.value, added_at: entry.from_version })
            },
        )
    }

    fn begin_read(&self) -> Result<ReadTransaction> {
        self.db.begin_read().context(TransactionSnafu)
    }

    fn resolve_in(
        &self,
        txn: &ReadTransaction,
        selector: LedgerStateSelector,
    ) -> Result<Option<StateVersion>> {
        let meta = txn.open_table(Tables::STORE_META).context(TableSnafu)?;
        let tip = meta
            .get(TIP_KEY)
            .context(StorageSnafu)?
            .map(|guard| StateVersion::new(guard.value()));
        Ok(match selector {
            LedgerStateSelector::Latest => tip,
            LedgerStateSelector::AtVersion(version) => match tip {
                Some(tip) if version <= tip => Some(version),
                _ => None,
            },
        })
    }

    fn point_read<V: serde::de::DeserializeOwned>(
        &self,
        table: FactTable,
        natural_key: Vec<u8>,
        selector: LedgerStateSelector,
    ) -> Result<Option<HistoryEntry<V>>> {
        let txn = self.begin_read()?;
        let Some(version) = self.resolve_in(&txn, selector)? else {
            return Ok(None);
        };
        let rows = txn.open_table(table).context(TableSnafu)?;
        History::read_at::<V>(&rows, &natural_key, version)
    }

    fn page_collection<V, T>(
        &self,
        collection: &'static str,
        aggregate_table: FactTable,
        entry_table: FactTable,
        owner: &[u8],
        request: &PageRequest,
        mut map_item: impl FnMut(&[u8], HistoryEntry<V>) -> Result<T>,
    ) -> Result<Option<Page<T>>>
    where
        V: serde::de::DeserializeOwned,
    {
        let txn = self.begin_read()?;

        let (offset, limit, version) = match request {
            PageRequest::First { selector, limit } => {
                let Some(version) = self.resolve_in(&txn, *selector)? else {
                    return Ok(None);
                };
                (0u64, self.clamp_limit(*limit), version)
            },
            PageRequest::Continue { cursor } => {
                let cursor = self.cursors.decode(cursor)?;
                self.cursors.validate_context(&cursor, collection, owner)?;
                // A pinned version beyond the tip means history was rolled
                // back underneath the pagination.
                let tip = self.resolve_in(&txn, LedgerStateSelector::Latest)?;
                match tip {
                    Some(tip) if cursor.pinned_version <= tip => {},
                    _ => {
                        return MalformedCursorSnafu {
                            reason: "pinned state version no longer exists",
                        }
                        .fail();
                    },
                }
                (cursor.offset, self.clamp_limit(cursor.limit as usize), cursor.pinned_version)
            },
        };

        let aggregates = txn.open_table(aggregate_table).context(TableSnafu)?;
        let entries = txn.open_table(entry_table).context(TableSnafu)?;
        let raw =
            page_members::<V>(&aggregates, &entries, owner, version, offset as usize, limit)?;

        let next_offset = offset + raw.items.len() as u64;
        let next_cursor = if next_offset < raw.total_count {
            Some(self.cursors.encode(&Cursor::new(
                collection,
                owner,
                next_offset,
                limit as u32,
                version,
            )))
        } else {
            None
        };

        let mut items = Vec::with_capacity(raw.items.len());
        for (member_id, entry) in raw.items {
            items.push(map_item(&member_id, entry)?);
        }

        Ok(Some(Page { items, total_count: raw.total_count, at_version: version, next_cursor }))
    }

    fn clamp_limit(&self, limit: usize) -> usize {
        if limit == 0 {
            self.config.default_page_size
        } else {
            limit.min(self.config.max_page_size)
        }
    }
}
