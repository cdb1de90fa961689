//! Aggregate + entry collection history.
//!
//! A collection (an account's owned resources, its preference list, its
//! authorized depositors) is versioned at two levels:
//!
//! - the aggregate table stores a full membership snapshot whenever the
//!   membership changes — one row per change, regardless of collection
//!   size, and zero rows for unrelated entity updates;
//! - each member's value lives in its own entry history, addressed by the
//!   member id alone, so per-member value changes never touch the
//!   aggregate.
//!
//! A page read resolves the snapshot in force at the requested version,
//! slices it, and dereferences each member id against the entry history at
//! the same version. A member removed from the current snapshot keeps its
//! frozen entry value, reachable only through older snapshots.

use redb::ReadableTable;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use snafu::{OptionExt, ResultExt};
use tidemark_types::{decode, encode, StateVersion};

use crate::error::{CodecSnafu, InconsistentCollectionSnafu, Result, StorageSnafu};
use crate::history::{FactTableMut, History, HistoryEntry};
use crate::keys::{split_versioned_key, versioned_key};

/// Full membership of one collection at one point in time.
///
/// Member ids are the natural keys of the corresponding entry-history rows,
/// in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateSnapshot {
    /// Ordered member ids.
    pub member_ids: Vec<Vec<u8>>,
}

impl AggregateSnapshot {
    /// Number of members in the snapshot.
    pub fn count(&self) -> u64 {
        self.member_ids.len() as u64
    }

    /// True if the snapshot contains the member.
    pub fn contains(&self, member_id: &[u8]) -> bool {
        self.member_ids.iter().any(|m| m == member_id)
    }
}

/// Aggregate history operations over one collection's snapshot table.
pub struct Aggregates;

impl Aggregates {
    /// Records a new membership snapshot for `owner` at `at`.
    ///
    /// Recording twice at the same version overwrites, which coalesces
    /// multiple membership changes inside one ledger transaction into one
    /// snapshot row.
    pub fn record(
        table: &mut FactTableMut<'_>,
        owner: &[u8],
        snapshot: &AggregateSnapshot,
        at: StateVersion,
    ) -> Result<()> {
        let encoded = encode(snapshot).context(CodecSnafu)?;
        let row_key = versioned_key(owner, at);
        table.insert(&row_key[..], &encoded[..]).context(StorageSnafu)?;
        Ok(())
    }

    /// Returns the snapshot in force for `owner` at `version`.
    pub fn read_at(
        table: &impl ReadableTable<&'static [u8], &'static [u8]>,
        owner: &[u8],
        version: StateVersion,
    ) -> Result<Option<(StateVersion, AggregateSnapshot)>> {
        let start = versioned_key(owner, version);

        for row in table.range(start.as_slice()..).context(StorageSnafu)? {
            let (row_key, row_value) = row.context(StorageSnafu)?;
            let row_key = row_key.value();
            if !row_key.starts_with(owner) {
                break;
            }
            if row_key.len() != owner.len() + 8 {
                continue;
            }
            let Some((_, from_version)) = split_versioned_key(row_key) else {
                continue;
            };
            let snapshot: AggregateSnapshot =
                decode(row_value.value()).context(CodecSnafu)?;
            return Ok(Some((from_version, snapshot)));
        }

        Ok(None)
    }

    /// Returns the latest snapshot for `owner`.
    pub fn read_current(
        table: &impl ReadableTable<&'static [u8], &'static [u8]>,
        owner: &[u8],
    ) -> Result<Option<(StateVersion, AggregateSnapshot)>> {
        Self::read_at(table, owner, StateVersion::new(u64::MAX))
    }

    /// Deletes every snapshot born after `target`.
    ///
    /// Snapshots carry no `to_version`, so truncation alone restores the
    /// aggregate relation. Returns the number of rows removed.
    pub fn rollback(table: &mut FactTableMut<'_>, target: StateVersion) -> Result<u64> {
        let mut doomed: Vec<Vec<u8>> = Vec::new();
        for row in table.iter().context(StorageSnafu)? {
            let (row_key, _) = row.context(StorageSnafu)?;
            let row_key = row_key.value();
            let Some((_, from_version)) = split_versioned_key(row_key) else {
                continue;
            };
            if from_version > target {
                doomed.push(row_key.to_vec());
            }
        }
        let removed = doomed.len() as u64;
        for row_key in &doomed {
            table.remove(&row_key[..]).context(StorageSnafu)?;
        }
        Ok(removed)
    }
}

/// One page of a collection read.
#[derive(Debug, Clone)]
pub struct MemberPage<V> {
    /// `(member_id, entry)` pairs in snapshot order.
    pub items: Vec<(Vec<u8>, HistoryEntry<V>)>,
    /// Total membership of the snapshot, independent of the page window.
    pub total_count: u64,
}

/// Reads one page of `owner`'s collection as of `version`.
///
/// An absent snapshot is an empty collection. A member id with no entry at
/// the pinned version means the store is corrupt (entry and snapshot are
/// written together) and surfaces as `InconsistentCollection`.
pub fn page_members<V: DeserializeOwned>(
    aggregates: &impl ReadableTable<&'static [u8], &'static [u8]>,
    entries: &impl ReadableTable<&'static [u8], &'static [u8]>,
    owner: &[u8],
    version: StateVersion,
    offset: usize,
    limit: usize,
) -> Result<MemberPage<V>> {
    let Some((_, snapshot)) = Aggregates::read_at(aggregates, owner, version)? else {
        return Ok(MemberPage { items: Vec::new(), total_count: 0 });
    };

    let total_count = snapshot.count();
    let mut items = Vec::with_capacity(limit.min(snapshot.member_ids.len()));

    for member_id in snapshot.member_ids.iter().skip(offset).take(limit) {
        let entry = History::read_at::<V>(entries, member_id, version)?.context(
            InconsistentCollectionSnafu {
                reason: format!(
                    "member {:?} has no entry at {version}",
                    String::from_utf8_lossy(member_id)
                ),
            },
        )?;
        items.push((member_id.clone(), entry));
    }

    Ok(MemberPage { items, total_count })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::engine::StorageEngine;
    use crate::tables::Tables;
    use redb::Database;
    use std::sync::Arc;

    fn test_db() -> Arc<Database> {
        let db = StorageEngine::open_in_memory().expect("open engine").db();
        let txn = db.begin_write().unwrap();
        {
            let _ = txn.open_table(Tables::ACCOUNT_RESOURCE_AGGREGATE).unwrap();
            let _ = txn.open_table(Tables::ACCOUNT_BALANCE_HISTORY).unwrap();
            let _ = txn.open_table(Tables::ACCOUNT_BALANCE_HEAD).unwrap();
        }
        txn.commit().unwrap();
        db
    }

    fn snapshot_of(members: &[&[u8]]) -> AggregateSnapshot {
        AggregateSnapshot { member_ids: members.iter().map(|m| m.to_vec()).collect() }
    }

    fn add_member(db: &Database, owner: &[u8], members: &[&[u8]], value: u64, at: u64) {
        let txn = db.begin_write().unwrap();
        {
            let mut agg = txn.open_table(Tables::ACCOUNT_RESOURCE_AGGREGATE).unwrap();
            let mut rows = txn.open_table(Tables::ACCOUNT_BALANCE_HISTORY).unwrap();
            let mut head = txn.open_table(Tables::ACCOUNT_BALANCE_HEAD).unwrap();
            Aggregates::record(&mut agg, owner, &snapshot_of(members), StateVersion::new(at))
                .unwrap();
            let new_member = members[members.len() - 1];
            History::append(&mut rows, &mut head, new_member, &value, StateVersion::new(at))
                .unwrap();
        }
        txn.commit().unwrap();
    }

    fn page(
        db: &Database,
        owner: &[u8],
        version: u64,
        offset: usize,
        limit: usize,
    ) -> MemberPage<u64> {
        let txn = db.begin_read().unwrap();
        let agg = txn.open_table(Tables::ACCOUNT_RESOURCE_AGGREGATE).unwrap();
        let rows = txn.open_table(Tables::ACCOUNT_BALANCE_HISTORY).unwrap();
        page_members::<u64>(&agg, &rows, owner, StateVersion::new(version), offset, limit)
            .unwrap()
    }

    #[test]
    fn test_pagination_in_insertion_order() {
        let db = test_db();
        let members: [&[u8]; 5] = [b"m1", b"m2", b"m3", b"m4", b"m5"];
        for (i, _) in members.iter().enumerate() {
            add_member(&db, b"acc", &members[..=i], (i + 1) as u64, 20);
        }

        let first = page(&db, b"acc", 20, 0, 2);
        assert_eq!(first.total_count, 5);
        let ids: Vec<&[u8]> = first.items.iter().map(|(id, _)| id.as_slice()).collect();
        assert_eq!(ids, vec![b"m1".as_slice(), b"m2".as_slice()]);

        let last = page(&db, b"acc", 20, 4, 2);
        assert_eq!(last.total_count, 5);
        assert_eq!(last.items.len(), 1);
        assert_eq!(last.items[0].0, b"m5".to_vec());
    }

    #[test]
    fn test_snapshot_pinning_under_growth() {
        let db = test_db();
        add_member(&db, b"acc", &[b"m1"], 1, 10);
        add_member(&db, b"acc", &[b"m1", b"m2"], 2, 20);

        // At version 10 the collection has one member; at 20 it has two.
        assert_eq!(page(&db, b"acc", 10, 0, 10).total_count, 1);
        assert_eq!(page(&db, b"acc", 20, 0, 10).total_count, 2);
        assert_eq!(page(&db, b"acc", 15, 0, 10).total_count, 1);
    }

    #[test]
    fn test_member_value_changes_do_not_touch_snapshots() {
        let db = test_db();
        add_member(&db, b"acc", &[b"m1"], 1, 10);

        // Update the member's value without recording a snapshot.
        let txn = db.begin_write().unwrap();
        {
            let mut rows = txn.open_table(Tables::ACCOUNT_BALANCE_HISTORY).unwrap();
            let mut head = txn.open_table(Tables::ACCOUNT_BALANCE_HEAD).unwrap();
            History::append(&mut rows, &mut head, b"m1", &9u64, StateVersion::new(30)).unwrap();
        }
        txn.commit().unwrap();

        // Old value at the old version, new value at the new version, and
        // still exactly one snapshot.
        assert_eq!(page(&db, b"acc", 10, 0, 10).items[0].1.value, 1);
        assert_eq!(page(&db, b"acc", 30, 0, 10).items[0].1.value, 9);

        let txn = db.begin_read().unwrap();
        let agg = txn.open_table(Tables::ACCOUNT_RESOURCE_AGGREGATE).unwrap();
        let (from, _) = Aggregates::read_current(&agg, b"acc").unwrap().unwrap();
        assert_eq!(from, StateVersion::new(10));
    }

    #[test]
    fn test_absent_collection_is_empty_page() {
        let db = test_db();
        let result = page(&db, b"nobody", 100, 0, 10);
        assert!(result.items.is_empty());
        assert_eq!(result.total_count, 0);
    }

    #[test]
    fn test_empty_snapshot_is_count_zero() {
        let db = test_db();
        add_member(&db, b"acc", &[b"m1"], 1, 10);

        let txn = db.begin_write().unwrap();
        {
            let mut agg = txn.open_table(Tables::ACCOUNT_RESOURCE_AGGREGATE).unwrap();
            Aggregates::record(&mut agg, b"acc", &snapshot_of(&[]), StateVersion::new(20))
                .unwrap();
        }
        txn.commit().unwrap();

        assert_eq!(page(&db, b"acc", 20, 0, 10).total_count, 0);
        // The old snapshot still answers for the old version.
        assert_eq!(page(&db, b"acc", 19, 0, 10).total_count, 1);
    }

    #[test]
    fn test_removed_member_frozen_value_reachable_via_old_snapshot() {
        let db = test_db();
        add_member(&db, b"acc", &[b"m1", b"m2"], 2, 10);
        let txn = db.begin_write().unwrap();
        {
            let mut rows = txn.open_table(Tables::ACCOUNT_BALANCE_HISTORY).unwrap();
            let mut head = txn.open_table(Tables::ACCOUNT_BALANCE_HEAD).unwrap();
            History::append(&mut rows, &mut head, b"m1", &1u64, StateVersion::new(10)).unwrap();
        }
        txn.commit().unwrap();

        // Remove m1 at version 20: new snapshot without it, no entry write.
        let txn = db.begin_write().unwrap();
        {
            let mut agg = txn.open_table(Tables::ACCOUNT_RESOURCE_AGGREGATE).unwrap();
            Aggregates::record(&mut agg, b"acc", &snapshot_of(&[b"m2"]), StateVersion::new(20))
                .unwrap();
        }
        txn.commit().unwrap();

        let now = page(&db, b"acc", 20, 0, 10);
        assert_eq!(now.total_count, 1);
        assert_eq!(now.items[0].0, b"m2".to_vec());

        // The frozen value is still visible through the older snapshot.
        let before = page(&db, b"acc", 19, 0, 10);
        assert_eq!(before.total_count, 2);
        assert!(before.items.iter().any(|(id, e)| id == b"m1" && e.value == 1));
    }

    #[test]
    fn test_aggregate_rollback_truncates() {
        let db = test_db();
        add_member(&db, b"acc", &[b"m1"], 1, 10);
        add_member(&db, b"acc", &[b"m1", b"m2"], 2, 20);

        let txn = db.begin_write().unwrap();
        {
            let mut agg = txn.open_table(Tables::ACCOUNT_RESOURCE_AGGREGATE).unwrap();
            let removed = Aggregates::rollback(&mut agg, StateVersion::new(15)).unwrap();
            assert_eq!(removed, 1);
        }
        txn.commit().unwrap();

        let txn = db.begin_read().unwrap();
        let agg = txn.open_table(Tables::ACCOUNT_RESOURCE_AGGREGATE).unwrap();
        let (from, snapshot) = Aggregates::read_current(&agg, b"acc").unwrap().unwrap();
        assert_eq!(from, StateVersion::new(10));
        assert_eq!(snapshot.count(), 1);
    }
}
