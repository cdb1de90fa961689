//! The History Ledger: append-only, point-in-time readable timelines.
//!
//! Each single-valued fact is a timeline of entries, one per change. For a
//! fixed key the entries' version ranges partition the version axis with no
//! gaps or overlaps, and at most one entry per key is open
//! (`to_version = None`).
//!
//! Two tables back every relation:
//! - the history table, keyed `{natural_key}{inverted_from_version:8BE}`,
//!   row value `{ value, to_version }`;
//! - the head table, keyed by the natural key alone, holding the open
//!   entry. One point lookup answers "current value"; it also anchors the
//!   conditional close step inside [`History::append`].
//!
//! All functions take already-opened table handles so the ingestion
//! pipeline can update every relation inside one write transaction.

use redb::{ReadableTable, Table};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use snafu::{ensure, OptionExt, ResultExt};
use tidemark_types::{decode, encode, StateVersion};

use crate::error::{
    CodecSnafu, ConcurrencyConflictSnafu, OutOfOrderAppendSnafu, Result, StorageSnafu,
};
use crate::keys::{split_versioned_key, versioned_key};

/// Write handle shape shared by every relation table.
pub(crate) type FactTableMut<'txn> = Table<'txn, &'static [u8], &'static [u8]>;

/// One entry of a fact's timeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry<V> {
    /// The fact's value over this entry's range.
    pub value: V,
    /// First version at which the value applies.
    pub from_version: StateVersion,
    /// Last version at which the value applies; `None` while current.
    pub to_version: Option<StateVersion>,
}

impl<V> HistoryEntry<V> {
    /// True if this entry is still the current value.
    pub fn is_open(&self) -> bool {
        self.to_version.is_none()
    }
}

/// Persisted form of a history row.
#[derive(Debug, Serialize, Deserialize)]
struct StoredRow<V> {
    value: V,
    to_version: Option<u64>,
}

/// Borrowed form of [`StoredRow`] for encoding without cloning the value.
#[derive(Serialize)]
struct StoredRowRef<'a, V> {
    value: &'a V,
    to_version: Option<u64>,
}

/// Persisted form of a head row. `from_version` is implicit in history row
/// keys but must be explicit here.
#[derive(Debug, Serialize, Deserialize)]
struct StoredHead<V> {
    value: V,
    from_version: u64,
}

/// Borrowed form of [`StoredHead`] for encoding without cloning the value.
#[derive(Serialize)]
struct StoredHeadRef<'a, V> {
    value: &'a V,
    from_version: u64,
}

/// History Ledger operations over one relation's table pair.
pub struct History;

impl History {
    /// Appends a new value for `key` at `at`.
    ///
    /// If an open entry exists it is closed at `at - 1` first; the close is
    /// conditional on the row still being open, and a failed condition is a
    /// [`ConcurrencyConflict`](crate::StoreError::ConcurrencyConflict).
    ///
    /// # Errors
    ///
    /// Returns `OutOfOrderAppend` if `at` is not strictly greater than the
    /// open entry's `from_version`. This is fatal to the caller: appending
    /// anyway would corrupt the timeline partition.
    pub fn append<V: Serialize + DeserializeOwned>(
        rows: &mut FactTableMut<'_>,
        head: &mut FactTableMut<'_>,
        key: &[u8],
        value: &V,
        at: StateVersion,
    ) -> Result<()> {
        if let Some(open) = Self::read_current::<V>(head, key)? {
            ensure!(
                at > open.from_version,
                OutOfOrderAppendSnafu { attempted: at, open_since: open.from_version }
            );

            // Close step. The head said an open row exists; require that it
            // still does and is still open before rewriting it.
            let open_row_key = versioned_key(key, open.from_version);
            let stored: Option<StoredRow<V>> = {
                match rows.get(&open_row_key[..]).context(StorageSnafu)? {
                    Some(guard) => Some(decode(guard.value()).context(CodecSnafu)?),
                    None => None,
                }
            };
            let row = stored
                .filter(|row| row.to_version.is_none())
                .context(ConcurrencyConflictSnafu { open_since: open.from_version })?;

            let closed = StoredRowRef { value: &row.value, to_version: Some(at.value() - 1) };
            let encoded = encode(&closed).context(CodecSnafu)?;
            rows.insert(&open_row_key[..], &encoded[..]).context(StorageSnafu)?;
        }

        let new_row = StoredRowRef { value, to_version: None };
        let encoded = encode(&new_row).context(CodecSnafu)?;
        let row_key = versioned_key(key, at);
        rows.insert(&row_key[..], &encoded[..]).context(StorageSnafu)?;

        let new_head = StoredHeadRef { value, from_version: at.value() };
        let encoded = encode(&new_head).context(CodecSnafu)?;
        head.insert(key, &encoded[..]).context(StorageSnafu)?;

        Ok(())
    }

    /// Returns the open entry for `key`, or `None` if the key has none.
    pub fn read_current<V: DeserializeOwned>(
        head: &impl ReadableTable<&'static [u8], &'static [u8]>,
        key: &[u8],
    ) -> Result<Option<HistoryEntry<V>>> {
        match head.get(key).context(StorageSnafu)? {
            Some(guard) => {
                let stored: StoredHead<V> = decode(guard.value()).context(CodecSnafu)?;
                Ok(Some(HistoryEntry {
                    value: stored.value,
                    from_version: StateVersion::new(stored.from_version),
                    to_version: None,
                }))
            },
            None => Ok(None),
        }
    }

    /// Returns the entry in force for `key` at `version`.
    ///
    /// By the partition invariant this is the unique entry with the
    /// greatest `from_version <= version`; `None` means the key did not
    /// exist yet at that version.
    pub fn read_at<V: DeserializeOwned>(
        rows: &impl ReadableTable<&'static [u8], &'static [u8]>,
        key: &[u8],
        version: StateVersion,
    ) -> Result<Option<HistoryEntry<V>>> {
        let start = versioned_key(key, version);

        for row in rows.range(start.as_slice()..).context(StorageSnafu)? {
            let (row_key, row_value) = row.context(StorageSnafu)?;
            let row_key = row_key.value();

            // Rows of other natural keys that extend `key` byte-wise can
            // interleave; they have a different length and are skipped.
            if !row_key.starts_with(key) {
                break;
            }
            if row_key.len() != key.len() + 8 {
                continue;
            }
            let Some((_, from_version)) = split_versioned_key(row_key) else {
                continue;
            };

            let stored: StoredRow<V> = decode(row_value.value()).context(CodecSnafu)?;
            return Ok(Some(HistoryEntry {
                value: stored.value,
                from_version,
                to_version: stored.to_version.map(StateVersion::new),
            }));
        }

        Ok(None)
    }

    /// Restores one relation to its state at `target`.
    ///
    /// Deletes every entry born after `target`, reopens entries whose
    /// closing successor was deleted, and re-derives the head for every
    /// touched key. Returns the number of rows removed.
    pub fn rollback<V: Serialize + DeserializeOwned>(
        rows: &mut FactTableMut<'_>,
        head: &mut FactTableMut<'_>,
        target: StateVersion,
    ) -> Result<u64> {
        let mut doomed: Vec<Vec<u8>> = Vec::new();
        let mut affected: std::collections::BTreeSet<Vec<u8>> = std::collections::BTreeSet::new();

        for row in rows.iter().context(StorageSnafu)? {
            let (row_key, _) = row.context(StorageSnafu)?;
            let row_key = row_key.value();
            let Some((natural, from_version)) = split_versioned_key(row_key) else {
                continue;
            };
            if from_version > target {
                doomed.push(row_key.to_vec());
                affected.insert(natural.to_vec());
            }
        }

        let removed = doomed.len() as u64;
        for row_key in &doomed {
            rows.remove(&row_key[..]).context(StorageSnafu)?;
        }

        for natural in affected {
            match Self::read_at::<V>(rows, &natural, target)? {
                Some(entry) => {
                    if entry.to_version.is_some() {
                        // Its closing successor was just deleted; reopen.
                        let row_key = versioned_key(&natural, entry.from_version);
                        let reopened = StoredRowRef { value: &entry.value, to_version: None };
                        let encoded = encode(&reopened).context(CodecSnafu)?;
                        rows.insert(&row_key[..], &encoded[..]).context(StorageSnafu)?;
                    }
                    let new_head = StoredHeadRef {
                        value: &entry.value,
                        from_version: entry.from_version.value(),
                    };
                    let encoded = encode(&new_head).context(CodecSnafu)?;
                    head.insert(&natural[..], &encoded[..]).context(StorageSnafu)?;
                },
                None => {
                    // The key was born after the target.
                    head.remove(&natural[..]).context(StorageSnafu)?;
                },
            }
        }

        Ok(removed)
    }
}
