//! Full-store dumps.
//!
//! A [`StoreSnapshot`] is an ordered, comparable export of every relation.
//! Operators use it for offline inspection and backups; the test suite
//! uses it to check that rollback is an exact inverse of the appends it
//! undoes.

use std::collections::BTreeMap;

use redb::{ReadableTable, TableHandle};
use snafu::ResultExt;

use crate::error::{Result, StorageSnafu, TableSnafu, TransactionSnafu};
use crate::store::LedgerStore;
use crate::tables::Tables;

/// Raw rows of one relation, in key order.
pub type RelationDump = Vec<(Vec<u8>, Vec<u8>)>;

/// A full export of the store's contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreSnapshot {
    /// Every fact relation's rows, keyed by table name.
    pub relations: BTreeMap<String, RelationDump>,
    /// Store metadata counters (`tip`, `genesis`).
    pub meta: BTreeMap<String, u64>,
}

impl LedgerStore {
    /// Dumps every relation from one consistent read transaction.
    pub fn snapshot(&self) -> Result<StoreSnapshot> {
        let txn = self.db.begin_read().context(TransactionSnafu)?;

        let mut relations = BTreeMap::new();
        for definition in Tables::ALL_FACT_TABLES {
            let name = definition.name().to_string();
            let table = txn.open_table(definition).context(TableSnafu)?;
            let mut rows: RelationDump = Vec::new();
            for row in table.iter().context(StorageSnafu)? {
                let (key, value) = row.context(StorageSnafu)?;
                rows.push((key.value().to_vec(), value.value().to_vec()));
            }
            relations.insert(name, rows);
        }

        let mut meta = BTreeMap::new();
        let meta_table = txn.open_table(Tables::STORE_META).context(TableSnafu)?;
        for row in meta_table.iter().context(StorageSnafu)? {
            let (key, value) = row.context(StorageSnafu)?;
            meta.insert(key.value().to_string(), value.value());
        }

        Ok(StoreSnapshot { relations, meta })
    }
}
