//! The store facade.
//!
//! [`LedgerStore`] owns the database handle, the writer gate, and the
//! rollback status flag. Exactly one ingestion pipeline should call
//! [`commit_transaction`](LedgerStore::commit_transaction); any number of
//! [`LedgerReader`]s may read concurrently.

use std::path::Path;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use redb::Database;
use snafu::ResultExt;
use tidemark_types::StateVersion;

use crate::config::StoreConfig;
use crate::cursor::CursorCodec;
use crate::engine::StorageEngine;
use crate::error::{CommitSnafu, ConfigSnafu, EngineSnafu, Result, StorageSnafu, TableSnafu, TransactionSnafu};
use crate::reader::LedgerReader;
use crate::tables::{Tables, GENESIS_KEY, TIP_KEY};

/// Store lifecycle state, observable by embedders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreStatus {
    /// Ingestion and reads proceed normally.
    Active,
    /// A rollback is truncating history; ingestion is paused.
    RollingBack,
}

/// Handle to a versioned history store.
pub struct LedgerStore {
    pub(crate) db: Arc<Database>,
    pub(crate) config: StoreConfig,
    pub(crate) cursors: Arc<CursorCodec>,
    /// Serializes the single writer against rollback.
    pub(crate) write_gate: Arc<Mutex<()>>,
    pub(crate) status: Arc<RwLock<StoreStatus>>,
}

impl LedgerStore {
    /// Opens or creates a store at the given path.
    pub fn open(path: impl AsRef<Path>, config: StoreConfig) -> Result<Self> {
        let engine = StorageEngine::open(path).context(EngineSnafu)?;
        Self::from_engine(engine, config)
    }

    /// Creates an in-memory store; contents vanish on drop.
    pub fn open_in_memory(config: StoreConfig) -> Result<Self> {
        let engine = StorageEngine::open_in_memory().context(EngineSnafu)?;
        Self::from_engine(engine, config)
    }

    fn from_engine(engine: StorageEngine, config: StoreConfig) -> Result<Self> {
        config.validate().context(ConfigSnafu)?;
        let db = engine.db();
        Self::ensure_tables(&db)?;

        let cursors = match config.cursor_key {
            Some(key) => CursorCodec::new(key),
            None => CursorCodec::with_random_key(),
        };

        Ok(Self {
            db,
            config,
            cursors: Arc::new(cursors),
            write_gate: Arc::new(Mutex::new(())),
            status: Arc::new(RwLock::new(StoreStatus::Active)),
        })
    }

    /// Creates every table up front so read transactions never race table
    /// creation.
    fn ensure_tables(db: &Database) -> Result<()> {
        let txn = db.begin_write().context(TransactionSnafu)?;
        {
            for table in Tables::ALL_FACT_TABLES {
                let _ = txn.open_table(table).context(TableSnafu)?;
            }
            let _ = txn.open_table(Tables::STORE_META).context(TableSnafu)?;
        }
        txn.commit().context(CommitSnafu)?;
        Ok(())
    }

    /// Returns a reader sharing this store's database handle.
    pub fn reader(&self) -> LedgerReader {
        LedgerReader {
            db: Arc::clone(&self.db),
            config: self.config.clone(),
            cursors: Arc::clone(&self.cursors),
        }
    }

    /// Current lifecycle state.
    pub fn status(&self) -> StoreStatus {
        *self.status.read()
    }

    /// The last ingested state version, or `None` for an empty store.
    pub fn tip(&self) -> Result<Option<StateVersion>> {
        let txn = self.db.begin_read().context(TransactionSnafu)?;
        let meta = txn.open_table(Tables::STORE_META).context(TableSnafu)?;
        Ok(meta
            .get(TIP_KEY)
            .context(StorageSnafu)?
            .map(|guard| StateVersion::new(guard.value())))
    }

    /// The first ingested state version, or `None` for an empty store.
    pub fn genesis(&self) -> Result<Option<StateVersion>> {
        let txn = self.db.begin_read().context(TransactionSnafu)?;
        let meta = txn.open_table(Tables::STORE_META).context(TableSnafu)?;
        Ok(meta
            .get(GENESIS_KEY)
            .context(StorageSnafu)?
            .map(|guard| StateVersion::new(guard.value())))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_open_in_memory_starts_empty_and_active() {
        let store = LedgerStore::open_in_memory(StoreConfig::default()).unwrap();
        assert_eq!(store.status(), StoreStatus::Active);
        assert_eq!(store.tip().unwrap(), None);
        assert_eq!(store.genesis().unwrap(), None);
    }

    #[test]
    fn test_invalid_config_rejected_at_open() {
        let config = StoreConfig::builder().default_page_size(0).build();
        let result = LedgerStore::open_in_memory(config);
        assert!(matches!(result, Err(crate::StoreError::Config { .. })));
    }

    #[test]
    fn test_file_backed_store_persists_tables() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("history.redb");
        {
            let _store = LedgerStore::open(&path, StoreConfig::default()).unwrap();
        }
        // Re-open and read without any writes in between.
        let store = LedgerStore::open(&path, StoreConfig::default()).unwrap();
        assert_eq!(store.tip().unwrap(), None);
    }
}
