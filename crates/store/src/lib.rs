//! Versioned history store for ledger-derived facts.
//!
//! Tidemark ingests a strictly ordered stream of committed ledger
//! transactions and maintains a queryable, versioned history of the facts
//! they derive: account balances, resource supply, validator stakes,
//! metadata, and per-account preference/authorization lists. Every fact can
//! be read "as of now" or as of any previously committed state version,
//! with stable pagination over collections and atomic rollback to an
//! earlier version.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                 LedgerStore                  │
//! │  (open, commit_transaction, rollback_to)     │
//! └───────────────┬─────────────┬────────────────┘
//!                 │             │
//! ┌───────────────▼──┐   ┌──────▼────────────────┐
//! │ History Ledger   │   │ Aggregate + Entry     │
//! │ (append/read_at/ │   │ collection history    │
//! │  read_current)   │   │ (page_members)        │
//! └───────────────┬──┘   └──────┬────────────────┘
//!                 │             │
//! ┌───────────────▼─────────────▼────────────────┐
//! │           redb (MVCC, single writer)         │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! One writer ingests transactions in increasing state-version order; any
//! number of readers issue snapshot-isolated reads through [`LedgerReader`].

#![deny(unsafe_code)]

mod aggregation;
mod collection;
mod config;
mod cursor;
mod engine;
mod error;
mod history;
mod ingest;
pub mod keys;
mod reader;
mod rollback;
mod snapshot;
mod store;
mod tables;

pub use aggregation::{fold, Fold};
pub use collection::{page_members, AggregateSnapshot, Aggregates, MemberPage};
pub use config::{ConfigError, StoreConfig};
pub use cursor::{Cursor, CursorCodec};
pub use engine::{EngineError, StorageEngine};
pub use error::{Result, StoreError};
pub use history::{History, HistoryEntry};
pub use ingest::{CommittedTransaction, FactChange, IngestOutcome};
pub use reader::{
    AuthorizedDepositorItem, LedgerReader, OwnedResource, Page, PageRequest, PreferenceItem,
};
pub use rollback::RollbackReport;
pub use snapshot::{RelationDump, StoreSnapshot};
pub use store::{LedgerStore, StoreStatus};
pub use tables::Tables;
