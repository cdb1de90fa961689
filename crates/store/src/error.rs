//! Error types for the history store.
//!
//! The taxonomy separates fatal ingestion errors (which must stop the
//! pipeline rather than corrupt history), client request errors (malformed
//! cursors, invalid rollback targets), and substrate failures. Absent keys
//! are never errors; reads surface them as `Ok(None)`.

use snafu::Snafu;
use tidemark_types::{CodecError, StateVersion};

use crate::config::ConfigError;
use crate::engine::EngineError;

/// Result type alias for store operations.
pub type Result<T, E = StoreError> = std::result::Result<T, E>;

/// Errors that can occur during store operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum StoreError {
    /// The underlying database could not be opened.
    #[snafu(display("engine error: {source}"))]
    Engine {
        /// The wrapped engine error.
        source: EngineError,
    },

    /// The store configuration is invalid.
    #[snafu(display("config error: {source}"))]
    Config {
        /// The wrapped validation error.
        source: ConfigError,
    },

    /// A transaction could not be started.
    #[snafu(display("transaction error: {source}"))]
    Transaction {
        /// The underlying redb transaction error.
        source: redb::TransactionError,
    },

    /// A table could not be opened.
    #[snafu(display("table error: {source}"))]
    Table {
        /// The underlying redb table error.
        source: redb::TableError,
    },

    /// A storage read or write failed.
    #[snafu(display("storage error: {source}"))]
    Storage {
        /// The underlying redb storage error.
        source: redb::StorageError,
    },

    /// A transaction failed to commit.
    #[snafu(display("commit error: {source}"))]
    Commit {
        /// The underlying redb commit error.
        source: redb::CommitError,
    },

    /// A row value failed to encode or decode.
    #[snafu(display("codec error: {source}"))]
    Codec {
        /// The wrapped codec error.
        source: CodecError,
    },

    /// An append targeted a version at or below the key's open entry.
    ///
    /// Indicates an ingestion-pipeline bug; fatal.
    #[snafu(display(
        "append at {attempted} is not after the open entry at {open_since}"
    ))]
    OutOfOrderAppend {
        /// The version the append attempted to write.
        attempted: StateVersion,
        /// The open entry's `from_version`.
        open_since: StateVersion,
    },

    /// A committed transaction skipped ahead of the expected next version.
    ///
    /// The pipeline must never skip a version; fatal.
    #[snafu(display("expected state version {expected}, got {got}"))]
    VersionGap {
        /// The version the store expected next.
        expected: StateVersion,
        /// The version that was delivered.
        got: StateVersion,
    },

    /// A committed transaction carried a version outside the valid range.
    #[snafu(display("state version {got} is not a valid ledger version"))]
    InvalidStateVersion {
        /// The rejected raw version.
        got: u64,
    },

    /// The close step found no open row to close.
    ///
    /// A correctness backstop: with a single writer this should never fire.
    /// Retried once by the writer, then fatal.
    #[snafu(display("close step found no open entry (open since {open_since})"))]
    ConcurrencyConflict {
        /// The `from_version` the head claimed was open.
        open_since: StateVersion,
    },

    /// A rollback target was rejected before any mutation.
    #[snafu(display("rollback to {target} rejected: {reason}"))]
    RollbackTargetInvalid {
        /// The rejected target version.
        target: StateVersion,
        /// Why the target is invalid.
        reason: String,
    },

    /// A pagination cursor failed to parse, verify, or resolve.
    ///
    /// A client request error, not a store fault.
    #[snafu(display("malformed pagination cursor: {reason}"))]
    MalformedCursor {
        /// Why the cursor was rejected.
        reason: String,
    },

    /// A collection snapshot references a member with no entry history.
    #[snafu(display("collection is inconsistent: {reason}"))]
    InconsistentCollection {
        /// Description of the inconsistency.
        reason: String,
    },
}

impl StoreError {
    /// True for errors that must abort the ingestion pipeline.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::OutOfOrderAppend { .. }
                | Self::VersionGap { .. }
                | Self::InvalidStateVersion { .. }
                | Self::ConcurrencyConflict { .. }
        )
    }

    /// True for errors caused by a bad client request rather than the store.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::MalformedCursor { .. } | Self::RollbackTargetInvalid { .. }
        )
    }
}
