//! redb storage engine wrapper.
//!
//! Provides a thin wrapper around redb with:
//! - Database lifecycle management
//! - Convenient constructors for file-backed and in-memory stores

use std::path::Path;
use std::sync::Arc;

use redb::backends::InMemoryBackend;
use redb::Database;
use snafu::Snafu;

/// Error context for engine operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum EngineError {
    /// The database could not be opened or created.
    #[snafu(display("failed to open database at {path}: {source}"))]
    Open {
        /// Path of the database file (or `:memory:`).
        path: String,
        /// The underlying redb error.
        source: redb::DatabaseError,
    },
}

/// Storage engine backed by a redb database file.
///
/// Cheap to clone; all clones share the same database handle.
pub struct StorageEngine {
    db: Arc<Database>,
}

impl StorageEngine {
    /// Opens or creates a database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let path = path.as_ref();
        let db = Database::create(path).map_err(|source| EngineError::Open {
            path: path.display().to_string(),
            source,
        })?;
        Ok(Self { db: Arc::new(db) })
    }

    /// Creates a fresh in-memory database.
    ///
    /// Used by tests and ephemeral deployments; contents vanish on drop.
    pub fn open_in_memory() -> Result<Self, EngineError> {
        let db = Database::builder()
            .create_with_backend(InMemoryBackend::new())
            .map_err(|source| EngineError::Open { path: ":memory:".to_string(), source })?;
        Ok(Self { db: Arc::new(db) })
    }

    /// Returns a clone of the database handle.
    pub fn db(&self) -> Arc<Database> {
        Arc::clone(&self.db)
    }
}

impl Clone for StorageEngine {
    fn clone(&self) -> Self {
        Self { db: Arc::clone(&self.db) }
    }
}
