//! Storage traits and error types
//!
//! This module defines the trait interface the crawler writes through and
//! the associated error types.

use crate::model::Repository;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("Storage has been closed")]
    Closed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Sink for crawled repositories
///
/// Implementations must make [`RepositoryStore::save_repositories`] atomic:
/// either every repository in the batch is written or none is.
pub trait RepositoryStore {
    /// Inserts or updates a batch of repositories keyed on `(owner, name)`
    ///
    /// An existing row is only updated when the star count differs or the
    /// incoming `fetched_at` is newer than the stored one. Saving identical
    /// or older data leaves the row untouched.
    fn save_repositories(&mut self, repositories: &[Repository]) -> StorageResult<()>;

    /// Gets the total number of stored repositories
    fn repository_count(&self) -> StorageResult<u64>;

    /// Releases any held resources; later calls fail with [`StorageError::Closed`]
    fn close(&mut self) -> StorageResult<()>;
}
