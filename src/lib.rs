//! Stargaze: a rate-limited GitHub star crawler
//!
//! This crate pages through GitHub's GraphQL repository search, batches the
//! results, and upserts them into a SQLite database while staying inside the
//! API's rate-limit budget.

pub mod config;
pub mod crawler;
pub mod model;
pub mod output;
pub mod storage;

use thiserror::Error;

/// Main error type for Stargaze operations
#[derive(Debug, Error)]
pub enum StargazeError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("Giving up after {attempts} attempts: {source}")]
    RetriesExhausted { attempts: u32, source: FetchError },

    #[error("Final batch of {batch_size} repositories could not be saved: {source}")]
    FinalFlush {
        batch_size: usize,
        source: storage::StorageError,
    },

    #[error("Crawl cancelled after {records_crawled} repositories were saved")]
    Cancelled { records_crawled: u64 },

    #[error("Target count must be greater than zero")]
    InvalidTarget,

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure of a single page fetch, classified by whether retrying can help
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// Rate limited, timed out, connection failure, 5xx or garbled response
    #[error("transient failure: {0}")]
    Transient(String),

    /// Authentication rejected, malformed query or another 4xx
    #[error("fatal failure: {0}")]
    Fatal(String),
}

impl FetchError {
    /// Returns true if the failure may succeed on a later attempt
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Environment variable {0} is not set or empty")]
    MissingToken(String),
}

/// Result type alias for Stargaze operations
pub type Result<T> = std::result::Result<T, StargazeError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{run_crawl, Coordinator};
pub use model::{CrawlMetrics, Cursor, Page, RateBudget, Repository};
