//! Storage module for persisting crawl data
//!
//! This module handles all database operations for the crawler, including:
//! - SQLite database initialization and schema management
//! - Batched, idempotent repository upserts
//! - Crawl run bookkeeping
//! - Read-side queries backing the statistics report and CSV export

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{RepositoryStore, StorageError, StorageResult};

use crate::model::Repository;
use chrono::{DateTime, SecondsFormat, Utc};

use std::path::Path;

/// Initializes or opens a storage database
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
///
/// # Returns
///
/// * `Ok(SqliteStorage)` - Successfully initialized storage
/// * `Err(StorageError)` - Failed to initialize storage
pub fn open_storage(path: &Path) -> StorageResult<SqliteStorage> {
    SqliteStorage::new(path)
}

/// Formats a timestamp the way every timestamp column stores it
///
/// Fixed-width RFC 3339 in UTC, so text comparison in SQL matches
/// chronological order.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parses a stored timestamp column
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// A repository row together with its bookkeeping columns
#[derive(Debug, Clone)]
pub struct StoredRepository {
    /// The repository, carrying its storage ID
    pub repository: Repository,
    pub created_at: String,
    pub updated_at: String,
}

/// Aggregate star figures across all stored repositories
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StarSummary {
    pub total: u64,
    pub min: Option<u64>,
    pub max: Option<u64>,
    pub average: Option<f64>,
    pub median: Option<f64>,
    pub first_fetched: Option<String>,
    pub last_fetched: Option<String>,
}

/// Number of repositories falling into one star range
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StarBucket {
    pub label: String,
    pub count: u64,
}

/// Repository count and total stars of one owner
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnerSummary {
    pub owner: String,
    pub repository_count: u64,
    pub total_stars: u64,
}

/// Represents a crawl run
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: i64,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub config_hash: String,
    pub target_count: u64,
    pub status: RunStatus,
    pub records_crawled: u64,
    pub duration_seconds: f64,
    pub rate_limit_pauses: u64,
    pub errors_encountered: u64,
    pub error_message: Option<String>,
}

/// Status of a crawl run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    Cancelled,
    Failed,
}

impl RunStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "cancelled" => Some(Self::Cancelled),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}
