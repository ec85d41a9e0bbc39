//! Repository value type
//!
//! A `Repository` is the unit of data the crawler moves from the search API
//! into storage.

use chrono::{DateTime, Utc};
use std::fmt;

/// A GitHub repository as observed by one crawl
///
/// Values are immutable. The `id` is only ever assigned by storage after a
/// successful write; use [`Repository::with_id`] to derive an identified copy.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Repository {
    owner: String,
    name: String,
    star_count: u64,
    fetched_at: DateTime<Utc>,
    id: Option<i64>,
}

impl Repository {
    /// Creates a repository value that has not been persisted yet
    pub fn new(
        owner: impl Into<String>,
        name: impl Into<String>,
        star_count: u64,
        fetched_at: DateTime<Utc>,
    ) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
            star_count,
            fetched_at,
            id: None,
        }
    }

    /// Returns a copy of this repository carrying the storage-assigned ID
    pub fn with_id(&self, id: i64) -> Self {
        Self {
            id: Some(id),
            ..self.clone()
        }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// `owner/name`, always derived from the two parts
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }

    pub fn star_count(&self) -> u64 {
        self.star_count
    }

    pub fn fetched_at(&self) -> DateTime<Utc> {
        self.fetched_at
    }

    /// Storage identity, `None` until the repository has been persisted
    pub fn id(&self) -> Option<i64> {
        self.id
    }
}

impl fmt::Display for Repository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} stars)", self.full_name(), self.star_count)
    }
}
