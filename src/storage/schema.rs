//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the Stargaze database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- One row per repository, keyed on its natural (owner, name) identity
CREATE TABLE IF NOT EXISTS repositories (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    owner TEXT NOT NULL,
    name TEXT NOT NULL,
    full_name TEXT NOT NULL,
    star_count INTEGER NOT NULL DEFAULT 0,
    fetched_at TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE(owner, name)
);

CREATE INDEX IF NOT EXISTS idx_repositories_star_count ON repositories(star_count DESC);
CREATE INDEX IF NOT EXISTS idx_repositories_fetched_at ON repositories(fetched_at DESC);
CREATE INDEX IF NOT EXISTS idx_repositories_owner ON repositories(owner);

-- Track crawl runs and their final metrics
CREATE TABLE IF NOT EXISTS crawl_runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    config_hash TEXT NOT NULL,
    target_count INTEGER NOT NULL,
    status TEXT NOT NULL,
    records_crawled INTEGER NOT NULL DEFAULT 0,
    duration_seconds REAL NOT NULL DEFAULT 0,
    rate_limit_pauses INTEGER NOT NULL DEFAULT 0,
    errors_encountered INTEGER NOT NULL DEFAULT 0,
    error_message TEXT
);
"#;

/// Upsert for a single repository row
///
/// Parameters: owner, name, full_name, star_count, fetched_at, now.
/// The `WHERE` clause makes identical or stale data a no-op, so `updated_at`
/// only moves when the row actually changes. `fetched_at` never moves backwards.
pub const UPSERT_REPOSITORY_SQL: &str = "
    INSERT INTO repositories
        (owner, name, full_name, star_count, fetched_at, created_at, updated_at)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
    ON CONFLICT(owner, name) DO UPDATE SET
        star_count = excluded.star_count,
        fetched_at = MAX(repositories.fetched_at, excluded.fetched_at),
        updated_at = excluded.updated_at
    WHERE repositories.star_count != excluded.star_count
       OR repositories.fetched_at < excluded.fetched_at
";

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
