//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the RepositoryStore trait,
//! plus the run bookkeeping and read queries used by the CLI.

use crate::model::{CrawlMetrics, Repository};
use crate::storage::schema::{initialize_schema, UPSERT_REPOSITORY_SQL};
use crate::storage::traits::{RepositoryStore, StorageError, StorageResult};
use crate::storage::{
    format_timestamp, parse_timestamp, OwnerSummary, RunRecord, RunStatus, StarBucket, StarSummary,
    StoredRepository,
};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;

const REPOSITORY_COLUMNS: &str = "id, owner, name, star_count, fetched_at, created_at, updated_at";

const RUN_COLUMNS: &str = "id, started_at, finished_at, config_hash, target_count, status,
     records_crawled, duration_seconds, rate_limit_pauses, errors_encountered, error_message";

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Option<Connection>,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(StorageError)` - Failed to open database
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        // Configure SQLite for better performance
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
            PRAGMA mmap_size = 268435456;
        ",
        )?;

        // Initialize schema
        initialize_schema(&conn)?;

        tracing::info!("Opened database at {}", path.display());
        Ok(Self { conn: Some(conn) })
    }

    /// Creates an in-memory database (for testing)
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self { conn: Some(conn) })
    }

    fn conn(&self) -> StorageResult<&Connection> {
        self.conn.as_ref().ok_or(StorageError::Closed)
    }

    fn conn_mut(&mut self) -> StorageResult<&mut Connection> {
        self.conn.as_mut().ok_or(StorageError::Closed)
    }

    /// Gets a repository by its natural key, with its storage ID
    pub fn get_repository(&self, owner: &str, name: &str) -> StorageResult<Option<Repository>> {
        let sql = format!(
            "SELECT {} FROM repositories WHERE owner = ?1 AND name = ?2",
            REPOSITORY_COLUMNS
        );
        let stored = self
            .conn()?
            .query_row(&sql, params![owner, name], stored_repository_from_row)
            .optional()?;
        Ok(stored.map(|s| s.repository))
    }

    /// Gets the repositories with the most stars
    pub fn top_repositories(&self, limit: usize) -> StorageResult<Vec<Repository>> {
        self.query_repositories("ORDER BY star_count DESC, owner, name", limit)
    }

    /// Gets the most recently fetched repositories
    pub fn recently_fetched(&self, limit: usize) -> StorageResult<Vec<Repository>> {
        self.query_repositories("ORDER BY fetched_at DESC, star_count DESC", limit)
    }

    fn query_repositories(&self, order_by: &str, limit: usize) -> StorageResult<Vec<Repository>> {
        let sql = format!(
            "SELECT {} FROM repositories {} LIMIT ?1",
            REPOSITORY_COLUMNS, order_by
        );
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![limit as i64], stored_repository_from_row)?
            .map(|row| row.map(|s| s.repository))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Visits every stored repository in descending star order
    ///
    /// Returns the number of rows visited.
    pub fn for_each_repository<F>(&self, mut visit: F) -> StorageResult<u64>
    where
        F: FnMut(StoredRepository) -> StorageResult<()>,
    {
        let sql = format!(
            "SELECT {} FROM repositories ORDER BY star_count DESC, owner, name",
            REPOSITORY_COLUMNS
        );
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query([])?;

        let mut visited = 0;
        while let Some(row) = rows.next()? {
            visit(stored_repository_from_row(row)?)?;
            visited += 1;
        }
        Ok(visited)
    }

    /// Computes count, range, mean, median and fetch window of star counts
    pub fn star_summary(&self) -> StorageResult<StarSummary> {
        let conn = self.conn()?;

        let (total, min, max, average, first_fetched, last_fetched) = conn.query_row(
            "SELECT COUNT(*), MIN(star_count), MAX(star_count), AVG(star_count),
                    MIN(fetched_at), MAX(fetched_at)
             FROM repositories",
            [],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, Option<i64>>(1)?,
                    row.get::<_, Option<i64>>(2)?,
                    row.get::<_, Option<f64>>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, Option<String>>(5)?,
                ))
            },
        )?;

        let median = if total > 0 {
            // One middle row for odd counts, the two middle rows for even counts
            let mut stmt = conn.prepare(
                "SELECT star_count FROM repositories ORDER BY star_count LIMIT ?1 OFFSET ?2",
            )?;
            let middle = stmt
                .query_map(params![2 - total % 2, (total - 1) / 2], |row| {
                    row.get::<_, i64>(0)
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Some(middle.iter().sum::<i64>() as f64 / middle.len() as f64)
        } else {
            None
        };

        Ok(StarSummary {
            total: total.max(0) as u64,
            min: min.map(to_count),
            max: max.map(to_count),
            average,
            median,
            first_fetched,
            last_fetched,
        })
    }

    /// Counts repositories per star range, smallest range first
    pub fn star_distribution(&self) -> StorageResult<Vec<StarBucket>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT
                CASE
                    WHEN star_count < 10 THEN '0-9'
                    WHEN star_count < 100 THEN '10-99'
                    WHEN star_count < 1000 THEN '100-999'
                    WHEN star_count < 10000 THEN '1K-9.9K'
                    WHEN star_count < 100000 THEN '10K-99.9K'
                    ELSE '100K+'
                END AS star_range,
                COUNT(*)
             FROM repositories
             GROUP BY star_range
             ORDER BY MIN(star_count)",
        )?;
        let buckets = stmt
            .query_map([], |row| {
                Ok(StarBucket {
                    label: row.get(0)?,
                    count: to_count(row.get(1)?),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(buckets)
    }

    /// Gets the owners with the most stored repositories
    pub fn top_owners(&self, limit: usize) -> StorageResult<Vec<OwnerSummary>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT owner, COUNT(*) AS repo_count, SUM(star_count) AS total_stars
             FROM repositories
             GROUP BY owner
             ORDER BY repo_count DESC, total_stars DESC, owner
             LIMIT ?1",
        )?;
        let owners = stmt
            .query_map(params![limit as i64], |row| {
                Ok(OwnerSummary {
                    owner: row.get(0)?,
                    repository_count: to_count(row.get(1)?),
                    total_stars: to_count(row.get(2)?),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(owners)
    }

    // ===== Run Management =====

    /// Creates a new crawl run in the `running` state
    ///
    /// # Returns
    ///
    /// The ID of the newly created run
    pub fn create_run(&mut self, config_hash: &str, target_count: u64) -> StorageResult<i64> {
        let now = format_timestamp(Utc::now());
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO crawl_runs (started_at, config_hash, target_count, status)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                now,
                config_hash,
                to_sql_int(target_count),
                RunStatus::Running.to_db_string()
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Marks a run as completed and records its final metrics
    pub fn complete_run(&mut self, run_id: i64, metrics: &CrawlMetrics) -> StorageResult<()> {
        let now = format_timestamp(Utc::now());
        let updated = self.conn()?.execute(
            "UPDATE crawl_runs
             SET status = ?1, finished_at = ?2, records_crawled = ?3, duration_seconds = ?4,
                 rate_limit_pauses = ?5, errors_encountered = ?6
             WHERE id = ?7",
            params![
                RunStatus::Completed.to_db_string(),
                now,
                to_sql_int(metrics.records_crawled),
                metrics.duration_seconds,
                to_sql_int(metrics.rate_limit_pauses),
                to_sql_int(metrics.errors_encountered),
                run_id
            ],
        )?;
        if updated == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        Ok(())
    }

    /// Marks a run as failed with the error that ended it
    ///
    /// `records_crawled` is what the run saved before the failure.
    pub fn fail_run(
        &mut self,
        run_id: i64,
        records_crawled: u64,
        message: &str,
    ) -> StorageResult<()> {
        self.finish_run_with_error(run_id, RunStatus::Failed, records_crawled, message)
    }

    /// Marks a run as cancelled by the operator
    pub fn cancel_run(
        &mut self,
        run_id: i64,
        records_crawled: u64,
        message: &str,
    ) -> StorageResult<()> {
        self.finish_run_with_error(run_id, RunStatus::Cancelled, records_crawled, message)
    }

    fn finish_run_with_error(
        &mut self,
        run_id: i64,
        status: RunStatus,
        records_crawled: u64,
        message: &str,
    ) -> StorageResult<()> {
        let now = format_timestamp(Utc::now());
        let updated = self.conn()?.execute(
            "UPDATE crawl_runs
             SET status = ?1, finished_at = ?2, records_crawled = ?3, error_message = ?4
             WHERE id = ?5",
            params![
                status.to_db_string(),
                now,
                to_sql_int(records_crawled),
                message,
                run_id
            ],
        )?;
        if updated == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        Ok(())
    }

    /// Gets a run by ID
    pub fn get_run(&self, run_id: i64) -> StorageResult<RunRecord> {
        let sql = format!("SELECT {} FROM crawl_runs WHERE id = ?1", RUN_COLUMNS);
        self.conn()?
            .query_row(&sql, params![run_id], run_from_row)
            .optional()?
            .ok_or(StorageError::RunNotFound(run_id))
    }

    /// Gets the most recent runs, newest first
    pub fn latest_runs(&self, limit: usize) -> StorageResult<Vec<RunRecord>> {
        let sql = format!(
            "SELECT {} FROM crawl_runs ORDER BY id DESC LIMIT ?1",
            RUN_COLUMNS
        );
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let runs = stmt
            .query_map(params![limit as i64], run_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(runs)
    }
}

impl RepositoryStore for SqliteStorage {
    fn save_repositories(&mut self, repositories: &[Repository]) -> StorageResult<()> {
        if repositories.is_empty() {
            return Ok(());
        }

        let now = format_timestamp(Utc::now());
        let tx = self.conn_mut()?.transaction()?;
        {
            let mut stmt = tx.prepare_cached(UPSERT_REPOSITORY_SQL)?;
            for repo in repositories {
                stmt.execute(params![
                    repo.owner(),
                    repo.name(),
                    repo.full_name(),
                    to_sql_int(repo.star_count()),
                    format_timestamp(repo.fetched_at()),
                    now
                ])?;
            }
        }
        // Dropping an uncommitted transaction rolls it back
        tx.commit()?;

        tracing::debug!("Saved {} repositories to database", repositories.len());
        Ok(())
    }

    fn repository_count(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn()?
            .query_row("SELECT COUNT(*) FROM repositories", [], |row| row.get(0))?;
        Ok(to_count(count))
    }

    fn close(&mut self) -> StorageResult<()> {
        if let Some(conn) = self.conn.take() {
            conn.close().map_err(|(_, e)| StorageError::Sqlite(e))?;
            tracing::info!("Closed database connection");
        }
        Ok(())
    }
}

fn to_sql_int(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn to_count(value: i64) -> u64 {
    value.max(0) as u64
}

fn timestamp_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    parse_timestamp(&raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Text,
            format!("invalid timestamp '{}'", raw).into(),
        )
    })
}

fn stored_repository_from_row(row: &Row<'_>) -> rusqlite::Result<StoredRepository> {
    let id: i64 = row.get(0)?;
    let owner: String = row.get(1)?;
    let name: String = row.get(2)?;
    let star_count: i64 = row.get(3)?;
    let fetched_at = timestamp_column(row, 4)?;

    Ok(StoredRepository {
        repository: Repository::new(owner, name, to_count(star_count), fetched_at).with_id(id),
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
    Ok(RunRecord {
        id: row.get(0)?,
        started_at: row.get(1)?,
        finished_at: row.get(2)?,
        config_hash: row.get(3)?,
        target_count: to_count(row.get(4)?),
        status: RunStatus::from_db_string(&row.get::<_, String>(5)?)
            .unwrap_or(RunStatus::Failed),
        records_crawled: to_count(row.get(6)?),
        duration_seconds: row.get(7)?,
        rate_limit_pauses: to_count(row.get(8)?),
        errors_encountered: to_count(row.get(9)?),
        error_message: row.get(10)?,
    })
}
