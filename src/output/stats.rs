//! Statistics generation from the crawl database
//!
//! This module provides functionality for extracting and displaying
//! repository and run statistics from the storage layer.

use crate::storage::{
    OwnerSummary, RunRecord, SqliteStorage, StarBucket, StarSummary, StorageResult,
};
use crate::Repository;
use std::io::{self, Write};

/// Number of entries shown in each ranked list
const TOP_LIMIT: usize = 10;

/// Number of crawl runs shown
const RUN_LIMIT: usize = 5;

/// Repository and run statistics
#[derive(Debug, Clone)]
pub struct CrawlStatistics {
    /// Count, range, mean, median and fetch window of star counts
    pub summary: StarSummary,

    /// Repositories with the most stars
    pub top_repositories: Vec<Repository>,

    /// Repository counts per star range
    pub distribution: Vec<StarBucket>,

    /// Owners with the most repositories
    pub top_owners: Vec<OwnerSummary>,

    /// Most recently fetched repositories
    pub recently_fetched: Vec<Repository>,

    /// Latest crawl runs, newest first
    pub recent_runs: Vec<RunRecord>,
}

impl CrawlStatistics {
    /// Share of all repositories that fall into `bucket`, in percent
    pub fn bucket_percentage(&self, bucket: &StarBucket) -> f64 {
        if self.summary.total > 0 {
            (bucket.count as f64 / self.summary.total as f64) * 100.0
        } else {
            0.0
        }
    }
}

/// Loads statistics from storage
///
/// # Arguments
///
/// * `storage` - The storage backend to query
///
/// # Returns
///
/// * `Ok(CrawlStatistics)` - Successfully loaded statistics
/// * `Err(StorageError)` - Failed to query statistics
pub fn load_statistics(storage: &SqliteStorage) -> StorageResult<CrawlStatistics> {
    Ok(CrawlStatistics {
        summary: storage.star_summary()?,
        top_repositories: storage.top_repositories(TOP_LIMIT)?,
        distribution: storage.star_distribution()?,
        top_owners: storage.top_owners(TOP_LIMIT)?,
        recently_fetched: storage.recently_fetched(TOP_LIMIT)?,
        recent_runs: storage.latest_runs(RUN_LIMIT)?,
    })
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &CrawlStatistics) -> io::Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    write_statistics(stats, &mut out)
}

/// Writes the statistics report to any writer
pub fn write_statistics<W: Write>(stats: &CrawlStatistics, out: &mut W) -> io::Result<()> {
    writeln!(out, "=== Repository Statistics ===\n")?;

    let summary = &stats.summary;
    writeln!(out, "Overview:")?;
    writeln!(out, "  Total repositories: {}", summary.total)?;
    if summary.total == 0 {
        writeln!(out, "\nNo repositories stored yet.")?;
        return write_runs(stats, out);
    }

    writeln!(
        out,
        "  Stars: min {}, max {}, average {:.1}, median {:.1}",
        summary.min.unwrap_or(0),
        summary.max.unwrap_or(0),
        summary.average.unwrap_or(0.0),
        summary.median.unwrap_or(0.0)
    )?;
    writeln!(
        out,
        "  Fetched between {} and {}",
        summary.first_fetched.as_deref().unwrap_or("-"),
        summary.last_fetched.as_deref().unwrap_or("-")
    )?;
    writeln!(out)?;

    writeln!(out, "Top {} by Stars:", stats.top_repositories.len())?;
    for (rank, repo) in stats.top_repositories.iter().enumerate() {
        writeln!(
            out,
            "  {:>2}. {} ({} stars)",
            rank + 1,
            repo.full_name(),
            repo.star_count()
        )?;
    }
    writeln!(out)?;

    writeln!(out, "Star Distribution:")?;
    for bucket in &stats.distribution {
        writeln!(
            out,
            "  {:>10}: {} ({:.1}%)",
            bucket.label,
            bucket.count,
            stats.bucket_percentage(bucket)
        )?;
    }
    writeln!(out)?;

    writeln!(out, "Top Owners:")?;
    for owner in &stats.top_owners {
        writeln!(
            out,
            "  {}: {} repositories, {} stars",
            owner.owner, owner.repository_count, owner.total_stars
        )?;
    }
    writeln!(out)?;

    writeln!(out, "Recently Fetched:")?;
    for repo in &stats.recently_fetched {
        writeln!(
            out,
            "  {} ({} stars) at {}",
            repo.full_name(),
            repo.star_count(),
            repo.fetched_at().format("%Y-%m-%d %H:%M:%S UTC")
        )?;
    }
    writeln!(out)?;

    write_runs(stats, out)
}

fn write_runs<W: Write>(stats: &CrawlStatistics, out: &mut W) -> io::Result<()> {
    if stats.recent_runs.is_empty() {
        return Ok(());
    }

    writeln!(out, "Recent Runs:")?;
    for run in &stats.recent_runs {
        write!(
            out,
            "  #{} {} started {}: {} / {} repositories in {:.1}s, {} pauses, {} failed batches",
            run.id,
            run.status.to_db_string(),
            run.started_at,
            run.records_crawled,
            run.target_count,
            run.duration_seconds,
            run.rate_limit_pauses,
            run.errors_encountered
        )?;
        match &run.error_message {
            Some(message) => writeln!(out, " ({})", message)?,
            None => writeln!(out)?,
        }
    }
    Ok(())
}
