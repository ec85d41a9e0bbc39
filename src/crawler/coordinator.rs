//! Crawler coordinator - main crawl orchestration logic
//!
//! This module contains the main crawl loop that coordinates all aspects of
//! the crawling process, including:
//! - Pausing for the rate-limit window before each request
//! - Retrying transient fetch failures with back-off
//! - Batching repositories and flushing them to storage
//! - Isolating failed batches so they do not abort the run
//! - Cooperative cancellation
//! - Recording the run in the database

use crate::config::{resolve_token, Config, CrawlerConfig, GithubConfig};
use crate::crawler::fetcher::{GithubFetcher, PageFetcher};
use crate::crawler::rate_limiter::{Clock, RateLimiter, SystemClock};
use crate::crawler::retry::{RetryDecision, RetryPolicy};
use crate::model::{CrawlMetrics, Cursor, MetricsAccumulator, Page, Repository};
use crate::storage::{open_storage, RepositoryStore};
use crate::{FetchError, StargazeError};
use std::path::Path;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Main crawler coordinator structure
///
/// Owns the fetcher and the store for the duration of a crawl. Pages are
/// fetched strictly one after another since each request needs the cursor
/// of the previous page.
pub struct Coordinator<F, S> {
    fetcher: F,
    store: S,
    clock: Box<dyn Clock>,
    rate_limiter: RateLimiter,
    retry_policy: RetryPolicy,
    batch_size: usize,
    request_timeout: Duration,
    records_saved: u64,
}

impl<F, S> Coordinator<F, S>
where
    F: PageFetcher,
    S: RepositoryStore,
{
    /// Creates a coordinator with default batching, rate-limit and retry settings
    pub fn new(fetcher: F, store: S) -> Self {
        Self {
            fetcher,
            store,
            clock: Box::new(SystemClock),
            rate_limiter: RateLimiter::default(),
            retry_policy: RetryPolicy::default(),
            batch_size: CrawlerConfig::default().batch_size,
            request_timeout: GithubConfig::default().request_timeout(),
            records_saved: 0,
        }
    }

    /// Creates a coordinator using the settings from a loaded configuration
    pub fn from_config(fetcher: F, store: S, config: &Config) -> Self {
        Self::new(fetcher, store)
            .with_rate_limiter(RateLimiter::from_config(&config.rate_limit))
            .with_retry_policy(RetryPolicy::from_config(&config.retry))
            .with_batch_size(config.crawler.batch_size)
            .with_request_timeout(config.github.request_timeout())
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn with_rate_limiter(mut self, rate_limiter: RateLimiter) -> Self {
        self.rate_limiter = rate_limiter;
        self
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    /// Sets the flush size; a zero size is raised to 1
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Repositories saved by the most recent crawl, including one that failed
    pub fn records_saved(&self) -> u64 {
        self.records_saved
    }

    /// Gives the fetcher and store back, e.g. to record the run and close storage
    pub fn into_parts(self) -> (F, S) {
        (self.fetcher, self.store)
    }

    /// Crawls until `target_count` repositories were taken or the source ran out
    ///
    /// # Returns
    ///
    /// * `Ok(CrawlMetrics)` - Crawl finished; failed mid-run batches are
    ///   counted in `errors_encountered`
    /// * `Err(StargazeError)` - Invalid target, fatal or retry-exhausted fetch
    ///   failure, or the final flush failed
    pub async fn crawl(&mut self, target_count: u64) -> Result<CrawlMetrics, StargazeError> {
        self.crawl_with_cancel(target_count, CancellationToken::new())
            .await
    }

    /// Same as [`Coordinator::crawl`], stopping early once `cancel` fires
    ///
    /// Cancellation is observed while fetching, while pausing for the rate
    /// limit or back-off, and before every save. Buffered repositories are
    /// not flushed; [`StargazeError::Cancelled`] reports how many were
    /// already saved.
    pub async fn crawl_with_cancel(
        &mut self,
        target_count: u64,
        cancel: CancellationToken,
    ) -> Result<CrawlMetrics, StargazeError> {
        if target_count == 0 {
            return Err(StargazeError::InvalidTarget);
        }

        tracing::info!(
            "Starting crawl: target {} repositories, batch size {}",
            target_count,
            self.batch_size
        );

        self.records_saved = 0;
        let mut metrics = MetricsAccumulator::start();
        let outcome = self
            .crawl_pages(target_count, &mut metrics, &cancel)
            .await;
        self.records_saved = metrics.records_crawled();
        outcome?;

        let metrics = metrics.finish();
        tracing::info!(
            "Crawl completed: {} repositories saved in {:.2}s ({:.2}/sec), {} pages, {} rate-limit pauses, {} retries, {} failed batches",
            metrics.records_crawled,
            metrics.duration_seconds,
            metrics.throughput(),
            metrics.pages_fetched,
            metrics.rate_limit_pauses,
            metrics.retries,
            metrics.errors_encountered
        );

        Ok(metrics)
    }

    /// Fetches and saves pages until the target is met or the source runs out
    async fn crawl_pages(
        &mut self,
        target_count: u64,
        metrics: &mut MetricsAccumulator,
        cancel: &CancellationToken,
    ) -> Result<(), StargazeError> {
        let capacity = usize::try_from(target_count)
            .unwrap_or(usize::MAX)
            .min(self.batch_size);
        let mut buffer: Vec<Repository> = Vec::with_capacity(capacity);
        let mut cursor: Option<Cursor> = None;

        loop {
            let page = self.fetch_page(cursor.as_ref(), metrics, cancel).await?;
            metrics.record_page();

            let next_cursor = page.continuation().cloned();
            let has_more = page.has_more;

            for repository in page.records {
                if metrics.records_accepted() >= target_count {
                    break;
                }

                if repository.owner().is_empty() || repository.name().is_empty() {
                    tracing::debug!("Skipping repository without owner or name");
                    continue;
                }

                buffer.push(repository);
                metrics.record_accepted();

                if buffer.len() >= self.batch_size {
                    self.flush_batch(&mut buffer, metrics, cancel)?;
                }
            }

            if metrics.records_accepted() >= target_count {
                tracing::info!("Reached target of {} repositories", target_count);
                break;
            }

            if !has_more {
                tracing::info!("Search results exhausted");
                break;
            }

            match next_cursor {
                Some(next) => cursor = Some(next),
                None => {
                    tracing::warn!("Source reported more results but sent no cursor, stopping");
                    break;
                }
            }
        }

        if !buffer.is_empty() {
            ensure_not_cancelled(cancel, metrics)?;

            let batch_size = buffer.len();
            match self.store.save_repositories(&buffer) {
                Ok(()) => metrics.record_saved(batch_size),
                Err(source) => {
                    metrics.record_batch_error();
                    tracing::error!(
                        "Failed to save final batch of {} repositories: {}",
                        batch_size,
                        source
                    );
                    return Err(StargazeError::FinalFlush { batch_size, source });
                }
            }
        }

        Ok(())
    }

    /// Fetches one page, pausing for the rate limit and retrying transient failures
    async fn fetch_page(
        &mut self,
        cursor: Option<&Cursor>,
        metrics: &mut MetricsAccumulator,
        cancel: &CancellationToken,
    ) -> Result<Page, StargazeError> {
        let mut tracker = self.retry_policy.start();

        loop {
            self.wait_for_budget(metrics, cancel).await?;

            let attempt = tracker.begin_attempt();
            let request_timeout = self.request_timeout;

            let fetch = tokio::time::timeout(request_timeout, self.fetcher.fetch(cursor));
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(cancelled(metrics)),
                result = fetch => result,
            };

            let error = match outcome {
                Ok(Ok(page)) => {
                    tracker.on_success();
                    return Ok(page);
                }
                Ok(Err(error)) => error,
                Err(_) => {
                    let message = format!("Request timed out after {:?}", request_timeout);
                    FetchError::Transient(message)
                }
            };

            match tracker.on_failure(&error) {
                RetryDecision::Retry(delay) => {
                    metrics.record_retry();
                    tracing::warn!(
                        "Attempt {} failed: {}. Retrying in {:?}",
                        attempt,
                        error,
                        delay
                    );

                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(cancelled(metrics)),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                RetryDecision::GiveUp if error.is_transient() => {
                    tracing::error!("Giving up after {} attempts: {}", attempt, error);
                    return Err(StargazeError::RetriesExhausted {
                        attempts: attempt,
                        source: error,
                    });
                }
                RetryDecision::GiveUp => {
                    tracing::error!("Fatal fetch error: {}", error);
                    return Err(StargazeError::Fetch(error));
                }
            }
        }
    }

    /// Sleeps until the rate-limit window resets if the budget is nearly spent
    async fn wait_for_budget(
        &mut self,
        metrics: &mut MetricsAccumulator,
        cancel: &CancellationToken,
    ) -> Result<(), StargazeError> {
        let budget = self.fetcher.budget();
        let Some(pause) = self.rate_limiter.should_pause(&budget, self.clock.now()) else {
            return Ok(());
        };

        metrics.record_pause();
        tracing::warn!(
            "Rate limit nearly exhausted ({} remaining). Pausing {:?} until reset at {:?}",
            budget.remaining,
            pause,
            budget.reset_at
        );

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(cancelled(metrics)),
            _ = tokio::time::sleep(pause) => Ok(()),
        }
    }

    /// Saves a full batch; a failure is counted and the batch dropped
    fn flush_batch(
        &mut self,
        buffer: &mut Vec<Repository>,
        metrics: &mut MetricsAccumulator,
        cancel: &CancellationToken,
    ) -> Result<(), StargazeError> {
        ensure_not_cancelled(cancel, metrics)?;

        let batch_size = buffer.len();
        match self.store.save_repositories(buffer) {
            Ok(()) => {
                metrics.record_saved(batch_size);
                tracing::info!(
                    "Progress: {} repositories saved, {} pages fetched",
                    metrics.records_crawled(),
                    metrics.pages_fetched()
                );
            }
            Err(e) => {
                metrics.record_batch_error();
                tracing::error!("Dropping batch of {} repositories: {}", batch_size, e);
            }
        }

        buffer.clear();
        Ok(())
    }
}

fn cancelled(metrics: &MetricsAccumulator) -> StargazeError {
    tracing::warn!("Crawl cancelled");
    StargazeError::Cancelled {
        records_crawled: metrics.records_crawled(),
    }
}

fn ensure_not_cancelled(
    cancel: &CancellationToken,
    metrics: &MetricsAccumulator,
) -> Result<(), StargazeError> {
    if cancel.is_cancelled() {
        return Err(cancelled(metrics));
    }
    Ok(())
}

/// Runs the main crawl operation
///
/// This function orchestrates the entire crawl process:
///
/// 1. Resolve the target and the access token
/// 2. Build the GitHub fetcher
/// 3. Open storage and record a new run
/// 4. Crawl until the target is reached, results run out, or `cancel` fires
/// 5. Record the run's outcome and close storage
///
/// # Arguments
///
/// * `config` - The crawler configuration
/// * `config_hash` - Hash of the configuration file, stored with the run
/// * `target_override` - Target count taking precedence over the config
/// * `cancel` - Token that stops the crawl cooperatively
///
/// # Returns
///
/// * `Ok(CrawlMetrics)` - Crawl completed successfully
/// * `Err(StargazeError)` - Crawl failed with an error
///
/// # Example
///
/// ```no_run
/// use stargaze::config::load_config_with_hash;
/// use stargaze::crawler::run_crawl;
/// use std::path::Path;
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let (config, hash) = load_config_with_hash(Path::new("stargaze.toml"))?;
/// let metrics = run_crawl(&config, &hash, None, CancellationToken::new()).await?;
/// println!("Saved {} repositories", metrics.records_crawled);
/// # Ok(())
/// # }
/// ```
pub async fn run_crawl(
    config: &Config,
    config_hash: &str,
    target_override: Option<u64>,
    cancel: CancellationToken,
) -> Result<CrawlMetrics, StargazeError> {
    let target_count = target_override.unwrap_or(config.crawler.target_count);
    if target_count == 0 {
        return Err(StargazeError::InvalidTarget);
    }

    let token = resolve_token(&config.github)?;
    let fetcher = GithubFetcher::new(&config.github, token)?;

    let mut storage = open_storage(Path::new(&config.output.database_path))?;
    let run_id = storage.create_run(config_hash, target_count)?;
    tracing::info!("Starting crawl run {}", run_id);

    let mut coordinator = Coordinator::from_config(fetcher, storage, config);
    let result = coordinator.crawl_with_cancel(target_count, cancel).await;
    let records_saved = coordinator.records_saved();
    let (_, mut storage) = coordinator.into_parts();

    let recorded = match &result {
        Ok(metrics) => storage.complete_run(run_id, metrics),
        Err(e @ StargazeError::Cancelled { .. }) => {
            storage.cancel_run(run_id, records_saved, &e.to_string())
        }
        Err(e) => storage.fail_run(run_id, records_saved, &e.to_string()),
    };
    if let Err(e) = recorded {
        tracing::warn!("Failed to record outcome of run {}: {}", run_id, e);
    }

    let closed = storage.close();
    let metrics = result?;
    closed?;
    Ok(metrics)
}
