use tokio::time::Instant;

/// Final metrics of one crawl run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CrawlMetrics {
    /// Repositories successfully written to storage
    pub records_crawled: u64,

    /// Wall-clock duration of the run in seconds
    pub duration_seconds: f64,

    /// Number of times the crawl slept waiting for a rate-limit reset
    pub rate_limit_pauses: u64,

    /// Batches that storage rejected
    pub errors_encountered: u64,

    /// Pages successfully fetched from the source
    pub pages_fetched: u64,

    /// Fetch attempts that were retried after a transient failure
    pub retries: u64,
}

impl CrawlMetrics {
    /// Repositories saved per second, 0 for an instantaneous run
    pub fn throughput(&self) -> f64 {
        if self.duration_seconds > 0.0 {
            self.records_crawled as f64 / self.duration_seconds
        } else {
            0.0
        }
    }
}

/// Mutable counters populated by the coordinator during a run
///
/// Call [`MetricsAccumulator::finish`] once at the end to obtain the
/// immutable [`CrawlMetrics`].
#[derive(Debug)]
pub struct MetricsAccumulator {
    started: Instant,
    records_accepted: u64,
    records_crawled: u64,
    rate_limit_pauses: u64,
    errors_encountered: u64,
    pages_fetched: u64,
    retries: u64,
}

impl MetricsAccumulator {
    /// Starts the run timer
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
            records_accepted: 0,
            records_crawled: 0,
            rate_limit_pauses: 0,
            errors_encountered: 0,
            pages_fetched: 0,
            retries: 0,
        }
    }

    /// Records that one valid repository entered the batch buffer
    pub fn record_accepted(&mut self) {
        self.records_accepted += 1;
    }

    pub fn record_saved(&mut self, count: usize) {
        self.records_crawled += count as u64;
    }

    pub fn record_batch_error(&mut self) {
        self.errors_encountered += 1;
    }

    pub fn record_pause(&mut self) {
        self.rate_limit_pauses += 1;
    }

    pub fn record_page(&mut self) {
        self.pages_fetched += 1;
    }

    pub fn record_retry(&mut self) {
        self.retries += 1;
    }

    /// Repositories taken from the source so far, saved or not
    pub fn records_accepted(&self) -> u64 {
        self.records_accepted
    }

    pub fn records_crawled(&self) -> u64 {
        self.records_crawled
    }

    pub fn pages_fetched(&self) -> u64 {
        self.pages_fetched
    }

    /// Stops the timer and freezes the counters
    pub fn finish(self) -> CrawlMetrics {
        CrawlMetrics {
            records_crawled: self.records_crawled,
            duration_seconds: self.started.elapsed().as_secs_f64(),
            rate_limit_pauses: self.rate_limit_pauses,
            errors_encountered: self.errors_encountered,
            pages_fetched: self.pages_fetched,
            retries: self.retries,
        }
    }
}
