use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure for Stargaze
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub github: GithubConfig,
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(default, rename = "rate-limit")]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// GitHub GraphQL endpoint configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GithubConfig {
    /// GraphQL endpoint URL
    pub endpoint: String,

    /// Name of the environment variable holding the access token
    #[serde(rename = "token-env")]
    pub token_env: String,

    /// Search qualifier passed to the `search` query
    #[serde(rename = "search-query")]
    pub search_query: String,

    /// Repositories requested per page (GitHub allows at most 100)
    #[serde(rename = "page-size")]
    pub page_size: u32,

    /// Upper bound on a single request, in seconds
    #[serde(rename = "request-timeout-secs")]
    pub request_timeout_secs: u64,
}

impl GithubConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.github.com/graphql".to_string(),
            token_env: "GITHUB_TOKEN".to_string(),
            search_query: "stars:>1".to_string(),
            page_size: 100,
            request_timeout_secs: 30,
        }
    }
}

/// Crawl size and batching configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    /// Number of repositories to collect
    #[serde(rename = "target-count")]
    pub target_count: u64,

    /// Repositories buffered before each write to storage
    #[serde(rename = "batch-size")]
    pub batch_size: usize,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            target_count: 100_000,
            batch_size: 1000,
        }
    }
}

/// Rate-limit pause policy
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Pause once the remaining budget drops to this value or below
    #[serde(rename = "low-watermark")]
    pub low_watermark: u32,

    /// Extra time slept past the reported reset, in seconds
    #[serde(rename = "safety-margin-secs")]
    pub safety_margin_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            low_watermark: 10,
            safety_margin_secs: 1,
        }
    }
}

/// Exponential back-off for transient fetch failures
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts per page, including the first one
    #[serde(rename = "max-attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry, in seconds
    #[serde(rename = "base-delay-secs")]
    pub base_delay_secs: u64,

    /// Cap on any single delay, in seconds
    #[serde(rename = "max-delay-secs")]
    pub max_delay_secs: u64,

    /// Add random jitter to each delay
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_secs: 4,
            max_delay_secs: 60,
            jitter: false,
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,

    /// Default destination of `--export`
    #[serde(rename = "export-path")]
    pub export_path: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            database_path: "./stargaze.db".to_string(),
            export_path: "./repositories.csv".to_string(),
        }
    }
}
