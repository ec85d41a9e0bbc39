//! Crawler module for paging through repository search results
//!
//! This module contains the core crawling logic, including:
//! - GraphQL request building and response parsing
//! - Page fetching with error classification
//! - Rate-limit pauses and retry back-off
//! - Overall crawl coordination

mod coordinator;
mod fetcher;
mod graphql;
mod rate_limiter;
mod retry;

pub use coordinator::{run_crawl, Coordinator};
pub use fetcher::{build_http_client, GithubFetcher, PageFetcher};
pub use graphql::{build_request_body, parse_search_response, SEARCH_QUERY};
pub use rate_limiter::{Clock, RateLimiter, SystemClock};
pub use retry::{RetryDecision, RetryPolicy, RetryState, RetryTracker};
