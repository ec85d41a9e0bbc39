//! Page fetcher implementation
//!
//! This module handles every request the crawler sends, including:
//! - Building the HTTP client with a proper user agent string
//! - The `PageFetcher` seam the coordinator drives
//! - The GitHub GraphQL search fetcher
//! - Error classification

use crate::config::{GithubConfig, MAX_PAGE_SIZE};
use crate::crawler::graphql::{
    budget_from_headers, build_request_body, classify_status, classify_transport_error,
    parse_search_response,
};
use crate::model::{Cursor, Page, RateBudget};
use crate::FetchError;
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use std::time::Duration;

/// Source of paginated repository search results
///
/// Each call to [`PageFetcher::fetch`] performs exactly one round-trip.
#[async_trait]
pub trait PageFetcher: Send {
    /// Fetches the page after `cursor`, or the first page for `None`
    ///
    /// `cursor` must be `None` or a cursor this fetcher returned earlier.
    async fn fetch(&mut self, cursor: Option<&Cursor>) -> Result<Page, FetchError>;

    /// Budget reported by the most recent response
    fn budget(&self) -> RateBudget;
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `request_timeout` - Upper bound for a whole request
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
pub fn build_http_client(request_timeout: Duration) -> Result<Client, reqwest::Error> {
    // Format: Name/Version; GitHub rejects requests without a user agent
    let user_agent = format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));

    Client::builder()
        .user_agent(user_agent)
        .timeout(request_timeout)
        .connect_timeout(Duration::from_secs(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Fetches repository search pages from GitHub's GraphQL API
pub struct GithubFetcher {
    client: Client,
    endpoint: String,
    token: String,
    search_query: String,
    page_size: u32,
    budget: RateBudget,
}

impl GithubFetcher {
    /// Creates a fetcher from configuration and an access token
    ///
    /// The page size is clamped to the 1..=100 range GitHub accepts.
    pub fn new(config: &GithubConfig, token: impl Into<String>) -> Result<Self, reqwest::Error> {
        let client = build_http_client(config.request_timeout())?;
        Ok(Self::with_client(client, config, token))
    }

    /// Creates a fetcher that sends requests through an existing client
    pub fn with_client(client: Client, config: &GithubConfig, token: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: config.endpoint.clone(),
            token: token.into(),
            search_query: config.search_query.clone(),
            page_size: config.page_size.clamp(1, MAX_PAGE_SIZE),
            budget: RateBudget::default(),
        }
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }
}

#[async_trait]
impl PageFetcher for GithubFetcher {
    async fn fetch(&mut self, cursor: Option<&Cursor>) -> Result<Page, FetchError> {
        let body = build_request_body(&self.search_query, self.page_size, cursor);

        tracing::debug!(
            "Requesting {} repositories after cursor {:?}",
            self.page_size,
            cursor.map(Cursor::as_str)
        );

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await
            .map_err(|e| classify_transport_error(&e))?;

        let status = response.status();
        let headers = response.headers().clone();
        self.budget = budget_from_headers(&headers, self.budget);

        let text = response
            .text()
            .await
            .map_err(|e| classify_transport_error(&e))?;

        if !status.is_success() {
            let error = classify_status(status, &headers, &text);
            tracing::warn!("Search request failed: {}", error);
            return Err(error);
        }

        let page = parse_search_response(&text, Utc::now(), &mut self.budget)?;

        tracing::debug!(
            "Received {} repositories, has_more={}, budget remaining={}",
            page.records.len(),
            page.has_more,
            self.budget.remaining
        );

        Ok(page)
    }

    fn budget(&self) -> RateBudget {
        self.budget
    }
}
