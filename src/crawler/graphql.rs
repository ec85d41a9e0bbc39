//! GitHub GraphQL search wire format
//!
//! This module builds the repository search request and turns responses
//! into pages, including:
//! - The search query document and its variables
//! - Response parsing with dirty-node tolerance
//! - Rate-limit budget extraction from bodies and headers
//! - Classification of failed responses as transient or fatal

use crate::model::{Cursor, Page, RateBudget, Repository};
use crate::FetchError;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};

/// Search query selecting owner, name and star count of each repository
pub const SEARCH_QUERY: &str = r#"
query SearchRepositories($query: String!, $first: Int!, $cursor: String) {
  search(query: $query, type: REPOSITORY, first: $first, after: $cursor) {
    pageInfo {
      hasNextPage
      endCursor
    }
    nodes {
      ... on Repository {
        owner {
          login
        }
        name
        stargazerCount
      }
    }
  }
  rateLimit {
    remaining
    resetAt
  }
}
"#;

const RATE_LIMIT_REMAINING_HEADER: &str = "x-ratelimit-remaining";
const RATE_LIMIT_RESET_HEADER: &str = "x-ratelimit-reset";

#[derive(Debug, Deserialize)]
struct GraphqlResponse {
    data: Option<SearchData>,
    #[serde(default)]
    errors: Vec<GraphqlError>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchData {
    search: Option<SearchConnection>,
    rate_limit: Option<RateLimitInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchConnection {
    page_info: PageInfo,
    #[serde(default)]
    nodes: Vec<Option<RepositoryNode>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageInfo {
    has_next_page: bool,
    end_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RepositoryNode {
    owner: Option<OwnerNode>,
    name: Option<String>,
    stargazer_count: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct OwnerNode {
    login: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RateLimitInfo {
    remaining: Option<i64>,
    reset_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct GraphqlError {
    #[serde(rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    message: String,
}

/// Builds the JSON body for one search request
pub fn build_request_body(search_query: &str, first: u32, cursor: Option<&Cursor>) -> Value {
    json!({
        "query": SEARCH_QUERY,
        "variables": {
            "query": search_query,
            "first": first,
            "cursor": cursor.map(Cursor::as_str),
        }
    })
}

/// Parses a successful (2xx) search response body into a page
///
/// `budget` is replaced with the rate limit the body reports, when it reports
/// one, even if the body turns out to carry GraphQL errors. A body without a
/// reset time keeps the one already known. All records share `fetched_at`.
pub fn parse_search_response(
    body: &str,
    fetched_at: DateTime<Utc>,
    budget: &mut RateBudget,
) -> Result<Page, FetchError> {
    let response: GraphqlResponse = serde_json::from_str(body)
        .map_err(|e| FetchError::Transient(format!("Unparseable response body: {}", e)))?;

    if let Some(info) = response.data.as_ref().and_then(|d| d.rate_limit.as_ref()) {
        if let Some(remaining) = info.remaining {
            let reset_at = info.reset_at.or(budget.reset_at);
            *budget = RateBudget::new(clamp_to_u32(remaining), reset_at);
        }
    }

    if !response.errors.is_empty() {
        return Err(classify_graphql_errors(&response.errors));
    }

    let search = response
        .data
        .and_then(|d| d.search)
        .ok_or_else(|| FetchError::Transient("Response has no search data".to_string()))?;

    let total_nodes = search.nodes.len();
    let records: Vec<Repository> = search
        .nodes
        .into_iter()
        .flatten()
        .filter_map(|node| node_to_repository(node, fetched_at))
        .collect();

    if records.len() < total_nodes {
        tracing::debug!(
            "Dropped {} search nodes without owner or name",
            total_nodes - records.len()
        );
    }

    Ok(Page {
        records,
        next_cursor: search.page_info.end_cursor.map(Cursor::new),
        has_more: search.page_info.has_next_page,
        budget: *budget,
    })
}

/// Converts a search node, dropping it if owner login or name is missing
fn node_to_repository(node: RepositoryNode, fetched_at: DateTime<Utc>) -> Option<Repository> {
    let owner = node
        .owner
        .and_then(|o| o.login)
        .filter(|login| !login.is_empty())?;
    let name = node.name.filter(|name| !name.is_empty())?;
    let stars = node.stargazer_count.unwrap_or(0).max(0) as u64;

    Some(Repository::new(owner, name, stars, fetched_at))
}

fn classify_graphql_errors(errors: &[GraphqlError]) -> FetchError {
    let messages = errors
        .iter()
        .map(|e| e.message.as_str())
        .collect::<Vec<_>>()
        .join("; ");

    let rate_limited = errors.iter().any(|e| {
        e.kind.as_deref() == Some("RATE_LIMITED") || e.message.to_lowercase().contains("rate limit")
    });

    if rate_limited {
        FetchError::Transient(format!("Rate limited: {}", messages))
    } else {
        FetchError::Fatal(format!("GraphQL query rejected: {}", messages))
    }
}

/// Reads the budget GitHub reports in response headers
///
/// Falls back to `current` when the headers are missing or malformed.
pub fn budget_from_headers(headers: &HeaderMap, current: RateBudget) -> RateBudget {
    let remaining = header_i64(headers, RATE_LIMIT_REMAINING_HEADER);
    let reset_at = header_i64(headers, RATE_LIMIT_RESET_HEADER)
        .and_then(|epoch| Utc.timestamp_opt(epoch, 0).single());

    match remaining {
        Some(remaining) => RateBudget::new(clamp_to_u32(remaining), reset_at.or(current.reset_at)),
        None => current,
    }
}

/// Classifies a non-2xx response
///
/// | Status | Classification |
/// |--------|----------------|
/// | 429, 5xx | Transient |
/// | 403 with rate-limit signal | Transient |
/// | 401, other 403, other 4xx | Fatal |
pub fn classify_status(status: StatusCode, headers: &HeaderMap, body: &str) -> FetchError {
    let summary = format!("HTTP {}: {}", status.as_u16(), truncate(body, 200));

    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        return FetchError::Transient(summary);
    }

    if status == StatusCode::FORBIDDEN {
        let exhausted = header_i64(headers, RATE_LIMIT_REMAINING_HEADER) == Some(0);
        if exhausted || body.to_lowercase().contains("rate limit") {
            return FetchError::Transient(summary);
        }
    }

    FetchError::Fatal(summary)
}

/// Classifies a transport-level failure
pub fn classify_transport_error(error: &reqwest::Error) -> FetchError {
    if error.is_builder() {
        FetchError::Fatal(format!("Invalid request: {}", error))
    } else if error.is_timeout() {
        FetchError::Transient("Request timeout".to_string())
    } else if error.is_connect() {
        FetchError::Transient(format!("Connection failed: {}", error))
    } else {
        FetchError::Transient(error.to_string())
    }
}

fn header_i64(headers: &HeaderMap, name: &str) -> Option<i64> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

fn clamp_to_u32(value: i64) -> u32 {
    value.clamp(0, u32::MAX as i64) as u32
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
