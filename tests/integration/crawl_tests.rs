//! Integration tests for the crawler
//!
//! These tests use wiremock to stand in for GitHub's GraphQL endpoint and
//! test the full crawl cycle end-to-end against a temporary SQLite database.

use serde_json::{json, Value};
use stargaze::config::{Config, GithubConfig};
use stargaze::crawler::{run_crawl, Coordinator, GithubFetcher, PageFetcher, RetryPolicy};
use stargaze::model::Cursor;
use stargaze::storage::{RepositoryStore, RunStatus, SqliteStorage};
use stargaze::{FetchError, StargazeError};
use std::path::Path;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TOKEN: &str = "test-token";

/// Builds a GraphQL search response body
fn search_body(
    nodes: Value,
    has_next_page: bool,
    end_cursor: Option<&str>,
    remaining: u32,
) -> Value {
    json!({
        "data": {
            "search": {
                "pageInfo": { "hasNextPage": has_next_page, "endCursor": end_cursor },
                "nodes": nodes
            },
            "rateLimit": { "remaining": remaining, "resetAt": "2030-01-01T00:00:00Z" }
        }
    })
}

fn node(owner: &str, name: &str, stars: i64) -> Value {
    json!({ "owner": { "login": owner }, "name": name, "stargazerCount": stars })
}

fn github_config(server: &MockServer, token_env: &str) -> GithubConfig {
    GithubConfig {
        endpoint: format!("{}/graphql", server.uri()),
        token_env: token_env.to_string(),
        page_size: 2,
        request_timeout_secs: 5,
        ..GithubConfig::default()
    }
}

/// Creates a test configuration writing to `db_path`
fn create_test_config(server: &MockServer, token_env: &str, db_path: &Path) -> Config {
    let mut config = Config::default();
    config.github = github_config(server, token_env);
    config.crawler.batch_size = 2;
    config.retry.max_attempts = 2;
    config.retry.base_delay_secs = 0;
    config.retry.max_delay_secs = 0;
    config.output.database_path = db_path.to_string_lossy().into_owned();
    config
}

/// Mounts a two-page search: owner-a/one, owner-b/two, then owner-c/three
async fn mount_two_pages(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .and(body_partial_json(json!({ "variables": { "cursor": null } })))
        .respond_with(ResponseTemplate::new(200).set_body_json(search_body(
            json!([node("owner-a", "one", 300), node("owner-b", "two", 200)]),
            true,
            Some("page-2"),
            4999,
        )))
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path("/graphql"))
        .and(body_partial_json(json!({ "variables": { "cursor": "page-2" } })))
        .respond_with(ResponseTemplate::new(200).set_body_json(search_body(
            json!([node("owner-c", "three", 100)]),
            false,
            None,
            4998,
        )))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_fetcher_sends_query_and_parses_page() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/graphql"))
        .and(header("authorization", "Bearer test-token"))
        .and(body_partial_json(json!({
            "variables": { "query": "stars:>1", "first": 2, "cursor": null }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(search_body(
            json!([
                node("rust-lang", "rust", 90000),
                { "owner": null, "name": "orphan", "stargazerCount": 1 },
                {}
            ]),
            true,
            Some("abc"),
            4321,
        )))
        .expect(1)
        .mount(&server)
        .await;

    let mut fetcher = GithubFetcher::new(&github_config(&server, "UNUSED"), TOKEN)
        .expect("Failed to build fetcher");
    let page = fetcher.fetch(None).await.expect("fetch should succeed");

    assert_eq!(page.records.len(), 1);
    assert_eq!(page.records[0].full_name(), "rust-lang/rust");
    assert_eq!(page.records[0].star_count(), 90_000);
    assert_eq!(page.continuation(), Some(&Cursor::new("abc")));
    assert_eq!(fetcher.budget().remaining, 4321);
    assert!(fetcher.budget().reset_at.is_some());
}

#[tokio::test]
async fn test_fetcher_classifies_server_errors_as_transient() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(502).set_body_string("Bad Gateway"))
        .mount(&server)
        .await;

    let mut fetcher = GithubFetcher::new(&github_config(&server, "UNUSED"), TOKEN)
        .expect("Failed to build fetcher");
    let result = fetcher.fetch(None).await;

    assert!(matches!(result, Err(FetchError::Transient(_))));
}

#[tokio::test]
async fn test_fetcher_classifies_bad_credentials_as_fatal() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(401)
                .set_body_json(json!({ "message": "Bad credentials" })),
        )
        .mount(&server)
        .await;

    let mut fetcher = GithubFetcher::new(&github_config(&server, "UNUSED"), TOKEN)
        .expect("Failed to build fetcher");
    let result = fetcher.fetch(None).await;

    match result {
        Err(FetchError::Fatal(msg)) => assert!(msg.contains("401")),
        other => panic!("expected fatal error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_fetcher_reads_budget_from_rate_limited_response() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(403)
                .insert_header("x-ratelimit-remaining", "0")
                .insert_header("x-ratelimit-reset", "1893456000")
                .set_body_json(json!({ "message": "API rate limit exceeded" })),
        )
        .mount(&server)
        .await;

    let mut fetcher = GithubFetcher::new(&github_config(&server, "UNUSED"), TOKEN)
        .expect("Failed to build fetcher");
    let result = fetcher.fetch(None).await;

    assert!(matches!(result, Err(FetchError::Transient(_))));
    assert_eq!(fetcher.budget().remaining, 0);
    assert_eq!(
        fetcher.budget().reset_at.map(|t| t.timestamp()),
        Some(1_893_456_000)
    );
}

#[tokio::test]
async fn test_fetcher_keeps_header_reset_when_body_has_none() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("x-ratelimit-remaining", "3")
                .insert_header("x-ratelimit-reset", "1893456000")
                .set_body_json(json!({
                    "data": {
                        "search": {
                            "pageInfo": { "hasNextPage": true, "endCursor": "next" },
                            "nodes": [node("rust-lang", "rust", 90000)]
                        },
                        "rateLimit": { "remaining": 3, "resetAt": null }
                    }
                })),
        )
        .mount(&server)
        .await;

    let mut fetcher = GithubFetcher::new(&github_config(&server, "UNUSED"), TOKEN)
        .expect("Failed to build fetcher");
    let page = fetcher.fetch(None).await.expect("fetch should succeed");

    assert_eq!(page.records.len(), 1);
    assert_eq!(fetcher.budget().remaining, 3);
    assert_eq!(
        fetcher.budget().reset_at.map(|t| t.timestamp()),
        Some(1_893_456_000)
    );
}

#[tokio::test]
async fn test_fetcher_graphql_rate_limit_error_is_transient() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "errors": [{ "type": "RATE_LIMITED", "message": "API rate limit exceeded for user" }]
        })))
        .mount(&server)
        .await;

    let mut fetcher = GithubFetcher::new(&github_config(&server, "UNUSED"), TOKEN)
        .expect("Failed to build fetcher");

    assert!(matches!(
        fetcher.fetch(None).await,
        Err(FetchError::Transient(_))
    ));
}

#[tokio::test]
async fn test_full_crawl_persists_repositories_and_run() {
    let server = MockServer::start().await;
    mount_two_pages(&server).await;

    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let db_path = dir.path().join("stargaze.db");
    let token_env = "STARGAZE_TEST_TOKEN_FULL_CRAWL";
    std::env::set_var(token_env, TOKEN);
    let config = create_test_config(&server, token_env, &db_path);

    let metrics = run_crawl(&config, "hash-1", Some(10), CancellationToken::new())
        .await
        .expect("Crawl should succeed");

    assert_eq!(metrics.records_crawled, 3);
    assert_eq!(metrics.pages_fetched, 2);
    assert_eq!(metrics.errors_encountered, 0);

    let storage = SqliteStorage::new(&db_path).expect("Failed to reopen database");
    assert_eq!(storage.repository_count().expect("count"), 3);

    let top = storage.top_repositories(1).expect("top");
    assert_eq!(top[0].full_name(), "owner-a/one");

    let runs = storage.latest_runs(1).expect("runs");
    assert_eq!(runs[0].status, RunStatus::Completed);
    assert_eq!(runs[0].config_hash, "hash-1");
    assert_eq!(runs[0].target_count, 10);
    assert_eq!(runs[0].records_crawled, 3);
}

#[tokio::test]
async fn test_crawl_stops_at_target_mid_page() {
    let server = MockServer::start().await;
    mount_two_pages(&server).await;

    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let db_path = dir.path().join("stargaze.db");
    let token_env = "STARGAZE_TEST_TOKEN_TARGET";
    std::env::set_var(token_env, TOKEN);
    let config = create_test_config(&server, token_env, &db_path);

    let metrics = run_crawl(&config, "hash", Some(1), CancellationToken::new())
        .await
        .expect("Crawl should succeed");

    assert_eq!(metrics.records_crawled, 1);
    assert_eq!(metrics.pages_fetched, 1);

    let storage = SqliteStorage::new(&db_path).expect("Failed to reopen database");
    assert_eq!(storage.repository_count().expect("count"), 1);
}

#[tokio::test]
async fn test_recrawl_updates_changed_stars() {
    let server = MockServer::start().await;
    mount_two_pages(&server).await;

    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let db_path = dir.path().join("stargaze.db");
    let token_env = "STARGAZE_TEST_TOKEN_RECRAWL";
    std::env::set_var(token_env, TOKEN);
    let config = create_test_config(&server, token_env, &db_path);

    run_crawl(&config, "hash", None, CancellationToken::new())
        .await
        .expect("First crawl should succeed");

    server.reset().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(search_body(
            json!([node("owner-a", "one", 301)]),
            false,
            None,
            4997,
        )))
        .mount(&server)
        .await;

    run_crawl(&config, "hash", None, CancellationToken::new())
        .await
        .expect("Second crawl should succeed");

    let storage = SqliteStorage::new(&db_path).expect("Failed to reopen database");
    assert_eq!(storage.repository_count().expect("count"), 3);
    let repo = storage
        .get_repository("owner-a", "one")
        .expect("query")
        .expect("row exists");
    assert_eq!(repo.star_count(), 301);
    assert_eq!(storage.latest_runs(10).expect("runs").len(), 2);
}

#[tokio::test]
async fn test_fatal_error_marks_run_failed() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(401)
                .set_body_json(json!({ "message": "Bad credentials" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let db_path = dir.path().join("stargaze.db");
    let token_env = "STARGAZE_TEST_TOKEN_FATAL";
    std::env::set_var(token_env, TOKEN);
    let config = create_test_config(&server, token_env, &db_path);

    let result = run_crawl(&config, "hash", Some(5), CancellationToken::new()).await;

    assert!(matches!(
        result,
        Err(StargazeError::Fetch(FetchError::Fatal(_)))
    ));

    let storage = SqliteStorage::new(&db_path).expect("Failed to reopen database");
    let run = &storage.latest_runs(1).expect("runs")[0];
    assert_eq!(run.status, RunStatus::Failed);
    assert!(run
        .error_message
        .as_deref()
        .is_some_and(|m| m.contains("Bad credentials")));
}

#[tokio::test]
async fn test_failed_run_records_batches_saved_before_failure() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "variables": { "cursor": null } })))
        .respond_with(ResponseTemplate::new(200).set_body_json(search_body(
            json!([node("owner-a", "one", 300), node("owner-b", "two", 200)]),
            true,
            Some("page-2"),
            4999,
        )))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "variables": { "cursor": "page-2" } })))
        .respond_with(ResponseTemplate::new(401).set_body_string("Bad credentials"))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let db_path = dir.path().join("stargaze.db");
    let token_env = "STARGAZE_TEST_TOKEN_PARTIAL";
    std::env::set_var(token_env, TOKEN);
    let config = create_test_config(&server, token_env, &db_path);

    let result = run_crawl(&config, "hash", Some(10), CancellationToken::new()).await;

    assert!(matches!(
        result,
        Err(StargazeError::Fetch(FetchError::Fatal(_)))
    ));

    let storage = SqliteStorage::new(&db_path).expect("Failed to reopen database");
    assert_eq!(storage.repository_count().expect("count"), 2);
    let run = &storage.latest_runs(1).expect("runs")[0];
    assert_eq!(run.status, RunStatus::Failed);
    assert_eq!(run.records_crawled, 2);
}

#[tokio::test]
async fn test_server_errors_exhaust_retries() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .expect(2)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let db_path = dir.path().join("stargaze.db");
    let token_env = "STARGAZE_TEST_TOKEN_RETRIES";
    std::env::set_var(token_env, TOKEN);
    let config = create_test_config(&server, token_env, &db_path);

    let result = run_crawl(&config, "hash", Some(5), CancellationToken::new()).await;

    assert!(matches!(
        result,
        Err(StargazeError::RetriesExhausted { attempts: 2, .. })
    ));
}

#[tokio::test]
async fn test_missing_token_fails_before_any_request() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let db_path = dir.path().join("stargaze.db");
    let config = create_test_config(&server, "STARGAZE_TEST_TOKEN_NEVER_SET", &db_path);

    let result = run_crawl(&config, "hash", Some(5), CancellationToken::new()).await;

    assert!(matches!(result, Err(StargazeError::Config(_))));
    assert!(!db_path.exists());
}

#[tokio::test]
async fn test_slow_response_times_out() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(search_body(json!([]), false, None, 4999))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let fetcher = GithubFetcher::new(&github_config(&server, "UNUSED"), TOKEN)
        .expect("Failed to build fetcher");
    let storage = SqliteStorage::new_in_memory().expect("in-memory database");
    let mut coordinator = Coordinator::new(fetcher, storage)
        .with_request_timeout(Duration::from_millis(200))
        .with_retry_policy(RetryPolicy::new(
            2,
            Duration::from_millis(10),
            Duration::from_millis(10),
        ));

    let result = coordinator.crawl(5).await;

    match result {
        Err(StargazeError::RetriesExhausted { attempts, source }) => {
            assert_eq!(attempts, 2);
            assert!(source.is_transient());
        }
        other => panic!("expected timeout to exhaust retries, got {:?}", other),
    }
}
