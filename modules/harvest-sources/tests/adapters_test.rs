use std::time::{Duration, Instant};

use harvest_common::HarvestConfig;
use harvest_sources::adapters::{dockerhub, github, npm, pypi, registries};
use harvest_sources::{FetchClient, FetchError, RetryPolicy, SourceAdapter};
use httpmock::prelude::*;
use serde_json::json;

fn client(source: &str) -> FetchClient {
    FetchClient::new(source, &HarvestConfig::default(), None)
        .unwrap()
        .with_policy(RetryPolicy::immediate(3))
}

fn terms(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn github_search_canonicalizes_and_truncates() {
    let server = MockServer::start_async().await;
    let search = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/search/repositories")
                .query_param("page", "1");
            then.status(200).json_body(json!({
                "items": [
                    {"html_url": "https://github.com/acme/gmail-mcp/", "full_name": "acme/gmail-mcp", "stargazers_count": 9},
                    {"html_url": "https://github.com/acme/mail-tools", "full_name": "acme/mail-tools"},
                    {"html_url": "https://github.com/acme/third", "full_name": "acme/third"}
                ]
            }));
        })
        .await;

    let adapter = github::GithubAdapter::new(client("github")).with_base_url(server.base_url());
    let hits = adapter.search(&terms(&["gmail"]), 2).await.unwrap();

    search.assert_hits_async(1).await;
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].url, "https://github.com/acme/gmail-mcp");
    assert_eq!(hits[0].extra["stars"], json!(9));
}

#[tokio::test]
async fn server_errors_are_retried_until_exhausted() {
    let server = MockServer::start_async().await;
    let failing = server
        .mock_async(|when, then| {
            when.method(GET).path("/api/content/v1/products/search");
            then.status(503);
        })
        .await;

    let adapter =
        dockerhub::DockerhubAdapter::new(client("dockerhub")).with_base_url(server.base_url());
    let err = adapter.search(&terms(&["gmail"]), 10).await.unwrap_err();

    failing.assert_hits_async(3).await;
    assert!(matches!(err, FetchError::Exhausted { attempts: 3, .. }));
}

#[tokio::test]
async fn npm_falls_back_to_plain_terms() {
    let server = MockServer::start_async().await;
    let enriched = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/-/v1/search")
                .query_param("text", "gmail modelcontextprotocol mcp");
            then.status(400);
        })
        .await;
    let plain = server
        .mock_async(|when, then| {
            when.method(GET).path("/-/v1/search").query_param("text", "gmail");
            then.status(200).json_body(json!({
                "objects": [{"package": {
                    "name": "gmail-mcp",
                    "links": {"repository": "git+https://github.com/acme/gmail-mcp.git"}
                }}]
            }));
        })
        .await;

    let adapter = npm::NpmAdapter::new(client("npm")).with_base_url(server.base_url());
    let hits = adapter.search(&terms(&["gmail"]), 10).await.unwrap();

    enriched.assert_hits_async(1).await;
    plain.assert_hits_async(1).await;
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].url, "https://github.com/acme/gmail-mcp");
}

#[tokio::test]
async fn pypi_skips_projects_whose_lookup_fails() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/search/");
            then.status(200).body(
                r#"<a href="/project/gmail-mcp/">a</a><a href="/project/broken/">b</a>"#,
            );
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/pypi/gmail-mcp/json");
            then.status(200).json_body(json!({
                "info": {
                    "summary": "Gmail MCP",
                    "project_urls": {"Source": "https://github.com/acme/gmail-mcp"}
                }
            }));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/pypi/broken/json");
            then.status(404);
        })
        .await;

    let adapter = pypi::PypiAdapter::new(client("pypi"), 2).with_base_url(server.base_url());
    let hits = adapter.search(&terms(&["gmail"]), 10).await.unwrap();

    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].title.as_deref(), Some("gmail-mcp"));
}

#[tokio::test]
async fn registries_return_partial_results_when_one_page_fails() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/list.md");
            then.status(200)
                .body("- [Gmail](https://github.com/acme/gmail-mcp) gmail server\n");
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/down");
            then.status(404);
        })
        .await;

    let pages = vec![server.url("/list.md"), server.url("/down")];
    let adapter = registries::RegistriesAdapter::new(client("registries"), pages);
    let hits = adapter.search(&terms(&["gmail"]), 10).await.unwrap();
    assert_eq!(hits.len(), 1);

    let all_down = registries::RegistriesAdapter::new(client("registries"), vec![server.url("/down")]);
    assert!(all_down.search(&terms(&["gmail"]), 10).await.is_err());
}

fn client_with_concurrency(limit: usize) -> FetchClient {
    let config =
        HarvestConfig::from_toml_str(&format!("[sources.npm]\nconcurrency = {limit}\n")).unwrap();
    FetchClient::new("npm", &config, None)
        .unwrap()
        .with_policy(RetryPolicy::immediate(2))
}

const SLOW: Duration = Duration::from_millis(150);

#[tokio::test]
async fn concurrent_requests_are_bounded_by_the_source_semaphore() {
    let server = MockServer::start_async().await;
    let slow = server
        .mock_async(|when, then| {
            when.method(GET).path("/slow");
            then.status(200).body("ok").delay(SLOW);
        })
        .await;

    let client = client_with_concurrency(2);
    let url = server.url("/slow");
    let started = Instant::now();
    let results =
        futures::future::join_all((0..6).map(|_| client.get_text(&url, &[]))).await;
    let elapsed = started.elapsed();

    assert!(results.iter().all(|r| matches!(r, Ok(body) if body == "ok")));
    slow.assert_hits_async(6).await;
    // Six requests two at a time need at least three delay rounds.
    assert!(elapsed >= SLOW * 3, "elapsed {elapsed:?}");
    assert_eq!(client.available_permits(), 2);
}

#[tokio::test]
async fn retries_stay_within_the_source_semaphore() {
    let server = MockServer::start_async().await;
    let failing = server
        .mock_async(|when, then| {
            when.method(GET).path("/flaky");
            then.status(503).delay(SLOW);
        })
        .await;

    let client = client_with_concurrency(2);
    let url = server.url("/flaky");
    let started = Instant::now();
    let results =
        futures::future::join_all((0..6).map(|_| client.get_text(&url, &[]))).await;
    let elapsed = started.elapsed();

    assert!(results
        .iter()
        .all(|r| matches!(r, Err(FetchError::Exhausted { attempts: 2, .. }))));
    failing.assert_hits_async(12).await;
    // Twelve attempts two at a time need at least six delay rounds.
    assert!(elapsed >= SLOW * 6, "elapsed {elapsed:?}");
    assert_eq!(client.available_permits(), 2);
}
