use async_trait::async_trait;
use harvest_common::SourceHit;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::adapter::{finalize_hits, SourceAdapter};
use crate::client::FetchClient;
use crate::error::FetchResult;

const DEFAULT_BASE_URL: &str = "https://api.github.com";
const PER_PAGE: usize = 50;
const MAX_PAGES: u32 = 2;

/// GitHub repository search adapter.
///
/// Searches readmes and descriptions; carries stars, push time, archive
/// state, forks and license through as signals.
pub struct GithubAdapter {
    client: FetchClient,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct GithubRepo {
    html_url: String,
    #[serde(default)]
    full_name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    stargazers_count: Option<u64>,
    #[serde(default)]
    forks_count: Option<u64>,
    #[serde(default)]
    pushed_at: Option<String>,
    #[serde(default)]
    archived: bool,
    #[serde(default)]
    license: Option<GithubLicense>,
    #[serde(default)]
    homepage: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GithubLicense {
    #[serde(default)]
    spdx_id: Option<String>,
}

impl GithubAdapter {
    pub fn new(client: FetchClient) -> Self {
        Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

/// Parse one page of `/search/repositories`. Malformed items are skipped.
pub fn parse_search_page(data: &Value) -> Vec<SourceHit> {
    let Some(items) = data.get("items").and_then(Value::as_array) else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| match serde_json::from_value::<GithubRepo>(item.clone()) {
            Ok(repo) => Some(repo),
            Err(e) => {
                debug!(error = %e, "Skipping malformed GitHub item");
                None
            }
        })
        .map(|repo| {
            let license = repo.license.and_then(|l| l.spdx_id);
            let mut hit = SourceHit::new("github", repo.html_url)
                .with_snippet(repo.description.unwrap_or_default())
                .with_extra("stars", repo.stargazers_count.unwrap_or(0))
                .with_extra("forks", repo.forks_count.unwrap_or(0))
                .with_extra("pushed_at", repo.pushed_at)
                .with_extra("archived", repo.archived)
                .with_extra("license", license);
            if let Some(name) = repo.full_name {
                hit = hit.with_title(name);
            }
            if let Some(homepage) = repo.homepage.filter(|h| !h.trim().is_empty()) {
                hit = hit.with_extra("homepage", homepage);
            }
            hit
        })
        .collect()
}

#[async_trait]
impl SourceAdapter for GithubAdapter {
    fn name(&self) -> &str {
        "github"
    }

    async fn search(&self, terms: &[String], limit: usize) -> FetchResult<Vec<SourceHit>> {
        let q = format!("{} in:readme,description", terms.join(" "));
        let url = format!("{}/search/repositories", self.base_url);
        let mut hits = Vec::new();

        for page in 1..=MAX_PAGES {
            let query = [
                ("q", q.clone()),
                ("per_page", PER_PAGE.to_string()),
                ("page", page.to_string()),
            ];
            let data: Value = match self.client.get_json(&url, &query).await {
                Ok(data) => data,
                // Later pages are best-effort; keep what we already have.
                Err(e) if page > 1 => {
                    warn!(source = "github", page, error = %e, "Page fetch failed, returning partial results");
                    break;
                }
                Err(e) => return Err(e),
            };

            let page_hits = parse_search_page(&data);
            let exhausted = page_hits.len() < PER_PAGE;
            hits.extend(page_hits);
            if hits.len() >= limit || exhausted {
                break;
            }
        }

        let hits = finalize_hits(hits, limit, true);
        info!(source = "github", count = hits.len(), "Search complete");
        Ok(hits)
    }
}
