use std::collections::HashSet;
use std::sync::LazyLock;

use async_trait::async_trait;
use harvest_common::SourceHit;
use regex::Regex;
use tracing::{info, warn};

use crate::adapter::{finalize_hits, SourceAdapter};
use crate::client::FetchClient;
use crate::error::{FetchError, FetchResult};

static GITHUB_REPO_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"https?://github\.com/([A-Za-z0-9_.-]+)/([A-Za-z0-9_.-]+)").expect("valid regex")
});

/// Scrapes curated registry pages (awesome lists, directory sites) for
/// GitHub repository links on lines that mention a search term.
pub struct RegistriesAdapter {
    client: FetchClient,
    pages: Vec<String>,
}

impl RegistriesAdapter {
    pub fn new(client: FetchClient, pages: Vec<String>) -> Self {
        Self { client, pages }
    }
}

/// Extract repository links from markup. A link is kept when its line
/// mentions any term (case-insensitive); each URL is reported once.
pub fn extract_repo_links(page_url: &str, body: &str, terms: &[String]) -> Vec<SourceHit> {
    let needles: Vec<String> = terms
        .iter()
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect();

    let mut seen = HashSet::new();
    let mut hits = Vec::new();
    for line in body.lines() {
        let lower = line.to_lowercase();
        if !needles.iter().any(|n| lower.contains(n.as_str())) {
            continue;
        }
        for caps in GITHUB_REPO_LINK.captures_iter(line) {
            let owner = &caps[1];
            let repo = caps[2].trim_end_matches(".git");
            let url = format!("https://github.com/{owner}/{repo}");
            if !seen.insert(url.to_lowercase()) {
                continue;
            }
            hits.push(
                SourceHit::new("registries", url)
                    .with_title(format!("{owner}/{repo}"))
                    .with_snippet(line.trim())
                    .with_extra("registry_page", page_url),
            );
        }
    }
    hits
}

#[async_trait]
impl SourceAdapter for RegistriesAdapter {
    fn name(&self) -> &str {
        "registries"
    }

    async fn search(&self, terms: &[String], limit: usize) -> FetchResult<Vec<SourceHit>> {
        let fetches = self
            .pages
            .iter()
            .map(|page| async move { (page, self.client.get_text(page, &[]).await) });
        let results = futures::future::join_all(fetches).await;

        let mut seen = HashSet::new();
        let mut hits = Vec::new();
        let mut last_error: Option<FetchError> = None;
        let mut fetched = 0usize;

        for (page, result) in results {
            match result {
                Ok(body) => {
                    fetched += 1;
                    for hit in extract_repo_links(page, &body, terms) {
                        if seen.insert(hit.url.to_lowercase()) {
                            hits.push(hit);
                        }
                    }
                }
                Err(e) => {
                    warn!(source = "registries", page = %page, error = %e, "Registry page fetch failed");
                    last_error = Some(e);
                }
            }
        }

        // Only a total outage is an error; any page that loaded yields partial results.
        if fetched == 0 {
            if let Some(e) = last_error {
                return Err(e);
            }
        }

        let hits = finalize_hits(hits, limit, true);
        info!(source = "registries", pages = fetched, count = hits.len(), "Search complete");
        Ok(hits)
    }
}
