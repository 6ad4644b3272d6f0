use std::collections::HashSet;
use std::sync::LazyLock;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use harvest_common::SourceHit;
use regex::Regex;
use serde_json::Value;
use tracing::{debug, info};

use crate::adapter::{finalize_hits, SourceAdapter};
use crate::client::FetchClient;
use crate::error::FetchResult;

const DEFAULT_BASE_URL: &str = "https://pypi.org";
const MAX_PROJECTS: usize = 40;

/// Project URL keys checked, in order, for a GitHub link.
const SOURCE_URL_KEYS: &[&str] = &["Source", "Repository", "Homepage", "Code"];

static PROJECT_LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/project/([A-Za-z0-9_.\-]+)/").expect("valid regex"));

/// PyPI adapter. Search has no JSON API, so project names are scraped from
/// the HTML results page and then resolved through the per-project JSON API.
pub struct PypiAdapter {
    client: FetchClient,
    base_url: String,
    lookup_concurrency: usize,
}

impl PypiAdapter {
    pub fn new(client: FetchClient, lookup_concurrency: usize) -> Self {
        Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            lookup_concurrency: lookup_concurrency.max(1),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    async fn lookup(&self, name: String) -> Option<SourceHit> {
        let url = format!("{}/pypi/{}/json", self.base_url, name);
        match self.client.get_json::<Value>(&url, &[]).await {
            Ok(data) => parse_project(&name, &data),
            Err(e) => {
                debug!(source = "pypi", project = %name, error = %e, "Project lookup failed");
                None
            }
        }
    }
}

/// Unique project names from a search results page, in page order.
pub fn parse_project_names(html: &str, max: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    PROJECT_LINK
        .captures_iter(html)
        .map(|c| c[1].to_string())
        .filter(|name| seen.insert(name.clone()))
        .take(max)
        .collect()
}

/// Resolve one project's JSON metadata to a hit pointing at its GitHub source.
pub fn parse_project(name: &str, data: &Value) -> Option<SourceHit> {
    let info = data.get("info")?;
    let urls = info.get("project_urls").and_then(Value::as_object)?;

    let repo = SOURCE_URL_KEYS
        .iter()
        .filter_map(|key| urls.get(*key).and_then(Value::as_str))
        .find(|url| url.contains("github.com"))?;

    let summary = info
        .get("summary")
        .and_then(Value::as_str)
        .unwrap_or_default();

    let mut hit = SourceHit::new("pypi", repo)
        .with_title(name)
        .with_snippet(summary)
        .with_extra("pypi_package", name);
    if let Some(version) = info.get("version").and_then(Value::as_str) {
        hit = hit.with_extra("pypi_version", version);
    }
    if let Some(license) = info
        .get("license")
        .and_then(Value::as_str)
        .filter(|l| !l.trim().is_empty() && l.len() <= 64)
    {
        hit = hit.with_extra("license", license);
    }
    Some(hit)
}

#[async_trait]
impl SourceAdapter for PypiAdapter {
    fn name(&self) -> &str {
        "pypi"
    }

    async fn search(&self, terms: &[String], limit: usize) -> FetchResult<Vec<SourceHit>> {
        let url = format!("{}/search/", self.base_url);
        let q = format!("{} modelcontextprotocol mcp", terms.join(" "));
        let html = self.client.get_text(&url, &[("q", q)]).await?;

        let names = parse_project_names(&html, limit.min(MAX_PROJECTS));
        debug!(source = "pypi", projects = names.len(), "Resolving projects");

        // Secondary lookups fail individually; a missing project is just skipped.
        let hits: Vec<SourceHit> = stream::iter(names)
            .map(|name| self.lookup(name))
            .buffered(self.lookup_concurrency)
            .filter_map(|hit| async move { hit })
            .collect()
            .await;

        let hits = finalize_hits(hits, limit, true);
        info!(source = "pypi", count = hits.len(), "Search complete");
        Ok(hits)
    }
}
