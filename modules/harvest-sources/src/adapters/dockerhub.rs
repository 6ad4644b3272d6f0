use async_trait::async_trait;
use harvest_common::SourceHit;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::adapter::{finalize_hits, SourceAdapter};
use crate::client::FetchClient;
use crate::error::FetchResult;

const DEFAULT_BASE_URL: &str = "https://hub.docker.com";
const MAX_PAGE_SIZE: usize = 50;

/// Docker Hub community image search.
pub struct DockerhubAdapter {
    client: FetchClient,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct DockerSummary {
    name: String,
    #[serde(default)]
    short_description: Option<String>,
    #[serde(default)]
    source_repository: Option<String>,
    #[serde(default)]
    source_url: Option<String>,
    #[serde(default)]
    star_count: Option<u64>,
    #[serde(default)]
    pull_count: Option<Value>,
}

impl DockerhubAdapter {
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

/// Parse a product search response. Only images that link a GitHub source survive.
pub fn parse_search(data: &Value) -> Vec<SourceHit> {
    let Some(summaries) = data.get("summaries").and_then(Value::as_array) else {
        return Vec::new();
    };

    summaries
        .iter()
        .filter_map(|s| match serde_json::from_value::<DockerSummary>(s.clone()) {
            Ok(summary) => Some(summary),
            Err(e) => {
                debug!(error = %e, "Skipping malformed Docker Hub summary");
                None
            }
        })
        .filter_map(|s| {
            let repo = [s.source_repository.as_deref(), s.source_url.as_deref()]
                .into_iter()
                .flatten()
                .find(|u| u.contains("github.com"))?
                .to_string();
            let mut hit = SourceHit::new("dockerhub", repo)
                .with_title(s.name.clone())
                .with_snippet(s.short_description.unwrap_or_default())
                .with_extra("docker_image", s.name);
            if let Some(stars) = s.star_count {
                hit = hit.with_extra("docker_stars", stars);
            }
            if let Some(pulls) = s.pull_count {
                hit = hit.with_extra("docker_pulls", pulls);
            }
            Some(hit)
        })
        .collect()
}

#[async_trait]
impl SourceAdapter for DockerhubAdapter {
    fn name(&self) -> &str {
        "dockerhub"
    }

    async fn search(&self, terms: &[String], limit: usize) -> FetchResult<Vec<SourceHit>> {
        let url = format!("{}/api/content/v1/products/search", self.base_url);
        let query = [
            ("q", format!("{} mcp modelcontextprotocol", terms.join(" "))),
            ("type", "image".to_string()),
            ("source", "community".to_string()),
            ("page_size", limit.clamp(1, MAX_PAGE_SIZE).to_string()),
        ];
        let data: Value = self.client.get_json(&url, &query).await?;

        let hits = finalize_hits(parse_search(&data), limit, true);
        info!(source = "dockerhub", count = hits.len(), "Search complete");
        Ok(hits)
    }
}
