use async_trait::async_trait;
use harvest_common::SourceHit;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::adapter::{finalize_hits, SourceAdapter};
use crate::client::FetchClient;
use crate::error::{FetchError, FetchResult};

const DEFAULT_BASE_URL: &str = "https://registry.npmjs.org";
const MAX_PAGE_SIZE: usize = 50;

/// npm registry search. Packages resolve to their linked GitHub repository.
pub struct NpmAdapter {
    client: FetchClient,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct NpmObject {
    package: NpmPackage,
}

#[derive(Debug, Deserialize)]
struct NpmPackage {
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    links: NpmLinks,
}

#[derive(Debug, Default, Deserialize)]
struct NpmLinks {
    #[serde(default)]
    repository: Option<String>,
    #[serde(default)]
    homepage: Option<String>,
}

impl NpmAdapter {
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

    async fn query(&self, text: String, size: usize) -> FetchResult<Value> {
        let url = format!("{}/-/v1/search", self.base_url);
        self.client
            .get_json(&url, &[("text", text), ("size", size.to_string())])
            .await
    }
}

/// Parse an npm `/-/v1/search` response. Packages without a repository link
/// are skipped here; non-GitHub links are dropped later by canonicalization.
pub fn parse_search(data: &Value) -> Vec<SourceHit> {
    let Some(objects) = data.get("objects").and_then(Value::as_array) else {
        return Vec::new();
    };

    objects
        .iter()
        .filter_map(|obj| match serde_json::from_value::<NpmObject>(obj.clone()) {
            Ok(o) => Some(o.package),
            Err(e) => {
                debug!(error = %e, "Skipping malformed npm object");
                None
            }
        })
        .filter_map(|pkg| {
            let repo = pkg.links.repository.filter(|r| !r.trim().is_empty())?;
            let mut hit = SourceHit::new("npm", repo)
                .with_title(pkg.name.clone())
                .with_snippet(pkg.description.unwrap_or_default())
                .with_extra("npm_package", pkg.name);
            if let Some(version) = pkg.version {
                hit = hit.with_extra("npm_version", version);
            }
            if let Some(homepage) = pkg.links.homepage {
                hit = hit.with_extra("homepage", homepage);
            }
            Some(hit)
        })
        .collect()
}

#[async_trait]
impl SourceAdapter for NpmAdapter {
    fn name(&self) -> &str {
        "npm"
    }

    async fn search(&self, terms: &[String], limit: usize) -> FetchResult<Vec<SourceHit>> {
        let plain = terms.join(" ");
        let size = limit.clamp(1, MAX_PAGE_SIZE);

        let data = match self
            .query(format!("{plain} modelcontextprotocol mcp"), size)
            .await
        {
            Ok(data) => data,
            // The registry occasionally rejects the enriched query; retry with the bare terms.
            Err(e @ FetchError::Status { .. }) => {
                warn!(source = "npm", error = %e, "Enriched query rejected, falling back to plain terms");
                self.query(plain, size).await?
            }
            Err(e) => return Err(e),
        };

        let hits = finalize_hits(parse_search(&data), limit, true);
        info!(source = "npm", count = hits.len(), "Search complete");
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_packages_with_repository_links() {
        let data = json!({
            "objects": [
                {"package": {
                    "name": "@acme/gmail-mcp",
                    "description": "Gmail over MCP",
                    "version": "1.2.0",
                    "links": {"repository": "git+https://github.com/acme/gmail-mcp.git"}
                }},
                {"package": {"name": "no-links"}},
                {"score": {"final": 0.5}},
                {"package": {
                    "name": "gitlab-only",
                    "links": {"repository": "https://gitlab.com/a/b"}
                }}
            ]
        });

        let hits = parse_search(&data);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].title.as_deref(), Some("@acme/gmail-mcp"));
        assert_eq!(hits[0].extra["npm_version"], json!("1.2.0"));

        let finalized = finalize_hits(hits, 10, true);
        assert_eq!(finalized.len(), 1);
        assert_eq!(finalized[0].url, "https://github.com/acme/gmail-mcp");
    }

    #[test]
    fn object_without_objects_array_is_empty() {
        assert!(parse_search(&json!([])).is_empty());
    }
}
