use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{HarvestError, Result};

/// Crawl configuration loaded from a TOML file.
///
/// Built once and handed to every component; there is no global copy.
/// Secrets stay in env vars, the file only names which var holds them.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HarvestConfig {
    pub crawl: CrawlConfig,
    pub apis: ApisConfig,
    pub sources: BTreeMap<String, SourceConfig>,
    pub registries: RegistriesConfig,
    pub storage: StorageConfig,
    /// keyword (lowercase) -> expansion terms
    pub synonyms: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CrawlConfig {
    pub user_agent: String,
    pub request_timeout_secs: u64,
    /// Deadline for one adapter's whole search, retries included.
    pub adapter_timeout_secs: u64,
    pub max_attempts: u32,
    pub backoff_initial_ms: u64,
    pub backoff_max_ms: u64,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            user_agent: "MCPHarvester/1.0".to_string(),
            request_timeout_secs: 20,
            adapter_timeout_secs: 120,
            max_attempts: 3,
            backoff_initial_ms: 500,
            backoff_max_ms: 2000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ApisConfig {
    pub github_token_env: String,
}

impl Default for ApisConfig {
    fn default() -> Self {
        Self {
            github_token_env: "GITHUB_TOKEN".to_string(),
        }
    }
}

/// Per-source overrides. Anything unset falls back to the source's default.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SourceConfig {
    pub enabled: Option<bool>,
    pub concurrency: Option<usize>,
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RegistriesConfig {
    /// Markup pages scraped for GitHub repository links.
    pub pages: Vec<String>,
}

impl Default for RegistriesConfig {
    fn default() -> Self {
        Self {
            pages: vec![
                "https://mcpservers.org/".to_string(),
                "https://raw.githubusercontent.com/modelcontextprotocol/servers/refs/heads/main/README.md"
                    .to_string(),
                "https://mcp.so/".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
        }
    }
}

/// Default semaphore sizes, matched to each source's informal rate tolerance.
pub fn default_concurrency(source: &str) -> usize {
    match source {
        "github" => 10,
        "npm" => 5,
        "pypi" => 6,
        "dockerhub" => 4,
        _ => 4,
    }
}

impl HarvestConfig {
    /// Load a TOML config file. Also loads `.env` so token vars resolve.
    pub fn load(path: &Path) -> Result<Self> {
        dotenvy::dotenv().ok();
        let content = std::fs::read_to_string(path).map_err(|source| HarvestError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&content).map_err(|source| HarvestError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would stall or fail every request. Both constructors
    /// call this; configs assembled in code should call it too.
    pub fn validate(&self) -> Result<()> {
        if self.crawl.max_attempts == 0 {
            return Err(HarvestError::Invalid("crawl.max_attempts must be at least 1".into()));
        }
        if self.crawl.request_timeout_secs == 0 {
            return Err(HarvestError::Invalid(
                "crawl.request_timeout_secs must be at least 1".into(),
            ));
        }
        if self.crawl.adapter_timeout_secs == 0 {
            return Err(HarvestError::Invalid(
                "crawl.adapter_timeout_secs must be at least 1".into(),
            ));
        }
        if let Some((name, _)) = self
            .sources
            .iter()
            .find(|(_, s)| s.concurrency == Some(0))
        {
            return Err(HarvestError::Invalid(format!(
                "sources.{name}.concurrency must be at least 1"
            )));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.crawl.request_timeout_secs)
    }

    pub fn adapter_timeout(&self) -> Duration {
        Duration::from_secs(self.crawl.adapter_timeout_secs)
    }

    pub fn source_enabled(&self, source: &str) -> bool {
        self.sources
            .get(source)
            .and_then(|s| s.enabled)
            .unwrap_or(true)
    }

    pub fn source_concurrency(&self, source: &str) -> usize {
        self.sources
            .get(source)
            .and_then(|s| s.concurrency)
            .unwrap_or_else(|| default_concurrency(source))
    }

    pub fn source_base_url(&self, source: &str) -> Option<&str> {
        self.sources.get(source).and_then(|s| s.base_url.as_deref())
    }

    /// GitHub token, read from the env var named in `apis.github_token_env`.
    pub fn github_token(&self) -> Option<String> {
        std::env::var(&self.apis.github_token_env)
            .ok()
            .filter(|t| !t.trim().is_empty())
    }

    /// `[keyword] + synonyms[keyword]`, trimmed and de-duplicated in order.
    pub fn expand_terms(&self, keyword: &str) -> Vec<String> {
        let mut terms: Vec<String> = Vec::new();
        let synonyms = self
            .synonyms
            .get(&keyword.trim().to_lowercase())
            .map(Vec::as_slice)
            .unwrap_or_default();

        for term in std::iter::once(keyword).chain(synonyms.iter().map(String::as_str)) {
            let term = term.trim();
            if !term.is_empty() && !terms.iter().any(|t| t == term) {
                terms.push(term.to_string());
            }
        }
        terms
    }

    pub fn log_redacted(&self) {
        let token_state = if self.github_token().is_some() {
            "set"
        } else {
            "<not set>"
        };
        tracing::info!(
            user_agent = %self.crawl.user_agent,
            data_dir = %self.storage.data_dir.display(),
            synonyms = self.synonyms.len(),
            "Config loaded"
        );
        tracing::info!("  {}: {}", self.apis.github_token_env, token_state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_is_a_valid_config() {
        let config = HarvestConfig::from_toml_str("").unwrap();
        assert_eq!(config.crawl.max_attempts, 3);
        assert_eq!(config.crawl.request_timeout_secs, 20);
        assert_eq!(config.apis.github_token_env, "GITHUB_TOKEN");
        assert_eq!(config.source_concurrency("github"), 10);
        assert!(config.source_enabled("npm"));
    }

    #[test]
    fn source_overrides_apply() {
        let config = HarvestConfig::from_toml_str(
            r#"
            [sources.npm]
            enabled = false
            concurrency = 2
            base_url = "http://localhost:9999"
            "#,
        )
        .unwrap();
        assert!(!config.source_enabled("npm"));
        assert_eq!(config.source_concurrency("npm"), 2);
        assert_eq!(config.source_base_url("npm"), Some("http://localhost:9999"));
        assert_eq!(config.source_concurrency("pypi"), 6);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(HarvestConfig::from_toml_str("[crawl]\nbogus = 1\n").is_err());
    }

    #[test]
    fn expand_terms_dedupes_and_keeps_keyword_first() {
        let config = HarvestConfig::from_toml_str(
            r#"
            [synonyms]
            gmail = ["google mail", " gmail ", "", "gmail api"]
            "#,
        )
        .unwrap();
        assert_eq!(
            config.expand_terms("Gmail"),
            vec!["Gmail", "google mail", "gmail", "gmail api"]
        );
        assert_eq!(config.expand_terms("slack"), vec!["slack"]);
    }

    #[test]
    fn load_rejects_zero_concurrency() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("harvest.toml");
        std::fs::write(&path, "[sources.github]\nconcurrency = 0\n").unwrap();
        assert!(matches!(
            HarvestConfig::load(&path),
            Err(HarvestError::Invalid(_))
        ));
    }

    #[test]
    fn shipped_config_parses() {
        let config =
            HarvestConfig::from_toml_str(include_str!("../../../config/harvest.toml")).unwrap();
        assert_eq!(config.source_concurrency("github"), 10);
        assert_eq!(config.registries.pages.len(), 3);
        assert!(config.expand_terms("gmail").contains(&"google mail".to_string()));
    }

    #[test]
    fn inline_toml_is_validated() {
        assert!(matches!(
            HarvestConfig::from_toml_str("[sources.npm]\nconcurrency = 0\n"),
            Err(HarvestError::Invalid(_))
        ));
        assert!(matches!(
            HarvestConfig::from_toml_str("[crawl]\nadapter_timeout_secs = 0\n"),
            Err(HarvestError::Invalid(_))
        ));
        assert!(matches!(
            HarvestConfig::from_toml_str("[crawl]\nrequest_timeout_secs = 0\n"),
            Err(HarvestError::Invalid(_))
        ));
        assert!(HarvestConfig::default().validate().is_ok());
    }

    #[test]
    fn load_reports_missing_file() {
        let err = HarvestConfig::load(Path::new("/nonexistent/harvest.toml")).unwrap_err();
        assert!(matches!(err, HarvestError::ConfigRead { .. }));
    }
}
