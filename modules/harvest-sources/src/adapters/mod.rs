pub mod dockerhub;
pub mod github;
pub mod npm;
pub mod pypi;
pub mod registries;

use std::sync::Arc;

use harvest_common::HarvestConfig;
use tracing::info;

use crate::adapter::SourceAdapter;
use crate::client::FetchClient;
use crate::error::FetchResult;

/// Every source this crate knows how to search, in fan-out order.
pub const SOURCE_NAMES: &[&str] = &["github", "npm", "pypi", "dockerhub", "registries"];

/// Build one adapter by source name, with its own client and semaphore.
///
/// Returns `Ok(None)` for unknown names.
pub fn build_adapter(
    name: &str,
    config: &HarvestConfig,
) -> FetchResult<Option<Arc<dyn SourceAdapter>>> {
    let base_url = config.source_base_url(name).map(str::to_string);

    let adapter: Arc<dyn SourceAdapter> = match name {
        "github" => {
            let token = config.github_token();
            let client = FetchClient::new(name, config, token.as_deref())?;
            let mut adapter = github::GithubAdapter::new(client);
            if let Some(url) = base_url {
                adapter = adapter.with_base_url(url);
            }
            Arc::new(adapter)
        }
        "npm" => {
            let mut adapter = npm::NpmAdapter::new(FetchClient::new(name, config, None)?);
            if let Some(url) = base_url {
                adapter = adapter.with_base_url(url);
            }
            Arc::new(adapter)
        }
        "pypi" => {
            let client = FetchClient::new(name, config, None)?;
            let mut adapter = pypi::PypiAdapter::new(client, config.source_concurrency(name));
            if let Some(url) = base_url {
                adapter = adapter.with_base_url(url);
            }
            Arc::new(adapter)
        }
        "dockerhub" => {
            let mut adapter = dockerhub::DockerhubAdapter::new(FetchClient::new(name, config, None)?);
            if let Some(url) = base_url {
                adapter = adapter.with_base_url(url);
            }
            Arc::new(adapter)
        }
        "registries" => Arc::new(registries::RegistriesAdapter::new(
            FetchClient::new(name, config, None)?,
            config.registries.pages.clone(),
        )),
        _ => return Ok(None),
    };
    Ok(Some(adapter))
}

/// Build every enabled adapter.
pub fn build_adapters(config: &HarvestConfig) -> FetchResult<Vec<Arc<dyn SourceAdapter>>> {
    let mut adapters = Vec::new();
    for name in SOURCE_NAMES {
        if !config.source_enabled(name) {
            info!(source = name, "Source disabled by config");
            continue;
        }
        if let Some(adapter) = build_adapter(name, config)? {
            adapters.push(adapter);
        }
    }
    Ok(adapters)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_all_sources_by_default() {
        let config = HarvestConfig::default();
        let adapters = build_adapters(&config).unwrap();
        let names: Vec<_> = adapters.iter().map(|a| a.name().to_string()).collect();
        assert_eq!(names, SOURCE_NAMES);
    }

    #[test]
    fn disabled_sources_are_skipped() {
        let config = HarvestConfig::from_toml_str(
            "[sources.pypi]\nenabled = false\n[sources.registries]\nenabled = false\n",
        )
        .unwrap();
        let adapters = build_adapters(&config).unwrap();
        let names: Vec<_> = adapters.iter().map(|a| a.name().to_string()).collect();
        assert_eq!(names, vec!["github", "npm", "dockerhub"]);
    }

    #[test]
    fn unknown_source_builds_nothing() {
        assert!(build_adapter("gitlab", &HarvestConfig::default())
            .unwrap()
            .is_none());
    }
}
