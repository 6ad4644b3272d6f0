use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::Utc;
use harvest_common::{HarvestConfig, ServerCandidate, SourceHit};
use harvest_sources::{build_adapters, FetchError, SourceAdapter};
use harvest_store::{snapshot_path, write_candidates_jsonl};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::merge::merge;
use crate::normalize::normalize_at;
use crate::rescale::{apply_rescaler, NoopRescaler, Rescaler};
use crate::score::Scorer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceErrorKind {
    /// The adapter returned an error (network, status, decode).
    Fetch,
    /// The adapter did not finish within the per-task deadline.
    Timeout,
    /// The adapter task panicked or was cancelled.
    Aborted,
}

/// Per-source failure annotation. A failed source contributes no hits but
/// never fails the discovery call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceError {
    pub source: String,
    pub kind: SourceErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryStats {
    pub sources_queried: usize,
    pub sources_failed: usize,
    pub hits: usize,
    pub candidates: usize,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryReport {
    pub keyword: String,
    pub terms: Vec<String>,
    pub candidates: Vec<ServerCandidate>,
    pub source_errors: Vec<SourceError>,
    pub stats: DiscoveryStats,
    #[serde(default)]
    pub snapshot: Option<PathBuf>,
}

type TaskOutcome = std::result::Result<
    std::result::Result<std::result::Result<Vec<SourceHit>, FetchError>, tokio::time::error::Elapsed>,
    tokio::task::JoinError,
>;

/// Discovery orchestrator: fan out to every adapter, then normalize, merge,
/// score, optionally rescale, and snapshot the ranking.
pub struct Discovery {
    adapters: Vec<Arc<dyn SourceAdapter>>,
    adapter_timeout: Duration,
    scorer: Scorer,
    rescaler: Arc<dyn Rescaler>,
    config: Arc<HarvestConfig>,
    snapshot_dir: Option<PathBuf>,
}

impl Discovery {
    pub fn new(config: Arc<HarvestConfig>, adapters: Vec<Arc<dyn SourceAdapter>>) -> Self {
        Self {
            adapters,
            adapter_timeout: config.adapter_timeout(),
            scorer: Scorer::default(),
            rescaler: Arc::new(NoopRescaler),
            snapshot_dir: Some(config.storage.data_dir.clone()),
            config,
        }
    }

    /// Orchestrator over every adapter enabled in `config`.
    pub fn from_config(config: Arc<HarvestConfig>) -> Result<Self> {
        config.validate().context("Invalid configuration")?;
        let adapters = build_adapters(&config).context("Failed to build source adapters")?;
        info!(count = adapters.len(), "Source adapters ready");
        Ok(Self::new(config, adapters))
    }

    pub fn with_scorer(mut self, scorer: Scorer) -> Self {
        self.scorer = scorer;
        self
    }

    pub fn with_rescaler(mut self, rescaler: Arc<dyn Rescaler>) -> Self {
        self.rescaler = rescaler;
        self
    }

    pub fn with_adapter_timeout(mut self, timeout: Duration) -> Self {
        self.adapter_timeout = timeout;
        self
    }

    /// Directory for `discover_<keyword>.jsonl`; `None` skips the snapshot.
    pub fn with_snapshot_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.snapshot_dir = dir;
        self
    }

    /// Run one discovery cycle. `limit` caps each source's hits.
    ///
    /// Source failures are reported in `source_errors`; only a snapshot
    /// write failure is returned as an error.
    pub async fn discover(&self, keyword: &str, limit: usize) -> Result<DiscoveryReport> {
        let started = Instant::now();
        let terms = self.config.expand_terms(keyword);
        anyhow::ensure!(!terms.is_empty(), "keyword must not be blank");
        info!(keyword, terms = ?terms, sources = self.adapters.len(), "Starting discovery");

        let (hits, source_errors) = self.fan_out(&terms, limit).await;
        let hit_count = hits.len();

        let now = Utc::now();
        let candidates: Vec<ServerCandidate> = hits
            .into_iter()
            .map(|hit| normalize_at(hit.into(), now))
            .collect();
        let merged = merge(candidates);
        let scored = self.scorer.score(merged, keyword, &terms);
        let ranked = apply_rescaler(self.rescaler.as_ref(), scored);

        let snapshot = match &self.snapshot_dir {
            Some(dir) => {
                let path = snapshot_path(dir, keyword);
                write_candidates_jsonl(&path, &ranked)
                    .with_context(|| format!("Failed to write snapshot {}", path.display()))?;
                Some(path)
            }
            None => None,
        };

        let stats = DiscoveryStats {
            sources_queried: self.adapters.len(),
            sources_failed: source_errors.len(),
            hits: hit_count,
            candidates: ranked.len(),
            elapsed_ms: started.elapsed().as_millis() as u64,
        };
        info!(
            keyword,
            hits = stats.hits,
            candidates = stats.candidates,
            failed_sources = stats.sources_failed,
            elapsed_ms = stats.elapsed_ms,
            "Discovery complete"
        );

        Ok(DiscoveryReport {
            keyword: keyword.to_string(),
            terms,
            candidates: ranked,
            source_errors,
            stats,
            snapshot,
        })
    }

    /// One task per adapter, each under the per-task deadline. Joins only
    /// after every task has finished or timed out.
    async fn fan_out(&self, terms: &[String], limit: usize) -> (Vec<SourceHit>, Vec<SourceError>) {
        let terms: Arc<Vec<String>> = Arc::new(terms.to_vec());
        let deadline = self.adapter_timeout;

        let handles: Vec<_> = self
            .adapters
            .iter()
            .map(|adapter| {
                let adapter = Arc::clone(adapter);
                let terms = Arc::clone(&terms);
                let name = adapter.name().to_string();
                let handle = tokio::spawn(async move {
                    tokio::time::timeout(deadline, adapter.search(&terms, limit)).await
                });
                (name, handle)
            })
            .collect();

        let names: Vec<String> = handles.iter().map(|(n, _)| n.clone()).collect();
        let outcomes: Vec<TaskOutcome> =
            futures::future::join_all(handles.into_iter().map(|(_, h)| h)).await;

        let mut hits = Vec::new();
        let mut errors = Vec::new();
        for (source, outcome) in names.into_iter().zip(outcomes) {
            match outcome {
                Ok(Ok(Ok(found))) => {
                    info!(source = %source, count = found.len(), "Source returned hits");
                    hits.extend(found);
                }
                Ok(Ok(Err(e))) => {
                    warn!(source = %source, error = %e, "Source failed");
                    errors.push(SourceError {
                        source,
                        kind: SourceErrorKind::Fetch,
                        message: e.to_string(),
                    });
                }
                Ok(Err(_)) => {
                    warn!(source = %source, timeout_secs = deadline.as_secs(), "Source timed out");
                    errors.push(SourceError {
                        source,
                        kind: SourceErrorKind::Timeout,
                        message: format!("no response within {}s", deadline.as_secs_f64()),
                    });
                }
                Err(e) => {
                    warn!(source = %source, error = %e, "Source task aborted");
                    errors.push(SourceError {
                        source,
                        kind: SourceErrorKind::Aborted,
                        message: e.to_string(),
                    });
                }
            }
        }
        (hits, errors)
    }
}
