use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use tracing::info;
use tracing_subscriber::EnvFilter;

use harvest_common::HarvestConfig;
use harvest_discovery::{track_candidates, Discovery};
use harvest_store::{
    read_candidates_jsonl, snapshot_path, DeltaLog, FingerprintTracker, FsManifestStore,
    TrackerOptions,
};

#[derive(Parser)]
#[command(name = "harvest", about = "Discover, rank and track MCP servers")]
struct Cli {
    /// Path to config TOML file. Defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Search every source for a keyword and print the ranked candidates
    Discover {
        #[arg(short = 'q', long)]
        query: String,
        /// Maximum hits per source
        #[arg(short = 'k', long, default_value_t = 120)]
        limit: usize,
        /// Number of candidates to print
        #[arg(long, default_value_t = 20)]
        top: usize,
    },
    /// Fingerprint the candidates in a discovery snapshot and log changes
    Track {
        /// Snapshot file; defaults to the snapshot for --query
        #[arg(long)]
        input: Option<PathBuf>,
        #[arg(short = 'q', long, required_unless_present = "input")]
        query: Option<String>,
        /// Also log a delta for servers seen for the first time
        #[arg(long)]
        record_first_sighting: bool,
    },
    /// Fingerprint one manifest file against its stored version
    Fingerprint {
        #[arg(long)]
        server_id: String,
        #[arg(long)]
        registry: String,
        #[arg(long)]
        manifest: PathBuf,
    },
}

fn load_config(path: Option<&Path>) -> Result<HarvestConfig> {
    let config = match path {
        Some(path) => HarvestConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => {
            dotenvy::dotenv().ok();
            HarvestConfig::default()
        }
    };
    config.log_redacted();
    Ok(config)
}

fn build_tracker(config: &HarvestConfig, options: TrackerOptions) -> FingerprintTracker<FsManifestStore> {
    let data_dir = &config.storage.data_dir;
    FingerprintTracker::new(FsManifestStore::new(data_dir.join("manifests")))
        .with_delta_log(DeltaLog::new(data_dir.join("deltas.csv")))
        .with_options(options)
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so stdout stays machine-readable
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("harvest=info"));
    let logs = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if cli.log_json {
        logs.json().init();
    } else {
        logs.init();
    }
    let config = Arc::new(load_config(cli.config.as_deref())?);

    match cli.command {
        Command::Discover { query, limit, top } => {
            let discovery = Discovery::from_config(config)?;
            let report = discovery.discover(&query, limit).await?;
            let shown: Vec<_> = report.candidates.iter().take(top).collect();
            print_json(&json!({
                "keyword": report.keyword,
                "terms": report.terms,
                "stats": report.stats,
                "source_errors": report.source_errors,
                "snapshot": report.snapshot,
                "candidates": shown,
            }))?;
        }
        Command::Track {
            input,
            query,
            record_first_sighting,
        } => {
            let path = match (input, query) {
                (Some(path), _) => path,
                (None, Some(query)) => snapshot_path(&config.storage.data_dir, &query),
                (None, None) => anyhow::bail!("either --input or --query is required"),
            };
            let candidates = read_candidates_jsonl(&path)
                .with_context(|| format!("Failed to read snapshot {}", path.display()))?;
            info!(path = %path.display(), count = candidates.len(), "Tracking snapshot");

            let tracker = build_tracker(&config, TrackerOptions { record_first_sighting });
            let summary = track_candidates(&tracker, &candidates, Utc::now())?;
            print_json(&json!({
                "tracked": summary.tracked,
                "deltas": summary.deltas,
            }))?;
        }
        Command::Fingerprint {
            server_id,
            registry,
            manifest,
        } => {
            let content = std::fs::read_to_string(&manifest)
                .with_context(|| format!("Failed to read manifest {}", manifest.display()))?;
            let Value::Object(manifest) = serde_json::from_str::<Value>(&content)
                .with_context(|| format!("Invalid JSON in {}", manifest.display()))?
            else {
                anyhow::bail!("manifest must be a JSON object");
            };

            let tracker = build_tracker(&config, TrackerOptions::default());
            let (fingerprint, delta) = tracker.update(&server_id, &registry, &manifest)?;
            print_json(&json!({
                "fingerprint": fingerprint,
                "delta": delta,
            }))?;
        }
    }

    Ok(())
}
