use std::path::{Path, PathBuf};

use harvest_common::ServerCandidate;
use tracing::{debug, info};

use crate::atomic::write_atomic;
use crate::error::{StoreError, StoreResult};

/// `discover_<keyword>.jsonl`. The keyword is lowercased and every character
/// outside `[a-z0-9_-]` becomes `_`, so the name never leaves its directory.
pub fn snapshot_file_name(keyword: &str) -> String {
    let slug: String = keyword
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| match c {
            'a'..='z' | '0'..='9' | '_' | '-' => c,
            _ => '_',
        })
        .collect();
    format!("discover_{slug}.jsonl")
}

pub fn snapshot_path(data_dir: &Path, keyword: &str) -> PathBuf {
    data_dir.join(snapshot_file_name(keyword))
}

/// Write candidates as newline-delimited JSON, replacing any previous run's file atomically.
pub fn write_candidates_jsonl(path: &Path, candidates: &[ServerCandidate]) -> StoreResult<()> {
    let mut body = String::new();
    for candidate in candidates {
        let line = serde_json::to_string(candidate).map_err(|source| StoreError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        body.push_str(&line);
        body.push('\n');
    }
    write_atomic(path, body.as_bytes())?;
    info!(path = %path.display(), count = candidates.len(), "Wrote candidate snapshot");
    Ok(())
}

/// Read a snapshot back. Blank and malformed lines are skipped.
pub fn read_candidates_jsonl(path: &Path) -> StoreResult<Vec<ServerCandidate>> {
    let content = std::fs::read_to_string(path).map_err(|e| StoreError::io(path, e))?;
    Ok(content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .filter_map(|(i, line)| match serde_json::from_str(line) {
            Ok(candidate) => Some(candidate),
            Err(e) => {
                debug!(path = %path.display(), line = i + 1, error = %e, "Skipping malformed snapshot line");
                None
            }
        })
        .collect())
}
