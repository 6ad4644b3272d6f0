use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use harvest_common::Delta;
use tracing::warn;

use crate::error::{StoreError, StoreResult};

pub const DELTA_LOG_HEADER: &str = "timestamp,server_id,registry,old_sha,new_sha,changed_keys";

/// Append-only CSV log of deltas. Rows are never rewritten.
#[derive(Debug, Clone)]
pub struct DeltaLog {
    path: PathBuf,
}

impl DeltaLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one row, writing the header first if the file is new or empty.
    pub fn append(&self, delta: &Delta) -> StoreResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| StoreError::io(&self.path, e))?;
        let is_empty = file
            .metadata()
            .map_err(|e| StoreError::io(&self.path, e))?
            .len()
            == 0;

        let mut out = String::new();
        if is_empty {
            out.push_str(DELTA_LOG_HEADER);
            out.push('\n');
        }
        out.push_str(&format_row(delta));
        out.push('\n');

        // One write call per row keeps rows whole under concurrent appenders.
        file.write_all(out.as_bytes())
            .map_err(|e| StoreError::io(&self.path, e))
    }

    /// Read all rows back. Rows that do not parse are skipped with a warning.
    pub fn read_all(&self) -> StoreResult<Vec<Delta>> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::io(&self.path, e)),
        };

        Ok(content
            .lines()
            .skip(1)
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| {
                let parsed = parse_row(line);
                if parsed.is_none() {
                    warn!(path = %self.path.display(), line, "Skipping unreadable delta row");
                }
                parsed
            })
            .collect())
    }
}

fn format_row(delta: &Delta) -> String {
    let changed = serde_json::to_string(&delta.changed_keys).unwrap_or_else(|_| "[]".into());
    [
        delta.timestamp.to_rfc3339(),
        delta.server_id.clone(),
        delta.registry.clone(),
        delta.old_sha.clone().unwrap_or_default(),
        delta.new_sha.clone(),
        changed,
    ]
    .iter()
    .map(|field| csv_field(field))
    .collect::<Vec<_>>()
    .join(",")
}

/// Quote a field when it holds a separator, quote or line break.
fn csv_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn split_row(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match (c, in_quotes) {
            ('"', true) if chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            ('"', true) => in_quotes = false,
            ('"', false) if current.is_empty() => in_quotes = true,
            (',', false) => fields.push(std::mem::take(&mut current)),
            (c, _) => current.push(c),
        }
    }
    fields.push(current);
    fields
}

fn parse_row(line: &str) -> Option<Delta> {
    let fields = split_row(line);
    let [timestamp, server_id, registry, old_sha, new_sha, changed] = fields.as_slice() else {
        return None;
    };
    let timestamp = DateTime::parse_from_rfc3339(timestamp)
        .ok()?
        .with_timezone(&Utc);
    Some(Delta {
        timestamp,
        server_id: server_id.clone(),
        registry: registry.clone(),
        old_sha: Some(old_sha.clone()).filter(|s| !s.is_empty()),
        new_sha: new_sha.clone(),
        changed_keys: serde_json::from_str(changed).ok()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delta(old_sha: Option<&str>, keys: &[&str]) -> Delta {
        Delta {
            timestamp: DateTime::parse_from_rfc3339("2024-05-01T12:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
            server_id: "discovered-abc".into(),
            registry: "discovered".into(),
            old_sha: old_sha.map(str::to_string),
            new_sha: "def".into(),
            changed_keys: keys.iter().map(|k| k.to_string()).collect(),
        }
    }

    #[test]
    fn header_written_once_and_rows_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let log = DeltaLog::new(dir.path().join("deltas.csv"));

        let first = delta(None, &["description", "license"]);
        let second = delta(Some("abc"), &["license"]);
        log.append(&first).unwrap();
        log.append(&second).unwrap();

        let content = std::fs::read_to_string(log.path()).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], DELTA_LOG_HEADER);
        assert!(lines[1].contains(r#""[""description"",""license""]""#));

        assert_eq!(log.read_all().unwrap(), vec![first, second]);
    }

    #[test]
    fn missing_log_reads_empty() {
        let log = DeltaLog::new("/nonexistent/deltas.csv");
        assert!(log.read_all().unwrap().is_empty());
    }

    #[test]
    fn split_row_handles_quoted_commas() {
        assert_eq!(
            split_row(r#"a,"b,c","d""e",,"#),
            vec!["a", "b,c", "d\"e", "", ""]
        );
    }
}
