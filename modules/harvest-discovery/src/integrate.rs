use chrono::{DateTime, SecondsFormat, Utc};
use harvest_common::{Delta, Manifest, Sdk, ServerCandidate};
use harvest_store::{FingerprintTracker, ManifestStore, StoreResult};
use serde_json::{json, Value};
use tracing::info;

use crate::reputation::{compute_reputation, ReputationInputs};

/// Registry name for manifests built from discovery results.
pub const DISCOVERED_REGISTRY: &str = "discovered";

pub fn server_id_for(candidate: &ServerCandidate) -> String {
    format!("{DISCOVERED_REGISTRY}-{}", candidate.id)
}

/// Best guess at how the server runs, from its SDK and where it was published.
pub fn infer_runtime(candidate: &ServerCandidate) -> &'static str {
    match candidate.sdk {
        Sdk::TypeScript => return "node",
        Sdk::Python => return "python",
        _ => {}
    }
    let seen = |source: &str| candidate.registries.contains(source);
    if seen("npm") {
        "node"
    } else if seen("pypi") {
        "python"
    } else if seen("dockerhub") {
        "docker-image"
    } else {
        "unknown"
    }
}

fn auth_required(candidate: &ServerCandidate) -> &'static str {
    let auth = &candidate.auth;
    if auth.is_empty() {
        "unknown"
    } else if auth.contains("oauth") {
        "oauth"
    } else if auth.contains("api key") || auth.contains("bearer") {
        "api_key"
    } else {
        "other"
    }
}

/// Build the manifest persisted for one ranked candidate.
///
/// `first_seen` carries over from the previous manifest when there is one.
pub fn manifest_from_candidate(
    candidate: &ServerCandidate,
    now: DateTime<Utc>,
    first_seen: Option<&str>,
) -> Manifest {
    let now_iso = now.to_rfc3339_opts(SecondsFormat::Secs, true);
    let name = candidate.name.as_str();
    let description = if candidate.description.trim().is_empty() {
        format!("MCP server for {name}")
    } else {
        candidate.description.clone()
    };
    let install = match &candidate.repo_url {
        Some(repo) => format!("# Install from {repo}"),
        None => "# Manual installation required".to_string(),
    };
    let transports: Vec<String> = if candidate.transports.is_empty() {
        vec!["stdio".to_string()]
    } else {
        candidate.transports.iter().map(|t| t.to_string()).collect()
    };
    let tag = name.to_lowercase().replace(['-', '_'], " ");
    let notes = format!(
        "Discovered via search. Score: {}. {}",
        candidate.score,
        candidate.reasons.join(", ")
    );

    [
        ("registry", json!(DISCOVERED_REGISTRY)),
        ("server_id", json!(server_id_for(candidate))),
        ("display_name", json!(name)),
        ("description", json!(description)),
        ("runtime", json!(infer_runtime(candidate))),
        ("install", json!(install)),
        ("source_repo", json!(candidate.repo_url)),
        ("homepage", json!(candidate.homepage)),
        ("license", json!(candidate.license())),
        ("maintainer", Value::Null),
        ("auth_required", json!(auth_required(candidate))),
        ("env_vars", json!([])),
        ("tools", json!(candidate.tools)),
        ("transports", json!(transports)),
        ("tags", json!([tag])),
        ("registries_seen_in", json!(candidate.registries)),
        ("first_seen_iso", json!(first_seen.unwrap_or(now_iso.as_str()))),
        ("last_seen_iso", json!(now_iso)),
        (
            "reputation_score",
            json!(compute_reputation(&ReputationInputs::from_candidate(candidate))),
        ),
        ("notes", json!(notes)),
    ]
    .into_iter()
    .map(|(key, value)| (key.to_string(), value))
    .collect()
}

#[derive(Debug, Clone, Default)]
pub struct TrackSummary {
    pub tracked: usize,
    pub deltas: Vec<Delta>,
}

/// Fingerprint every candidate's manifest; deltas go to the tracker's log.
/// A store failure stops the run.
pub fn track_candidates<S: ManifestStore>(
    tracker: &FingerprintTracker<S>,
    candidates: &[ServerCandidate],
    now: DateTime<Utc>,
) -> StoreResult<TrackSummary> {
    let mut summary = TrackSummary::default();
    for candidate in candidates {
        let server_id = server_id_for(candidate);
        let prior = tracker.store().load(&server_id)?;
        let first_seen = prior
            .as_ref()
            .and_then(|p| p.manifest.get("first_seen_iso"))
            .and_then(Value::as_str);

        let manifest = manifest_from_candidate(candidate, now, first_seen);
        let (_, delta) = tracker.update_at(&server_id, DISCOVERED_REGISTRY, &manifest, now)?;
        summary.tracked += 1;
        summary.deltas.extend(delta);
    }
    info!(
        tracked = summary.tracked,
        changed = summary.deltas.len(),
        "Tracked discovered servers"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use harvest_common::Transport;
    use harvest_store::MemoryManifestStore;

    fn gmail() -> ServerCandidate {
        let mut c = ServerCandidate::new("gmail_mcp-server")
            .with_repo_url("https://github.com/acme/gmail-mcp")
            .with_signal("license", "MIT")
            .with_signal("stars", 10);
        c.sdk = Sdk::TypeScript;
        c.transports.insert(Transport::Sse);
        c.registries.insert("github".into());
        c
    }

    #[test]
    fn manifest_fields_follow_candidate() {
        let now = Utc::now();
        let m = manifest_from_candidate(&gmail(), now, None);
        assert_eq!(m["registry"], "discovered");
        assert_eq!(m["description"], "MCP server for gmail_mcp-server");
        assert_eq!(m["runtime"], "node");
        assert_eq!(m["install"], "# Install from https://github.com/acme/gmail-mcp");
        assert_eq!(m["license"], "MIT");
        assert_eq!(m["transports"], json!(["sse"]));
        assert_eq!(m["tags"], json!(["gmail mcp server"]));
        assert_eq!(m["first_seen_iso"], m["last_seen_iso"]);
    }

    #[test]
    fn manifest_carries_tracked_and_volatile_keys() {
        let m = manifest_from_candidate(&gmail(), Utc::now(), Some("2024-01-01T00:00:00Z"));
        for key in harvest_store::TRACKED_KEYS {
            assert!(m.contains_key(*key), "missing {key}");
        }
        assert_eq!(m["first_seen_iso"], "2024-01-01T00:00:00Z");
        assert_eq!(m["server_id"], json!(server_id_for(&gmail())));
        assert!(m["reputation_score"].is_u64());
        assert_eq!(m["registries_seen_in"], json!(["github"]));
    }

    #[test]
    fn runtime_falls_back_to_registry() {
        let mut c = ServerCandidate::new("x");
        c.registries.insert("pypi".into());
        assert_eq!(infer_runtime(&c), "python");
        assert_eq!(infer_runtime(&ServerCandidate::new("y")), "unknown");
    }

    #[test]
    fn retracking_keeps_first_seen_and_reports_changes() {
        let tracker = FingerprintTracker::new(MemoryManifestStore::new());
        let first = DateTime::parse_from_rfc3339("2024-05-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let later = DateTime::parse_from_rfc3339("2024-06-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);

        let summary = track_candidates(&tracker, &[gmail()], first).unwrap();
        assert_eq!(summary.tracked, 1);
        assert!(summary.deltas.is_empty());

        let mut changed = gmail();
        changed.description = "Send mail".into();
        let summary = track_candidates(&tracker, &[changed.clone()], later).unwrap();
        assert_eq!(summary.deltas.len(), 1);
        assert_eq!(summary.deltas[0].changed_keys, vec!["description"]);

        let stored = tracker.store().load(&server_id_for(&changed)).unwrap().unwrap();
        assert_eq!(stored.manifest["first_seen_iso"], "2024-05-01T00:00:00Z");
    }
}
