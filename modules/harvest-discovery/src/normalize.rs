use std::collections::BTreeSet;
use std::sync::LazyLock;

use chrono::{DateTime, NaiveDateTime, Utc};
use harvest_common::{Sdk, ServerCandidate, Signals, SourceHit, Transport};
use harvest_sources::is_github_url;
use regex::Regex;
use serde_json::Value;

static SDK_TS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)@modelcontextprotocol/sdk").expect("valid regex"));

static SDK_PY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bfrom mcp\.server\.fastmcp import FastMCP\b|@mcp\.tool\b").expect("valid regex")
});

// Go, Rust, Java/Kotlin and C# SDK signatures.
static SDK_OTHER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)github\.com/(modelcontextprotocol|mark3labs)/(go-sdk|mcp-go)|\brmcp\b|io\.modelcontextprotocol|modelcontextprotocol\.(sdk|aspnetcore)|ModelContextProtocol\.Server",
    )
    .expect("valid regex")
});

static TRANSPORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)streamable[\s_-]*http|/sse\b|/mcp\b|\bstdio\b|\bsse\b").expect("valid regex")
});

static AUTH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(api[\s_-]?key|oauth|okta|bearer|basic auth)\b").expect("valid regex")
});

static DANGER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(chmod|curl|bash|powershell|exec)\b|/etc/passwd|\brm\s+-rf\b").expect("valid regex")
});

static PIPE_TO_SHELL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(curl|wget)\b[^\n|]*\|\s*(sudo\s+)?(ba|z)?sh\b").expect("valid regex")
});

/// Loose transport wording -> canonical transport.
const TRANSPORT_TABLE: &[(&str, Transport)] = &[
    ("stdio", Transport::Stdio),
    ("sse", Transport::Sse),
    ("/sse", Transport::Sse),
    ("/mcp", Transport::Http),
    ("http", Transport::Http),
    ("streamable http", Transport::Http),
    ("streamable-http", Transport::Http),
    ("streamable_http", Transport::Http),
    ("streamablehttp", Transport::Http),
];

pub const RISK_DANGER_TERMS: &str = "danger_terms";
pub const RISK_PIPE_TO_SHELL: &str = "pipe_to_shell";

/// Source evidence before normalization. One per hit, or built by hand.
#[derive(Debug, Clone, Default)]
pub struct RawCandidate {
    pub name: String,
    pub description: String,
    pub repo_url: Option<String>,
    pub homepage: Option<String>,
    pub manifest_url: Option<String>,
    pub readme: Option<String>,
    pub tools: Vec<String>,
    pub registries: Vec<String>,
    pub signals: Signals,
    pub provenance: Vec<SourceHit>,
}

impl From<SourceHit> for RawCandidate {
    fn from(hit: SourceHit) -> Self {
        let (repo_url, homepage) = if is_github_url(&hit.url) {
            let homepage = hit
                .extra
                .get("homepage")
                .and_then(Value::as_str)
                .filter(|h| !h.trim().is_empty())
                .map(str::to_string);
            (Some(hit.url.clone()), homepage)
        } else {
            (None, Some(hit.url.clone()))
        };

        let name = hit
            .title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(&hit.url)
            .to_string();

        Self {
            name,
            description: hit.snippet.clone().unwrap_or_default(),
            repo_url,
            homepage,
            manifest_url: None,
            readme: None,
            tools: Vec::new(),
            registries: vec![hit.source.clone()],
            signals: hit.extra.clone(),
            provenance: vec![hit],
        }
    }
}

pub fn normalize(raw: RawCandidate) -> ServerCandidate {
    normalize_at(raw, Utc::now())
}

/// Normalize with an explicit clock for the `days_since_push` derivation.
pub fn normalize_at(raw: RawCandidate, now: DateTime<Utc>) -> ServerCandidate {
    let text = [
        raw.description.as_str(),
        raw.readme.as_deref().unwrap_or_default(),
    ]
    .into_iter()
    .chain(raw.provenance.iter().filter_map(|h| h.snippet.as_deref()))
    .collect::<Vec<_>>()
    .join(" ");

    let mut signals = raw.signals;
    derive_days_since_push(&mut signals, now);

    let name = match raw.name.trim() {
        "" => raw
            .repo_url
            .clone()
            .or_else(|| raw.homepage.clone())
            .unwrap_or_else(|| "unknown".to_string()),
        name => name.to_string(),
    };

    let mut transports = detect_transports(&text);
    if let Some(Value::Array(declared)) = signals.get("transports") {
        transports.extend(
            declared
                .iter()
                .filter_map(Value::as_str)
                .filter_map(canonical_transport),
        );
    }

    let mut candidate = ServerCandidate::new(name).with_description(raw.description);
    if let Some(homepage) = raw.homepage.filter(|h| !h.trim().is_empty()) {
        candidate = candidate.with_homepage(homepage.trim());
    }
    if let Some(repo) = raw.repo_url.filter(|r| !r.trim().is_empty()) {
        candidate = candidate.with_repo_url(repo.trim());
    }

    candidate.manifest_url = raw.manifest_url;
    candidate.sdk = detect_sdk(&text);
    candidate.transports = transports;
    candidate.auth = detect_auth(&text);
    candidate.tools = raw.tools.into_iter().collect();
    candidate.registries = raw.registries.into_iter().collect();
    candidate.risk_flags = detect_risks(&text);
    candidate.signals = signals;
    candidate.provenance = raw.provenance;
    candidate
}

pub fn detect_sdk(text: &str) -> Sdk {
    if SDK_TS.is_match(text) {
        Sdk::TypeScript
    } else if SDK_PY.is_match(text) {
        Sdk::Python
    } else if SDK_OTHER.is_match(text) {
        Sdk::Other
    } else {
        Sdk::Unknown
    }
}

/// Map one loosely worded transport mention onto the canonical set.
pub fn canonical_transport(mention: &str) -> Option<Transport> {
    let key = mention.trim().to_lowercase();
    let key = key.split_whitespace().collect::<Vec<_>>().join(" ");
    TRANSPORT_TABLE
        .iter()
        .find(|(word, _)| *word == key)
        .map(|(_, transport)| *transport)
}

pub fn detect_transports(text: &str) -> BTreeSet<Transport> {
    TRANSPORT
        .find_iter(text)
        .filter_map(|m| canonical_transport(m.as_str()))
        .collect()
}

pub fn detect_auth(text: &str) -> BTreeSet<String> {
    AUTH.find_iter(text)
        .map(|m| {
            let lower = m.as_str().to_lowercase();
            if lower.starts_with("api") {
                "api key".to_string()
            } else {
                lower
            }
        })
        .collect()
}

/// Lexical denylist heuristic over install and doc text.
pub fn detect_risks(text: &str) -> BTreeSet<String> {
    let mut flags = BTreeSet::new();
    if DANGER.is_match(text) {
        flags.insert(RISK_DANGER_TERMS.to_string());
    }
    if PIPE_TO_SHELL.is_match(text) {
        flags.insert(RISK_PIPE_TO_SHELL.to_string());
    }
    flags
}

/// Fill `days_since_push` from `pushed_at` unless already present.
/// Unparseable timestamps leave the signal absent.
fn derive_days_since_push(signals: &mut Signals, now: DateTime<Utc>) {
    let present = signals
        .get("days_since_push")
        .is_some_and(|v| !v.is_null());
    if present {
        return;
    }
    let Some(pushed_at) = signals.get("pushed_at").and_then(Value::as_str) else {
        return;
    };
    if let Some(ts) = parse_timestamp(pushed_at) {
        let days = (now - ts).num_seconds().div_euclid(86_400).max(0);
        signals.insert("days_since_push".to_string(), Value::from(days));
    }
}

/// RFC 3339, or a naive ISO timestamp taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}
