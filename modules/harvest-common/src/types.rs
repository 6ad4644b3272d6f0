use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::fmt;

use crate::identity::{identity_key, stable_id};

/// Free-form per-source signals (stars, pushed_at, license, archived, ...).
pub type Signals = Map<String, Value>;

/// A manifest is an arbitrary JSON object describing one server.
pub type Manifest = Map<String, Value>;

// --- Source hits ---

/// One raw result returned by a source adapter. Never persisted on its own;
/// it survives only as provenance on a candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceHit {
    pub source: String,
    pub url: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub snippet: Option<String>,
    #[serde(default)]
    pub extra: Signals,
}

impl SourceHit {
    pub fn new(source: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            url: url.into(),
            title: None,
            snippet: None,
            extra: Signals::new(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_snippet(mut self, snippet: impl Into<String>) -> Self {
        self.snippet = Some(snippet.into());
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

// --- Candidate attributes ---

/// Which official SDK a server appears to be built on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sdk {
    #[serde(alias = "ts")]
    TypeScript,
    #[serde(alias = "py")]
    Python,
    Other,
    #[default]
    Unknown,
}

impl Sdk {
    /// `true` for the two first-party SDKs the scorer rewards.
    pub fn is_recognized(self) -> bool {
        matches!(self, Sdk::TypeScript | Sdk::Python)
    }

    pub fn is_unknown(self) -> bool {
        self == Sdk::Unknown
    }
}

impl fmt::Display for Sdk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sdk::TypeScript => write!(f, "typescript"),
            Sdk::Python => write!(f, "python"),
            Sdk::Other => write!(f, "other"),
            Sdk::Unknown => write!(f, "unknown"),
        }
    }
}

/// Canonical transport set. Loose wording is mapped onto these three.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    Stdio,
    Sse,
    Http,
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transport::Stdio => write!(f, "stdio"),
            Transport::Sse => write!(f, "sse"),
            Transport::Http => write!(f, "http"),
        }
    }
}

// --- Candidates ---

/// A normalized, not-yet-deduplicated record of one discovered server.
///
/// Set-valued fields are `BTreeSet`s so serialization is always sorted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerCandidate {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub repo_url: Option<String>,
    #[serde(default)]
    pub homepage: Option<String>,
    #[serde(default)]
    pub manifest_url: Option<String>,
    #[serde(default)]
    pub sdk: Sdk,
    #[serde(default)]
    pub transports: BTreeSet<Transport>,
    #[serde(default)]
    pub auth: BTreeSet<String>,
    #[serde(default)]
    pub tools: BTreeSet<String>,
    #[serde(default)]
    pub registries: BTreeSet<String>,
    #[serde(default)]
    pub signals: Signals,
    #[serde(default)]
    pub risk_flags: BTreeSet<String>,
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub reasons: Vec<String>,
    #[serde(default)]
    pub provenance: Vec<SourceHit>,
}

impl ServerCandidate {
    /// Minimal candidate; `id` is derived from the name until a repo or
    /// homepage is attached with the builder methods.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id: stable_id(&identity_key(None, None, &name)),
            name,
            description: String::new(),
            repo_url: None,
            homepage: None,
            manifest_url: None,
            sdk: Sdk::Unknown,
            transports: BTreeSet::new(),
            auth: BTreeSet::new(),
            tools: BTreeSet::new(),
            registries: BTreeSet::new(),
            signals: Signals::new(),
            risk_flags: BTreeSet::new(),
            score: 0.0,
            reasons: Vec::new(),
            provenance: Vec::new(),
        }
    }

    pub fn with_repo_url(mut self, repo_url: impl Into<String>) -> Self {
        self.repo_url = Some(repo_url.into());
        self.id = stable_id(&self.identity_key());
        self
    }

    pub fn with_homepage(mut self, homepage: impl Into<String>) -> Self {
        self.homepage = Some(homepage.into());
        self.id = stable_id(&self.identity_key());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_signal(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.signals.insert(key.into(), value.into());
        self
    }

    /// The string two candidates must share to be merged.
    pub fn identity_key(&self) -> String {
        identity_key(self.repo_url.as_deref(), self.homepage.as_deref(), &self.name)
    }

    /// Numeric signal, tolerating integers, floats and numeric strings.
    pub fn signal_f64(&self, key: &str) -> Option<f64> {
        match self.signals.get(key)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn stars(&self) -> f64 {
        self.signal_f64("stars").unwrap_or(0.0).max(0.0)
    }

    pub fn days_since_push(&self) -> Option<f64> {
        self.signal_f64("days_since_push")
    }

    pub fn is_archived(&self) -> bool {
        matches!(self.signals.get("archived"), Some(Value::Bool(true)))
    }

    /// Declared license, ignoring GitHub's `NOASSERTION` placeholder.
    pub fn license(&self) -> Option<&str> {
        match self.signals.get("license") {
            Some(Value::String(s)) if !s.trim().is_empty() && s != "NOASSERTION" => Some(s),
            _ => None,
        }
    }
}

// --- Fingerprints & deltas ---

/// Content hash over the tracked subset of one server's manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fingerprint {
    pub server_id: String,
    pub registry: String,
    pub sha256: String,
    pub manifest_subset: Manifest,
    pub computed_at: DateTime<Utc>,
}

/// Record of a detected change between two fingerprinted states.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Delta {
    pub timestamp: DateTime<Utc>,
    pub server_id: String,
    pub registry: String,
    pub old_sha: Option<String>,
    pub new_sha: String,
    pub changed_keys: Vec<String>,
}
