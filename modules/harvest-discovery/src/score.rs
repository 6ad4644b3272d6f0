//! Composite relevance and trust scoring.
//!
//! The score is a fixed-weight sum of independently normalized terms:
//! semantic similarity, TF-IDF lexical overlap, recency, registry presence,
//! SDK and hygiene bonuses, damped popularity, and fixed penalties for risk
//! flags and archived repositories.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use harvest_common::{ServerCandidate, Transport};
use regex::Regex;

pub const SEMANTIC_WEIGHT: f64 = 40.0;
pub const LEXICAL_WEIGHT: f64 = 22.0;
pub const RECENCY_WEIGHT: f64 = 14.0;
pub const PRESENCE_WEIGHT: f64 = 10.0;
pub const SDK_WEIGHT: f64 = 6.0;
pub const HYGIENE_WEIGHT: f64 = 4.0;
pub const POPULARITY_CAP: f64 = 4.0;
pub const STDIO_BONUS: f64 = 1.5;
pub const SSE_BONUS: f64 = 1.0;
pub const LICENSE_BONUS: f64 = 1.0;
pub const RISK_PENALTY: f64 = 8.0;
pub const ARCHIVED_PENALTY: f64 = 12.0;

/// Registries needed for full presence credit.
const PRESENCE_SATURATION: f64 = 3.0;
/// Above this many declared auth schemes the hygiene bonus is reduced.
const MAX_CLEAN_AUTH: usize = 10;
const UNKNOWN_PUSH_DAYS: f64 = 9999.0;
const RECENT_ACTIVITY_DAYS: f64 = 45.0;

static WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b\w\w+\b").expect("valid regex"));

/// Pluggable text similarity in `[0, 1]`.
pub trait SemanticModel: Send + Sync {
    fn similarity(&self, query: &str, text: &str) -> f64;
}

/// Deterministic bag-of-features embedding: word tokens plus padded
/// character trigrams, hashed into a fixed number of buckets and compared
/// by cosine similarity. Needs no model download and catches near-miss
/// spellings (`gmail` vs `gmail-mcp`).
#[derive(Debug, Clone)]
pub struct HashedEmbedding {
    dims: usize,
}

impl Default for HashedEmbedding {
    fn default() -> Self {
        Self { dims: 512 }
    }
}

impl HashedEmbedding {
    pub fn new(dims: usize) -> Self {
        Self { dims: dims.max(1) }
    }

    pub fn embed(&self, text: &str) -> Vec<f64> {
        let mut v = vec![0.0; self.dims];
        let lower = text.to_lowercase();
        for word in lower.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()) {
            v[self.bucket(word.as_bytes())] += 1.0;
            let padded: Vec<char> = format!("#{word}#").chars().collect();
            for gram in padded.windows(3) {
                let gram: String = gram.iter().collect();
                v[self.bucket(gram.as_bytes())] += 0.5;
            }
        }
        v
    }

    fn bucket(&self, bytes: &[u8]) -> usize {
        (fnv1a(bytes) % self.dims as u64) as usize
    }
}

impl SemanticModel for HashedEmbedding {
    fn similarity(&self, query: &str, text: &str) -> f64 {
        if query.trim().is_empty() || text.trim().is_empty() {
            return 0.0;
        }
        let a = self.embed(query);
        let b = self.embed(text);
        let dot: f64 = a.iter().zip(&b).map(|(x, y)| x * y).sum();
        let norm = |v: &[f64]| v.iter().map(|x| x * x).sum::<f64>().sqrt();
        let denom = norm(&a) * norm(&b);
        if denom == 0.0 {
            0.0
        } else {
            (dot / denom).clamp(0.0, 1.0)
        }
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for b in bytes {
        hash ^= u64::from(*b);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

fn terms_with_bigrams(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    let words: Vec<&str> = WORD.find_iter(&lower).map(|m| m.as_str()).collect();
    let mut out: Vec<String> = words.iter().map(|w| w.to_string()).collect();
    out.extend(words.windows(2).map(|pair| format!("{} {}", pair[0], pair[1])));
    out
}

/// TF-IDF cosine similarity with the vocabulary fitted on just these two
/// documents: unigrams and bigrams, smoothed idf, L2-normalized vectors.
pub fn tfidf_cosine(a: &str, b: &str) -> f64 {
    let count = |text: &str| {
        let mut tf: HashMap<String, f64> = HashMap::new();
        for term in terms_with_bigrams(text) {
            *tf.entry(term).or_default() += 1.0;
        }
        tf
    };
    let tf_a = count(a);
    let tf_b = count(b);
    if tf_a.is_empty() || tf_b.is_empty() {
        return 0.0;
    }

    let idf = |term: &str| {
        let df = f64::from(u8::from(tf_a.contains_key(term)) + u8::from(tf_b.contains_key(term)));
        ((1.0 + 2.0) / (1.0 + df)).ln() + 1.0
    };
    let weigh = |tf: &HashMap<String, f64>| -> HashMap<String, f64> {
        let raw: HashMap<String, f64> = tf.iter().map(|(t, n)| (t.clone(), n * idf(t))).collect();
        let norm = raw.values().map(|w| w * w).sum::<f64>().sqrt();
        raw.into_iter().map(|(t, w)| (t, w / norm)).collect()
    };

    let wa = weigh(&tf_a);
    let wb = weigh(&tf_b);
    wa.iter()
        .filter_map(|(t, w)| wb.get(t).map(|v| w * v))
        .sum::<f64>()
        .clamp(0.0, 1.0)
}

pub fn recency(days_since_push: f64) -> f64 {
    1.0 / (1.0 + days_since_push.max(0.0).ln_1p())
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

pub struct Scorer {
    semantic: Arc<dyn SemanticModel>,
}

impl Default for Scorer {
    fn default() -> Self {
        Self::new(Arc::new(HashedEmbedding::default()))
    }
}

impl Scorer {
    pub fn new(semantic: Arc<dyn SemanticModel>) -> Self {
        Self { semantic }
    }

    /// Score every candidate and return them sorted by descending score.
    /// Ties keep their input order.
    pub fn score(
        &self,
        mut candidates: Vec<ServerCandidate>,
        query: &str,
        expanded_terms: &[String],
    ) -> Vec<ServerCandidate> {
        let terms: Vec<&str> = if expanded_terms.is_empty() {
            vec![query]
        } else {
            expanded_terms.iter().map(String::as_str).collect()
        };
        let lexical_query = terms.join(" ");

        for candidate in &mut candidates {
            self.score_one(candidate, &terms, &lexical_query);
        }
        candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
        candidates
    }

    fn score_one(&self, c: &mut ServerCandidate, terms: &[&str], lexical_query: &str) {
        let text = format!("{} {}", c.name, c.description);

        let semantic = terms
            .iter()
            .map(|t| self.semantic.similarity(t, &text))
            .fold(0.0, f64::max);
        let lexical = tfidf_cosine(lexical_query, &text);

        let stars = c.stars();
        let days = c.days_since_push().unwrap_or(UNKNOWN_PUSH_DAYS);
        let presence = (c.registries.len() as f64 / PRESENCE_SATURATION).min(1.0);
        let sdk_bonus = if c.sdk.is_recognized() { 1.0 } else { 0.0 };
        let hygiene = if c.auth.len() <= MAX_CLEAN_AUTH { 1.0 } else { 0.7 };

        let mut transport_bonus = 0.0;
        if c.transports.contains(&Transport::Stdio) {
            transport_bonus += STDIO_BONUS;
        }
        if c.transports.contains(&Transport::Sse) {
            transport_bonus += SSE_BONUS;
        }
        let has_risk = !c.risk_flags.is_empty();
        let has_license = c.license().is_some();
        let archived = c.is_archived();

        let mut score = SEMANTIC_WEIGHT * semantic
            + LEXICAL_WEIGHT * lexical
            + RECENCY_WEIGHT * recency(days)
            + PRESENCE_WEIGHT * presence
            + SDK_WEIGHT * sdk_bonus
            + HYGIENE_WEIGHT * hygiene
            + stars.ln_1p().min(POPULARITY_CAP)
            + transport_bonus;
        if has_license {
            score += LICENSE_BONUS;
        }
        if has_risk {
            score -= RISK_PENALTY;
        }
        if archived {
            score -= ARCHIVED_PENALTY;
        }

        let mut reasons = Vec::new();
        if sdk_bonus > 0.0 {
            reasons.push(format!("uses official {} SDK", c.sdk));
        }
        if presence > 0.0 {
            reasons.push(format!("present in {} registry(ies)", c.registries.len()));
        }
        if stars > 0.0 {
            reasons.push(format!("{} GitHub stars", stars as u64));
        }
        if days < RECENT_ACTIVITY_DAYS {
            reasons.push(format!("recent activity {} days ago", days.max(0.0) as u64));
        }
        if transport_bonus > 0.0 {
            reasons.push("standard MCP transport(s)".to_string());
        }
        if has_risk {
            reasons.push("potentially risky install/docs content detected (penalized)".to_string());
        }
        if has_license {
            reasons.push("has declared license".to_string());
        }
        if archived {
            reasons.push("archived repository (penalized)".to_string());
        }

        c.score = round2(score);
        c.reasons = reasons;
    }
}
