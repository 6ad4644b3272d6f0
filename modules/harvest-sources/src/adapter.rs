use async_trait::async_trait;
use harvest_common::SourceHit;

use crate::error::FetchResult;

/// Universal source trait: every adapter, JSON API or markup scraper,
/// turns query terms into `SourceHit`s.
///
/// Implementations contain per-item failures and return partial results
/// where they can; an `Err` means the source produced nothing usable.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Stable source name, recorded on every hit and error annotation.
    fn name(&self) -> &str;

    /// Search the source. At most `limit` hits are returned.
    async fn search(&self, terms: &[String], limit: usize) -> FetchResult<Vec<SourceHit>>;
}

/// Rewrite a repository reference to a canonical `https://` URL.
///
/// Handles `git+`, `git@github.com:`, `ssh://`, `git://` and `.git` forms.
/// Returns `None` for anything that is not an absolute http(s) URL afterwards.
pub fn canonical_repo_url(raw: &str) -> Option<String> {
    let mut r = raw.trim();
    if r.is_empty() {
        return None;
    }
    if let Some(rest) = r.strip_prefix("git+") {
        r = rest;
    }

    let github_path = r
        .strip_prefix("git@github.com:")
        .or_else(|| r.strip_prefix("ssh://git@github.com/"))
        .or_else(|| r.strip_prefix("git://github.com/"));

    let candidate = match github_path {
        Some(path) => format!("https://github.com/{path}"),
        None => r.to_string(),
    };

    let mut candidate = candidate.trim_end_matches('/').to_string();
    if let Some(stripped) = candidate.strip_suffix(".git") {
        candidate = stripped.to_string();
    }

    let parsed = url::Url::parse(&candidate).ok()?;
    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return None;
    }
    Some(candidate)
}

pub fn is_github_url(url: &str) -> bool {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.eq_ignore_ascii_case("github.com")))
        .unwrap_or(false)
}

/// Canonicalize hit URLs, drop the ones that do not resolve, then truncate.
///
/// Dropping happens before truncation so unresolvable items never use up
/// the limit.
pub fn finalize_hits(hits: Vec<SourceHit>, limit: usize, require_github: bool) -> Vec<SourceHit> {
    hits.into_iter()
        .filter_map(|mut hit| {
            let url = canonical_repo_url(&hit.url)?;
            if require_github && !is_github_url(&url) {
                tracing::debug!(source = %hit.source, url = %hit.url, "Dropping non-GitHub hit");
                return None;
            }
            hit.url = url;
            Some(hit)
        })
        .take(limit)
        .collect()
}
