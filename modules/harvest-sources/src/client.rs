use std::future::Future;
use std::time::Duration;

use harvest_common::HarvestConfig;
use rand::Rng;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::de::DeserializeOwned;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::error::{FetchError, FetchResult};

/// Jittered exponential backoff: `initial * 2^attempt + rand(0..=initial)`, capped at `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial: Duration,
    pub max: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial: Duration::from_millis(500),
            max: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &HarvestConfig) -> Self {
        Self {
            max_attempts: config.crawl.max_attempts.max(1),
            initial: Duration::from_millis(config.crawl.backoff_initial_ms),
            max: Duration::from_millis(config.crawl.backoff_max_ms),
        }
    }

    /// No waiting between attempts.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial: Duration::ZERO,
            max: Duration::ZERO,
        }
    }

    /// Delay before retrying after the given zero-based attempt failed.
    pub fn delay(&self, attempt: u32) -> Duration {
        let initial_ms = self.initial.as_millis() as u64;
        let base = initial_ms.saturating_mul(1u64 << attempt.min(16));
        let jitter = if initial_ms == 0 {
            0
        } else {
            rand::rng().random_range(0..=initial_ms)
        };
        Duration::from_millis(base.saturating_add(jitter)).min(self.max)
    }
}

/// Run `op` until it succeeds, fails with a non-retryable error, or attempts run out.
pub async fn retry_with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    label: &str,
    mut op: F,
) -> FetchResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = FetchResult<T>>,
{
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt + 1 < attempts => {
                let backoff = policy.delay(attempt);
                warn!(
                    label,
                    attempt = attempt + 1,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %e,
                    "Request failed, retrying after backoff"
                );
                tokio::time::sleep(backoff).await;
                attempt += 1;
            }
            Err(e) if e.is_retryable() && attempts > 1 => {
                return Err(FetchError::Exhausted {
                    attempts,
                    last: Box::new(e),
                });
            }
            Err(e) => return Err(e),
        }
    }
}

/// HTTP client for one source: shared headers, a per-source concurrency
/// bound, and retries. Every attempt (retries included) takes a permit.
pub struct FetchClient {
    source: String,
    http: reqwest::Client,
    semaphore: Semaphore,
    policy: RetryPolicy,
}

impl FetchClient {
    pub fn new(
        source: impl Into<String>,
        config: &HarvestConfig,
        bearer_token: Option<&str>,
    ) -> FetchResult<Self> {
        let source = source.into();
        let mut headers = HeaderMap::new();
        if let Some(token) = bearer_token {
            let mut value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| FetchError::Setup(format!("invalid token header: {e}")))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let http = reqwest::Client::builder()
            .user_agent(config.crawl.user_agent.clone())
            .timeout(config.request_timeout())
            .default_headers(headers)
            .build()
            .map_err(|e| FetchError::Setup(e.to_string()))?;

        let concurrency = config
            .source_concurrency(&source)
            .clamp(1, Semaphore::MAX_PERMITS);
        debug!(source = %source, concurrency, "FetchClient initialized");

        Ok(Self {
            source,
            http,
            semaphore: Semaphore::new(concurrency),
            policy: RetryPolicy::from_config(config),
        })
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// GET a URL and decode the JSON body.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> FetchResult<T> {
        let body = self.get_text(url, query).await?;
        serde_json::from_str(&body).map_err(|e| FetchError::Decode {
            url: url.to_string(),
            message: e.to_string(),
        })
    }

    /// GET a URL and return the body as text.
    pub async fn get_text(&self, url: &str, query: &[(&str, String)]) -> FetchResult<String> {
        retry_with_backoff(&self.policy, &self.source, || self.attempt(url, query)).await
    }

    async fn attempt(&self, url: &str, query: &[(&str, String)]) -> FetchResult<String> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| FetchError::Setup(format!("{} semaphore closed", self.source)))?;

        debug!(source = %self.source, url, "GET");
        let resp = self.http.get(url).query(query).send().await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        Ok(resp.text().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn unavailable() -> FetchError {
        FetchError::Status {
            status: 503,
            url: "https://example.com".into(),
        }
    }

    #[test]
    fn delay_grows_and_is_capped() {
        let policy = RetryPolicy::default();
        for attempt in 0..6 {
            let d = policy.delay(attempt);
            assert!(d <= Duration::from_secs(2), "attempt {attempt}: {d:?}");
        }
        let first = policy.delay(0);
        assert!(first >= Duration::from_millis(500));
        assert!(first <= Duration::from_millis(1000));
        assert_eq!(policy.delay(10), Duration::from_secs(2));
    }

    #[test]
    fn immediate_policy_never_waits() {
        let policy = RetryPolicy::immediate(3);
        assert_eq!(policy.delay(0), Duration::ZERO);
        assert_eq!(policy.delay(5), Duration::ZERO);
    }

    #[tokio::test]
    async fn retries_transient_failures_then_succeeds() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result = retry_with_backoff(&RetryPolicy::immediate(3), "test", || async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(unavailable())
            } else {
                Ok("ok")
            }
        })
        .await;
        assert_eq!(result.unwrap(), "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: FetchResult<()> =
            retry_with_backoff(&RetryPolicy::immediate(3), "test", || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(unavailable())
            })
            .await;
        assert!(matches!(result, Err(FetchError::Exhausted { attempts: 3, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn does_not_retry_client_errors() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: FetchResult<()> =
            retry_with_backoff(&RetryPolicy::immediate(3), "test", || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(FetchError::Status {
                    status: 404,
                    url: "https://example.com".into(),
                })
            })
            .await;
        assert!(matches!(result, Err(FetchError::Status { status: 404, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn client_uses_configured_concurrency() {
        let config = HarvestConfig::from_toml_str("[sources.dockerhub]\nconcurrency = 7\n").unwrap();
        let client = FetchClient::new("dockerhub", &config, Some("secret")).unwrap();
        assert_eq!(client.available_permits(), 7);
        assert_eq!(client.source(), "dockerhub");
    }

    #[test]
    fn unvalidated_concurrency_is_clamped() {
        let mut config = HarvestConfig::default();
        for (name, concurrency) in [("npm", 0), ("pypi", usize::MAX)] {
            config.sources.insert(
                name.to_string(),
                harvest_common::config::SourceConfig {
                    concurrency: Some(concurrency),
                    ..Default::default()
                },
            );
        }
        let npm = FetchClient::new("npm", &config, None).unwrap();
        assert_eq!(npm.available_permits(), 1);
        let pypi = FetchClient::new("pypi", &config, None).unwrap();
        assert_eq!(pypi.available_permits(), Semaphore::MAX_PERMITS);
    }
}
