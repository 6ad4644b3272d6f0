//! Typed errors for fetch operations.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    /// Transport-level failure (connect, timeout, body read)
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Non-success HTTP status
    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    /// Response body did not match the expected shape
    #[error("could not decode response from {url}: {message}")]
    Decode { url: String, message: String },

    /// Every attempt failed with a retryable error
    #[error("giving up after {attempts} attempts: {last}")]
    Exhausted {
        attempts: u32,
        #[source]
        last: Box<FetchError>,
    },

    /// HTTP client could not be constructed
    #[error("client setup failed: {0}")]
    Setup(String),
}

impl FetchError {
    /// Transient failures worth another attempt: transport errors, 429 and 5xx.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Request(_) => true,
            FetchError::Status { status, .. } => *status == 429 || *status >= 500,
            FetchError::Decode { .. } | FetchError::Exhausted { .. } | FetchError::Setup(_) => {
                false
            }
        }
    }
}

/// Result type alias for fetch operations.
pub type FetchResult<T> = std::result::Result<T, FetchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transient_statuses_are_retryable() {
        let status = |status| FetchError::Status {
            status,
            url: "https://example.com".into(),
        };
        assert!(status(429).is_retryable());
        assert!(status(503).is_retryable());
        assert!(!status(404).is_retryable());
        assert!(!status(400).is_retryable());
        assert!(!FetchError::Decode {
            url: String::new(),
            message: String::new()
        }
        .is_retryable());
    }
}
