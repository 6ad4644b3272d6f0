pub mod adapter;
pub mod adapters;
pub mod client;
pub mod error;

pub use adapter::{canonical_repo_url, finalize_hits, is_github_url, SourceAdapter};
pub use adapters::{build_adapter, build_adapters, SOURCE_NAMES};
pub use client::{retry_with_backoff, FetchClient, RetryPolicy};
pub use error::{FetchError, FetchResult};
