pub mod config;
pub mod error;
pub mod identity;
pub mod types;

pub use config::HarvestConfig;
pub use error::HarvestError;
pub use identity::{identity_key, sha256_hex, stable_id};
pub use types::*;
