pub mod atomic;
pub mod delta_log;
pub mod error;
pub mod manifest;
pub mod snapshots;
pub mod store;
pub mod tracker;

pub use delta_log::DeltaLog;
pub use error::{StoreError, StoreResult};
pub use manifest::{compute_sha256, diff_keys, manifest_subset, to_canonical_string, TRACKED_KEYS};
pub use snapshots::{read_candidates_jsonl, snapshot_path, write_candidates_jsonl};
pub use store::{FsManifestStore, ManifestStore, MemoryManifestStore, StoredManifest};
pub use tracker::{FingerprintTracker, TrackerOptions};
