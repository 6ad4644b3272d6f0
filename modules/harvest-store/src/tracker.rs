use chrono::{DateTime, Utc};
use harvest_common::{Delta, Fingerprint, Manifest};
use tracing::{debug, info};

use crate::delta_log::DeltaLog;
use crate::error::StoreResult;
use crate::manifest::{compute_sha256, diff_keys, manifest_subset};
use crate::store::{ManifestStore, StoredManifest};

#[derive(Debug, Clone, Copy, Default)]
pub struct TrackerOptions {
    /// Emit a delta (with `old_sha = None` and every tracked key) the first
    /// time a server is seen. Off by default: first sightings are silent.
    pub record_first_sighting: bool,
}

/// Fingerprints manifests against their last persisted state and emits deltas.
pub struct FingerprintTracker<S> {
    store: S,
    delta_log: Option<DeltaLog>,
    options: TrackerOptions,
}

impl<S: ManifestStore> FingerprintTracker<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            delta_log: None,
            options: TrackerOptions::default(),
        }
    }

    /// Append every emitted delta to this log.
    pub fn with_delta_log(mut self, log: DeltaLog) -> Self {
        self.delta_log = Some(log);
        self
    }

    pub fn with_options(mut self, options: TrackerOptions) -> Self {
        self.options = options;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn update(
        &self,
        server_id: &str,
        registry: &str,
        manifest: &Manifest,
    ) -> StoreResult<(Fingerprint, Option<Delta>)> {
        self.update_at(server_id, registry, manifest, Utc::now())
    }

    /// [`update`](Self::update) with an explicit clock.
    pub fn update_at(
        &self,
        server_id: &str,
        registry: &str,
        manifest: &Manifest,
        now: DateTime<Utc>,
    ) -> StoreResult<(Fingerprint, Option<Delta>)> {
        let prior = self.store.load(server_id)?;
        let new_sha = compute_sha256(manifest);

        let fingerprint = Fingerprint {
            server_id: server_id.to_string(),
            registry: registry.to_string(),
            sha256: new_sha.clone(),
            manifest_subset: manifest_subset(manifest),
            computed_at: now,
        };

        let (old_sha, changed_keys) = match &prior {
            Some(prior) if prior.sha256 == new_sha => {
                debug!(server_id, "Manifest unchanged");
                return Ok((fingerprint, None));
            }
            Some(prior) => (
                Some(prior.sha256.clone()),
                diff_keys(Some(&prior.manifest), manifest),
            ),
            None => (None, diff_keys(None, manifest)),
        };

        let emit = match &old_sha {
            None => self.options.record_first_sighting,
            // A digest mismatch with no differing field means the stored digest
            // was computed differently; the save below refreshes it.
            Some(_) => !changed_keys.is_empty(),
        };
        let delta = emit.then(|| Delta {
            timestamp: now,
            server_id: server_id.to_string(),
            registry: registry.to_string(),
            old_sha,
            new_sha: new_sha.clone(),
            changed_keys,
        });

        // Append before saving so a failed append leaves the change pending.
        if let (Some(delta), Some(log)) = (&delta, &self.delta_log) {
            log.append(delta)?;
        }
        self.store.save(
            server_id,
            &StoredManifest {
                manifest: manifest.clone(),
                sha256: new_sha,
            },
        )?;

        match &delta {
            Some(delta) => info!(
                server_id,
                registry,
                changed = ?delta.changed_keys,
                "Manifest changed"
            ),
            None => debug!(server_id, first_sighting = prior.is_none(), "Manifest stored without delta"),
        }
        Ok((fingerprint, delta))
    }
}
