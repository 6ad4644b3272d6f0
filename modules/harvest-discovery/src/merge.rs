use std::collections::HashMap;

use harvest_common::ServerCandidate;

/// Collapse candidates that share an identity key into one record each.
///
/// Output keeps the order in which each identity was first seen. Scalars
/// are fill-if-empty, sets are unioned, signals are shallow-merged with
/// later values winning, and provenance is concatenated as-is.
pub fn merge(candidates: Vec<ServerCandidate>) -> Vec<ServerCandidate> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut merged: Vec<ServerCandidate> = Vec::new();

    for candidate in candidates {
        let key = candidate.identity_key();
        match index.get(&key) {
            Some(&i) => absorb(&mut merged[i], candidate),
            None => {
                index.insert(key, merged.len());
                merged.push(candidate);
            }
        }
    }
    merged
}

fn absorb(base: &mut ServerCandidate, other: ServerCandidate) {
    if base.description.trim().is_empty() {
        base.description = other.description;
    }
    if base.sdk.is_unknown() {
        base.sdk = other.sdk;
    }
    if base.repo_url.is_none() {
        base.repo_url = other.repo_url;
    }
    if base.homepage.is_none() {
        base.homepage = other.homepage;
    }
    if base.manifest_url.is_none() {
        base.manifest_url = other.manifest_url;
    }

    base.transports.extend(other.transports);
    base.auth.extend(other.auth);
    base.tools.extend(other.tools);
    base.registries.extend(other.registries);
    base.risk_flags.extend(other.risk_flags);
    base.signals.extend(other.signals);
    base.provenance.extend(other.provenance);
}
