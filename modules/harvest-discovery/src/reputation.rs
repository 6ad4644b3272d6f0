use std::collections::BTreeSet;

use harvest_common::ServerCandidate;

const MAX_REPUTATION: u32 = 100;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GithubStats {
    pub stars: u64,
    pub forks: u64,
    pub last_commit_days: Option<u64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SupplyChain {
    pub sbom: bool,
    pub signed: bool,
    pub provenance: bool,
}

/// Evidence the reputation score is computed from. Absent evidence earns nothing.
#[derive(Debug, Clone, Default)]
pub struct ReputationInputs {
    pub registries: BTreeSet<String>,
    pub curated_docker: bool,
    pub supply_chain: SupplyChain,
    /// `None` when env vars are unknown, as opposed to declared empty.
    pub env_vars: Option<Vec<String>>,
    pub github: Option<GithubStats>,
    pub recency_days: Option<u64>,
}

impl ReputationInputs {
    /// Inputs available from a discovered candidate's signals.
    pub fn from_candidate(c: &ServerCandidate) -> Self {
        let days = c.days_since_push().map(|d| d.max(0.0) as u64);
        let stars = c.stars() as u64;
        let forks = c.signal_f64("forks").unwrap_or(0.0).max(0.0) as u64;
        let github = (stars > 0 || forks > 0).then_some(GithubStats {
            stars,
            forks,
            last_commit_days: days,
        });
        Self {
            registries: c.registries.clone(),
            github,
            recency_days: days,
            ..Self::default()
        }
    }
}

/// Trust score in `0..=100` from registry presence, supply-chain evidence,
/// recency, GitHub health and env-var hygiene.
pub fn compute_reputation(inputs: &ReputationInputs) -> u32 {
    let mut score = 0;

    score += match inputs.registries.len() {
        n if n >= 3 => 20,
        2 => 10,
        _ => 0,
    };

    if inputs.curated_docker {
        score += 10;
    }
    let sc = inputs.supply_chain;
    if sc.sbom || sc.signed || sc.provenance {
        score += 10;
    }

    if let Some(days) = inputs.recency_days {
        score += match days {
            0..=7 => 20,
            8..=30 => 15,
            31..=180 => 10,
            181..=365 => 5,
            _ => 0,
        };
    }

    if let Some(gh) = inputs.github {
        score += match gh.stars {
            s if s >= 500 => 20,
            s if s >= 100 => 15,
            s if s >= 25 => 10,
            s if s >= 5 => 5,
            _ => 0,
        };
        if gh.forks >= 20 {
            score += 5;
        }
        if gh.last_commit_days.is_some_and(|d| d <= 30) {
            score += 5;
        }
    }

    if let Some(env_vars) = &inputs.env_vars {
        if !env_vars.is_empty() {
            score += 5;
        }
        if !env_vars.iter().any(|v| v.to_lowercase().starts_with("root_")) {
            score += 5;
        }
    }

    score.min(MAX_REPUTATION)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registries(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn empty_evidence_scores_zero() {
        assert_eq!(compute_reputation(&ReputationInputs::default()), 0);
    }

    #[test]
    fn buckets_add_up() {
        let inputs = ReputationInputs {
            registries: registries(&["npm", "pypi"]),
            recency_days: Some(20),
            github: Some(GithubStats {
                stars: 150,
                forks: 3,
                last_commit_days: Some(20),
            }),
            env_vars: Some(vec!["GMAIL_TOKEN".into()]),
            ..Default::default()
        };
        // 10 registries + 15 recency + 15 stars + 5 last commit + 10 env hygiene
        assert_eq!(compute_reputation(&inputs), 55);
    }

    #[test]
    fn root_prefixed_env_vars_lose_hygiene_credit() {
        let inputs = ReputationInputs {
            env_vars: Some(vec!["ROOT_PASSWORD".into()]),
            ..Default::default()
        };
        assert_eq!(compute_reputation(&inputs), 5);
        let declared_empty = ReputationInputs {
            env_vars: Some(Vec::new()),
            ..Default::default()
        };
        assert_eq!(compute_reputation(&declared_empty), 5);
    }

    #[test]
    fn capped_at_one_hundred() {
        let inputs = ReputationInputs {
            registries: registries(&["a", "b", "c"]),
            curated_docker: true,
            supply_chain: SupplyChain {
                sbom: true,
                ..Default::default()
            },
            env_vars: Some(vec!["TOKEN".into()]),
            github: Some(GithubStats {
                stars: 1000,
                forks: 50,
                last_commit_days: Some(1),
            }),
            recency_days: Some(1),
        };
        assert_eq!(compute_reputation(&inputs), MAX_REPUTATION);
    }

    #[test]
    fn candidate_signals_feed_github_stats() {
        let mut c = ServerCandidate::new("x")
            .with_signal("stars", 30)
            .with_signal("forks", 25)
            .with_signal("days_since_push", 400);
        c.registries.insert("github".into());
        let inputs = ReputationInputs::from_candidate(&c);
        // 10 stars + 5 forks
        assert_eq!(compute_reputation(&inputs), 15);
    }
}
