use harvest_common::ServerCandidate;
use tracing::{debug, warn};

pub const RESCALED_REASON: &str = "ML ranker (weak labels) boosted";

/// Optional re-ranking capability. Returns the same candidates with final
/// scores; model-backed implementations build their output with
/// [`with_probabilities`].
pub trait Rescaler: Send + Sync {
    fn rescale(&self, candidates: &[ServerCandidate]) -> anyhow::Result<Vec<ServerCandidate>>;
}

/// Leaves heuristic scores untouched.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopRescaler;

impl Rescaler for NoopRescaler {
    fn rescale(&self, candidates: &[ServerCandidate]) -> anyhow::Result<Vec<ServerCandidate>> {
        Ok(candidates.to_vec())
    }
}

/// Replace each score with `probability * 100` (2 decimals) and note the rescale.
pub fn with_probabilities(
    candidates: &[ServerCandidate],
    probabilities: &[f64],
) -> anyhow::Result<Vec<ServerCandidate>> {
    anyhow::ensure!(
        candidates.len() == probabilities.len(),
        "expected {} probabilities, got {}",
        candidates.len(),
        probabilities.len()
    );
    Ok(candidates
        .iter()
        .zip(probabilities)
        .map(|(c, p)| {
            let mut c = c.clone();
            c.score = (p.clamp(0.0, 1.0) * 100.0 * 100.0).round() / 100.0;
            c.reasons.push(RESCALED_REASON.to_string());
            c
        })
        .collect())
}

/// Run the rescaler and re-sort. Any failure, or output that does not line
/// up with the input, keeps the heuristic ranking.
pub fn apply_rescaler(rescaler: &dyn Rescaler, candidates: Vec<ServerCandidate>) -> Vec<ServerCandidate> {
    let mut rescaled = match rescaler.rescale(&candidates) {
        Ok(out) => out,
        Err(e) => {
            warn!(error = %e, "Rescaler failed, keeping heuristic scores");
            return candidates;
        }
    };
    if rescaled.len() != candidates.len() {
        warn!(
            expected = candidates.len(),
            got = rescaled.len(),
            "Rescaler changed the candidate count, keeping heuristic scores"
        );
        return candidates;
    }
    if rescaled.iter().any(|c| !c.score.is_finite()) {
        warn!("Rescaler produced a non-finite score, keeping heuristic scores");
        return candidates;
    }

    rescaled.sort_by(|a, b| b.score.total_cmp(&a.score));
    debug!(count = rescaled.len(), "Applied rescaler");
    rescaled
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(Vec<f64>);

    impl Rescaler for Fixed {
        fn rescale(&self, candidates: &[ServerCandidate]) -> anyhow::Result<Vec<ServerCandidate>> {
            with_probabilities(candidates, &self.0)
        }
    }

    struct Broken;

    impl Rescaler for Broken {
        fn rescale(&self, _: &[ServerCandidate]) -> anyhow::Result<Vec<ServerCandidate>> {
            anyhow::bail!("model not loaded")
        }
    }

    struct Truncating;

    impl Rescaler for Truncating {
        fn rescale(&self, candidates: &[ServerCandidate]) -> anyhow::Result<Vec<ServerCandidate>> {
            Ok(candidates.iter().take(1).cloned().collect())
        }
    }

    fn scored(name: &str, score: f64) -> ServerCandidate {
        let mut c = ServerCandidate::new(name);
        c.score = score;
        c
    }

    #[test]
    fn rescales_to_percent_and_reorders() {
        let out = apply_rescaler(
            &Fixed(vec![0.25, 0.91234]),
            vec![scored("a", 60.0), scored("b", 40.0)],
        );
        assert_eq!(out[0].name, "b");
        assert_eq!(out[0].score, 91.23);
        assert_eq!(out[1].score, 25.0);
        assert_eq!(out[0].reasons.last().map(String::as_str), Some(RESCALED_REASON));
    }

    #[test]
    fn failures_fall_back_silently() {
        let input = vec![scored("a", 60.0), scored("b", 40.0)];
        assert_eq!(apply_rescaler(&Broken, input.clone()), input);
        assert_eq!(apply_rescaler(&Truncating, input.clone()), input);
        assert_eq!(apply_rescaler(&Fixed(vec![0.5]), input.clone()), input);
    }

    #[test]
    fn noop_changes_nothing() {
        let input = vec![scored("a", 60.0), scored("b", 60.0), scored("c", 10.0)];
        assert_eq!(apply_rescaler(&NoopRescaler, input.clone()), input);
    }
}
