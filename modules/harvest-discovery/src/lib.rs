pub mod integrate;
pub mod merge;
pub mod normalize;
pub mod pipeline;
pub mod reputation;
pub mod rescale;
pub mod score;

pub use integrate::{manifest_from_candidate, server_id_for, track_candidates, TrackSummary, DISCOVERED_REGISTRY};
pub use merge::merge;
pub use normalize::{normalize, normalize_at, RawCandidate};
pub use pipeline::{Discovery, DiscoveryReport, DiscoveryStats, SourceError, SourceErrorKind};
pub use reputation::{compute_reputation, ReputationInputs};
pub use rescale::{apply_rescaler, with_probabilities, NoopRescaler, Rescaler};
pub use score::{HashedEmbedding, Scorer, SemanticModel};
