// src/scoring/mod.rs - Prompt/style similarity scoring

pub mod quality;
pub mod scorer;
pub mod vectors;

pub use quality::{FixedQuality, QualityEstimator, RandomQuality};
pub use scorer::{PromptCandidate, RankedPrompt, ScoreFeatures, ScoreResult, SimilarityScorer};
pub use vectors::ReferenceVectors;

use std::sync::Arc;

use crate::infra::config::{QualityMode, ScoringConfig};

/// Scorer over the builtin references with the configured quality signal.
pub fn from_config(config: &ScoringConfig) -> SimilarityScorer {
    let quality: Arc<dyn QualityEstimator> = match config.quality {
        QualityMode::Random => Arc::new(RandomQuality::new()),
        QualityMode::Fixed => Arc::new(FixedQuality(config.fixed_quality)),
    };
    SimilarityScorer::new(Arc::new(ReferenceVectors::builtin()), quality)
}
