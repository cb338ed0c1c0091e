// src/scoring/scorer.rs - Style similarity scoring

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::quality::{QualityEstimator, RandomQuality};
use super::vectors::{dot, prompt_vector, ReferenceVectors};

const STYLE_WEIGHT: f64 = 0.6;
const RELEVANCE_WEIGHT: f64 = 0.4;
const DEFAULT_SCORE: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreFeatures {
    pub style_alignment: f64,
    pub prompt_relevance: f64,
    pub overall_quality: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreResult {
    pub score: f64,
    pub features: ScoreFeatures,
}

impl ScoreResult {
    /// Returned for styles without a reference vector.
    pub fn neutral() -> Self {
        Self {
            score: DEFAULT_SCORE,
            features: ScoreFeatures {
                style_alignment: DEFAULT_SCORE,
                prompt_relevance: DEFAULT_SCORE,
                overall_quality: DEFAULT_SCORE,
            },
        }
    }
}

/// A prompt to rank, with whatever score it was stored under.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptCandidate {
    pub prompt: String,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedPrompt {
    pub prompt: String,
    pub score: f64,
    pub similarity: f64,
}

/// Scores prompts against style references. Cheap to clone; the reference
/// vectors and quality estimator are shared.
#[derive(Clone)]
pub struct SimilarityScorer {
    references: Arc<ReferenceVectors>,
    quality: Arc<dyn QualityEstimator>,
}

impl Default for SimilarityScorer {
    fn default() -> Self {
        Self::new(
            Arc::new(ReferenceVectors::builtin()),
            Arc::new(RandomQuality::new()),
        )
    }
}

impl SimilarityScorer {
    pub fn new(references: Arc<ReferenceVectors>, quality: Arc<dyn QualityEstimator>) -> Self {
        Self {
            references,
            quality,
        }
    }

    /// Score a candidate produced from `prompt` for `style`.
    pub fn score_image(&self, prompt: &str, style: &str, image_url: Option<&str>) -> ScoreResult {
        let Some(reference) = self.references.get(style) else {
            tracing::warn!(style, "No reference vector for style, using neutral score");
            return ScoreResult::neutral();
        };

        let style_alignment = dot(&prompt_vector(prompt), reference) as f64;
        let prompt_relevance = self.quality.estimate(prompt, style, image_url);
        let overall_quality = STYLE_WEIGHT * style_alignment + RELEVANCE_WEIGHT * prompt_relevance;

        tracing::info!(
            style,
            score = overall_quality,
            style_alignment,
            prompt_relevance,
            "Image scored"
        );

        ScoreResult {
            score: overall_quality,
            features: ScoreFeatures {
                style_alignment,
                prompt_relevance,
                overall_quality,
            },
        }
    }

    /// Cosine similarity between two prompts' vectors.
    pub fn prompt_similarity(&self, a: &str, b: &str) -> f64 {
        dot(&prompt_vector(a), &prompt_vector(b)) as f64
    }

    /// Rank candidates by cosine similarity to `prompt`, best first, keeping
    /// at most `top_k`.
    pub fn find_similar_prompts(
        &self,
        prompt: &str,
        candidates: &[PromptCandidate],
        top_k: usize,
    ) -> Vec<RankedPrompt> {
        let query = prompt_vector(prompt);
        let mut ranked: Vec<RankedPrompt> = candidates
            .iter()
            .map(|c| RankedPrompt {
                prompt: c.prompt.clone(),
                score: c.score,
                similarity: dot(&query, &prompt_vector(&c.prompt)) as f64,
            })
            .collect();

        ranked.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        ranked.truncate(top_k);
        ranked
    }
}
