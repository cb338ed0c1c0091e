// src/scoring/quality.rs - Pluggable secondary quality signal
//
// Stands in for a visual-quality model. The scorer only sees the trait, so a
// real estimator can replace these without touching the engine.

use std::sync::Mutex;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub const RELEVANCE_MIN: f64 = 0.6;
pub const RELEVANCE_MAX: f64 = 0.9;

/// Estimates how well a generated artifact matches its prompt, in
/// `[RELEVANCE_MIN, RELEVANCE_MAX]`.
pub trait QualityEstimator: Send + Sync {
    fn estimate(&self, prompt: &str, style: &str, image_url: Option<&str>) -> f64;
}

/// Uniform random relevance, the placeholder used by default.
pub struct RandomQuality {
    rng: Mutex<StdRng>,
}

impl Default for RandomQuality {
    fn default() -> Self {
        Self::new()
    }
}

impl RandomQuality {
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Reproducible sequence, for tests and benchmarks.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl QualityEstimator for RandomQuality {
    fn estimate(&self, _prompt: &str, _style: &str, _image_url: Option<&str>) -> f64 {
        match self.rng.lock() {
            Ok(mut rng) => rng.gen_range(RELEVANCE_MIN..=RELEVANCE_MAX),
            Err(_) => (RELEVANCE_MIN + RELEVANCE_MAX) / 2.0,
        }
    }
}

/// Constant relevance, clamped into the valid range.
#[derive(Debug, Clone, Copy)]
pub struct FixedQuality(pub f64);

impl QualityEstimator for FixedQuality {
    fn estimate(&self, _prompt: &str, _style: &str, _image_url: Option<&str>) -> f64 {
        self.0.clamp(RELEVANCE_MIN, RELEVANCE_MAX)
    }
}
