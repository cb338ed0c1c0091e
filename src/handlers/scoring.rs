// src/handlers/scoring.rs - Scoring and threshold steps

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use super::{input_f64, input_str, require_f64, ActionHandler, Outputs};
use crate::infra::errors::TunerError;
use crate::scoring::SimilarityScorer;
use crate::workflow::context::ExecutionContext;

/// `calculateScore`: score the current enhanced prompt against the style.
pub struct CalculateScore {
    scorer: SimilarityScorer,
}

impl CalculateScore {
    pub fn new(scorer: SimilarityScorer) -> Self {
        Self { scorer }
    }
}

#[async_trait]
impl ActionHandler for CalculateScore {
    fn name(&self) -> &str {
        "calculateScore"
    }

    async fn handle(
        &self,
        inputs: &Map<String, Value>,
        ctx: &mut ExecutionContext,
    ) -> Result<Outputs, TunerError> {
        // The prompt being tuned lives in the context, not in the inputs.
        let prompt = ctx
            .get_str("ENHANCED_PROMPT")
            .or_else(|| input_str(inputs, "prompt"))
            .ok_or_else(|| TunerError::handler(self.name(), "no ENHANCED_PROMPT to score"))?;
        let style = input_str(inputs, "target_style")
            .or_else(|| ctx.get_str("STYLE"))
            .unwrap_or("default");
        let image_url = input_str(inputs, "image_url");

        let result = self.scorer.score_image(prompt, style, image_url);
        tracing::info!(
            score = result.score,
            style_alignment = result.features.style_alignment,
            prompt_relevance = result.features.prompt_relevance,
            "Calculated score"
        );

        let mut out = Outputs::new();
        out.insert("score".into(), json!(result.score));
        out.insert("features".into(), serde_json::to_value(result.features)?);
        Ok(out)
    }
}

/// `checkThreshold`: compare against the target and count the cycle.
pub struct CheckThreshold;

#[async_trait]
impl ActionHandler for CheckThreshold {
    fn name(&self) -> &str {
        "checkThreshold"
    }

    async fn handle(
        &self,
        inputs: &Map<String, Value>,
        ctx: &mut ExecutionContext,
    ) -> Result<Outputs, TunerError> {
        let score = require_f64(self.name(), inputs, "score")?;
        let target = input_f64(inputs, "target").unwrap_or(ctx.target_score);

        let iterations = ctx
            .get("ITERATIONS")
            .and_then(Value::as_u64)
            .unwrap_or(0) as u32
            + 1;
        let passed = score >= target;

        ctx.set("ITERATIONS", json!(iterations));
        ctx.iteration = iterations;

        tracing::info!(score, target, passed, iterations, "Threshold check");

        let mut out = Outputs::new();
        out.insert("passed".into(), json!(passed));
        out.insert("iterations".into(), json!(iterations));
        Ok(out)
    }
}
