// src/handlers/prompt.rs - Prompt setup and mutation

use std::sync::Mutex;

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde_json::{json, Map, Value};

use super::{input_f64, input_str, require_str, ActionHandler, Outputs};
use crate::infra::errors::TunerError;
use crate::workflow::context::ExecutionContext;

const DEFAULT_STYLE_PHRASES: &str = "moonbird creature, detailed feathers, artistic style";

pub const MUTATIONS: [&str; 6] = [
    "more detailed",
    "vibrant colors",
    "dramatic lighting",
    "intricate patterns",
    "mystical atmosphere",
    "enhanced textures",
];

const DEFAULT_MUTATION_RATE: f64 = 0.3;

pub fn style_phrases(style: &str) -> &'static str {
    match style {
        "wizard" => "mystical wizard moonbird, magical staff, ethereal glow, ancient symbols",
        "cosmic" => "cosmic moonbird, starfield background, nebula colors, space dust",
        "cyber" => "cyberpunk moonbird, neon lights, digital circuits, chrome feathers",
        _ => DEFAULT_STYLE_PHRASES,
    }
}

/// `setupPrompt`: append the style's phrases and mint a prompt id.
pub struct SetupPrompt;

#[async_trait]
impl ActionHandler for SetupPrompt {
    fn name(&self) -> &str {
        "setupPrompt"
    }

    async fn handle(
        &self,
        inputs: &Map<String, Value>,
        ctx: &mut ExecutionContext,
    ) -> Result<Outputs, TunerError> {
        let base = require_str(self.name(), inputs, "base_prompt")?;
        let style = input_str(inputs, "style")
            .or_else(|| ctx.get_str("STYLE"))
            .unwrap_or("default");

        let prompt_id = uuid::Uuid::new_v4().to_string();
        let enhanced = format!("{base}, {}", style_phrases(style));

        tracing::info!(prompt_id = %prompt_id, enhanced_prompt = %enhanced, "Setup prompt");

        let mut out = Outputs::new();
        out.insert("prompt_id".into(), json!(prompt_id));
        out.insert("enhanced_prompt".into(), json!(enhanced));
        Ok(out)
    }
}

/// Number of catalog phrases appended for a mutation rate.
pub fn mutation_count(rate: f64) -> usize {
    let rate = if rate.is_finite() { rate.clamp(0.0, 1.0) } else { DEFAULT_MUTATION_RATE };
    ((MUTATIONS.len() as f64 * rate).ceil() as usize).clamp(1, MUTATIONS.len())
}

/// `mutatePrompt`: append a random selection of distinct catalog phrases.
pub struct MutatePrompt {
    rng: Mutex<StdRng>,
}

impl Default for MutatePrompt {
    fn default() -> Self {
        Self::new()
    }
}

impl MutatePrompt {
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    fn pick(&self, count: usize) -> Result<Vec<&'static str>, TunerError> {
        let mut rng = self
            .rng
            .lock()
            .map_err(|_| TunerError::handler("mutatePrompt", "rng lock poisoned"))?;
        Ok(MUTATIONS.choose_multiple(&mut *rng, count).copied().collect())
    }
}

#[async_trait]
impl ActionHandler for MutatePrompt {
    fn name(&self) -> &str {
        "mutatePrompt"
    }

    async fn handle(
        &self,
        inputs: &Map<String, Value>,
        _ctx: &mut ExecutionContext,
    ) -> Result<Outputs, TunerError> {
        let current = require_str(self.name(), inputs, "current_prompt")?;
        let rate = input_f64(inputs, "mutation_rate").unwrap_or(DEFAULT_MUTATION_RATE);

        let selected = self.pick(mutation_count(rate))?;
        let mutated = format!("{current}, {}", selected.join(", "));
        let mutation_type = selected.join("+");

        tracing::info!(
            score = input_f64(inputs, "score"),
            mutations = %mutation_type,
            "Mutated prompt"
        );

        let mut out = Outputs::new();
        out.insert("mutated_prompt".into(), json!(mutated));
        out.insert("mutation_type".into(), json!(mutation_type));
        Ok(out)
    }
}
