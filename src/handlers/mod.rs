// src/handlers/mod.rs - Action handlers and their registry
//
// Handlers receive resolved step inputs plus the run's context and return a
// map of output fields. The registry is built once; the engine refuses to
// start if a definition names a handler it doesn't hold.

pub mod complete;
pub mod generate;
pub mod prompt;
pub mod scoring;
pub mod storage;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::cache::{prompt_cache::DEFAULT_TTL, PromptCache};
use crate::generator::{ImageGenerator, PlaceholderGenerator};
use crate::infra::errors::TunerError;
use crate::scoring::SimilarityScorer;
use crate::workflow::context::ExecutionContext;

pub type Outputs = Map<String, Value>;

#[async_trait]
pub trait ActionHandler: Send + Sync {
    fn name(&self) -> &str;

    async fn handle(
        &self,
        inputs: &Map<String, Value>,
        ctx: &mut ExecutionContext,
    ) -> Result<Outputs, TunerError>;
}

/// Collaborators the builtin handlers are wired to.
#[derive(Clone)]
pub struct HandlerDeps {
    pub scorer: SimilarityScorer,
    pub generator: Arc<dyn ImageGenerator>,
    pub cache: Option<PromptCache>,
    pub cache_ttl: Duration,
    /// Fixes mutation choices, for reproducible runs.
    pub mutation_seed: Option<u64>,
}

impl Default for HandlerDeps {
    fn default() -> Self {
        Self {
            scorer: SimilarityScorer::default(),
            generator: Arc::new(PlaceholderGenerator),
            cache: None,
            cache_ttl: DEFAULT_TTL,
            mutation_seed: None,
        }
    }
}

#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: BTreeMap<String, Arc<dyn ActionHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The seven builtin handlers.
    pub fn builtin(deps: HandlerDeps) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(prompt::SetupPrompt));
        registry.register(Arc::new(generate::GenerateImage::new(deps.generator.clone())));
        registry.register(Arc::new(scoring::CalculateScore::new(deps.scorer.clone())));
        registry.register(Arc::new(scoring::CheckThreshold));
        registry.register(Arc::new(match deps.mutation_seed {
            Some(seed) => prompt::MutatePrompt::seeded(seed),
            None => prompt::MutatePrompt::new(),
        }));
        registry.register(Arc::new(storage::CachePrompt::new(deps.cache.clone(), deps.cache_ttl)));
        registry.register(Arc::new(complete::CompleteWorkflow));
        registry
    }

    /// Add or replace a handler under its own name.
    pub fn register(&mut self, handler: Arc<dyn ActionHandler>) {
        self.handlers.insert(handler.name().to_string(), handler);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ActionHandler>> {
        self.handlers.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.handlers.keys().map(String::as_str).collect()
    }
}

// Input accessors shared by the handlers.

pub(crate) fn input_str<'a>(inputs: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    inputs.get(key).and_then(Value::as_str)
}

pub(crate) fn input_f64(inputs: &Map<String, Value>, key: &str) -> Option<f64> {
    inputs.get(key).and_then(|v| match v {
        Value::String(s) => s.trim().parse().ok(),
        other => other.as_f64(),
    })
}

pub(crate) fn require_str<'a>(
    handler: &str,
    inputs: &'a Map<String, Value>,
    key: &str,
) -> Result<&'a str, TunerError> {
    input_str(inputs, key)
        .ok_or_else(|| TunerError::handler(handler, format!("missing string input '{key}'")))
}

pub(crate) fn require_f64(
    handler: &str,
    inputs: &Map<String, Value>,
    key: &str,
) -> Result<f64, TunerError> {
    input_f64(inputs, key)
        .ok_or_else(|| TunerError::handler(handler, format!("missing numeric input '{key}'")))
}
