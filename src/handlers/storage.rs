// src/handlers/storage.rs - Write accepted results to the prompt cache

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use super::{input_f64, input_str, ActionHandler, Outputs};
use crate::cache::{normalize_key, NewCacheEntry, PromptCache};
use crate::infra::errors::TunerError;
use crate::workflow::context::ExecutionContext;

/// `cachePrompt`: store the accepted prompt under the user's original prompt,
/// so the next run with the same input can skip the loop.
pub struct CachePrompt {
    cache: Option<PromptCache>,
    default_ttl: Duration,
}

impl CachePrompt {
    pub fn new(cache: Option<PromptCache>, default_ttl: Duration) -> Self {
        Self { cache, default_ttl }
    }
}

fn features_from(value: Option<&Value>) -> BTreeMap<String, f64> {
    value
        .and_then(Value::as_object)
        .map(|obj| {
            obj.iter()
                .filter_map(|(k, v)| v.as_f64().map(|f| (k.clone(), f)))
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
impl ActionHandler for CachePrompt {
    fn name(&self) -> &str {
        "cachePrompt"
    }

    async fn handle(
        &self,
        inputs: &Map<String, Value>,
        ctx: &mut ExecutionContext,
    ) -> Result<Outputs, TunerError> {
        let mut out = Outputs::new();

        let key = input_str(inputs, "prompt_key")
            .or_else(|| ctx.get_str("USER_PROMPT"))
            .unwrap_or_default()
            .to_string();

        let Some(cache) = &self.cache else {
            tracing::debug!("No prompt cache attached, skipping store");
            out.insert("cached".into(), json!(false));
            out.insert("cache_id".into(), Value::Null);
            return Ok(out);
        };

        let entry = NewCacheEntry {
            prompt: input_str(inputs, "prompt")
                .or_else(|| ctx.get_str("ENHANCED_PROMPT"))
                .unwrap_or(&key)
                .to_string(),
            style: input_str(inputs, "style")
                .or_else(|| ctx.get_str("STYLE"))
                .unwrap_or("default")
                .to_string(),
            score: input_f64(inputs, "score").unwrap_or(0.0),
            features: features_from(inputs.get("features")),
            image_url: input_str(inputs, "image_url")
                .or_else(|| ctx.get_str("IMAGE_URL"))
                .unwrap_or_default()
                .to_string(),
        };

        let ttl = input_f64(inputs, "ttl")
            .filter(|t| *t >= 1.0)
            .map(|t| Duration::from_secs(t as u64))
            .unwrap_or(self.default_ttl);

        let cached = cache.set(&key, entry, ttl).await;
        tracing::info!(cached, ttl_secs = ttl.as_secs(), "Caching prompt");

        out.insert("cached".into(), json!(cached));
        out.insert("cache_id".into(), json!(normalize_key(&key)));
        Ok(out)
    }
}
