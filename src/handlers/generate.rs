// src/handlers/generate.rs - Image generation step

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use super::{input_str, require_str, ActionHandler, Outputs};
use crate::generator::ImageGenerator;
use crate::infra::errors::TunerError;
use crate::workflow::context::ExecutionContext;

/// `generateImage`: hand the prompt to the configured generator.
pub struct GenerateImage {
    generator: Arc<dyn ImageGenerator>,
}

impl GenerateImage {
    pub fn new(generator: Arc<dyn ImageGenerator>) -> Self {
        Self { generator }
    }
}

#[async_trait]
impl ActionHandler for GenerateImage {
    fn name(&self) -> &str {
        "generateImage"
    }

    async fn handle(
        &self,
        inputs: &Map<String, Value>,
        ctx: &mut ExecutionContext,
    ) -> Result<Outputs, TunerError> {
        let prompt = require_str(self.name(), inputs, "prompt")?;
        let style = input_str(inputs, "style")
            .or_else(|| ctx.get_str("STYLE"))
            .unwrap_or("default");

        let url = self.generator.generate(prompt, style).await?;
        tracing::info!(generator = self.generator.id(), image_url = %url, "Generated image");

        let mut out = Outputs::new();
        out.insert("image_url".into(), json!(url));
        Ok(out)
    }
}
