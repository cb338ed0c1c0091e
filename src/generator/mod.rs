// src/generator/mod.rs - Image generation backends

pub mod fallback;
pub mod http;
pub mod placeholder;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::infra::config::GeneratorConfig;
use crate::infra::errors::TunerError;

pub use fallback::FallbackGenerator;
pub use http::HttpImageGenerator;
pub use placeholder::PlaceholderGenerator;

/// Turns a prompt into an image URL.
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    fn id(&self) -> &str;

    async fn generate(&self, prompt: &str, style: &str) -> Result<String, TunerError>;
}

/// Build the generator described by config. No endpoint means offline
/// placeholder images; fallback endpoints are tried in order after the first.
pub fn from_config(config: &GeneratorConfig) -> Arc<dyn ImageGenerator> {
    let Some(primary) = &config.endpoint else {
        tracing::info!("No image endpoint configured, using placeholder generator");
        return Arc::new(PlaceholderGenerator);
    };

    let timeout = Duration::from_secs(config.timeout_seconds.max(1));
    let primary: Arc<dyn ImageGenerator> = Arc::new(HttpImageGenerator::new(primary, timeout));
    if config.fallback_endpoints.is_empty() {
        return primary;
    }

    let mut chain = vec![primary];
    for endpoint in &config.fallback_endpoints {
        chain.push(Arc::new(HttpImageGenerator::new(endpoint, timeout)));
    }
    Arc::new(FallbackGenerator::new(chain))
}
