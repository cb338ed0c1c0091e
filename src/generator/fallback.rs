// src/generator/fallback.rs - Fallback chain across image generators

use std::sync::Arc;

use async_trait::async_trait;

use super::ImageGenerator;
use crate::infra::errors::TunerError;

/// Tries each generator in order. Remote failures move on to the next one;
/// any other error is returned as-is.
pub struct FallbackGenerator {
    generators: Vec<Arc<dyn ImageGenerator>>,
}

impl FallbackGenerator {
    pub fn new(generators: Vec<Arc<dyn ImageGenerator>>) -> Self {
        Self { generators }
    }
}

#[async_trait]
impl ImageGenerator for FallbackGenerator {
    fn id(&self) -> &str {
        "fallback"
    }

    async fn generate(&self, prompt: &str, style: &str) -> Result<String, TunerError> {
        let mut last_error = None;
        for generator in &self.generators {
            match generator.generate(prompt, style).await {
                Ok(url) => return Ok(url),
                Err(e @ TunerError::RemoteCall { .. }) => {
                    tracing::warn!(generator = generator.id(), "Generator failed, trying fallback: {}", e);
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| TunerError::remote("fallback", "No generators configured")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::PlaceholderGenerator;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Failing {
        calls: AtomicUsize,
        fatal: bool,
    }

    #[async_trait]
    impl ImageGenerator for Failing {
        fn id(&self) -> &str {
            "failing"
        }

        async fn generate(&self, _prompt: &str, _style: &str) -> Result<String, TunerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fatal {
                Err(TunerError::Cancelled)
            } else {
                Err(TunerError::remote("failing", "boom"))
            }
        }
    }

    fn failing(fatal: bool) -> Arc<Failing> {
        Arc::new(Failing {
            calls: AtomicUsize::new(0),
            fatal,
        })
    }

    #[tokio::test]
    async fn test_falls_through_remote_errors() {
        let first = failing(false);
        let chain = FallbackGenerator::new(vec![
            first.clone() as Arc<dyn ImageGenerator>,
            Arc::new(PlaceholderGenerator),
        ]);
        let url = chain.generate("owl", "cyber").await.unwrap();
        assert!(url.starts_with("placeholder://cyber/"));
        assert_eq!(first.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_stops_on_other_errors() {
        let second = failing(false);
        let chain = FallbackGenerator::new(vec![
            failing(true) as Arc<dyn ImageGenerator>,
            second.clone(),
        ]);
        assert!(matches!(chain.generate("owl", "cyber").await, Err(TunerError::Cancelled)));
        assert_eq!(second.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_all_failed_returns_last_error() {
        let chain = FallbackGenerator::new(vec![
            failing(false) as Arc<dyn ImageGenerator>,
            failing(false),
        ]);
        assert!(matches!(
            chain.generate("owl", "cyber").await,
            Err(TunerError::RemoteCall { .. })
        ));

        let empty = FallbackGenerator::new(Vec::new());
        assert!(empty.generate("owl", "cyber").await.is_err());
    }
}
