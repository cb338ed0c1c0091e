// src/generator/placeholder.rs - Deterministic offline generator

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use super::ImageGenerator;
use crate::infra::errors::TunerError;

/// Produces `placeholder://<style>/<digest>` without touching the network.
/// The same style and prompt always yield the same URL.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaceholderGenerator;

pub fn placeholder_url(prompt: &str, style: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(style.as_bytes());
    hasher.update(b"\n");
    hasher.update(prompt.as_bytes());
    let digest = hex::encode(hasher.finalize());
    format!("placeholder://{style}/{}", &digest[..16])
}

#[async_trait]
impl ImageGenerator for PlaceholderGenerator {
    fn id(&self) -> &str {
        "placeholder"
    }

    async fn generate(&self, prompt: &str, style: &str) -> Result<String, TunerError> {
        Ok(placeholder_url(prompt, style))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_deterministic() {
        let a = PlaceholderGenerator.generate("owl", "wizard").await.unwrap();
        let b = PlaceholderGenerator.generate("owl", "wizard").await.unwrap();
        assert_eq!(a, b);
        assert!(a.starts_with("placeholder://wizard/"));
        assert_eq!(a.len(), "placeholder://wizard/".len() + 16);
    }

    #[test]
    fn test_style_changes_url() {
        assert_ne!(placeholder_url("owl", "wizard"), placeholder_url("owl", "cyber"));
    }
}
