// src/generator/http.rs - HTTP image generation endpoint

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::ImageGenerator;
use crate::infra::errors::TunerError;

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    prompt: &'a str,
    style: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    url: Option<String>,
    error: Option<String>,
}

/// POSTs `{prompt, style}` and expects `{url}` back. A `{error}` body or a
/// non-success status is a remote-call failure.
pub struct HttpImageGenerator {
    endpoint: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpImageGenerator {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Self {
        Self {
            endpoint: endpoint.into(),
            client: reqwest::Client::new(),
            timeout,
        }
    }
}

#[async_trait]
impl ImageGenerator for HttpImageGenerator {
    fn id(&self) -> &str {
        "http"
    }

    async fn generate(&self, prompt: &str, style: &str) -> Result<String, TunerError> {
        tracing::debug!(endpoint = %self.endpoint, style, "Requesting image");

        let resp = self
            .client
            .post(&self.endpoint)
            .timeout(self.timeout)
            .json(&GenerateRequest { prompt, style })
            .send()
            .await
            .map_err(|e| TunerError::remote(&self.endpoint, format!("Cannot reach generator: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(TunerError::remote(
                &self.endpoint,
                format!("HTTP {}: {}", status.as_u16(), body.trim()),
            ));
        }

        let body: GenerateResponse = resp
            .json()
            .await
            .map_err(|e| TunerError::remote(&self.endpoint, format!("Invalid response: {e}")))?;

        match (body.url, body.error) {
            (_, Some(error)) => Err(TunerError::remote(&self.endpoint, error)),
            (Some(url), None) => Ok(url),
            (None, None) => Err(TunerError::remote(&self.endpoint, "Response carried no url")),
        }
    }
}
