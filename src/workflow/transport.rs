// src/workflow/transport.rs - Remote calls for `api` actions

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::infra::errors::TunerError;

#[async_trait]
pub trait ApiTransport: Send + Sync {
    /// Call `endpoint` with the resolved inputs and return the decoded body.
    async fn call(
        &self,
        endpoint: &str,
        method: &str,
        inputs: &Map<String, Value>,
    ) -> Result<Value, TunerError>;
}

/// JSON over HTTP. Inputs travel as the body, or as the query string for GET.
pub struct HttpTransport {
    client: reqwest::Client,
    timeout: Duration,
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new(Duration::from_secs(60))
    }
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout,
        }
    }
}

fn query_pairs(inputs: &Map<String, Value>) -> Vec<(String, String)> {
    inputs
        .iter()
        .filter(|(_, v)| !v.is_null())
        .map(|(k, v)| {
            let v = match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (k.clone(), v)
        })
        .collect()
}

#[async_trait]
impl ApiTransport for HttpTransport {
    async fn call(
        &self,
        endpoint: &str,
        method: &str,
        inputs: &Map<String, Value>,
    ) -> Result<Value, TunerError> {
        let method = reqwest::Method::from_bytes(method.to_ascii_uppercase().as_bytes())
            .map_err(|e| TunerError::remote(endpoint, format!("Invalid method '{method}': {e}")))?;

        tracing::debug!(endpoint, method = %method, "Calling api action");

        let request = self.client.request(method.clone(), endpoint).timeout(self.timeout);
        let request = if method == reqwest::Method::GET {
            request.query(&query_pairs(inputs))
        } else {
            request.json(inputs)
        };

        let resp = request
            .send()
            .await
            .map_err(|e| TunerError::remote(endpoint, e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let reason = status.canonical_reason().unwrap_or("error");
            return Err(TunerError::remote(
                endpoint,
                format!("API call failed: {} {reason}", status.as_u16()),
            ));
        }

        let text = resp
            .text()
            .await
            .map_err(|e| TunerError::remote(endpoint, e.to_string()))?;
        if text.trim().is_empty() {
            return Ok(Value::Object(Map::new()));
        }
        serde_json::from_str(&text)
            .map_err(|e| TunerError::remote(endpoint, format!("Invalid JSON response: {e}")))
    }
}
