// src/handlers/complete.rs - Final result assembly

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Map, Value};

use super::{ActionHandler, Outputs};
use crate::infra::errors::TunerError;
use crate::workflow::context::{truthy, ExecutionContext};

/// `completeWorkflow`: package the run's outcome as `result`.
pub struct CompleteWorkflow;

#[async_trait]
impl ActionHandler for CompleteWorkflow {
    fn name(&self) -> &str {
        "completeWorkflow"
    }

    async fn handle(
        &self,
        inputs: &Map<String, Value>,
        ctx: &mut ExecutionContext,
    ) -> Result<Outputs, TunerError> {
        let field = |key: &str| inputs.get(key).cloned().unwrap_or(Value::Null);
        let success = match inputs.get("passed") {
            Some(v) => truthy(v),
            None => ctx.is_truthy("PASSED"),
        };

        let result = json!({
            "success": success,
            "image_url": field("image_url"),
            "final_prompt": field("final_prompt"),
            "score": field("score"),
            "iterations": field("iterations"),
            "timestamp": Utc::now().to_rfc3339(),
        });

        tracing::info!(success, iterations = %field("iterations"), "Workflow completed");

        let mut out = Outputs::new();
        out.insert("result".into(), result);
        Ok(out)
    }
}
