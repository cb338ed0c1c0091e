// src/workflow/engine.rs - Step executor driving the generate/mutate loop

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;

use super::condition::ConditionEvaluator;
use super::context::ExecutionContext;
use super::control::{CancelToken, RunGuard};
use super::definition::{ActionType, Step, WorkflowDefinition};
use super::transport::{ApiTransport, HttpTransport};
use super::types::{ProgressEvent, RunState, WorkflowResult};
use crate::cache::PromptCache;
use crate::handlers::HandlerRegistry;
use crate::infra::errors::TunerError;

/// Executes one workflow definition. Each `execute` call owns a fresh
/// `ExecutionContext`; the engine itself is shared read-only across runs.
pub struct WorkflowEngine {
    definition: Arc<WorkflowDefinition>,
    registry: HandlerRegistry,
    conditions: ConditionEvaluator,
    transport: Arc<dyn ApiTransport>,
    cache: Option<PromptCache>,
    timeout: Option<Duration>,
    on_progress: Option<Box<dyn Fn(ProgressEvent) + Send + Sync>>,
}

impl WorkflowEngine {
    /// Build an engine, failing if any action names a handler the registry
    /// doesn't hold.
    pub fn new(definition: WorkflowDefinition, registry: HandlerRegistry) -> Result<Self, TunerError> {
        for name in definition.handler_names() {
            if !registry.contains(name) {
                return Err(TunerError::HandlerNotFound {
                    name: name.to_string(),
                });
            }
        }

        Ok(Self {
            definition: Arc::new(definition),
            registry,
            conditions: ConditionEvaluator::new(),
            transport: Arc::new(HttpTransport::default()),
            cache: None,
            timeout: None,
            on_progress: None,
        })
    }

    pub fn with_transport(mut self, transport: Arc<dyn ApiTransport>) -> Self {
        self.transport = transport;
        self
    }

    /// Consult this cache before running any step.
    pub fn with_cache(mut self, cache: PromptCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Wall-clock budget per run.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set a callback for real-time progress events.
    pub fn with_progress(mut self, cb: impl Fn(ProgressEvent) + Send + Sync + 'static) -> Self {
        self.on_progress = Some(Box::new(cb));
        self
    }

    pub fn definition(&self) -> &WorkflowDefinition {
        &self.definition
    }

    fn emit(&self, event: ProgressEvent) {
        if let Some(ref cb) = self.on_progress {
            cb(event);
        }
    }

    /// Run to completion. Fatal errors come back as a failed result.
    pub async fn execute(&self, user_prompt: &str, style: &str) -> WorkflowResult {
        self.execute_with_cancel(user_prompt, style, &CancelToken::new())
            .await
    }

    pub async fn execute_with_cancel(
        &self,
        user_prompt: &str,
        style: &str,
        cancel: &CancelToken,
    ) -> WorkflowResult {
        match self.try_execute(user_prompt, style, cancel).await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(error = %e, "Workflow execution failed");
                let result = WorkflowResult::failed(&e);
                self.emit(ProgressEvent::Finished {
                    state: RunState::Failed,
                    iterations: 0,
                    score: 0.0,
                });
                result
            }
        }
    }

    /// Run to completion, surfacing fatal errors instead of folding them in.
    pub async fn try_execute(
        &self,
        user_prompt: &str,
        style: &str,
        cancel: &CancelToken,
    ) -> Result<WorkflowResult, TunerError> {
        let def = &self.definition;
        let guard = RunGuard::new(cancel.clone(), self.timeout);

        tracing::info!(
            user_prompt,
            style,
            max_iterations = def.config.max_iterations,
            target_score = def.config.target_score,
            "Starting tuner workflow"
        );
        self.emit(ProgressEvent::WorkflowStarted {
            style: style.to_string(),
            max_iterations: def.config.max_iterations,
            target_score: def.config.target_score,
        });

        if let Some(cache) = &self.cache {
            let hit = guard
                .run(async { Ok::<_, TunerError>(cache.get(user_prompt).await) })
                .await?;
            match hit {
                Some(entry) if entry.style == style => {
                    tracing::info!(score = entry.score, "Returning cached result");
                    self.emit(ProgressEvent::CacheHit { score: entry.score });
                    let result = WorkflowResult::from_cache(&entry);
                    self.emit(ProgressEvent::Finished {
                        state: result.state,
                        iterations: 0,
                        score: result.score,
                    });
                    return Ok(result);
                }
                Some(entry) => {
                    tracing::debug!(cached_style = %entry.style, "Cached entry has another style");
                }
                None => {}
            }
        }

        let mut ctx = ExecutionContext::for_run(def, user_prompt, style);
        self.run_steps(&mut ctx, &guard).await?;

        let result = self.collect_result(&ctx);
        tracing::info!(
            state = %result.state,
            iterations = result.iterations,
            score = result.score,
            "Workflow finished"
        );
        self.emit(ProgressEvent::Finished {
            state: result.state,
            iterations: result.iterations,
            score: result.score,
        });
        Ok(result)
    }

    async fn run_steps(&self, ctx: &mut ExecutionContext, guard: &RunGuard) -> Result<(), TunerError> {
        let def = &self.definition;
        let mut index = 0;
        // Passes taken per back-edge, keyed by the index of the step carrying `loop_to`.
        let mut loop_backs: HashMap<usize, u32> = HashMap::new();

        while index < def.steps.len() {
            guard.check()?;
            let step = &def.steps[index];

            if !self.guard_passes(step, ctx) {
                tracing::debug!(step = %step.name, "Skipping step");
                self.emit(ProgressEvent::StepSkipped {
                    step: step.name.clone(),
                });
                index += 1;
                continue;
            }

            tracing::debug!(step = %step.name, action = %step.action, "Executing step");
            self.emit(ProgressEvent::StepStarted {
                step: step.name.clone(),
                iteration: ctx.iteration,
            });
            self.run_step(step, ctx, guard).await?;

            if let Some(expr) = &step.exit_when {
                if self.holds(expr, ctx) {
                    match def.exit_resume_index(index) {
                        Some(next) => {
                            // Edges jumped over are left behind; re-entry starts fresh.
                            loop_backs.retain(|edge, _| *edge >= next);
                            index = next;
                            continue;
                        }
                        None => break,
                    }
                }
            }

            if let Some(target) = def.loop_target(index) {
                // Each loop body may run at most max_iterations times.
                let taken = loop_backs.entry(index).or_insert(0);
                if *taken + 1 < def.config.max_iterations {
                    *taken += 1;
                    self.emit(ProgressEvent::LoopBack {
                        from: step.name.clone(),
                        to: def.steps[target].name.clone(),
                        cycle: *taken,
                    });
                    index = target;
                    continue;
                }
                tracing::warn!(step = %step.name, loop_backs = *taken, "Iteration cap reached, leaving loop");
                loop_backs.remove(&index);
            }

            index += 1;
        }

        Ok(())
    }

    fn guard_passes(&self, step: &Step, ctx: &ExecutionContext) -> bool {
        match &step.condition {
            None => true,
            Some(expr) => self.holds(expr, ctx),
        }
    }

    /// Evaluate a condition; failures are logged and count as false.
    fn holds(&self, expr: &str, ctx: &ExecutionContext) -> bool {
        match self.conditions.evaluate(expr, ctx, &self.definition) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(error = %e, "Condition evaluation failed");
                false
            }
        }
    }

    async fn run_step(
        &self,
        step: &Step,
        ctx: &mut ExecutionContext,
        guard: &RunGuard,
    ) -> Result<(), TunerError> {
        let def = &self.definition;
        let action = def.actions.get(&step.action).ok_or_else(|| {
            TunerError::Configuration(format!("Unknown action: {}", step.action))
        })?;
        let inputs = ctx.resolve_all(&step.inputs, def);

        let output = match action.kind {
            ActionType::Api => {
                let endpoint = action.endpoint.as_deref().unwrap_or_default();
                guard
                    .run(self.transport.call(endpoint, action.method(), &inputs))
                    .await?
            }
            ActionType::Function | ActionType::Condition | ActionType::Storage => {
                let name = action.handler.as_deref().unwrap_or_default();
                let handler = self.registry.get(name).ok_or_else(|| TunerError::HandlerNotFound {
                    name: name.to_string(),
                })?;
                Value::Object(guard.run(handler.handle(&inputs, ctx)).await?)
            }
        };

        for (field, target) in &step.outputs {
            let value = output.get(field).cloned().unwrap_or(Value::Null);
            ctx.bind_output(target, value);
        }
        Ok(())
    }

    /// Turn the finished context into the caller's result. Uses
    /// `WORKFLOW_RESULT` when a step produced one, context variables otherwise.
    fn collect_result(&self, ctx: &ExecutionContext) -> WorkflowResult {
        let passed = ctx.is_truthy("PASSED");
        let state = if passed {
            RunState::Passed
        } else {
            RunState::Exhausted
        };

        let reported = ctx.get("WORKFLOW_RESULT").and_then(Value::as_object);
        let field = |key: &str, var: &str| -> Option<Value> {
            reported
                .and_then(|r| r.get(key))
                .filter(|v| !v.is_null())
                .or_else(|| ctx.get(var))
                .cloned()
        };

        let text = |key: &str, var: &str| field(key, var).and_then(|v| v.as_str().map(String::from));
        let timestamp = reported
            .and_then(|r| r.get("timestamp"))
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);

        WorkflowResult {
            success: passed,
            image_url: text("image_url", "IMAGE_URL"),
            final_prompt: text("final_prompt", "ENHANCED_PROMPT"),
            score: field("score", "SCORE").and_then(|v| v.as_f64()).unwrap_or(0.0),
            iterations: field("iterations", "ITERATIONS")
                .and_then(|v| v.as_u64())
                .unwrap_or(0) as u32,
            timestamp,
            state,
            cached: false,
            error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::{HandlerDeps, HandlerRegistry};

    #[test]
    fn test_missing_handler_rejected_at_build() {
        let def = WorkflowDefinition::builtin().unwrap();
        let err = WorkflowEngine::new(def, HandlerRegistry::new()).err().unwrap();
        assert!(matches!(err, TunerError::HandlerNotFound { .. }));
    }

    #[test]
    fn test_builtin_registry_satisfies_builtin_workflow() {
        let def = WorkflowDefinition::builtin().unwrap();
        let registry = HandlerRegistry::builtin(HandlerDeps::default());
        assert!(WorkflowEngine::new(def, registry).is_ok());
    }
}
