// src/cli/run.rs - `run` command: tune one prompt

use std::path::Path;
use std::time::Duration;

use super::progress::terminal_progress;
use super::RunArgs;
use crate::cache::{self, PromptCache};
use crate::generator;
use crate::handlers::{HandlerDeps, HandlerRegistry};
use crate::infra::config::Config;
use crate::scoring;
use crate::workflow::{CancelToken, RunState, WorkflowDefinition, WorkflowEngine};

/// Workflow from the flag, then config, then the embedded default.
pub fn resolve_definition(flag: Option<&str>, config: &Config) -> anyhow::Result<WorkflowDefinition> {
    let path = flag.or(config.engine.workflow.as_deref());
    let definition = match path {
        Some(p) => WorkflowDefinition::load(Path::new(p))
            .map_err(|e| anyhow::anyhow!("{}: {}", p, e))?,
        None => WorkflowDefinition::builtin()?,
    };
    Ok(definition)
}

/// Open the cache if enabled. A cache that can't be opened disables caching
/// for this run rather than failing it.
fn open_cache(config: &Config) -> Option<PromptCache> {
    if !config.cache.enabled {
        return None;
    }
    match cache::open(&config.cache) {
        Ok(cache) => Some(cache),
        Err(e) => {
            tracing::warn!("Prompt cache unavailable, continuing without it: {}", e);
            None
        }
    }
}

pub fn build_engine(args: &RunArgs, config: &Config) -> anyhow::Result<WorkflowEngine> {
    let definition = resolve_definition(args.workflow.as_deref(), config)?;
    let cache = open_cache(config);

    let deps = HandlerDeps {
        scorer: scoring::from_config(&config.scoring),
        generator: generator::from_config(&config.generator),
        cache: cache.clone(),
        cache_ttl: config.cache.ttl(),
        mutation_seed: None,
    };
    let mut engine = WorkflowEngine::new(definition, HandlerRegistry::builtin(deps))?;

    if let Some(cache) = cache {
        if config.engine.use_cache && !args.no_cache {
            engine = engine.with_cache(cache);
        }
    }

    let timeout = args.timeout.unwrap_or(config.engine.timeout_seconds);
    if timeout > 0 {
        engine = engine.with_timeout(Duration::from_secs(timeout));
    }
    if !args.quiet {
        engine = engine.with_progress(terminal_progress());
    }
    Ok(engine)
}

/// Run the engine, cancelling on Ctrl-C, and print the result as JSON.
pub async fn run_workflow(args: RunArgs, config: &Config) -> anyhow::Result<()> {
    let prompt = args.prompt.join(" ");
    if prompt.trim().is_empty() {
        anyhow::bail!("prompt must not be empty");
    }
    let engine = build_engine(&args, config)?;

    let cancel = CancelToken::new();
    let on_signal = cancel.clone();
    let signal_task = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling run");
            on_signal.cancel();
        }
    });

    let result = engine
        .execute_with_cancel(&prompt, &args.style, &cancel)
        .await;
    signal_task.abort();

    println!("{}", serde_json::to_string_pretty(&result)?);

    if result.state == RunState::Failed {
        anyhow::bail!(
            "run failed: {}",
            result.error.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}
