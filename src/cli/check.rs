// src/cli/check.rs - Validate a workflow definition

use std::path::Path;

use crate::handlers::{HandlerDeps, HandlerRegistry};
use crate::scoring::ReferenceVectors;
use crate::workflow::{ActionType, WorkflowDefinition, WorkflowEngine};

/// Load the definition and build an engine over the builtin handlers, which
/// is everything a run checks before its first step.
pub fn run_check(path: &Path) -> anyhow::Result<()> {
    let definition = WorkflowDefinition::load(path)
        .map_err(|e| anyhow::anyhow!("{}: {}", path.display(), e))?;
    let engine = WorkflowEngine::new(definition, HandlerRegistry::builtin(HandlerDeps::default()))?;
    let def = engine.definition();

    println!(
        "{}: ok ({} steps, {} actions, max_iterations={}, target_score={})",
        path.display(),
        def.steps.len(),
        def.actions.len(),
        def.config.max_iterations,
        def.config.target_score
    );
    for (i, step) in def.steps.iter().enumerate() {
        let kind = def
            .actions
            .get(&step.action)
            .map(|a| match a.kind {
                ActionType::Function => "function",
                ActionType::Api => "api",
                ActionType::Condition => "condition",
                ActionType::Storage => "storage",
            })
            .unwrap_or("?");
        let mut line = format!("  {}. {} [{}:{}]", i + 1, step.name, kind, step.action);
        if let Some(cond) = &step.condition {
            line.push_str(&format!(" if {}", cond));
        }
        if let Some(target) = &step.loop_to {
            line.push_str(&format!(" -> {}", target));
        }
        if let Some(exit) = &step.exit_when {
            line.push_str(&format!(" exit when {}", exit));
        }
        println!("{}", line);
    }
    println!(
        "  styles with reference vectors: {}",
        ReferenceVectors::builtin().styles().join(", ")
    );
    Ok(())
}
