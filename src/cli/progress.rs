// src/cli/progress.rs - Terminal progress renderer for workflow runs

use crate::workflow::ProgressEvent;

/// One line of terminal output per event.
pub fn format_event(event: &ProgressEvent) -> String {
    match event {
        ProgressEvent::WorkflowStarted {
            style,
            max_iterations,
            target_score,
        } => format!(
            "[start] style={} target={:.2} max_iterations={}",
            style, target_score, max_iterations
        ),
        ProgressEvent::CacheHit { score } => format!("[cache] hit score={:.2}", score),
        ProgressEvent::StepStarted { step, iteration } => {
            format!("[iter {}] {}", iteration, step)
        }
        ProgressEvent::StepSkipped { step } => format!("[skip] {}", step),
        ProgressEvent::LoopBack { from, to, cycle } => {
            format!("[loop {}] {} -> {}", cycle, from, to)
        }
        ProgressEvent::Finished {
            state,
            iterations,
            score,
        } => format!(
            "[done] {} score={:.2} iterations={}",
            state, score, iterations
        ),
    }
}

/// Build a progress callback that writes formatted output to stderr.
///
/// All progress output goes to stderr so stdout remains clean for the JSON
/// result. Returns a closure suitable for `WorkflowEngine::with_progress()`.
pub fn terminal_progress() -> impl Fn(ProgressEvent) + Send + Sync + 'static {
    move |event| eprintln!("{}", format_event(&event))
}
