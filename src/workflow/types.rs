// src/workflow/types.rs - Run results, states and progress events

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cache::CacheEntry;
use crate::infra::errors::TunerError;

/// How a finished run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Passed,
    Exhausted,
    Failed,
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RunState::Passed => "passed",
            RunState::Exhausted => "exhausted",
            RunState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// What a run hands back to its caller. Fatal errors are folded in
/// (`state = failed`, `error` set) rather than surfacing partial results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowResult {
    pub success: bool,
    pub image_url: Option<String>,
    pub final_prompt: Option<String>,
    pub score: f64,
    pub iterations: u32,
    pub timestamp: DateTime<Utc>,
    pub state: RunState,
    #[serde(default)]
    pub cached: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WorkflowResult {
    pub fn failed(error: &TunerError) -> Self {
        Self {
            success: false,
            image_url: None,
            final_prompt: None,
            score: 0.0,
            iterations: 0,
            timestamp: Utc::now(),
            state: RunState::Failed,
            cached: false,
            error: Some(error.to_string()),
        }
    }

    /// A cache hit short-circuits the run; the stored record was accepted once.
    pub fn from_cache(entry: &CacheEntry) -> Self {
        Self {
            success: true,
            image_url: Some(entry.image_url.clone()),
            final_prompt: Some(entry.prompt.clone()),
            score: entry.score,
            iterations: 0,
            timestamp: Utc::now(),
            state: RunState::Passed,
            cached: true,
            error: None,
        }
    }
}

/// Lifecycle notifications for `WorkflowEngine::with_progress`.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    WorkflowStarted {
        style: String,
        max_iterations: u32,
        target_score: f64,
    },
    CacheHit {
        score: f64,
    },
    StepStarted {
        step: String,
        iteration: u32,
    },
    StepSkipped {
        step: String,
    },
    LoopBack {
        from: String,
        to: String,
        cycle: u32,
    },
    Finished {
        state: RunState,
        iterations: u32,
        score: f64,
    },
}
