// src/workflow/mod.rs - Declarative workflow engine

pub mod condition;
pub mod context;
pub mod control;
pub mod definition;
pub mod engine;
pub mod transport;
pub mod types;

pub use context::ExecutionContext;
pub use control::CancelToken;
pub use definition::{ActionSpec, ActionType, Step, WorkflowConfig, WorkflowDefinition};
pub use engine::WorkflowEngine;
pub use transport::{ApiTransport, HttpTransport};
pub use types::{ProgressEvent, RunState, WorkflowResult};
