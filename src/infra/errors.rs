// src/infra/errors.rs - Error types for moonforge

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TunerError {
    // Load-time errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Handler '{name}' not found")]
    HandlerNotFound { name: String },

    // Run-time errors (fatal)
    #[error("Remote call to '{target}' failed: {message}")]
    RemoteCall { target: String, message: String },

    #[error("Handler '{handler}' failed: {message}")]
    Handler { handler: String, message: String },

    #[error("Run cancelled")]
    Cancelled,

    #[error("Run exceeded its deadline of {seconds}s")]
    DeadlineExceeded { seconds: u64 },

    // Recovered locally by their callers
    #[error("Condition '{expression}' could not be evaluated: {message}")]
    ConditionEvaluation { expression: String, message: String },

    #[error("Cache error: {0}")]
    Cache(String),

    // Infra
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl TunerError {
    /// Whether this error aborts a workflow run. Condition and cache errors are
    /// absorbed where they happen; everything else ends the run.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            TunerError::ConditionEvaluation { .. } | TunerError::Cache(_)
        )
    }

    pub fn remote(target: impl Into<String>, message: impl Into<String>) -> Self {
        TunerError::RemoteCall {
            target: target.into(),
            message: message.into(),
        }
    }

    pub fn handler(handler: impl Into<String>, message: impl Into<String>) -> Self {
        TunerError::Handler {
            handler: handler.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_kinds_are_not_fatal() {
        let cond = TunerError::ConditionEvaluation {
            expression: "${X} >".into(),
            message: "unexpected end".into(),
        };
        assert!(!cond.is_fatal());
        assert!(!TunerError::Cache("store down".into()).is_fatal());
    }

    #[test]
    fn test_fatal_kinds() {
        assert!(TunerError::HandlerNotFound { name: "x".into() }.is_fatal());
        assert!(TunerError::remote("http://x", "500").is_fatal());
        assert!(TunerError::Cancelled.is_fatal());
        assert!(TunerError::Configuration("bad".into()).is_fatal());
    }

    #[test]
    fn test_display_messages() {
        let e = TunerError::HandlerNotFound {
            name: "mutatePrompt".into(),
        };
        assert_eq!(e.to_string(), "Handler 'mutatePrompt' not found");

        let e = TunerError::DeadlineExceeded { seconds: 30 };
        assert_eq!(e.to_string(), "Run exceeded its deadline of 30s");
    }
}
