// src/workflow/definition.rs - Workflow definition (YAML) and load-time validation

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::infra::errors::TunerError;

/// The definition shipped with the crate.
pub const BUILTIN_WORKFLOW: &str = include_str!("../../workflows/tuner.yaml");

/// Exit condition given to a step named `evaluate` that declares none.
pub const DEFAULT_EXIT_WHEN: &str = "${PASSED} || ${ITERATIONS} >= ${config.max_iterations}";

const HTTP_METHODS: &[&str] = &["GET", "POST", "PUT", "PATCH", "DELETE"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionType {
    Function,
    Api,
    Condition,
    Storage,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionSpec {
    #[serde(rename = "type")]
    pub kind: ActionType,
    #[serde(default)]
    pub handler: Option<String>,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub method: Option<String>,
}

impl ActionSpec {
    pub fn method(&self) -> &str {
        self.method.as_deref().unwrap_or("POST")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub name: String,
    #[serde(default)]
    pub condition: Option<String>,
    pub action: String,
    #[serde(default)]
    pub inputs: Map<String, Value>,
    #[serde(default)]
    pub outputs: BTreeMap<String, String>,
    /// Jump back to this (earlier) step after running.
    #[serde(default)]
    pub loop_to: Option<String>,
    /// Leave the enclosing loop once this holds.
    #[serde(default)]
    pub exit_when: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowConfig {
    pub max_iterations: u32,
    pub target_score: f64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub config: WorkflowConfig,
    pub actions: BTreeMap<String, ActionSpec>,
    pub steps: Vec<Step>,

    /// `config` as a JSON tree, for `${config.path}` lookups.
    #[serde(skip)]
    config_tree: Value,
    /// Resolved `loop_to` index per step.
    #[serde(skip)]
    loop_targets: Vec<Option<usize>>,
}

impl WorkflowDefinition {
    pub fn builtin() -> Result<Self, TunerError> {
        Self::from_yaml_str(BUILTIN_WORKFLOW)
    }

    pub fn load(path: &Path) -> Result<Self, TunerError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// Parse, apply the step-name conventions, and validate.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, TunerError> {
        let mut def: WorkflowDefinition = serde_yml::from_str(yaml)?;
        def.apply_conventions();
        def.validate()?;
        def.config_tree = serde_json::to_value(&def.config)?;
        def.loop_targets = def
            .steps
            .iter()
            .map(|s| s.loop_to.as_deref().and_then(|t| def.step_index(t)))
            .collect();

        tracing::debug!(
            steps = def.steps.len(),
            actions = def.actions.len(),
            max_iterations = def.config.max_iterations,
            "Loaded workflow definition"
        );
        Ok(def)
    }

    /// `mutate` loops back to `generate`; `evaluate` exits on pass or cap.
    fn apply_conventions(&mut self) {
        let generate_at = self.step_index("generate");
        for (i, step) in self.steps.iter_mut().enumerate() {
            match step.name.as_str() {
                "mutate" if step.loop_to.is_none() => {
                    if generate_at.is_some_and(|g| g < i) {
                        step.loop_to = Some("generate".into());
                    }
                }
                "evaluate" if step.exit_when.is_none() => {
                    step.exit_when = Some(DEFAULT_EXIT_WHEN.into());
                }
                _ => {}
            }
        }
    }

    fn validate(&self) -> Result<(), TunerError> {
        let err = |msg: String| Err(TunerError::Configuration(msg));

        if self.config.max_iterations == 0 {
            return err("config.max_iterations must be at least 1".into());
        }
        if !self.config.target_score.is_finite() {
            return err("config.target_score must be a finite number".into());
        }
        if self.steps.is_empty() {
            return err("workflow declares no steps".into());
        }

        for (name, action) in &self.actions {
            match action.kind {
                ActionType::Api => {
                    if action.endpoint.as_deref().map_or(true, str::is_empty) {
                        return err(format!("api action '{name}' has no endpoint"));
                    }
                    let method = action.method().to_ascii_uppercase();
                    if !HTTP_METHODS.contains(&method.as_str()) {
                        return err(format!("api action '{name}' has unsupported method '{method}'"));
                    }
                }
                _ => {
                    if action.handler.as_deref().map_or(true, str::is_empty) {
                        return err(format!("action '{name}' has no handler"));
                    }
                }
            }
        }

        let mut seen = HashSet::new();
        for (i, step) in self.steps.iter().enumerate() {
            if !seen.insert(step.name.as_str()) {
                return err(format!("duplicate step name '{}'", step.name));
            }
            if !self.actions.contains_key(&step.action) {
                return err(format!(
                    "step '{}' references unknown action '{}'",
                    step.name, step.action
                ));
            }
            if let Some(target) = &step.loop_to {
                match self.step_index(target) {
                    Some(t) if t <= i => {}
                    Some(_) => {
                        return err(format!(
                            "step '{}' loops forward to '{target}'; loop_to must name an earlier step",
                            step.name
                        ))
                    }
                    None => {
                        return err(format!(
                            "step '{}' loops to unknown step '{target}'",
                            step.name
                        ))
                    }
                }
            }
        }

        Ok(())
    }

    pub fn step_index(&self, name: &str) -> Option<usize> {
        self.steps.iter().position(|s| s.name == name)
    }

    pub fn loop_target(&self, index: usize) -> Option<usize> {
        self.loop_targets.get(index).copied().flatten()
    }

    /// Where execution resumes when `exit_when` fires at `index`: just past
    /// the innermost loop containing it, or `None` to end the run's steps.
    pub fn exit_resume_index(&self, index: usize) -> Option<usize> {
        self.loop_targets
            .iter()
            .enumerate()
            .filter_map(|(back, target)| target.map(|t| (t, back)))
            .filter(|&(t, back)| t <= index && index <= back)
            .min_by_key(|&(t, back)| back - t)
            .map(|(_, back)| back + 1)
    }

    /// Dotted lookup into `config`; missing segments yield `Null`.
    pub fn config_value(&self, path: &str) -> Value {
        let mut node = &self.config_tree;
        for part in path.split('.') {
            match node.get(part) {
                Some(next) => node = next,
                None => return Value::Null,
            }
        }
        node.clone()
    }

    /// Handler names referenced by non-api actions.
    pub fn handler_names(&self) -> impl Iterator<Item = &str> {
        self.actions
            .values()
            .filter(|a| a.kind != ActionType::Api)
            .filter_map(|a| a.handler.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const LOOPED: &str = r#"
config:
  max_iterations: 4
  target_score: 0.9
  nested:
    depth: 2
actions:
  work: { type: function, handler: doWork }
  remote: { type: api, endpoint: "http://localhost:1/x" }
steps:
  - { name: start, action: work }
  - { name: generate, action: work }
  - { name: evaluate, action: work }
  - { name: mutate, action: work }
  - { name: finish, action: remote }
"#;

    #[test]
    fn test_builtin_loads() {
        let def = WorkflowDefinition::builtin().unwrap();
        assert_eq!(def.config.max_iterations, 3);
        assert!((def.config.target_score - 0.85).abs() < 1e-9);
        let names: Vec<&str> = def.steps.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["setup", "generate", "score", "evaluate", "mutate", "cache", "complete"]
        );
        assert_eq!(def.loop_target(4), Some(1));
    }

    #[test]
    fn test_conventions_fill_control_fields() {
        let def = WorkflowDefinition::from_yaml_str(LOOPED).unwrap();
        assert_eq!(def.steps[3].loop_to.as_deref(), Some("generate"));
        assert_eq!(def.steps[2].exit_when.as_deref(), Some(DEFAULT_EXIT_WHEN));
        assert_eq!(def.loop_target(3), Some(1));
        assert_eq!(def.loop_target(0), None);
    }

    #[test]
    fn test_exit_resumes_after_loop() {
        let def = WorkflowDefinition::from_yaml_str(LOOPED).unwrap();
        // evaluate (2) sits inside generate..=mutate (1..=3)
        assert_eq!(def.exit_resume_index(2), Some(4));
        assert_eq!(def.exit_resume_index(0), None);
        assert_eq!(def.exit_resume_index(4), None);
    }

    #[test]
    fn test_config_lookup() {
        let def = WorkflowDefinition::from_yaml_str(LOOPED).unwrap();
        assert_eq!(def.config_value("max_iterations"), serde_json::json!(4));
        assert_eq!(def.config_value("nested.depth"), serde_json::json!(2));
        assert_eq!(def.config_value("nested.missing"), Value::Null);
        assert_eq!(def.config_value("nope"), Value::Null);
    }

    #[test]
    fn test_api_method_defaults_to_post() {
        let def = WorkflowDefinition::from_yaml_str(LOOPED).unwrap();
        assert_eq!(def.actions["remote"].method(), "POST");
        let handlers: Vec<&str> = def.handler_names().collect();
        assert_eq!(handlers, vec!["doWork"]);
    }

    fn config_error(yaml: &str) -> String {
        match WorkflowDefinition::from_yaml_str(yaml) {
            Err(TunerError::Configuration(msg)) => msg,
            other => panic!("expected configuration error, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_action_rejected() {
        let msg = config_error(
            r#"
config: { max_iterations: 1, target_score: 0.5 }
actions: {}
steps:
  - { name: a, action: missing }
"#,
        );
        assert!(msg.contains("unknown action 'missing'"));
    }

    #[test]
    fn test_forward_loop_rejected() {
        let msg = config_error(
            r#"
config: { max_iterations: 1, target_score: 0.5 }
actions:
  w: { type: function, handler: h }
steps:
  - { name: a, action: w, loop_to: b }
  - { name: b, action: w }
"#,
        );
        assert!(msg.contains("earlier step"));
    }

    #[test]
    fn test_invalid_definitions() {
        assert!(config_error(
            "config: { max_iterations: 0, target_score: 0.5 }\nactions: {}\nsteps: []\n"
        )
        .contains("max_iterations"));

        assert!(config_error(
            r#"
config: { max_iterations: 1, target_score: 0.5 }
actions:
  w: { type: function }
steps:
  - { name: a, action: w }
"#
        )
        .contains("no handler"));

        assert!(config_error(
            r#"
config: { max_iterations: 1, target_score: 0.5 }
actions:
  r: { type: api, endpoint: "http://x", method: TRACE }
steps:
  - { name: a, action: r }
"#
        )
        .contains("unsupported method"));
    }

    #[test]
    fn test_unknown_action_type_is_parse_error() {
        let yaml = r#"
config: { max_iterations: 1, target_score: 0.5 }
actions:
  w: { type: teleport, handler: h }
steps:
  - { name: a, action: w }
"#;
        assert!(matches!(
            WorkflowDefinition::from_yaml_str(yaml),
            Err(TunerError::Yaml(_))
        ));
    }
}
