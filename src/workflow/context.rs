// src/workflow/context.rs - Per-run variable store and binding resolution

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use super::definition::WorkflowDefinition;

/// Mutable state owned by exactly one run.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    variables: BTreeMap<String, Value>,
    pub iteration: u32,
    pub max_iterations: u32,
    pub target_score: f64,
}

impl ExecutionContext {
    pub fn new(max_iterations: u32, target_score: f64) -> Self {
        Self {
            variables: BTreeMap::new(),
            iteration: 0,
            max_iterations,
            target_score,
        }
    }

    /// Fresh context seeded with the run's inputs.
    pub fn for_run(definition: &WorkflowDefinition, user_prompt: &str, style: &str) -> Self {
        let mut ctx = Self::new(definition.config.max_iterations, definition.config.target_score);
        ctx.set("USER_PROMPT", Value::from(user_prompt));
        ctx.set("STYLE", Value::from(style));
        ctx.set("ITERATIONS", Value::from(0));
        ctx.set("PASSED", Value::Bool(false));
        ctx
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.variables.get(name)
    }

    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.variables.insert(name.into(), value);
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    pub fn is_truthy(&self, name: &str) -> bool {
        self.get(name).is_some_and(truthy)
    }

    /// Write a step output. `VAR` and `${VAR}` name the same variable.
    pub fn bind_output(&mut self, target: &str, value: Value) {
        let name = strip_token(target).unwrap_or(target).trim();
        self.set(name, value);
    }

    /// Look up a `${...}` reference body: `config.a.b` walks the workflow
    /// config, anything else is a context variable. Missing yields `Null`.
    pub fn lookup(&self, reference: &str, definition: &WorkflowDefinition) -> Value {
        let reference = reference.trim();
        match reference.strip_prefix("config.") {
            Some(path) => definition.config_value(path),
            None => self.get(reference).cloned().unwrap_or(Value::Null),
        }
    }

    /// Resolve one input binding. A string that is exactly `${name}` takes the
    /// referenced value with its type; embedded references are interpolated
    /// as text; everything else passes through.
    pub fn resolve(&self, binding: &Value, definition: &WorkflowDefinition) -> Value {
        match binding {
            Value::String(s) => {
                if let Some(reference) = strip_token(s) {
                    return self.lookup(reference, definition);
                }
                if s.contains("${") {
                    return Value::String(self.interpolate(s, definition));
                }
                binding.clone()
            }
            Value::Array(items) => {
                Value::Array(items.iter().map(|v| self.resolve(v, definition)).collect())
            }
            Value::Object(map) => Value::Object(self.resolve_all(map, definition)),
            _ => binding.clone(),
        }
    }

    pub fn resolve_all(&self, bindings: &Map<String, Value>, definition: &WorkflowDefinition) -> Map<String, Value> {
        bindings
            .iter()
            .map(|(k, v)| (k.clone(), self.resolve(v, definition)))
            .collect()
    }

    fn interpolate(&self, template: &str, definition: &WorkflowDefinition) -> String {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;
        while let Some(start) = rest.find("${") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let Some(end) = after.find('}') else {
                out.push_str(&rest[start..]);
                return out;
            };
            out.push_str(&render(&self.lookup(&after[..end], definition)));
            rest = &after[end + 1..];
        }
        out.push_str(rest);
        out
    }
}

/// `${name}` -> `name`, only when the whole string is one reference.
fn strip_token(s: &str) -> Option<&str> {
    let inner = s.trim().strip_prefix("${")?.strip_suffix('}')?;
    (!inner.contains("${") && !inner.contains('}')).then_some(inner)
}

fn render(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
