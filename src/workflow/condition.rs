// src/workflow/condition.rs - Sandboxed guard-expression evaluation
//
// Guards are rhai expressions over `${name}` references. References become
// scope variables (never spliced in as text), so a value can't change the
// shape of the expression. Only expressions are accepted: no statements, no
// function definitions, no I/O.

use rhai::{Dynamic, Engine, Scope};
use serde_json::Value;

use super::context::ExecutionContext;
use super::definition::WorkflowDefinition;
use crate::infra::errors::TunerError;

const ARITHMETIC_SYMBOLS: &[&str] = &[
    "+", "-", "*", "/", "%", "**", "<<", ">>", "&", "|", "^", "..", "..=", "=", "+=", "-=",
    "*=", "/=", "%=", "**=", "<<=", ">>=", "&=", "|=", "^=",
];

pub struct ConditionEvaluator {
    engine: Engine,
}

impl Default for ConditionEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl ConditionEvaluator {
    pub fn new() -> Self {
        let mut engine = Engine::new();

        engine.set_max_expr_depths(32, 16);
        engine.set_max_operations(10_000);
        engine.set_max_string_size(65_536);
        engine.set_max_array_size(1_000);
        engine.set_max_map_size(1_000);

        for symbol in ["print", "debug", "eval", "fn", "import", "export"] {
            engine.disable_symbol(symbol);
        }
        // Guards compare and combine; they never compute.
        for symbol in ARITHMETIC_SYMBOLS {
            engine.disable_symbol(*symbol);
        }

        Self { engine }
    }

    /// Evaluate `expression` to a boolean against the run's variables.
    pub fn evaluate(
        &self,
        expression: &str,
        ctx: &ExecutionContext,
        definition: &WorkflowDefinition,
    ) -> Result<bool, TunerError> {
        let failed = |message: String| TunerError::ConditionEvaluation {
            expression: expression.to_string(),
            message,
        };

        let mut scope = Scope::new();
        let script = bind_references(expression, |i, reference| {
            let name = format!("binding_{i}");
            scope.push_dynamic(name.clone(), json_to_dynamic(&ctx.lookup(reference, definition)));
            name
        })
        .map_err(failed)?;

        self.engine
            .eval_expression_with_scope::<bool>(&mut scope, &script)
            .map_err(|e| failed(e.to_string()))
    }
}

/// Replace each `${...}` with the name returned by `bind` (called once per
/// distinct reference, in order of first appearance).
fn bind_references(
    expression: &str,
    mut bind: impl FnMut(usize, &str) -> String,
) -> Result<String, String> {
    let mut out = String::with_capacity(expression.len());
    let mut seen: Vec<(String, String)> = Vec::new();
    let mut rest = expression;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after
            .find('}')
            .ok_or_else(|| format!("unterminated reference at '{}'", &rest[start..]))?;
        let reference = after[..end].trim();
        if reference.is_empty() {
            return Err("empty reference '${}'".into());
        }

        let name = match seen.iter().find(|(r, _)| r == reference) {
            Some((_, name)) => name.clone(),
            None => {
                let name = bind(seen.len(), reference);
                seen.push((reference.to_string(), name.clone()));
                name
            }
        };
        out.push_str(&name);
        rest = &after[end + 1..];
    }

    out.push_str(rest);
    Ok(out)
}

fn json_to_dynamic(value: &Value) -> Dynamic {
    match value {
        Value::Null => Dynamic::UNIT,
        Value::Bool(b) => Dynamic::from(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Dynamic::from(i)
            } else if let Some(f) = n.as_f64() {
                Dynamic::from(f)
            } else {
                Dynamic::UNIT
            }
        }
        Value::String(s) => Dynamic::from(s.clone()),
        Value::Array(arr) => {
            let items: Vec<Dynamic> = arr.iter().map(json_to_dynamic).collect();
            Dynamic::from(items)
        }
        Value::Object(obj) => {
            let mut map = rhai::Map::new();
            for (k, v) in obj {
                map.insert(k.clone().into(), json_to_dynamic(v));
            }
            Dynamic::from(map)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn setup() -> (ConditionEvaluator, ExecutionContext, WorkflowDefinition) {
        let def = WorkflowDefinition::builtin().unwrap();
        let ctx = ExecutionContext::for_run(&def, "owl", "wizard");
        (ConditionEvaluator::new(), ctx, def)
    }

    #[test]
    fn test_boolean_and_negation() {
        let (eval, mut ctx, def) = setup();
        assert!(!eval.evaluate("${PASSED}", &ctx, &def).unwrap());
        assert!(eval.evaluate("!${PASSED}", &ctx, &def).unwrap());

        ctx.set("PASSED", json!(true));
        assert!(eval.evaluate("${PASSED}", &ctx, &def).unwrap());
    }

    #[test]
    fn test_comparisons_with_config() {
        let (eval, mut ctx, def) = setup();
        let exit = "${PASSED} || ${ITERATIONS} >= ${config.max_iterations}";
        ctx.set("ITERATIONS", json!(2));
        assert!(!eval.evaluate(exit, &ctx, &def).unwrap());
        ctx.set("ITERATIONS", json!(3));
        assert!(eval.evaluate(exit, &ctx, &def).unwrap());

        ctx.set("SCORE", json!(0.9));
        assert!(eval.evaluate("${SCORE} >= ${config.target_score}", &ctx, &def).unwrap());
        assert!(eval.evaluate("${STYLE} == \"wizard\"", &ctx, &def).unwrap());
    }

    #[test]
    fn test_values_cannot_inject_code() {
        let (eval, mut ctx, def) = setup();
        ctx.set("USER_PROMPT", json!("true || true"));
        assert!(!eval.evaluate("${USER_PROMPT} == \"x\"", &ctx, &def).unwrap());
    }

    #[test]
    fn test_failures_are_condition_errors() {
        let (eval, ctx, def) = setup();
        for expr in ["${PASSED} &&", "${MISSING}", "${PASSED", "${}", "print(1)", "40 + 2"] {
            assert!(
                matches!(
                    eval.evaluate(expr, &ctx, &def),
                    Err(TunerError::ConditionEvaluation { .. })
                ),
                "expected failure for {expr}"
            );
        }
    }

    #[test]
    fn test_arithmetic_and_concatenation_rejected() {
        let (eval, mut ctx, def) = setup();
        ctx.set("SCORE", json!(0.5));
        for expr in [
            "${SCORE} + 0.5 >= 1.0",
            "${SCORE} * 2 == 1.0",
            "${ITERATIONS} % 2 == 0",
            "${STYLE} + \"!\" == \"wizard!\"",
            "${PASSED} | true",
        ] {
            assert!(
                matches!(
                    eval.evaluate(expr, &ctx, &def),
                    Err(TunerError::ConditionEvaluation { .. })
                ),
                "expected rejection for {expr}"
            );
        }
        // Comparisons and boolean operators still work
        assert!(eval
            .evaluate("${SCORE} < 0.6 && ${STYLE} != \"cyber\" || !${PASSED}", &ctx, &def)
            .unwrap());
    }

    #[test]
    fn test_repeated_reference_binds_once() {
        let mut calls = 0;
        let script = bind_references("${A} && ${B} || ${A}", |i, _| {
            calls += 1;
            format!("v{i}")
        })
        .unwrap();
        assert_eq!(script, "v0 && v1 || v0");
        assert_eq!(calls, 2);
    }
}
