use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use voxcore::{
    ConfigSchema, ExecutionContext, ExecutorError, FieldSpec, NodeExecutor, NodeResult, Value,
};
use voxruntime::{NodeCategory, NodeDefinition};

pub const HANDLE_TRUE: &str = "true";
pub const HANDLE_FALSE: &str = "false";

/// Evaluates a predicate over the input context and activates the
/// matching outgoing handle.
///
/// Targets of the untaken handle are skipped by the scheduler.
pub struct BranchNode;

#[async_trait]
impl NodeExecutor for BranchNode {
    async fn execute(&self, ctx: ExecutionContext) -> Result<NodeResult, ExecutorError> {
        let field = ctx.require_config_str("field")?;
        let operator = ctx.config_str_or("operator", "eq");
        let expected = ctx.config.get("value");
        let actual = ctx.inputs.lookup(field);

        let matched = evaluate(operator, actual.as_ref(), expected)?;
        let handle = if matched { HANDLE_TRUE } else { HANDLE_FALSE };

        let mut output = HashMap::new();
        output.insert("matched".to_string(), Value::Bool(matched));
        output.insert("branch".to_string(), Value::String(handle.to_string()));
        if let Some(value) = actual {
            output.insert("value".to_string(), value);
        }
        Ok(NodeResult::output(Value::Object(output)).with_active_handles([handle]))
    }
}

fn evaluate(
    operator: &str,
    actual: Option<&Value>,
    expected: Option<&Value>,
) -> Result<bool, ExecutorError> {
    match operator {
        "exists" => Ok(actual.map(|v| !v.is_null()).unwrap_or(false)),
        "eq" => Ok(values_equal(actual, expected)),
        "ne" => Ok(!values_equal(actual, expected)),
        "contains" => {
            let Some(actual) = actual else {
                return Ok(false);
            };
            let needle = expected.map(|v| v.to_text()).unwrap_or_default();
            match actual {
                Value::Array(items) => Ok(items.iter().any(|i| i.to_text() == needle)),
                other => Ok(other.to_text().contains(&needle)),
            }
        }
        "gt" | "lt" => {
            let (Some(lhs), Some(rhs)) = (actual.and_then(as_number), expected.and_then(as_number))
            else {
                return Ok(false);
            };
            Ok(if operator == "gt" { lhs > rhs } else { lhs < rhs })
        }
        other => Err(ExecutorError::Configuration(format!(
            "unsupported operator: {}",
            other
        ))),
    }
}

fn values_equal(actual: Option<&Value>, expected: Option<&Value>) -> bool {
    let (Some(actual), Some(expected)) = (actual, expected) else {
        return false;
    };
    if let (Some(a), Some(b)) = (as_number(actual), as_number(expected)) {
        return a == b;
    }
    actual.to_text() == expected.to_text()
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => Some(*n),
        Value::Json(j) => j.as_f64(),
        _ => None,
    }
}

pub(crate) fn definitions() -> Vec<NodeDefinition> {
    vec![NodeDefinition::new(
        "branch.if",
        NodeCategory::Branch,
        "Condition",
        ConfigSchema::new()
            .field(FieldSpec::string("field").required())
            .field(
                FieldSpec::string("operator")
                    .one_of(["eq", "ne", "contains", "exists", "gt", "lt"])
                    .default_value("eq"),
            )
            .field(FieldSpec::new("value", voxcore::FieldKind::Any)),
        Arc::new(BranchNode),
    )]
}
