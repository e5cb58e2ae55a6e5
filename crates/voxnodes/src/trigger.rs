use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;
use voxcore::{
    ConfigSchema, ExecutionContext, ExecutorError, FieldSpec, NodeExecutor, NodeResult, Value,
};
use voxruntime::{NodeCategory, NodeDefinition};

/// Produces a simulated inbound call payload as the run's initial context.
pub struct CallTriggerNode;

#[async_trait]
impl NodeExecutor for CallTriggerNode {
    async fn execute(&self, ctx: ExecutionContext) -> Result<NodeResult, ExecutorError> {
        let mut payload = HashMap::new();
        payload.insert(
            "call_id".to_string(),
            Value::String(Uuid::new_v4().to_string()),
        );
        payload.insert(
            "from".to_string(),
            ctx.config_or("from", Value::String("+15550100".to_string())),
        );
        payload.insert(
            "to".to_string(),
            ctx.config_or("to", Value::String("+15550199".to_string())),
        );
        payload.insert("speech".to_string(), ctx.config_or("speech", Value::String(String::new())));
        if let Some(intent) = ctx.config.get("intent") {
            payload.insert("intent".to_string(), intent.clone());
        }
        Ok(NodeResult::output(Value::Object(payload)))
    }
}

/// Passes a configured payload through as the initial context.
pub struct ManualTriggerNode;

#[async_trait]
impl NodeExecutor for ManualTriggerNode {
    async fn execute(&self, ctx: ExecutionContext) -> Result<NodeResult, ExecutorError> {
        let payload = ctx.config_or("payload", Value::Object(HashMap::new()));
        Ok(NodeResult::output(payload))
    }
}

pub(crate) fn definitions() -> Vec<NodeDefinition> {
    vec![
        NodeDefinition::new(
            "trigger.call",
            NodeCategory::Trigger,
            "Inbound Call",
            ConfigSchema::new()
                .field(FieldSpec::string("from").default_value("+15550100"))
                .field(FieldSpec::string("to").default_value("+15550199"))
                .field(FieldSpec::string("speech").default_value(""))
                .field(FieldSpec::string("intent")),
            Arc::new(CallTriggerNode),
        ),
        NodeDefinition::new(
            "trigger.manual",
            NodeCategory::Trigger,
            "Manual Trigger",
            ConfigSchema::new()
                .field(FieldSpec::new("payload", voxcore::FieldKind::Object)),
            Arc::new(ManualTriggerNode),
        ),
    ]
}
