use crate::render_template;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use voxcore::{
    ConfigSchema, ExecutionContext, ExecutorError, FieldSpec, NodeExecutor, NodeResult, Value,
};
use voxruntime::{NodeCategory, NodeDefinition};

/// Renders a text template against the merged input context.
///
/// Deterministic: the same inputs always produce the same spoken line.
pub struct SayNode;

#[async_trait]
impl NodeExecutor for SayNode {
    async fn execute(&self, ctx: ExecutionContext) -> Result<NodeResult, ExecutorError> {
        let text = ctx.require_config_str("text")?;
        let spoken = render_template(text, &ctx.inputs.merged());
        let mut output = HashMap::new();
        output.insert("spoken".to_string(), Value::String(spoken));
        Ok(NodeResult::output(Value::Object(output)))
    }
}

/// Extracts caller speech from upstream context into a transcript.
pub struct GatherNode;

#[async_trait]
impl NodeExecutor for GatherNode {
    async fn execute(&self, ctx: ExecutionContext) -> Result<NodeResult, ExecutorError> {
        let source = ctx.config_str_or("source", "speech");
        let fallback = ctx.config_str_or("fallback", "");
        let transcript = ctx
            .inputs
            .lookup(source)
            .map(|v| v.to_text())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| fallback.to_string());
        let mut output = HashMap::new();
        output.insert("transcript".to_string(), Value::String(transcript));
        Ok(NodeResult::output(Value::Object(output)))
    }
}

pub(crate) fn definitions() -> Vec<NodeDefinition> {
    vec![
        NodeDefinition::new(
            "speech.say",
            NodeCategory::Speech,
            "Say",
            ConfigSchema::new().field(FieldSpec::string("text").required()),
            Arc::new(SayNode),
        ),
        NodeDefinition::new(
            "speech.gather",
            NodeCategory::Speech,
            "Gather Speech",
            ConfigSchema::new()
                .field(FieldSpec::string("source").default_value("speech"))
                .field(FieldSpec::string("fallback").default_value("")),
            Arc::new(GatherNode),
        ),
    ]
}
