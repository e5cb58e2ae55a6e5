use crate::{render_template, AdapterSet};
use async_trait::async_trait;
use std::sync::Arc;
use voxcore::{
    ConfigSchema, ExecutionContext, ExecutorError, FieldKind, FieldSpec, IntegrationAdapter,
    NodeExecutor, NodeResult, Value,
};
use voxruntime::{NodeCategory, NodeDefinition};

/// Service families the built-in integration nodes delegate to.
pub(crate) const SERVICES: &[&str] = &["telephony", "ai", "tts", "sheets", "erp", "calendar"];

/// Delegates one operation to an external-service adapter.
///
/// Params are the node's config (string values template-rendered against
/// the merged inputs) plus the merged input context under `input`. The
/// adapter's result becomes the node output unchanged.
pub struct IntegrationNode {
    operation: String,
    adapter: Arc<dyn IntegrationAdapter>,
}

impl IntegrationNode {
    pub fn new(operation: impl Into<String>, adapter: Arc<dyn IntegrationAdapter>) -> Self {
        Self {
            operation: operation.into(),
            adapter,
        }
    }
}

#[async_trait]
impl NodeExecutor for IntegrationNode {
    async fn execute(&self, ctx: ExecutionContext) -> Result<NodeResult, ExecutorError> {
        let merged = ctx.inputs.merged();
        let mut params = ctx.config.clone();
        for value in params.values_mut() {
            if let Value::String(text) = value {
                *text = render_template(text, &merged);
            }
        }
        params.insert("input".to_string(), Value::Object(merged));

        tracing::debug!(
            service = self.adapter.service(),
            operation = %self.operation,
            node = %ctx.node_id,
            "integration call"
        );
        let result = self
            .adapter
            .call(&self.operation, Value::Object(params), &ctx.cancellation)
            .await?;
        Ok(NodeResult::output(result))
    }
}

struct IntegrationSpec {
    node_type: &'static str,
    label: &'static str,
    service: &'static str,
    operation: &'static str,
    side_effecting: bool,
    schema: ConfigSchema,
}

fn specs() -> Vec<IntegrationSpec> {
    vec![
        IntegrationSpec {
            node_type: "telephony.dial",
            label: "Place Call",
            service: "telephony",
            operation: "dial",
            side_effecting: true,
            schema: ConfigSchema::new()
                .field(FieldSpec::string("to").required())
                .field(FieldSpec::string("from").default_value("+15550100")),
        },
        IntegrationSpec {
            node_type: "ai.generate",
            label: "Generate Text",
            service: "ai",
            operation: "generate",
            side_effecting: false,
            schema: ConfigSchema::new()
                .field(FieldSpec::string("prompt").required())
                .field(FieldSpec::number("max_tokens").default_value(256.0)),
        },
        IntegrationSpec {
            node_type: "speech.synthesize",
            label: "Synthesize Speech",
            service: "tts",
            operation: "synthesize",
            side_effecting: false,
            schema: ConfigSchema::new()
                .field(FieldSpec::string("text").required())
                .field(FieldSpec::string("voice").default_value("neutral")),
        },
        IntegrationSpec {
            node_type: "sheet.append",
            label: "Append Row",
            service: "sheets",
            operation: "append_row",
            side_effecting: true,
            schema: ConfigSchema::new()
                .field(FieldSpec::string("sheet_id").required())
                .field(FieldSpec::array_of("columns", FieldKind::String)),
        },
        IntegrationSpec {
            node_type: "erp.create",
            label: "Create Record",
            service: "erp",
            operation: "create_record",
            side_effecting: true,
            schema: ConfigSchema::new().field(FieldSpec::string("entity").required()),
        },
        IntegrationSpec {
            node_type: "calendar.schedule",
            label: "Schedule Event",
            service: "calendar",
            operation: "create_event",
            side_effecting: true,
            schema: ConfigSchema::new()
                .field(FieldSpec::string("title").required())
                .field(FieldSpec::number("duration_minutes").default_value(30.0)),
        },
    ]
}

pub(crate) fn definitions(adapters: &AdapterSet) -> Vec<NodeDefinition> {
    specs()
        .into_iter()
        .filter_map(|spec| {
            let Some(adapter) = adapters.get(spec.service) else {
                tracing::warn!(
                    service = spec.service,
                    node_type = spec.node_type,
                    "no adapter configured, node type not registered"
                );
                return None;
            };
            let definition = NodeDefinition::new(
                spec.node_type,
                NodeCategory::Integration,
                spec.label,
                spec.schema,
                Arc::new(IntegrationNode::new(spec.operation, adapter)),
            );
            Some(if spec.side_effecting {
                definition.side_effecting()
            } else {
                definition
            })
        })
        .collect()
}
