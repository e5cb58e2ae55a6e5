use async_trait::async_trait;
use std::sync::Arc;
use voxcore::{
    ConfigSchema, ExecutionContext, ExecutorError, FieldSpec, NodeExecutor, NodeResult, Value,
};
use voxruntime::{NodeCategory, NodeDefinition, NodeRegistry, RegistryBuilder};

struct NoopNode;

#[async_trait]
impl NodeExecutor for NoopNode {
    async fn execute(&self, _ctx: ExecutionContext) -> Result<NodeResult, ExecutorError> {
        Ok(NodeResult::empty())
    }
}

fn registry() -> NodeRegistry {
    let mut builder = RegistryBuilder::new();
    builder.register(NodeDefinition::new(
        "call.answer",
        NodeCategory::Trigger,
        "Answer Call",
        ConfigSchema::new().field(FieldSpec::string("greeting").default_value("hello")),
        Arc::new(NoopNode),
    ));
    builder.register(NodeDefinition::new(
        "call.route",
        NodeCategory::Branch,
        "Route Call",
        ConfigSchema::new(),
        Arc::new(NoopNode),
    ));
    builder.register(NodeDefinition::new(
        "call.hangup",
        NodeCategory::Trigger,
        "Hang Up",
        ConfigSchema::new(),
        Arc::new(NoopNode),
    ));
    builder.build()
}

#[test]
fn listing_is_sorted_by_node_type() {
    let registry = registry();
    let types: Vec<&str> = registry
        .list()
        .iter()
        .map(|d| d.node_type.as_str())
        .collect();
    assert_eq!(types, vec!["call.answer", "call.hangup", "call.route"]);
}

#[test]
fn categories_cover_registered_definitions() {
    let registry = registry();
    let categories: Vec<&str> = registry.categories().into_iter().collect();
    assert_eq!(categories, vec!["branch", "trigger"]);

    let triggers = registry.list_by_category(NodeCategory::Trigger);
    assert_eq!(triggers.len(), 2);
    assert!(registry.list_by_category(NodeCategory::Integration).is_empty());
}

#[test]
fn create_default_uses_definition_label_and_defaults() {
    let registry = registry();
    let node = registry.create_default("call.answer").unwrap();

    assert_eq!(node.node_type, "call.answer");
    assert_eq!(node.label.as_deref(), Some("Answer Call"));
    assert_eq!(
        node.config.get("greeting"),
        Some(&Value::String("hello".to_string()))
    );

    assert!(registry.create_default("call.unknown").is_none());
}

#[test]
fn lookups_miss_cleanly_for_unknown_types() {
    let registry = registry();
    assert!(registry.get("call.answer").is_some());
    assert!(registry.get("call.unknown").is_none());
}
