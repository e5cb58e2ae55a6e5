use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use voxcore::{ConfigSchema, FieldError, Node, NodeExecutor, Value};

/// Closed set of executor capability families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeCategory {
    Trigger,
    Speech,
    Branch,
    Integration,
}

impl NodeCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeCategory::Trigger => "trigger",
            NodeCategory::Speech => "speech",
            NodeCategory::Branch => "branch",
            NodeCategory::Integration => "integration",
        }
    }
}

impl std::fmt::Display for NodeCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Registered schema, metadata and executor for one node type.
pub struct NodeDefinition {
    pub node_type: String,
    pub category: NodeCategory,
    pub label: String,
    pub schema: ConfigSchema,
    /// Side-effecting executors (placing a call, creating a record) are
    /// never automatically retried.
    pub side_effecting: bool,
    /// A failing node with this flag set fails alone; independent branches
    /// keep running and the run does not end `Failed`.
    pub continue_on_error: bool,
    executor: Arc<dyn NodeExecutor>,
}

impl NodeDefinition {
    pub fn new(
        node_type: impl Into<String>,
        category: NodeCategory,
        label: impl Into<String>,
        schema: ConfigSchema,
        executor: Arc<dyn NodeExecutor>,
    ) -> Self {
        Self {
            node_type: node_type.into(),
            category,
            label: label.into(),
            schema,
            side_effecting: false,
            continue_on_error: false,
            executor,
        }
    }

    pub fn side_effecting(mut self) -> Self {
        self.side_effecting = true;
        self
    }

    pub fn continue_on_error(mut self) -> Self {
        self.continue_on_error = true;
        self
    }

    pub fn executor(&self) -> Arc<dyn NodeExecutor> {
        Arc::clone(&self.executor)
    }

    pub fn default_config(&self) -> HashMap<String, Value> {
        self.schema.defaults()
    }
}

/// Accumulates definitions during startup, then seals into a registry.
#[derive(Default)]
pub struct RegistryBuilder {
    definitions: HashMap<String, Arc<NodeDefinition>>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, definition: NodeDefinition) {
        tracing::info!("registering node type: {}", definition.node_type);
        self.definitions
            .insert(definition.node_type.clone(), Arc::new(definition));
    }

    pub fn build(self) -> NodeRegistry {
        NodeRegistry {
            definitions: self.definitions,
        }
    }
}

/// Immutable catalog of node-type definitions.
///
/// Populated once at process start through `RegistryBuilder`; no runtime
/// registration.
pub struct NodeRegistry {
    definitions: HashMap<String, Arc<NodeDefinition>>,
}

impl NodeRegistry {
    pub fn get(&self, node_type: &str) -> Option<&Arc<NodeDefinition>> {
        self.definitions.get(node_type)
    }

    /// All definitions, sorted by node type for stable listings.
    pub fn list(&self) -> Vec<&Arc<NodeDefinition>> {
        let mut defs: Vec<_> = self.definitions.values().collect();
        defs.sort_by(|a, b| a.node_type.cmp(&b.node_type));
        defs
    }

    pub fn list_by_category(&self, category: NodeCategory) -> Vec<&Arc<NodeDefinition>> {
        self.list()
            .into_iter()
            .filter(|d| d.category == category)
            .collect()
    }

    pub fn categories(&self) -> BTreeSet<&'static str> {
        self.definitions
            .values()
            .map(|d| d.category.as_str())
            .collect()
    }

    /// A fresh node of the given type with the definition's label and
    /// default config.
    pub fn create_default(&self, node_type: &str) -> Option<Node> {
        let definition = self.get(node_type)?;
        let mut node = Node::new(definition.node_type.as_str())
            .with_label(definition.label.as_str());
        node.config = definition.default_config();
        Some(node)
    }

    /// Validate a config map against the type's schema, returning the
    /// normalized config or one error per offending field.
    ///
    /// An unknown type yields a single top-level error naming it.
    pub fn validate_config(
        &self,
        node_type: &str,
        config: &HashMap<String, Value>,
    ) -> Result<HashMap<String, Value>, Vec<FieldError>> {
        match self.get(node_type) {
            Some(definition) => definition.schema.validate(config),
            None => Err(vec![FieldError::top_level(format!(
                "unknown node type: {}",
                node_type
            ))]),
        }
    }
}
