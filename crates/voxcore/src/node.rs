use crate::error::ExecutorError;
use crate::run::RunId;
use crate::workflow::NodeId;
use crate::Value;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;

/// Uniform execution contract every node handler satisfies.
///
/// Handlers receive the ordered outputs of their live predecessors, their
/// validated config, and a cancellation token they must honor by aborting
/// underlying I/O promptly.
#[async_trait]
pub trait NodeExecutor: Send + Sync {
    async fn execute(&self, ctx: ExecutionContext) -> Result<NodeResult, ExecutorError>;
}

/// Output of one predecessor, as seen by a downstream node.
#[derive(Debug, Clone)]
pub struct InputEntry {
    pub source: NodeId,
    pub source_handle: Option<String>,
    pub value: Value,
}

/// Ordered collection of predecessor outputs, keyed by source node id.
///
/// Entries preserve the order in which the incoming edges were declared in
/// the workflow.
#[derive(Debug, Clone, Default)]
pub struct InputContext {
    entries: Vec<InputEntry>,
}

impl InputContext {
    pub fn new(entries: Vec<InputEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[InputEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Output of the first declared live edge, if any.
    pub fn first(&self) -> Option<&Value> {
        self.entries.first().map(|e| &e.value)
    }

    /// Output of a specific predecessor.
    pub fn get(&self, source: &NodeId) -> Option<&Value> {
        self.entries
            .iter()
            .find(|e| &e.source == source)
            .map(|e| &e.value)
    }

    /// Fold all object-shaped inputs into one map, in entry order.
    ///
    /// Later entries win on key collisions. Non-object inputs are skipped.
    pub fn merged(&self) -> HashMap<String, Value> {
        let mut merged = HashMap::new();
        for entry in &self.entries {
            if let Value::Object(map) = &entry.value {
                for (k, v) in map {
                    merged.insert(k.clone(), v.clone());
                }
            }
        }
        merged
    }

    /// Dotted-path lookup across merged inputs, falling back to the first
    /// input for non-object payloads.
    pub fn lookup(&self, path: &str) -> Option<Value> {
        let merged = Value::Object(self.merged());
        merged
            .get_path(path)
            .or_else(|| self.first().and_then(|v| v.get_path(path)))
    }
}

/// Execution context passed to each node handler.
#[derive(Clone)]
pub struct ExecutionContext {
    pub run_id: RunId,
    pub node_id: NodeId,
    pub inputs: InputContext,
    pub config: HashMap<String, Value>,
    pub cancellation: CancellationToken,
}

impl ExecutionContext {
    pub fn new(run_id: RunId, node_id: NodeId) -> Self {
        Self {
            run_id,
            node_id,
            inputs: InputContext::default(),
            config: HashMap::new(),
            cancellation: CancellationToken::new(),
        }
    }

    /// Get config value or return error
    pub fn require_config(&self, name: &str) -> Result<&Value, ExecutorError> {
        self.config
            .get(name)
            .ok_or_else(|| ExecutorError::Configuration(format!("missing config: {}", name)))
    }

    pub fn require_config_str(&self, name: &str) -> Result<&str, ExecutorError> {
        self.require_config(name)?
            .as_str()
            .ok_or_else(|| ExecutorError::InvalidInput {
                field: name.to_string(),
                expected: "string".to_string(),
            })
    }

    /// Get config with default
    pub fn config_or(&self, name: &str, default: Value) -> Value {
        self.config.get(name).cloned().unwrap_or(default)
    }

    pub fn config_str_or<'a>(&'a self, name: &str, default: &'a str) -> &'a str {
        self.config
            .get(name)
            .and_then(|v| v.as_str())
            .unwrap_or(default)
    }
}

/// Result of a successful node execution.
#[derive(Debug, Clone)]
pub struct NodeResult {
    pub output: Value,
    /// Which outgoing source handles are active. `None` activates all of
    /// them; branch nodes return the subset they chose.
    pub active_handles: Option<Vec<String>>,
}

impl NodeResult {
    pub fn output(output: impl Into<Value>) -> Self {
        Self {
            output: output.into(),
            active_handles: None,
        }
    }

    pub fn empty() -> Self {
        Self {
            output: Value::Null,
            active_handles: None,
        }
    }

    pub fn with_active_handles(
        mut self,
        handles: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.active_handles = Some(handles.into_iter().map(Into::into).collect());
        self
    }
}
