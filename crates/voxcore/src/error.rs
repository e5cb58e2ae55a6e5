use crate::schema::FieldError;
use crate::workflow::{EdgeId, NodeId, WorkflowId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A single problem found while compiling a workflow into a plan.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompileIssue {
    #[error("duplicate node id: {node_id}")]
    DuplicateNodeId { node_id: NodeId },

    #[error("node {node_id} has unknown type '{node_type}'")]
    UnknownNodeType { node_id: NodeId, node_type: String },

    #[error("node {node_id} has invalid config: {}", format_field_errors(.errors))]
    InvalidNodeConfig {
        node_id: NodeId,
        errors: Vec<FieldError>,
    },

    #[error("edge {edge_id} references missing node {node_id}")]
    DanglingEdge { edge_id: EdgeId, node_id: NodeId },

    #[error("cycle detected involving nodes: {}", format_node_ids(.nodes))]
    CycleDetected { nodes: Vec<NodeId> },
}

fn format_field_errors(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

fn format_node_ids(nodes: &[NodeId]) -> String {
    nodes
        .iter()
        .map(|n| n.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Compilation failure carrying every issue found before analysis stopped.
#[derive(Debug, Clone, Error)]
#[error("workflow failed to compile: {}", format_issues(.issues))]
pub struct CompileError {
    pub issues: Vec<CompileIssue>,
}

impl CompileError {
    pub fn new(issues: Vec<CompileIssue>) -> Self {
        Self { issues }
    }

    pub fn contains_cycle(&self) -> bool {
        self.issues
            .iter()
            .any(|i| matches!(i, CompileIssue::CycleDetected { .. }))
    }
}

fn format_issues(issues: &[CompileIssue]) -> String {
    issues
        .iter()
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Failure of an external service call made by an integration adapter.
#[derive(Debug, Clone, Error)]
#[error("{service}.{operation} failed: {message}")]
pub struct ExternalServiceError {
    pub service: String,
    pub operation: String,
    pub message: String,
    pub retryable: bool,
    pub status_hint: Option<u16>,
}

/// Errors a node executor can return.
#[derive(Debug, Clone, Error)]
pub enum ExecutorError {
    #[error("missing required input: {0}")]
    MissingInput(String),

    #[error("invalid input for '{field}': expected {expected}")]
    InvalidInput { field: String, expected: String },

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Service(#[from] ExternalServiceError),

    #[error("timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },

    #[error("cancelled")]
    Cancelled,

    #[error("execution failed: {0}")]
    Failed(String),
}

/// Why a run ended `Failed`, surfaced on the event bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum FailureReason {
    NodeFailed { node_id: NodeId, message: String },
    Timeout,
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureReason::NodeFailed { node_id, message } => {
                write!(f, "node {} failed: {}", node_id, message)
            }
            FailureReason::Timeout => write!(f, "run exceeded its maximum duration"),
        }
    }
}

/// Errors from `RunManager::start`.
#[derive(Debug, Error)]
pub enum StartError {
    #[error("workflow not found: {0}")]
    WorkflowNotFound(WorkflowId),

    #[error(transparent)]
    Rejected(#[from] CompileError),

    #[error("workflow {0} already has an active run")]
    AlreadyRunning(WorkflowId),

    #[error("too many concurrent runs (limit {limit})")]
    ResourceExhausted { limit: usize },

    #[error("workflow store error: {0}")]
    Store(#[from] StoreError),
}

/// Errors from `RunManager::cancel`.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CancelError {
    #[error("run not found")]
    NotFound,

    #[error("run is already terminal")]
    AlreadyTerminal,
}

/// Errors from `EventBus::subscribe`.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SubscribeError {
    #[error("no event history for run")]
    RunNotFound,

    #[error("event history expired")]
    HistoryExpired,
}

/// Errors from the workflow store collaborator.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("not found")]
    NotFound,

    #[error("storage failure: {0}")]
    Backend(String),
}

/// Errors from the secret provider collaborator.
#[derive(Debug, Clone, Error)]
pub enum SecretError {
    #[error("no credentials configured for service '{0}'")]
    MissingConfiguration(String),
}
