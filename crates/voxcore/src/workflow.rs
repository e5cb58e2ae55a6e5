use crate::Value;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

pub type WorkflowId = Uuid;
pub type NodeId = Uuid;
pub type EdgeId = Uuid;

/// Complete workflow definition: the graph a user authored.
///
/// Immutable for the duration of a run; the compiler snapshots it into an
/// execution plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub id: WorkflowId,
    pub name: String,
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

impl Workflow {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            nodes: Vec::new(),
            edges: Vec::new(),
        }
    }

    pub fn add_node(&mut self, node: Node) -> NodeId {
        let id = node.id;
        self.nodes.push(node);
        id
    }

    /// Connect two nodes with an untagged edge.
    pub fn connect(&mut self, source: NodeId, target: NodeId) -> EdgeId {
        self.connect_handle(source, None, target)
    }

    /// Connect two nodes through a named source handle (branch output).
    pub fn connect_handle(
        &mut self,
        source: NodeId,
        source_handle: Option<&str>,
        target: NodeId,
    ) -> EdgeId {
        let edge = Edge {
            id: Uuid::new_v4(),
            source,
            target,
            source_handle: source_handle.map(str::to_string),
        };
        let id = edge.id;
        self.edges.push(edge);
        id
    }

    pub fn find_node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }
}

/// A single typed step in a workflow graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub node_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default)]
    pub config: HashMap<String, Value>,
    /// Canvas placement. Carried for round-tripping documents; the engine
    /// never reads it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
}

impl Node {
    pub fn new(node_type: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            node_type: node_type.into(),
            label: None,
            config: HashMap::new(),
            position: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_config(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }

    pub fn with_position(mut self, x: f32, y: f32) -> Self {
        self.position = Some(Position { x, y });
        self
    }
}

/// Directed dependency between two nodes.
///
/// `source_handle` distinguishes multiple outgoing branches of a
/// conditional node, e.g. "true"/"false".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub id: EdgeId,
    pub source: NodeId,
    pub target: NodeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_handle: Option<String>,
}

/// Node position in the visual editor.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}
