use crate::registry::NodeRegistry;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use std::collections::{HashMap, HashSet};
use voxcore::{CompileError, CompileIssue, EdgeId, NodeId, Value, Workflow};

/// One edge of the compiled graph, as seen from either endpoint.
#[derive(Debug, Clone)]
pub struct EdgeRef {
    pub edge_id: EdgeId,
    pub source: NodeId,
    pub target: NodeId,
    pub source_handle: Option<String>,
}

/// Compiled, validated, acyclic form of a workflow, ready to run.
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    pub workflow: Workflow,
    /// Node ids in topological order.
    pub order: Vec<NodeId>,
    /// Kahn layering: nodes in the same wave share a dependency depth and
    /// may run concurrently.
    pub waves: Vec<Vec<NodeId>>,
    /// Incoming edges per node, in edge declaration order.
    pub predecessors: HashMap<NodeId, Vec<EdgeRef>>,
    /// Outgoing edges per node, in edge declaration order.
    pub successors: HashMap<NodeId, Vec<EdgeRef>>,
    /// Normalized (defaults applied) config per node.
    pub config: HashMap<NodeId, HashMap<String, Value>>,
}

impl ExecutionPlan {
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.workflow.nodes.iter().map(|n| n.id)
    }
}

/// Compile a workflow into an execution plan.
///
/// Type and config issues are collected across every node and returned
/// together. Dangling edges stop analysis before graph construction;
/// a cycle stops it after Kahn layering and names the entire remaining
/// node set.
pub fn compile(workflow: &Workflow, registry: &NodeRegistry) -> Result<ExecutionPlan, CompileError> {
    let mut issues = Vec::new();

    let mut node_ids = HashSet::new();
    for node in &workflow.nodes {
        if !node_ids.insert(node.id) {
            issues.push(CompileIssue::DuplicateNodeId { node_id: node.id });
        }
    }

    let mut config = HashMap::new();
    for node in &workflow.nodes {
        match registry.get(&node.node_type) {
            None => issues.push(CompileIssue::UnknownNodeType {
                node_id: node.id,
                node_type: node.node_type.clone(),
            }),
            Some(_) => match registry.validate_config(&node.node_type, &node.config) {
                Ok(normalized) => {
                    config.insert(node.id, normalized);
                }
                Err(errors) => issues.push(CompileIssue::InvalidNodeConfig {
                    node_id: node.id,
                    errors,
                }),
            },
        }
    }

    let mut dangling = Vec::new();
    for edge in &workflow.edges {
        for endpoint in [edge.source, edge.target] {
            if !node_ids.contains(&endpoint) {
                dangling.push(CompileIssue::DanglingEdge {
                    edge_id: edge.id,
                    node_id: endpoint,
                });
            }
        }
    }
    if !dangling.is_empty() {
        issues.extend(dangling);
        return Err(CompileError::new(issues));
    }

    let mut graph: DiGraph<NodeId, ()> = DiGraph::new();
    let mut index_of: HashMap<NodeId, NodeIndex> = HashMap::new();
    for node in &workflow.nodes {
        let idx = graph.add_node(node.id);
        index_of.insert(node.id, idx);
    }
    for edge in &workflow.edges {
        graph.add_edge(index_of[&edge.source], index_of[&edge.target], ());
    }

    let (order, waves) = kahn_layering(workflow, &graph, &index_of);
    if order.len() != workflow.nodes.len() {
        let ordered: HashSet<NodeId> = order.into_iter().collect();
        let cycle: Vec<NodeId> = workflow
            .nodes
            .iter()
            .map(|n| n.id)
            .filter(|id| !ordered.contains(id))
            .collect();
        issues.push(CompileIssue::CycleDetected { nodes: cycle });
        return Err(CompileError::new(issues));
    }

    if !issues.is_empty() {
        return Err(CompileError::new(issues));
    }

    let mut predecessors: HashMap<NodeId, Vec<EdgeRef>> = HashMap::new();
    let mut successors: HashMap<NodeId, Vec<EdgeRef>> = HashMap::new();
    for node in &workflow.nodes {
        predecessors.insert(node.id, Vec::new());
        successors.insert(node.id, Vec::new());
    }
    for edge in &workflow.edges {
        let edge_ref = EdgeRef {
            edge_id: edge.id,
            source: edge.source,
            target: edge.target,
            source_handle: edge.source_handle.clone(),
        };
        successors
            .get_mut(&edge.source)
            .expect("endpoint checked above")
            .push(edge_ref.clone());
        predecessors
            .get_mut(&edge.target)
            .expect("endpoint checked above")
            .push(edge_ref);
    }

    tracing::debug!(
        workflow = %workflow.id,
        nodes = workflow.nodes.len(),
        waves = waves.len(),
        "workflow compiled"
    );

    Ok(ExecutionPlan {
        workflow: workflow.clone(),
        order,
        waves,
        predecessors,
        successors,
        config,
    })
}

/// Kahn's algorithm, accumulating zero-in-degree nodes into waves.
///
/// Nodes within a wave keep workflow declaration order. Returns the
/// topological order and the waves; nodes left out of the order are part
/// of a cycle.
fn kahn_layering(
    workflow: &Workflow,
    graph: &DiGraph<NodeId, ()>,
    index_of: &HashMap<NodeId, NodeIndex>,
) -> (Vec<NodeId>, Vec<Vec<NodeId>>) {
    let declaration_pos: HashMap<NodeId, usize> = workflow
        .nodes
        .iter()
        .enumerate()
        .map(|(i, n)| (n.id, i))
        .collect();

    let mut in_degree: HashMap<NodeId, usize> = workflow
        .nodes
        .iter()
        .map(|n| {
            let idx = index_of[&n.id];
            (n.id, graph.edges_directed(idx, Direction::Incoming).count())
        })
        .collect();

    let mut wave: Vec<NodeId> = workflow
        .nodes
        .iter()
        .map(|n| n.id)
        .filter(|id| in_degree[id] == 0)
        .collect();

    let mut order = Vec::new();
    let mut waves = Vec::new();
    while !wave.is_empty() {
        order.extend(wave.iter().copied());
        let mut next = Vec::new();
        for id in &wave {
            for succ_idx in graph.neighbors_directed(index_of[id], Direction::Outgoing) {
                let succ = graph[succ_idx];
                let degree = in_degree
                    .get_mut(&succ)
                    .expect("graph nodes all have a degree entry");
                *degree -= 1;
                if *degree == 0 {
                    next.push(succ);
                }
            }
        }
        next.sort_by_key(|id| declaration_pos[id]);
        waves.push(std::mem::replace(&mut wave, next));
    }
    (order, waves)
}
