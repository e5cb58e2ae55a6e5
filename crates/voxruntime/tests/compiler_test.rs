use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use uuid::Uuid;
use voxcore::{
    CompileIssue, ConfigSchema, Edge, ExecutionContext, ExecutorError, FieldSpec, Node,
    NodeExecutor, NodeResult, Value, Workflow,
};
use voxruntime::{compile, NodeCategory, NodeDefinition, NodeRegistry, RegistryBuilder};

struct EmitNode;

#[async_trait]
impl NodeExecutor for EmitNode {
    async fn execute(&self, _ctx: ExecutionContext) -> Result<NodeResult, ExecutorError> {
        Ok(NodeResult::output(Value::Null))
    }
}

fn step_definition(node_type: &str) -> NodeDefinition {
    NodeDefinition::new(
        node_type,
        NodeCategory::Speech,
        node_type,
        ConfigSchema::new(),
        Arc::new(EmitNode),
    )
}

fn registry() -> NodeRegistry {
    let mut builder = RegistryBuilder::new();
    builder.register(step_definition("test.step"));
    builder.register(NodeDefinition::new(
        "test.configured",
        NodeCategory::Speech,
        "Configured Step",
        ConfigSchema::new().field(FieldSpec::string("mode").required()),
        Arc::new(EmitNode),
    ));
    builder.build()
}

fn step(workflow: &mut Workflow) -> Uuid {
    workflow.add_node(Node::new("test.step"))
}

#[test]
fn linear_graph_compiles_into_one_wave_per_node() {
    let registry = registry();
    let mut workflow = Workflow::new("linear");
    let a = step(&mut workflow);
    let b = step(&mut workflow);
    let c = step(&mut workflow);
    workflow.connect(a, b);
    workflow.connect(b, c);

    let plan = compile(&workflow, &registry).unwrap();
    assert_eq!(plan.order, vec![a, b, c]);
    assert_eq!(plan.waves, vec![vec![a], vec![b], vec![c]]);
}

#[test]
fn diamond_shares_a_wave_in_declaration_order() {
    let registry = registry();
    let mut workflow = Workflow::new("diamond");
    let a = step(&mut workflow);
    let b = step(&mut workflow);
    let c = step(&mut workflow);
    let d = step(&mut workflow);
    workflow.connect(a, b);
    workflow.connect(a, c);
    workflow.connect(b, d);
    workflow.connect(c, d);

    let plan = compile(&workflow, &registry).unwrap();
    assert_eq!(plan.waves, vec![vec![a], vec![b, c], vec![d]]);
    // Incoming edges keep declaration order for input assembly.
    let preds: Vec<Uuid> = plan.predecessors[&d].iter().map(|e| e.source).collect();
    assert_eq!(preds, vec![b, c]);
}

#[test]
fn cycle_reports_every_member_of_the_cycle_set() {
    let registry = registry();
    let mut workflow = Workflow::new("cyclic");
    let t = step(&mut workflow);
    let a = step(&mut workflow);
    let b = step(&mut workflow);
    let c = step(&mut workflow);
    workflow.connect(t, a);
    workflow.connect(a, b);
    workflow.connect(b, c);
    workflow.connect(c, a);

    let err = compile(&workflow, &registry).unwrap_err();
    let cycle = err
        .issues
        .iter()
        .find_map(|i| match i {
            CompileIssue::CycleDetected { nodes } => Some(nodes.clone()),
            _ => None,
        })
        .expect("cycle issue expected");
    let cycle: HashSet<Uuid> = cycle.into_iter().collect();
    assert_eq!(cycle, HashSet::from([a, b, c]));
}

#[test]
fn dangling_edge_stops_structural_analysis() {
    let registry = registry();
    let mut workflow = Workflow::new("dangling");
    let a = step(&mut workflow);
    let ghost = Uuid::new_v4();
    workflow.edges.push(Edge {
        id: Uuid::new_v4(),
        source: a,
        target: ghost,
        source_handle: None,
    });

    let err = compile(&workflow, &registry).unwrap_err();
    assert_eq!(err.issues.len(), 1);
    match &err.issues[0] {
        CompileIssue::DanglingEdge { node_id, .. } => assert_eq!(*node_id, ghost),
        other => panic!("expected dangling edge, got {:?}", other),
    }
}

#[test]
fn type_and_config_issues_are_collected_together() {
    let registry = registry();
    let mut workflow = Workflow::new("broken");
    workflow.add_node(Node::new("test.unknown"));
    workflow.add_node(Node::new("test.configured"));

    let err = compile(&workflow, &registry).unwrap_err();
    assert_eq!(err.issues.len(), 2, "all issues surfaced in one pass");
    assert!(err
        .issues
        .iter()
        .any(|i| matches!(i, CompileIssue::UnknownNodeType { node_type, .. } if node_type == "test.unknown")));
    assert!(err.issues.iter().any(|i| matches!(
        i,
        CompileIssue::InvalidNodeConfig { errors, .. }
            if errors.len() == 1 && errors[0].path_string() == "mode"
    )));
}

#[test]
fn duplicate_node_ids_are_rejected() {
    let registry = registry();
    let mut workflow = Workflow::new("duplicated");
    let node = Node::new("test.step");
    let twin = node.clone();
    workflow.add_node(node);
    workflow.add_node(twin);

    let err = compile(&workflow, &registry).unwrap_err();
    assert!(err
        .issues
        .iter()
        .any(|i| matches!(i, CompileIssue::DuplicateNodeId { .. })));
}

#[test]
fn unknown_type_validation_yields_single_top_level_error() {
    let registry = registry();
    let errors = registry
        .validate_config("test.unknown", &HashMap::new())
        .unwrap_err();

    assert_eq!(errors.len(), 1);
    assert!(errors[0].path.is_empty());
    assert!(errors[0].message.contains("test.unknown"));
}

#[test]
fn validate_config_is_deterministic() {
    let registry = registry();
    let mut config = HashMap::new();
    config.insert("mode".to_string(), Value::Number(1.0));
    config.insert("stray".to_string(), Value::Null);

    let first = registry.validate_config("test.configured", &config);
    let second = registry.validate_config("test.configured", &config);
    assert_eq!(first.unwrap_err(), second.unwrap_err());
}
