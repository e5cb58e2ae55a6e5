use async_trait::async_trait;
use std::sync::Arc;
use tokio::time::Duration;
use uuid::Uuid;
use voxcore::{
    CancelError, ConfigSchema, ExecutionContext, ExecutorError, Node, NodeExecutor, NodeResult,
    RunStatus, StartError, SubscribeError, Value, Workflow,
};
use voxruntime::{
    EngineConfig, MemoryWorkflowStore, NodeCategory, NodeDefinition, NodeRegistry,
    RegistryBuilder, RunManager,
};

struct EmitNode;

#[async_trait]
impl NodeExecutor for EmitNode {
    async fn execute(&self, _ctx: ExecutionContext) -> Result<NodeResult, ExecutorError> {
        Ok(NodeResult::output(Value::Null))
    }
}

struct SleepNode(Duration);

#[async_trait]
impl NodeExecutor for SleepNode {
    async fn execute(&self, ctx: ExecutionContext) -> Result<NodeResult, ExecutorError> {
        tokio::select! {
            _ = ctx.cancellation.cancelled() => Err(ExecutorError::Cancelled),
            _ = tokio::time::sleep(self.0) => Ok(NodeResult::output(Value::Null)),
        }
    }
}

fn registry() -> NodeRegistry {
    let mut builder = RegistryBuilder::new();
    builder.register(NodeDefinition::new(
        "test.emit",
        NodeCategory::Speech,
        "Emit",
        ConfigSchema::new(),
        Arc::new(EmitNode),
    ));
    builder.register(NodeDefinition::new(
        "test.sleep",
        NodeCategory::Speech,
        "Sleep",
        ConfigSchema::new(),
        Arc::new(SleepNode(Duration::from_secs(30))),
    ));
    builder.build()
}

fn quick_workflow() -> Workflow {
    let mut workflow = Workflow::new("quick");
    let a = workflow.add_node(Node::new("test.emit"));
    let b = workflow.add_node(Node::new("test.emit"));
    workflow.connect(a, b);
    workflow
}

fn slow_workflow() -> Workflow {
    let mut workflow = Workflow::new("slow");
    workflow.add_node(Node::new("test.sleep"));
    workflow
}

async fn manager_with(
    workflows: Vec<Workflow>,
    config: EngineConfig,
) -> (RunManager, Arc<MemoryWorkflowStore>) {
    let store = Arc::new(MemoryWorkflowStore::new());
    for workflow in workflows {
        store.insert(workflow).await;
    }
    let manager = RunManager::new(Arc::new(registry()), store.clone(), config);
    (manager, store)
}

async fn drain_run(manager: &RunManager, store: &Arc<MemoryWorkflowStore>, run_id: Uuid) {
    let mut stream = manager.subscribe(run_id, None).unwrap();
    while stream.next().await.is_some() {}
    for _ in 0..200 {
        if store.find_saved(run_id).await.is_some() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("run {} never persisted", run_id);
}

#[tokio::test]
async fn concurrent_starts_for_one_workflow_conflict() {
    let workflow = slow_workflow();
    let workflow_id = workflow.id;
    let (manager, store) = manager_with(vec![workflow], EngineConfig::default()).await;

    let (first, second) = tokio::join!(manager.start(workflow_id), manager.start(workflow_id));
    let results = [first, second];

    let ok_count = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(ok_count, 1, "exactly one start may win");
    assert!(results
        .iter()
        .any(|r| matches!(r, Err(StartError::AlreadyRunning(id)) if *id == workflow_id)));

    let run_id = results.iter().find_map(|r| r.as_ref().ok().copied()).unwrap();
    manager.cancel(run_id).unwrap();
    drain_run(&manager, &store, run_id).await;
}

#[tokio::test]
async fn claim_is_released_after_terminal_transition() {
    let workflow = quick_workflow();
    let workflow_id = workflow.id;
    let (manager, store) = manager_with(vec![workflow], EngineConfig::default()).await;

    let first = manager.start(workflow_id).await.unwrap();
    drain_run(&manager, &store, first).await;

    let second = manager.start(workflow_id).await.unwrap();
    assert_ne!(first, second);
    drain_run(&manager, &store, second).await;
}

#[tokio::test]
async fn run_count_limit_is_a_typed_rejection() {
    let first = slow_workflow();
    let second = slow_workflow();
    let first_id = first.id;
    let second_id = second.id;
    let config = EngineConfig {
        max_concurrent_runs: 1,
        ..EngineConfig::default()
    };
    let (manager, store) = manager_with(vec![first, second], config).await;

    let run_id = manager.start(first_id).await.unwrap();
    let rejected = manager.start(second_id).await;
    assert!(matches!(
        rejected,
        Err(StartError::ResourceExhausted { limit: 1 })
    ));

    manager.cancel(run_id).unwrap();
    drain_run(&manager, &store, run_id).await;
}

#[tokio::test]
async fn start_rejects_unknown_workflow() {
    let (manager, _) = manager_with(vec![], EngineConfig::default()).await;
    let missing = Uuid::new_v4();
    assert!(matches!(
        manager.start(missing).await,
        Err(StartError::WorkflowNotFound(id)) if id == missing
    ));
}

#[tokio::test]
async fn compile_rejection_creates_no_run() {
    let mut workflow = Workflow::new("invalid");
    workflow.add_node(Node::new("test.unknown"));
    let workflow_id = workflow.id;
    let (manager, store) = manager_with(vec![workflow], EngineConfig::default()).await;

    let result = manager.start(workflow_id).await;
    assert!(matches!(result, Err(StartError::Rejected(_))));
    assert!(store.saved_runs().await.is_empty(), "no run may exist");
}

#[tokio::test]
async fn get_snapshots_active_runs_and_forgets_terminal_ones() {
    let workflow = slow_workflow();
    let workflow_id = workflow.id;
    let (manager, store) = manager_with(vec![workflow], EngineConfig::default()).await;

    let run_id = manager.start(workflow_id).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let snapshot = manager.get(run_id).expect("active run is visible");
    assert_eq!(snapshot.status, RunStatus::Running);

    manager.cancel(run_id).unwrap();
    drain_run(&manager, &store, run_id).await;

    assert!(
        manager.get(run_id).is_none(),
        "terminal runs are discarded after the persistence hand-off"
    );
}

#[tokio::test]
async fn cancel_reports_not_found_for_unknown_or_discarded_runs() {
    let workflow = quick_workflow();
    let workflow_id = workflow.id;
    let (manager, store) = manager_with(vec![workflow], EngineConfig::default()).await;

    assert_eq!(manager.cancel(Uuid::new_v4()), Err(CancelError::NotFound));

    let run_id = manager.start(workflow_id).await.unwrap();
    drain_run(&manager, &store, run_id).await;
    assert_eq!(manager.cancel(run_id), Err(CancelError::NotFound));
}

#[tokio::test]
async fn terminal_snapshot_is_handed_to_the_store() {
    let workflow = quick_workflow();
    let workflow_id = workflow.id;
    let (manager, store) = manager_with(vec![workflow], EngineConfig::default()).await;

    let run_id = manager.start(workflow_id).await.unwrap();
    drain_run(&manager, &store, run_id).await;

    let saved = store.find_saved(run_id).await.unwrap();
    assert_eq!(saved.workflow_id, workflow_id);
    assert_eq!(saved.status, RunStatus::Completed);
    assert!(saved.finished_at.is_some());
    assert!(saved
        .node_states
        .values()
        .all(|s| s.status == voxcore::NodeStatus::Succeeded));
}

#[tokio::test]
async fn event_history_is_evicted_after_the_retention_window() {
    let workflow = quick_workflow();
    let workflow_id = workflow.id;
    let config = EngineConfig {
        event_retention: Duration::from_millis(50),
        ..EngineConfig::default()
    };
    let (manager, store) = manager_with(vec![workflow], config).await;

    let run_id = manager.start(workflow_id).await.unwrap();
    drain_run(&manager, &store, run_id).await;

    // Replay still works inside the retention window.
    assert!(manager.subscribe(run_id, Some(0)).is_ok());

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(
        manager.subscribe(run_id, Some(0)).unwrap_err(),
        SubscribeError::HistoryExpired
    );
}
