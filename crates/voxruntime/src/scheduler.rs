use crate::compiler::ExecutionPlan;
use crate::registry::NodeRegistry;
use chrono::Utc;
use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::time::{sleep, timeout, Duration};
use tokio_util::sync::CancellationToken;
use voxcore::{
    ExecutionContext, ExecutorError, FailureReason, InputContext, InputEntry, NodeId, NodeResult,
    NodeStatus, Run, RunEvent, RunPublisher, Value,
};

/// Retry policy for retryable external-service failures on
/// non-side-effecting nodes.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_millis(250),
            backoff_multiplier: 2.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Concurrent node executions per run.
    pub max_parallel: usize,
    /// Wall-clock budget for a single node execution attempt.
    pub node_timeout: Option<Duration>,
    pub retry: RetryPolicy,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_parallel: 6,
            node_timeout: Some(Duration::from_secs(60)),
            retry: RetryPolicy::default(),
        }
    }
}

/// How a run ended, from the scheduler's point of view.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Completed,
    Failed(FailureReason),
    Cancelled,
}

/// Drives one compiled plan to quiescence.
///
/// Nodes become ready as their predecessors reach terminal states, queue
/// behind the concurrency bound, and execute as spawned tasks. Every
/// status transition is written to the shared run state and published.
pub struct Scheduler {
    config: SchedulerConfig,
}

struct NodeTracker {
    statuses: HashMap<NodeId, NodeStatus>,
    outputs: HashMap<NodeId, Value>,
    /// Branch decisions recorded on success. `None` means every handle
    /// is active.
    active_handles: HashMap<NodeId, Option<Vec<String>>>,
}

impl NodeTracker {
    fn new(plan: &ExecutionPlan) -> Self {
        Self {
            statuses: plan.node_ids().map(|id| (id, NodeStatus::Waiting)).collect(),
            outputs: HashMap::new(),
            active_handles: HashMap::new(),
        }
    }

    fn status(&self, id: &NodeId) -> NodeStatus {
        self.statuses[id]
    }

    /// Is the edge from `source` tagged `handle` active per the source's
    /// branch decision? Untagged edges are always active.
    fn handle_active(&self, source: &NodeId, handle: Option<&str>) -> bool {
        let Some(handle) = handle else {
            return true;
        };
        match self.active_handles.get(source) {
            Some(Some(active)) => active.iter().any(|h| h == handle),
            _ => true,
        }
    }
}

type NodeCompletion = (NodeId, Result<NodeResult, ExecutorError>, Duration);

impl Scheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self { config }
    }

    pub async fn run(
        &self,
        plan: &ExecutionPlan,
        registry: &NodeRegistry,
        run: &Arc<Mutex<Run>>,
        publisher: &RunPublisher,
        cancel: &CancellationToken,
    ) -> RunOutcome {
        let run_id = publisher.run_id();
        let mut tracker = NodeTracker::new(plan);
        let mut ready_queue: VecDeque<NodeId> = VecDeque::new();
        let mut running: FuturesUnordered<tokio::task::JoinHandle<NodeCompletion>> =
            FuturesUnordered::new();
        let mut blocking_failure: Option<FailureReason> = None;

        loop {
            self.settle(plan, registry, run, publisher, &mut tracker, &mut ready_queue);

            while running.len() < self.config.max_parallel {
                let Some(node_id) = ready_queue.pop_front() else {
                    break;
                };
                self.transition(run, publisher, &mut tracker, node_id, NodeStatus::Running, None, None);
                match self.spawn_node(plan, registry, run_id, node_id, &tracker, cancel) {
                    Ok(handle) => running.push(handle),
                    Err(err) => {
                        let message = err.to_string();
                        self.transition(
                            run,
                            publisher,
                            &mut tracker,
                            node_id,
                            NodeStatus::Failed,
                            None,
                            Some(message.clone()),
                        );
                        if blocking_failure.is_none() {
                            blocking_failure =
                                Some(FailureReason::NodeFailed { node_id, message });
                        }
                    }
                }
            }

            if running.is_empty() && ready_queue.is_empty() {
                break;
            }

            tokio::select! {
                _ = cancel.cancelled() => {
                    self.drain_cancelled(run, publisher, &mut tracker, &mut running).await;
                    return RunOutcome::Cancelled;
                }
                Some(joined) = running.next() => {
                    let (node_id, result, elapsed) = match joined {
                        Ok(completion) => completion,
                        Err(join_err) => {
                            tracing::error!(run = %run_id, "node task panicked: {}", join_err);
                            continue;
                        }
                    };
                    match result {
                        Ok(node_result) => {
                            tracing::info!(
                                run = %run_id,
                                node = %node_id,
                                elapsed_ms = elapsed.as_millis() as u64,
                                "node succeeded"
                            );
                            tracker.outputs.insert(node_id, node_result.output.clone());
                            tracker
                                .active_handles
                                .insert(node_id, node_result.active_handles.clone());
                            self.transition(
                                run,
                                publisher,
                                &mut tracker,
                                node_id,
                                NodeStatus::Succeeded,
                                Some(node_result.output),
                                None,
                            );
                        }
                        Err(err) => {
                            let message = err.to_string();
                            tracing::warn!(run = %run_id, node = %node_id, "node failed: {}", message);
                            self.transition(
                                run,
                                publisher,
                                &mut tracker,
                                node_id,
                                NodeStatus::Failed,
                                None,
                                Some(message.clone()),
                            );
                            let tolerated = plan
                                .workflow
                                .find_node(node_id)
                                .and_then(|n| registry.get(&n.node_type))
                                .map(|d| d.continue_on_error)
                                .unwrap_or(false);
                            if !tolerated && blocking_failure.is_none() {
                                blocking_failure =
                                    Some(FailureReason::NodeFailed { node_id, message });
                            }
                        }
                    }
                }
            }
        }

        match blocking_failure {
            Some(reason) => RunOutcome::Failed(reason),
            None => RunOutcome::Completed,
        }
    }

    /// Advance waiting nodes to `Ready` or `Skipped` until nothing changes.
    ///
    /// A node with every predecessor terminal skips when any predecessor
    /// failed without continue-on-error, or when none of its incoming
    /// edges is live; skip therefore propagates transitively.
    fn settle(
        &self,
        plan: &ExecutionPlan,
        registry: &NodeRegistry,
        run: &Arc<Mutex<Run>>,
        publisher: &RunPublisher,
        tracker: &mut NodeTracker,
        ready_queue: &mut VecDeque<NodeId>,
    ) {
        loop {
            let mut changed = false;
            for node in &plan.workflow.nodes {
                if tracker.status(&node.id) != NodeStatus::Waiting {
                    continue;
                }
                let preds = &plan.predecessors[&node.id];
                if preds.is_empty() {
                    tracker.statuses.insert(node.id, NodeStatus::Ready);
                    self.publish_status(run, publisher, node.id, NodeStatus::Ready, None, None);
                    ready_queue.push_back(node.id);
                    changed = true;
                    continue;
                }
                if !preds
                    .iter()
                    .all(|e| tracker.status(&e.source).is_terminal())
                {
                    continue;
                }

                let blocked = preds.iter().any(|e| {
                    tracker.status(&e.source) == NodeStatus::Failed
                        && !plan
                            .workflow
                            .find_node(e.source)
                            .and_then(|n| registry.get(&n.node_type))
                            .map(|d| d.continue_on_error)
                            .unwrap_or(false)
                });
                let any_live = preds.iter().any(|e| {
                    tracker.status(&e.source) == NodeStatus::Succeeded
                        && tracker.handle_active(&e.source, e.source_handle.as_deref())
                });

                if blocked || !any_live {
                    self.transition(
                        run,
                        publisher,
                        tracker,
                        node.id,
                        NodeStatus::Skipped,
                        None,
                        None,
                    );
                } else {
                    tracker.statuses.insert(node.id, NodeStatus::Ready);
                    self.publish_status(run, publisher, node.id, NodeStatus::Ready, None, None);
                    ready_queue.push_back(node.id);
                }
                changed = true;
            }
            if !changed {
                break;
            }
        }
    }

    /// Spawn one node execution with retry, timeout and cancellation.
    fn spawn_node(
        &self,
        plan: &ExecutionPlan,
        registry: &NodeRegistry,
        run_id: voxcore::RunId,
        node_id: NodeId,
        tracker: &NodeTracker,
        cancel: &CancellationToken,
    ) -> Result<tokio::task::JoinHandle<NodeCompletion>, ExecutorError> {
        let node = plan
            .workflow
            .find_node(node_id)
            .ok_or_else(|| ExecutorError::Configuration(format!("node {} not in plan", node_id)))?;
        let definition = registry.get(&node.node_type).ok_or_else(|| {
            ExecutorError::Configuration(format!("unknown node type: {}", node.node_type))
        })?;

        let entries: Vec<InputEntry> = plan.predecessors[&node_id]
            .iter()
            .filter(|e| {
                tracker.status(&e.source) == NodeStatus::Succeeded
                    && tracker.handle_active(&e.source, e.source_handle.as_deref())
            })
            .map(|e| InputEntry {
                source: e.source,
                source_handle: e.source_handle.clone(),
                value: tracker.outputs[&e.source].clone(),
            })
            .collect();

        let ctx = ExecutionContext {
            run_id,
            node_id,
            inputs: InputContext::new(entries),
            config: plan.config[&node_id].clone(),
            cancellation: cancel.child_token(),
        };

        let executor = definition.executor();
        let allow_retry = !definition.side_effecting;
        let retry = self.config.retry.clone();
        let node_timeout = self.config.node_timeout;
        let token = cancel.clone();

        Ok(tokio::spawn(async move {
            let started = Instant::now();
            let work = async {
                let mut attempt = 0u32;
                let mut delay = retry.delay;
                loop {
                    attempt += 1;
                    let exec = executor.execute(ctx.clone());
                    let result = match node_timeout {
                        Some(budget) => match timeout(budget, exec).await {
                            Ok(result) => result,
                            Err(_) => Err(ExecutorError::Timeout {
                                elapsed_ms: budget.as_millis() as u64,
                            }),
                        },
                        None => exec.await,
                    };
                    match result {
                        Err(ExecutorError::Service(ref service_err))
                            if service_err.retryable
                                && allow_retry
                                && attempt < retry.max_attempts =>
                        {
                            tracing::warn!(
                                node = %node_id,
                                attempt,
                                "retryable service failure: {}",
                                service_err
                            );
                            sleep(delay).await;
                            delay = delay.mul_f64(retry.backoff_multiplier);
                        }
                        other => break other,
                    }
                }
            };
            let result = tokio::select! {
                _ = token.cancelled() => Err(ExecutorError::Cancelled),
                result = work => result,
            };
            (node_id, result, started.elapsed())
        }))
    }

    /// Drain in-flight work after cancellation and settle terminal states:
    /// running nodes fail as cancelled, everything else skips.
    async fn drain_cancelled(
        &self,
        run: &Arc<Mutex<Run>>,
        publisher: &RunPublisher,
        tracker: &mut NodeTracker,
        running: &mut FuturesUnordered<tokio::task::JoinHandle<NodeCompletion>>,
    ) {
        while let Some(joined) = running.next().await {
            let Ok((node_id, result, _)) = joined else {
                continue;
            };
            match result {
                Ok(node_result) => {
                    tracker.outputs.insert(node_id, node_result.output.clone());
                    self.transition(
                        run,
                        publisher,
                        tracker,
                        node_id,
                        NodeStatus::Succeeded,
                        Some(node_result.output),
                        None,
                    );
                }
                Err(_) => {
                    self.transition(
                        run,
                        publisher,
                        tracker,
                        node_id,
                        NodeStatus::Failed,
                        None,
                        Some("cancelled".to_string()),
                    );
                }
            }
        }
        let unfinished: Vec<NodeId> = tracker
            .statuses
            .iter()
            .filter(|(_, status)| !status.is_terminal())
            .map(|(id, _)| *id)
            .collect();
        for node_id in unfinished {
            self.transition(run, publisher, tracker, node_id, NodeStatus::Skipped, None, None);
        }
    }

    /// Record a node transition in the tracker and shared run state, then
    /// publish it.
    #[allow(clippy::too_many_arguments)]
    fn transition(
        &self,
        run: &Arc<Mutex<Run>>,
        publisher: &RunPublisher,
        tracker: &mut NodeTracker,
        node_id: NodeId,
        status: NodeStatus,
        output: Option<Value>,
        error: Option<String>,
    ) {
        tracker.statuses.insert(node_id, status);
        self.publish_status(run, publisher, node_id, status, output, error);
    }

    #[allow(clippy::too_many_arguments)]
    fn publish_status(
        &self,
        run: &Arc<Mutex<Run>>,
        publisher: &RunPublisher,
        node_id: NodeId,
        status: NodeStatus,
        output: Option<Value>,
        error: Option<String>,
    ) {
        {
            let mut run = run.lock().expect("run state lock poisoned");
            if let Some(state) = run.node_states.get_mut(&node_id) {
                state.status = status;
                if status == NodeStatus::Running {
                    state.started_at = Some(Utc::now());
                }
                if status.is_terminal() {
                    state.finished_at = Some(Utc::now());
                    state.output = output.clone();
                    state.error = error.clone();
                }
            }
        }
        publisher.publish(RunEvent::NodeStatusChanged {
            node_id,
            status,
            output,
            error,
        });
    }
}
