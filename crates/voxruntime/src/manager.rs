use crate::compiler::{compile, ExecutionPlan};
use crate::registry::NodeRegistry;
use crate::scheduler::{RetryPolicy, RunOutcome, Scheduler, SchedulerConfig};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;
use voxcore::{
    CancelError, EventBus, EventStream, FailureReason, Run, RunEvent, RunId, RunPublisher,
    RunStatus, StartError, StoreError, SubscribeError, WorkflowId, WorkflowStore,
};

/// Engine-wide configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Concurrent node executions per run.
    pub max_parallel_nodes: usize,
    /// Concurrent runs across the process.
    pub max_concurrent_runs: usize,
    /// Hard budget for a whole run; exceeding it fails the run with a
    /// timeout reason through the cancellation path.
    pub max_run_duration: Duration,
    pub node_timeout: Option<Duration>,
    pub retry: RetryPolicy,
    /// How long a terminal run's event history stays replayable.
    pub event_retention: Duration,
    pub event_buffer: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_parallel_nodes: 6,
            max_concurrent_runs: 32,
            max_run_duration: Duration::from_secs(600),
            node_timeout: Some(Duration::from_secs(60)),
            retry: RetryPolicy::default(),
            event_retention: Duration::from_secs(300),
            event_buffer: 1024,
        }
    }
}

/// Point-in-time copy of a run's state.
pub type RunSnapshot = Run;

#[derive(Debug, Clone, Copy, PartialEq)]
enum CancelReason {
    User,
    Timeout,
}

struct RunEntry {
    workflow_id: WorkflowId,
    run: Arc<Mutex<Run>>,
    cancel: CancellationToken,
    cancel_reason: Arc<Mutex<Option<CancelReason>>>,
}

#[derive(Default)]
struct ManagerState {
    active: HashMap<WorkflowId, RunId>,
    runs: HashMap<RunId, RunEntry>,
}

/// Owns every active run: admission, cancellation, timeout, and the
/// terminal hand-off to the workflow store.
///
/// At most one run per workflow may be active; the exclusive claim is
/// taken at `start` and released on terminal transition.
pub struct RunManager {
    registry: Arc<NodeRegistry>,
    store: Arc<dyn WorkflowStore>,
    bus: Arc<EventBus>,
    config: EngineConfig,
    state: Arc<Mutex<ManagerState>>,
}

impl RunManager {
    pub fn new(
        registry: Arc<NodeRegistry>,
        store: Arc<dyn WorkflowStore>,
        config: EngineConfig,
    ) -> Self {
        Self {
            registry,
            store,
            bus: Arc::new(EventBus::new(config.event_buffer)),
            config,
            state: Arc::new(Mutex::new(ManagerState::default())),
        }
    }

    pub fn registry(&self) -> &Arc<NodeRegistry> {
        &self.registry
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// Start a run for a workflow.
    ///
    /// The workflow is loaded and fully compiled before any run exists;
    /// compile failures reject the request without side effects.
    pub async fn start(&self, workflow_id: WorkflowId) -> Result<RunId, StartError> {
        let workflow = self.store.load(workflow_id).await.map_err(|e| match e {
            StoreError::NotFound => StartError::WorkflowNotFound(workflow_id),
            other => StartError::Store(other),
        })?;
        let plan = compile(&workflow, &self.registry)?;

        let run = Run::new(workflow_id, plan.node_ids());
        let run_id = run.id;
        let run = Arc::new(Mutex::new(run));
        let cancel = CancellationToken::new();
        let cancel_reason = Arc::new(Mutex::new(None));

        {
            let mut state = self.state.lock().expect("manager state lock poisoned");
            if state.active.contains_key(&workflow_id) {
                return Err(StartError::AlreadyRunning(workflow_id));
            }
            if state.runs.len() >= self.config.max_concurrent_runs {
                return Err(StartError::ResourceExhausted {
                    limit: self.config.max_concurrent_runs,
                });
            }
            state.active.insert(workflow_id, run_id);
            state.runs.insert(
                run_id,
                RunEntry {
                    workflow_id,
                    run: Arc::clone(&run),
                    cancel: cancel.clone(),
                    cancel_reason: Arc::clone(&cancel_reason),
                },
            );
        }

        let publisher = self.bus.register_run(run_id);
        tracing::info!(workflow = %workflow_id, run = %run_id, "run started");

        let driver = Driver {
            registry: Arc::clone(&self.registry),
            store: Arc::clone(&self.store),
            bus: Arc::clone(&self.bus),
            state: Arc::clone(&self.state),
            config: self.config.clone(),
        };
        tokio::spawn(driver.drive(plan, run, run_id, publisher, cancel, cancel_reason));

        Ok(run_id)
    }

    /// Request cooperative cancellation of a run.
    pub fn cancel(&self, run_id: RunId) -> Result<(), CancelError> {
        let state = self.state.lock().expect("manager state lock poisoned");
        let entry = state.runs.get(&run_id).ok_or(CancelError::NotFound)?;
        let status = entry.run.lock().expect("run state lock poisoned").status;
        if status.is_terminal() {
            return Err(CancelError::AlreadyTerminal);
        }
        {
            let mut reason = entry
                .cancel_reason
                .lock()
                .expect("cancel reason lock poisoned");
            reason.get_or_insert(CancelReason::User);
        }
        entry.cancel.cancel();
        tracing::info!(run = %run_id, "cancellation requested");
        Ok(())
    }

    /// Snapshot an active run. Terminal runs are discarded after
    /// persistence, so this returns `None` once the hand-off completed.
    pub fn get(&self, run_id: RunId) -> Option<RunSnapshot> {
        let state = self.state.lock().expect("manager state lock poisoned");
        state
            .runs
            .get(&run_id)
            .map(|e| e.run.lock().expect("run state lock poisoned").clone())
    }

    /// Attach to a run's event stream, optionally replaying from a
    /// sequence number.
    pub fn subscribe(
        &self,
        run_id: RunId,
        from_seq: Option<u64>,
    ) -> Result<EventStream, SubscribeError> {
        self.bus.subscribe(run_id, from_seq)
    }
}

/// Per-run driver task state, split from the manager so the spawned future
/// owns its dependencies.
struct Driver {
    registry: Arc<NodeRegistry>,
    store: Arc<dyn WorkflowStore>,
    bus: Arc<EventBus>,
    state: Arc<Mutex<ManagerState>>,
    config: EngineConfig,
}

impl Driver {
    async fn drive(
        self,
        plan: ExecutionPlan,
        run: Arc<Mutex<Run>>,
        run_id: RunId,
        publisher: RunPublisher,
        cancel: CancellationToken,
        cancel_reason: Arc<Mutex<Option<CancelReason>>>,
    ) {
        publisher.publish(RunEvent::RunStarted {
            workflow_id: plan.workflow.id,
        });
        {
            let mut run = run.lock().expect("run state lock poisoned");
            run.status = RunStatus::Running;
            run.started_at = Some(Utc::now());
        }

        // Watchdog: exceeding the run budget takes the same cancellation
        // path as an explicit cancel, surfaced as a timeout failure.
        let watchdog = {
            let cancel = cancel.clone();
            let cancel_reason = Arc::clone(&cancel_reason);
            let budget = self.config.max_run_duration;
            tokio::spawn(async move {
                tokio::select! {
                    _ = tokio::time::sleep(budget) => {
                        cancel_reason
                            .lock()
                            .expect("cancel reason lock poisoned")
                            .get_or_insert(CancelReason::Timeout);
                        cancel.cancel();
                    }
                    _ = cancel.cancelled() => {}
                }
            })
        };

        let scheduler = Scheduler::new(SchedulerConfig {
            max_parallel: self.config.max_parallel_nodes,
            node_timeout: self.config.node_timeout,
            retry: self.config.retry.clone(),
        });
        let outcome = scheduler
            .run(&plan, &self.registry, &run, &publisher, &cancel)
            .await;
        watchdog.abort();

        let (status, final_event) = match outcome {
            RunOutcome::Completed => (RunStatus::Completed, RunEvent::RunCompleted),
            RunOutcome::Failed(reason) => (RunStatus::Failed, RunEvent::RunFailed { reason }),
            RunOutcome::Cancelled => {
                let reason = *cancel_reason.lock().expect("cancel reason lock poisoned");
                match reason {
                    Some(CancelReason::Timeout) => (
                        RunStatus::Failed,
                        RunEvent::RunFailed {
                            reason: FailureReason::Timeout,
                        },
                    ),
                    _ => (RunStatus::Cancelled, RunEvent::RunCancelled),
                }
            }
        };

        let snapshot = {
            let mut run = run.lock().expect("run state lock poisoned");
            run.status = status;
            run.finished_at = Some(Utc::now());
            run.clone()
        };
        publisher.publish(final_event);
        tracing::info!(run = %run_id, status = ?status, "run finished");

        if let Err(err) = self.store.save_run_result(&snapshot).await {
            tracing::error!(run = %run_id, "failed to persist run result: {}", err);
        }

        {
            let mut state = self.state.lock().expect("manager state lock poisoned");
            if let Some(entry) = state.runs.remove(&run_id) {
                if state.active.get(&entry.workflow_id) == Some(&run_id) {
                    state.active.remove(&entry.workflow_id);
                }
            }
        }

        let bus = Arc::clone(&self.bus);
        let retention = self.config.event_retention;
        tokio::spawn(async move {
            tokio::time::sleep(retention).await;
            bus.evict(run_id);
        });
    }
}
