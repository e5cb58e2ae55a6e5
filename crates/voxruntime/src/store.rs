use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use voxcore::{Run, RunId, StoreError, Workflow, WorkflowId, WorkflowStore};

/// In-memory workflow store.
///
/// Backs tests and the CLI; production deployments supply their own
/// `WorkflowStore` implementation.
#[derive(Default)]
pub struct MemoryWorkflowStore {
    workflows: RwLock<HashMap<WorkflowId, Workflow>>,
    saved: RwLock<Vec<Run>>,
}

impl MemoryWorkflowStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, workflow: Workflow) {
        self.workflows.write().await.insert(workflow.id, workflow);
    }

    /// Terminal run snapshots handed over so far, oldest first.
    pub async fn saved_runs(&self) -> Vec<Run> {
        self.saved.read().await.clone()
    }

    pub async fn find_saved(&self, run_id: RunId) -> Option<Run> {
        self.saved
            .read()
            .await
            .iter()
            .find(|r| r.id == run_id)
            .cloned()
    }
}

#[async_trait]
impl WorkflowStore for MemoryWorkflowStore {
    async fn load(&self, id: WorkflowId) -> Result<Workflow, StoreError> {
        self.workflows
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn save_run_result(&self, run: &Run) -> Result<(), StoreError> {
        self.saved.write().await.push(run.clone());
        Ok(())
    }
}
