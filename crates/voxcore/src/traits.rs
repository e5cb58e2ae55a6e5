use crate::error::{ExternalServiceError, SecretError, StoreError};
use crate::run::Run;
use crate::workflow::{Workflow, WorkflowId};
use crate::Value;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;

/// Storage collaborator the engine loads workflows from and hands terminal
/// run snapshots to.
#[async_trait]
pub trait WorkflowStore: Send + Sync {
    async fn load(&self, id: WorkflowId) -> Result<Workflow, StoreError>;

    async fn save_run_result(&self, run: &Run) -> Result<(), StoreError>;
}

/// Credentials resolved for one external service.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub token: Option<String>,
    pub extra: HashMap<String, String>,
}

impl Credentials {
    pub fn bearer(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
            extra: HashMap::new(),
        }
    }
}

/// Secret/credential collaborator. Consulted only by integration adapters,
/// never by the scheduler.
#[async_trait]
pub trait SecretProvider: Send + Sync {
    async fn resolve(&self, service: &str) -> Result<Credentials, SecretError>;
}

/// Uniform contract for external-service adapters (telephony, AI text
/// generation, text-to-speech, spreadsheet, ERP, scheduling).
///
/// The engine treats every adapter identically; adapters must honor the
/// cancellation token by aborting their underlying I/O promptly.
#[async_trait]
pub trait IntegrationAdapter: Send + Sync {
    fn service(&self) -> &str;

    async fn call(
        &self,
        operation: &str,
        params: Value,
        cancel: &CancellationToken,
    ) -> Result<Value, ExternalServiceError>;
}
