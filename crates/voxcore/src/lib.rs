//! Core abstractions for the voxflow engine
//!
//! This crate provides the data model, executor contract, event bus, and
//! collaborator traits that the runtime and node crates depend on.

mod error;
pub mod events;
mod node;
mod run;
pub mod schema;
mod traits;
mod value;
mod workflow;

pub use error::{
    CancelError, CompileError, CompileIssue, ExecutorError, ExternalServiceError, FailureReason,
    SecretError, StartError, StoreError, SubscribeError,
};
pub use events::{EventBus, EventEnvelope, EventStream, RunEvent, RunPublisher};
pub use node::{ExecutionContext, InputContext, InputEntry, NodeExecutor, NodeResult};
pub use run::{NodeState, NodeStatus, Run, RunId, RunStatus};
pub use schema::{ConfigSchema, FieldError, FieldKind, FieldSpec, PathSegment};
pub use traits::{Credentials, IntegrationAdapter, SecretProvider, WorkflowStore};
pub use value::Value;
pub use workflow::{Edge, EdgeId, Node, NodeId, Position, Workflow, WorkflowId};
