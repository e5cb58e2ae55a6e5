use crate::error::FailureReason;
use crate::run::{NodeStatus, RunId};
use crate::workflow::{NodeId, WorkflowId};
use crate::Value;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Events published during a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum RunEvent {
    RunStarted {
        workflow_id: WorkflowId,
    },
    NodeStatusChanged {
        node_id: NodeId,
        status: NodeStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        output: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    RunCompleted,
    RunFailed {
        reason: FailureReason,
    },
    RunCancelled,
}

impl RunEvent {
    pub fn node_status(node_id: NodeId, status: NodeStatus) -> Self {
        RunEvent::NodeStatusChanged {
            node_id,
            status,
            output: None,
            error: None,
        }
    }

    /// Terminal run events end the stream for subscribers.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunEvent::RunCompleted | RunEvent::RunFailed { .. } | RunEvent::RunCancelled
        )
    }
}

/// An event stamped with its run and position in that run's sequence.
///
/// `seq` is monotonically increasing and gap-free within a run; delivery
/// order to every subscriber matches seq order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub run_id: RunId,
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    pub event: RunEvent,
}
