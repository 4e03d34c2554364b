//! Event types for rollout observability
//!
//! Events provide a single stream of per-host pipeline activity during a run.

use crate::stage::HostStage;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Envelope wrapping all rollout events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RolloutEventEnvelope {
    /// Unique event ID
    pub id: Uuid,

    /// Event timestamp
    pub timestamp: chrono::DateTime<chrono::Utc>,

    /// The actual event
    pub event: RolloutEvent,
}

impl RolloutEventEnvelope {
    pub fn new(event: RolloutEvent) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: chrono::Utc::now(),
            event,
        }
    }
}

/// Rollout events
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RolloutEvent {
    /// Run started with the hosts in execution order
    RunStarted { hosts: Vec<String> },

    /// Batch build started
    BuildStarted { hosts: Vec<String> },

    /// A host reached a stage
    StageReached { host: String, stage: HostStage },

    /// A host is waiting for constraint slots
    WaitingForSlots { host: String, keys: Vec<String> },

    /// A host holds its constraint slots and is now counted as unavailable
    WindowOpened { host: String, keys: Vec<String> },

    /// A host gave its constraint slots back
    WindowClosed { host: String },

    /// A host's pipeline ended
    HostFinished {
        host: String,
        stage: HostStage,
        error: Option<String>,
    },

    /// Run ended
    RunFinished { succeeded: usize, failed: usize },
}

impl RolloutEvent {
    /// The host this event is about, if any
    pub fn host(&self) -> Option<&str> {
        match self {
            RolloutEvent::StageReached { host, .. }
            | RolloutEvent::WaitingForSlots { host, .. }
            | RolloutEvent::WindowOpened { host, .. }
            | RolloutEvent::WindowClosed { host }
            | RolloutEvent::HostFinished { host, .. } => Some(host),
            RolloutEvent::RunStarted { .. }
            | RolloutEvent::BuildStarted { .. }
            | RolloutEvent::RunFinished { .. } => None,
        }
    }
}
