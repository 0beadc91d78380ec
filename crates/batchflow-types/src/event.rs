//! Lifecycle events published by tasks and workflows.

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// The finite set of lifecycle event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Start,
    Progress,
    Failure,
    Complete,
}

/// Event emitted on a task's channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskEvent {
    Start,
    Progress { percent: u8 },
    Failure { error: EngineError },
    Complete,
}

/// Event emitted on a workflow's channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkflowEvent {
    Start,
    Progress { percent: u8 },
    Failure { error: EngineError },
    Complete,
}

impl TaskEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            TaskEvent::Start => EventKind::Start,
            TaskEvent::Progress { .. } => EventKind::Progress,
            TaskEvent::Failure { .. } => EventKind::Failure,
            TaskEvent::Complete => EventKind::Complete,
        }
    }
}

impl WorkflowEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            WorkflowEvent::Start => EventKind::Start,
            WorkflowEvent::Progress { .. } => EventKind::Progress,
            WorkflowEvent::Failure { .. } => EventKind::Failure,
            WorkflowEvent::Complete => EventKind::Complete,
        }
    }
}
