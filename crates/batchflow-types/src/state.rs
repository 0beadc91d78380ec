//! Lifecycle states for tasks, workflows, and responses.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle state of a task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    #[default]
    InProgress,
    /// The action reported Pending; the task is re-driven on the next pass.
    Waiting,
    Completed,
}

/// Lifecycle state of a workflow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowState {
    #[default]
    InProgress,
    Waiting,
    Completed,
}

/// Outcome carried by a [`Response`](crate::response::Response).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResponseState {
    Pending,
    Failure,
    Success,
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskState::InProgress => write!(f, "in_progress"),
            TaskState::Waiting => write!(f, "waiting"),
            TaskState::Completed => write!(f, "completed"),
        }
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkflowState::InProgress => write!(f, "in_progress"),
            WorkflowState::Waiting => write!(f, "waiting"),
            WorkflowState::Completed => write!(f, "completed"),
        }
    }
}

impl fmt::Display for ResponseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseState::Pending => write!(f, "pending"),
            ResponseState::Failure => write!(f, "failure"),
            ResponseState::Success => write!(f, "success"),
        }
    }
}
