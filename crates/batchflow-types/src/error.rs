//! Error taxonomy for the orchestration engine.
//!
//! Every error carries an [`ErrorKind`] discriminator. Task and workflow
//! errors additionally record the entity they belong to, an optional error
//! code, an optional cause, and the moment they were raised.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Discriminator shared by all engine errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    ValidationFailed,
    NotDependenciesCompleted,
    NotTasksCompleted,
    DependencyExecutionFailed,
    ExecutionFailed,
    TaskFailed,
    WorkflowFailed,
    Timeout,
    Retry,
    CircularDependency,
    InvalidInitialState,
    InvalidTaskPayload,
    ActionExists,
    ActionNotFound,
    /// A handler chain ran out of stages.
    NoHandler,
    NotSupported,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::ValidationFailed => "ValidationFailed",
            ErrorKind::NotDependenciesCompleted => "NotDependenciesCompleted",
            ErrorKind::NotTasksCompleted => "NotTasksCompleted",
            ErrorKind::DependencyExecutionFailed => "DependencyExecutionFailed",
            ErrorKind::ExecutionFailed => "ExecutionFailed",
            ErrorKind::TaskFailed => "TaskFailed",
            ErrorKind::WorkflowFailed => "WorkflowFailed",
            ErrorKind::Timeout => "Timeout",
            ErrorKind::Retry => "Retry",
            ErrorKind::CircularDependency => "CircularDependency",
            ErrorKind::InvalidInitialState => "InvalidInitialState",
            ErrorKind::InvalidTaskPayload => "InvalidTaskPayload",
            ErrorKind::ActionExists => "ActionExists",
            ErrorKind::ActionNotFound => "ActionNotFound",
            ErrorKind::NoHandler => "NoHandler",
            ErrorKind::NotSupported => "NotSupported",
        };
        f.write_str(name)
    }
}

/// Error raised while validating or executing a task.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("{kind} (task {id}): {message}")]
pub struct TaskError {
    pub kind: ErrorKind,
    pub id: String,
    pub name: String,
    pub message: String,
    #[source]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<Box<EngineError>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl TaskError {
    pub fn new(
        kind: ErrorKind,
        id: impl Into<String>,
        name: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            id: id.into(),
            name: name.into(),
            message: message.into(),
            cause: None,
            code: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_cause(mut self, cause: impl Into<EngineError>) -> Self {
        self.cause = Some(Box::new(cause.into()));
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

/// Error raised while validating or executing a workflow.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("{kind} (workflow {id}): {message}")]
pub struct WorkflowError {
    pub kind: ErrorKind,
    pub id: String,
    pub name: String,
    pub message: String,
    #[source]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<Box<EngineError>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl WorkflowError {
    pub fn new(
        kind: ErrorKind,
        id: impl Into<String>,
        name: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            id: id.into(),
            name: name.into(),
            message: message.into(),
            cause: None,
            code: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_cause(mut self, cause: impl Into<EngineError>) -> Self {
        self.cause = Some(Box::new(cause.into()));
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

/// Any error produced by the engine.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineError {
    #[error(transparent)]
    Task(#[from] TaskError),

    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    #[error("{message} ({timeout_ms}ms)")]
    Timeout { message: String, timeout_ms: u64 },

    #[error("attempt {attempt} of {total_attempts} failed")]
    Retry {
        attempt: u32,
        total_attempts: u32,
        #[source]
        last_error: Box<EngineError>,
    },

    #[error("{kind}: {message}")]
    General {
        kind: ErrorKind,
        message: String,
        #[source]
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cause: Option<Box<EngineError>>,
    },
}

impl EngineError {
    pub fn general(kind: ErrorKind, message: impl Into<String>) -> Self {
        EngineError::General {
            kind,
            message: message.into(),
            cause: None,
        }
    }

    pub fn timeout(timeout_ms: u64) -> Self {
        EngineError::Timeout {
            message: "The operation timed out".to_string(),
            timeout_ms,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Task(e) => e.kind,
            EngineError::Workflow(e) => e.kind,
            EngineError::Timeout { .. } => ErrorKind::Timeout,
            EngineError::Retry { .. } => ErrorKind::Retry,
            EngineError::General { kind, .. } => *kind,
        }
    }

    /// The directly attached cause, if any.
    pub fn cause(&self) -> Option<&EngineError> {
        match self {
            EngineError::Task(e) => e.cause.as_deref(),
            EngineError::Workflow(e) => e.cause.as_deref(),
            EngineError::Timeout { .. } => None,
            EngineError::Retry { last_error, .. } => Some(last_error),
            EngineError::General { cause, .. } => cause.as_deref(),
        }
    }

    /// Walk the cause chain looking for an error of the given kind.
    pub fn has_kind(&self, kind: ErrorKind) -> bool {
        let mut current = Some(self);
        while let Some(err) = current {
            if err.kind() == kind {
                return true;
            }
            current = err.cause();
        }
        false
    }
}
