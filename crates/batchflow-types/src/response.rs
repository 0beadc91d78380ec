//! The uniform result envelope returned by every handler stage.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::EngineError;
use crate::state::ResponseState;

/// Result of running a task, a workflow, or a single handler stage.
///
/// Only [`state`](Self::state) is authoritative: a `Success` may still carry an
/// `error` (chain exhaustion reports `NoHandler` this way).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub state: ResponseState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<EngineError>,
}

pub type TaskResponse = Response;
pub type WorkflowResponse = Response;

impl Response {
    pub fn success() -> Self {
        Self {
            state: ResponseState::Success,
            result: None,
            error: None,
        }
    }

    pub fn pending() -> Self {
        Self {
            state: ResponseState::Pending,
            result: None,
            error: None,
        }
    }

    pub fn failure(error: impl Into<EngineError>) -> Self {
        Self {
            state: ResponseState::Failure,
            result: None,
            error: Some(error.into()),
        }
    }

    /// A `Success` that still reports an error.
    pub fn success_with_error(error: impl Into<EngineError>) -> Self {
        Self {
            state: ResponseState::Success,
            result: None,
            error: Some(error.into()),
        }
    }

    pub fn with_result(mut self, result: Value) -> Self {
        self.result = Some(result);
        self
    }

    pub fn is_success(&self) -> bool {
        self.state == ResponseState::Success
    }

    pub fn is_pending(&self) -> bool {
        self.state == ResponseState::Pending
    }

    pub fn is_failure(&self) -> bool {
        self.state == ResponseState::Failure
    }
}
