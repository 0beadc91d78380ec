//! Named, externally supplied units of executable behavior.
//!
//! A deferred workflow resolves each task's action by name through its
//! [`ActionRegistry`](registry::ActionRegistry). Actions are written against
//! the RPITIT [`Action`] trait and stored as type-erased
//! [`BoxAction`](box_action::BoxAction)s.

pub mod box_action;
pub mod registry;

use std::future::Future;

use batchflow_types::error::EngineError;
use batchflow_types::response::TaskResponse;
use serde_json::Value;

use crate::task::Task;
use crate::workflow::Workflow;

/// What an action produces.
///
/// `Ok` carries an explicit response (Success, Pending, or Failure). `Err`
/// means the action itself broke; the execution stage retries it and, once
/// attempts run out, reports `ExecutionFailed`.
pub type ActionResult = Result<TaskResponse, EngineError>;

/// Trait for executable actions resolved by name.
///
/// Uses native async fn in traits (RPITIT, Rust 2024 edition). Implementors
/// may simply write `async fn execute(...)`.
pub trait Action: Send + Sync {
    /// Unique registry key.
    fn name(&self) -> &str;

    /// Run the action for `task` inside `workflow`.
    ///
    /// Called on every heartbeat while the task is Waiting, so polling actions
    /// should inspect `task.execution()` to decide whether the work is done.
    fn execute(
        &self,
        task: &Task,
        workflow: &Workflow,
        payload: Option<&Value>,
    ) -> impl Future<Output = ActionResult> + Send;

    /// One-time setup, called exactly once while the action is registered.
    fn configure(
        &mut self,
        config: &Value,
    ) -> impl Future<Output = Result<(), EngineError>> + Send {
        let _ = config;
        async { Ok(()) }
    }
}
