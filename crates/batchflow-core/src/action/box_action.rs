//! BoxAction -- object-safe dynamic dispatch wrapper for Action.
//!
//! 1. `ActionDyn` is an object-safe mirror of `Action` with boxed futures
//! 2. A blanket impl covers every `T: Action`
//! 3. `BoxAction` wraps `Box<dyn ActionDyn>` and delegates

use std::future::Future;
use std::pin::Pin;

use serde_json::Value;

use super::{Action, ActionResult};
use crate::task::Task;
use crate::workflow::Workflow;

/// Object-safe version of [`Action`] with boxed futures.
///
/// `configure` is absent: it runs on the concrete type before boxing.
pub trait ActionDyn: Send + Sync {
    fn name(&self) -> &str;

    fn execute_boxed<'a>(
        &'a self,
        task: &'a Task,
        workflow: &'a Workflow,
        payload: Option<&'a Value>,
    ) -> Pin<Box<dyn Future<Output = ActionResult> + Send + 'a>>;
}

impl<T: Action> ActionDyn for T {
    fn name(&self) -> &str {
        Action::name(self)
    }

    fn execute_boxed<'a>(
        &'a self,
        task: &'a Task,
        workflow: &'a Workflow,
        payload: Option<&'a Value>,
    ) -> Pin<Box<dyn Future<Output = ActionResult> + Send + 'a>> {
        Box::pin(self.execute(task, workflow, payload))
    }
}

/// Type-erased action stored in the registry.
pub struct BoxAction {
    inner: Box<dyn ActionDyn>,
}

impl BoxAction {
    pub fn new<T: Action + 'static>(action: T) -> Self {
        Self {
            inner: Box::new(action),
        }
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }

    pub async fn execute(
        &self,
        task: &Task,
        workflow: &Workflow,
        payload: Option<&Value>,
    ) -> ActionResult {
        self.inner.execute_boxed(task, workflow, payload).await
    }
}

impl std::fmt::Debug for BoxAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoxAction").field("name", &self.name()).finish()
    }
}
