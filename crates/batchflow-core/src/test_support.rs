//! Shared fixtures for unit tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use batchflow_types::error::{EngineError, ErrorKind};
use batchflow_types::response::TaskResponse;
use futures_util::future::BoxFuture;
use serde_json::{Value, json};
use tokio::sync::broadcast;

use crate::action::registry::ActionRegistry;
use crate::action::{Action, ActionResult};
use crate::task::chain::{TaskNext, TaskStage};
use crate::task::{Task, TaskBuilder};
use crate::workflow::Workflow;
use crate::workflow::invoker::Invoker;

/// Inline task that succeeds immediately.
pub fn noop_task() -> TaskBuilder {
    Task::inline(|_, _| Box::pin(async { ActionResult::Ok(TaskResponse::success()) }))
}

/// Inline task that counts its runs and succeeds.
pub fn counting_task(calls: Arc<AtomicU32>) -> TaskBuilder {
    Task::inline(move |_, _| {
        let calls = calls.clone();
        Box::pin(async move {
            calls.fetch_add(1, Ordering::SeqCst);
            ActionResult::Ok(TaskResponse::success())
        })
    })
}

/// Inline task that counts its runs and always returns `Err`.
pub fn failing_task(calls: Arc<AtomicU32>) -> TaskBuilder {
    Task::inline(move |_, _| {
        let calls = calls.clone();
        Box::pin(async move {
            let attempt = calls.fetch_add(1, Ordering::SeqCst) + 1;
            ActionResult::Err(EngineError::general(
                ErrorKind::TaskFailed,
                format!("boom #{attempt}"),
            ))
        })
    })
}

/// JIT workflow with the standard chains.
pub fn jit_workflow(id: &str, tasks: Vec<Task>) -> Workflow {
    Workflow::standard_builder(&Invoker::default())
        .id(id)
        .tasks(tasks)
        .build()
        .unwrap()
}

/// Deferred workflow with the standard chains, resolving actions in `registry`.
pub fn deferred_workflow(id: &str, registry: ActionRegistry, tasks: Vec<Task>) -> Workflow {
    Workflow::standard_builder(&Invoker::default())
        .id(id)
        .jit(false)
        .container(registry)
        .tasks(tasks)
        .build()
        .unwrap()
}

/// Drain everything currently buffered on a receiver.
pub fn collect_events<E: Clone>(rx: &mut broadcast::Receiver<E>) -> Vec<E> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Reports Pending (recording 10% progress) until progress has been recorded
/// once, then Success.
pub struct PollingAction {
    name: String,
}

impl PollingAction {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

impl Action for PollingAction {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(
        &self,
        task: &Task,
        _workflow: &Workflow,
        _payload: Option<&Value>,
    ) -> ActionResult {
        if task.execution().progress >= 10 {
            return Ok(TaskResponse::success().with_result(json!({"polled": true})));
        }
        task.progress(10);
        Ok(TaskResponse::pending())
    }
}

/// Task stage that only counts how often it was reached.
pub struct CountingStage(pub Arc<AtomicU32>);

impl TaskStage for CountingStage {
    fn name(&self) -> &'static str {
        "counting"
    }

    fn handle<'a>(
        &'a self,
        _task: &'a Task,
        _workflow: &'a Workflow,
        _next: TaskNext<'a>,
    ) -> BoxFuture<'a, TaskResponse> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Box::pin(async { TaskResponse::success() })
    }
}
