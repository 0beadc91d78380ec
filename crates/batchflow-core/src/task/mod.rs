//! Tasks: the unit of work inside a workflow.
//!
//! A task is owned by the workflow that lists it and mutated only through its
//! interior-mutable fields (state, progress, last response). Construction
//! validates the payload shape and rejects dependency cycles.

pub mod chain;
pub mod stages;

use std::sync::{Arc, Mutex};

use batchflow_types::error::{ErrorKind, TaskError};
use batchflow_types::event::TaskEvent;
use batchflow_types::response::TaskResponse;
use batchflow_types::state::TaskState;
use batchflow_types::task::{ExecutionState, Metadata, RetryOption, TaskConfig};
use futures_util::future::BoxFuture;
use serde_json::Value;
use uuid::Uuid;

use crate::action::ActionResult;
use crate::dependency::DependencyGraph;
use crate::event::EventChannel;
use crate::sync::lock;
use crate::workflow::Workflow;

/// Default buffer size of a task's event channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 64;

/// Inline action callable, run directly by JIT workflows.
pub type InlineAction =
    Arc<dyn for<'a> Fn(&'a Task, &'a Workflow) -> BoxFuture<'a, ActionResult> + Send + Sync>;

/// What a task runs.
#[derive(Clone)]
pub enum TaskAction {
    /// A callable executed as-is (JIT workflows).
    Inline(InlineAction),
    /// A name resolved through the workflow's action registry (deferred workflows).
    Registered(String),
}

impl std::fmt::Debug for TaskAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskAction::Inline(_) => f.write_str("Inline(..)"),
            TaskAction::Registered(name) => f.debug_tuple("Registered").field(name).finish(),
        }
    }
}

/// A unit of work.
pub struct Task {
    id: String,
    name: String,
    order: u32,
    state: Mutex<TaskState>,
    retry: RetryOption,
    execution: Mutex<ExecutionState>,
    dependencies: Vec<Arc<Workflow>>,
    payload: Option<Value>,
    action: TaskAction,
    response: Mutex<Option<TaskResponse>>,
    metadata: Metadata,
    events: EventChannel<TaskEvent>,
}

impl Task {
    /// Start building a task that runs `action` inline.
    pub fn inline<F>(action: F) -> TaskBuilder
    where
        F: for<'a> Fn(&'a Task, &'a Workflow) -> BoxFuture<'a, ActionResult>
            + Send
            + Sync
            + 'static,
    {
        TaskBuilder::new(TaskAction::Inline(Arc::new(action)))
    }

    /// Start building a task that runs the registered action `name`.
    pub fn registered(name: impl Into<String>) -> TaskBuilder {
        TaskBuilder::new(TaskAction::Registered(name.into()))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Advisory ordering hint. Tasks always run in list order.
    pub fn order(&self) -> u32 {
        self.order
    }

    pub fn state(&self) -> TaskState {
        *lock(&self.state)
    }

    pub fn set_state(&self, state: TaskState) {
        *lock(&self.state) = state;
    }

    pub fn is_completed(&self) -> bool {
        self.state() == TaskState::Completed
    }

    pub fn retry(&self) -> &RetryOption {
        &self.retry
    }

    /// Snapshot of the execution progress.
    pub fn execution(&self) -> ExecutionState {
        lock(&self.execution).clone()
    }

    /// Snapshot of the full task configuration.
    pub fn config(&self) -> TaskConfig {
        TaskConfig {
            retry: self.retry.clone(),
            execution: self.execution(),
        }
    }

    /// Record progress (clamped to 100) and stamp the execution time.
    pub fn progress(&self, percent: u8) {
        lock(&self.execution).record(percent);
        tracing::debug!(task_id = %self.id, percent, "task progress updated");
    }

    pub fn dependencies(&self) -> &[Arc<Workflow>] {
        &self.dependencies
    }

    pub fn payload(&self) -> Option<&Value> {
        self.payload.as_ref()
    }

    pub fn action(&self) -> &TaskAction {
        &self.action
    }

    /// The last response stored by the execution stage.
    pub fn response(&self) -> Option<TaskResponse> {
        lock(&self.response).clone()
    }

    pub fn set_response(&self, response: TaskResponse) {
        *lock(&self.response) = Some(response);
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn events(&self) -> &EventChannel<TaskEvent> {
        &self.events
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("order", &self.order)
            .field("state", &self.state())
            .field("action", &self.action)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// TaskBuilder
// ---------------------------------------------------------------------------

/// Builder for [`Task`]. Validation happens in [`build`](Self::build).
pub struct TaskBuilder {
    id: Option<String>,
    name: Option<String>,
    order: u32,
    state: TaskState,
    retry: RetryOption,
    dependencies: Vec<Arc<Workflow>>,
    payload: Option<Value>,
    action: TaskAction,
    metadata: Metadata,
    event_capacity: usize,
}

impl TaskBuilder {
    fn new(action: TaskAction) -> Self {
        Self {
            id: None,
            name: None,
            order: 0,
            state: TaskState::default(),
            retry: RetryOption::default(),
            dependencies: Vec::new(),
            payload: None,
            action,
            metadata: Metadata::default(),
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn order(mut self, order: u32) -> Self {
        self.order = order;
        self
    }

    /// Initial state, e.g. to resume a task that already completed.
    pub fn state(mut self, state: TaskState) -> Self {
        self.state = state;
        self
    }

    pub fn retry(mut self, retry: RetryOption) -> Self {
        self.retry = retry;
        self
    }

    pub fn depends_on(mut self, workflow: Arc<Workflow>) -> Self {
        self.dependencies.push(workflow);
        self
    }

    pub fn dependencies(mut self, workflows: impl IntoIterator<Item = Arc<Workflow>>) -> Self {
        self.dependencies.extend(workflows);
        self
    }

    pub fn payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Validate and build the task.
    ///
    /// Fails with `InvalidTaskPayload` if the payload is neither an object nor
    /// null, and with `CircularDependency` if a dependency cycle is reachable.
    pub fn build(self) -> Result<Task, TaskError> {
        let id = self.id.unwrap_or_else(|| format!("T_{}", Uuid::now_v7().simple()));
        let name = self.name.unwrap_or_else(|| format!("Task.{id}"));

        let payload = match self.payload {
            None | Some(Value::Null) => None,
            Some(Value::Object(map)) => Some(Value::Object(map)),
            Some(_) => {
                tracing::error!(task_id = %id, "payload for task {name} must be an object");
                return Err(TaskError::new(
                    ErrorKind::InvalidTaskPayload,
                    &id,
                    &name,
                    format!("Payload for task {name} must be an object."),
                ));
            }
        };

        if let Some(node) = DependencyGraph::from_root(&id, &self.dependencies).find_cycle() {
            tracing::error!(task_id = %id, node, "circular dependency detected in task {name}");
            return Err(TaskError::new(
                ErrorKind::CircularDependency,
                &id,
                &name,
                format!("Circular dependency detected in task {name} at {node}"),
            ));
        }

        Ok(Task {
            id,
            name,
            order: self.order,
            state: Mutex::new(self.state),
            retry: self.retry,
            execution: Mutex::new(ExecutionState::default()),
            dependencies: self.dependencies,
            payload,
            action: self.action,
            response: Mutex::new(None),
            metadata: self.metadata,
            events: EventChannel::new(self.event_capacity),
        })
    }
}
