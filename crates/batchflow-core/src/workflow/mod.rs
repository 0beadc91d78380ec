//! Workflows: ordered, dependency-aware groups of tasks.
//!
//! A workflow owns its tasks and both handler chains. It is shared as
//! `Arc<Workflow>` between the caller, dependent tasks/workflows, and the pool,
//! and is driven by at most one caller at a time (see [`Workflow::process`]).

pub mod chain;
pub mod invoker;
pub mod pool;
pub mod stages;

use std::sync::{Arc, Mutex};

use batchflow_types::error::{ErrorKind, WorkflowError};
use batchflow_types::event::WorkflowEvent;
use batchflow_types::response::WorkflowResponse;
use batchflow_types::state::WorkflowState;
use batchflow_types::task::{ExecutionState, Metadata};
use batchflow_types::workflow::WorkflowConfig;
use serde_json::Value;
use uuid::Uuid;

use crate::action::registry::ActionRegistry;
use crate::dependency::DependencyGraph;
use crate::event::EventChannel;
use crate::sync::lock;
use crate::task::chain::TaskChain;
use crate::task::{DEFAULT_EVENT_CAPACITY, Task};

use self::chain::WorkflowChain;
use self::invoker::Invoker;

/// An ordered group of tasks with its own pipelines.
pub struct Workflow {
    id: String,
    name: String,
    state: Mutex<WorkflowState>,
    jit: bool,
    execution: Mutex<ExecutionState>,
    tasks: Vec<Arc<Task>>,
    dependencies: Vec<Arc<Workflow>>,
    task_chain: TaskChain,
    workflow_chain: WorkflowChain,
    container: Option<ActionRegistry>,
    initial_state: Option<Value>,
    metadata: Metadata,
    events: EventChannel<WorkflowEvent>,
    response: Mutex<Option<WorkflowResponse>>,
    run_guard: tokio::sync::Mutex<()>,
}

impl Workflow {
    /// Start building a workflow driven by the given chains.
    pub fn builder(task_chain: TaskChain, workflow_chain: WorkflowChain) -> WorkflowBuilder {
        WorkflowBuilder::new(task_chain, workflow_chain)
    }

    /// Start building a workflow with the standard task and workflow chains.
    pub fn standard_builder(invoker: &Invoker) -> WorkflowBuilder {
        WorkflowBuilder::new(
            TaskChain::standard(invoker.clone()),
            WorkflowChain::standard(invoker.clone()),
        )
    }

    /// Run the workflow chain once and remember its answer.
    ///
    /// Returns Pending without touching anything if another caller is already
    /// processing this workflow.
    pub async fn process(&self) -> WorkflowResponse {
        let Ok(_guard) = self.run_guard.try_lock() else {
            tracing::debug!(workflow_id = %self.id, "workflow is busy, skipping");
            return WorkflowResponse::pending();
        };
        let response = self.workflow_chain.handle(self).await;
        *lock(&self.response) = Some(response.clone());
        response
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> WorkflowState {
        *lock(&self.state)
    }

    pub fn set_state(&self, state: WorkflowState) {
        *lock(&self.state) = state;
    }

    pub fn is_completed(&self) -> bool {
        self.state() == WorkflowState::Completed
    }

    pub fn is_jit(&self) -> bool {
        self.jit
    }

    /// Snapshot of the workflow configuration.
    pub fn config(&self) -> WorkflowConfig {
        WorkflowConfig {
            jit: self.jit,
            execution: self.execution(),
        }
    }

    pub fn execution(&self) -> ExecutionState {
        lock(&self.execution).clone()
    }

    /// Record progress (clamped to 100) and stamp the execution time.
    pub fn progress(&self, percent: u8) {
        lock(&self.execution).record(percent);
        tracing::info!(
            workflow_id = %self.id,
            percent,
            "Workflow {}({}) progress is {percent}%",
            self.name,
            self.id
        );
    }

    pub fn tasks(&self) -> &[Arc<Task>] {
        &self.tasks
    }

    pub fn task(&self, id: &str) -> Option<&Arc<Task>> {
        self.tasks.iter().find(|task| task.id() == id)
    }

    pub fn dependencies(&self) -> &[Arc<Workflow>] {
        &self.dependencies
    }

    pub fn task_chain(&self) -> &TaskChain {
        &self.task_chain
    }

    pub fn workflow_chain(&self) -> &WorkflowChain {
        &self.workflow_chain
    }

    /// The action registry deferred tasks resolve against.
    pub fn container(&self) -> Option<&ActionRegistry> {
        self.container.as_ref()
    }

    pub fn initial_state(&self) -> Option<&Value> {
        self.initial_state.as_ref()
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn events(&self) -> &EventChannel<WorkflowEvent> {
        &self.events
    }

    /// Answer of the last completed [`process`](Self::process) pass.
    ///
    /// For a deferred workflow this is what the latest heartbeat saw.
    pub fn response(&self) -> Option<WorkflowResponse> {
        lock(&self.response).clone()
    }
}

impl std::fmt::Debug for Workflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workflow")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("state", &self.state())
            .field("jit", &self.jit)
            .field("tasks", &self.tasks.len())
            .field("dependencies", &self.dependencies.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// WorkflowBuilder
// ---------------------------------------------------------------------------

/// Builder for [`Workflow`]. Validation happens in [`build`](Self::build).
pub struct WorkflowBuilder {
    id: Option<String>,
    name: Option<String>,
    state: WorkflowState,
    jit: bool,
    tasks: Vec<Arc<Task>>,
    dependencies: Vec<Arc<Workflow>>,
    task_chain: TaskChain,
    workflow_chain: WorkflowChain,
    container: Option<ActionRegistry>,
    initial_state: Option<Value>,
    metadata: Metadata,
    event_capacity: usize,
}

impl WorkflowBuilder {
    fn new(task_chain: TaskChain, workflow_chain: WorkflowChain) -> Self {
        Self {
            id: None,
            name: None,
            state: WorkflowState::default(),
            jit: true,
            tasks: Vec::new(),
            dependencies: Vec::new(),
            task_chain,
            workflow_chain,
            container: None,
            initial_state: None,
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

    /// `false` queues the workflow in the pool instead of running it inline.
    pub fn jit(mut self, jit: bool) -> Self {
        self.jit = jit;
        self
    }

    /// Initial state, e.g. to resume a workflow that already completed.
    pub fn state(mut self, state: WorkflowState) -> Self {
        self.state = state;
        self
    }

    pub fn task(mut self, task: Task) -> Self {
        self.tasks.push(Arc::new(task));
        self
    }

    pub fn tasks(mut self, tasks: impl IntoIterator<Item = Task>) -> Self {
        self.tasks.extend(tasks.into_iter().map(Arc::new));
        self
    }

    pub fn depends_on(mut self, workflow: Arc<Workflow>) -> Self {
        self.dependencies.push(workflow);
        self
    }

    pub fn container(mut self, container: ActionRegistry) -> Self {
        self.container = Some(container);
        self
    }

    pub fn initial_state(mut self, initial_state: Value) -> Self {
        self.initial_state = Some(initial_state);
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

    /// Validate and build the workflow.
    ///
    /// Fails with `InvalidInitialState` for a non-object initial state,
    /// `CircularDependency` for a reachable dependency cycle, and
    /// `ValidationFailed` for an empty task list or a deferred workflow
    /// without an action registry.
    pub fn build(self) -> Result<Workflow, WorkflowError> {
        let id = self.id.unwrap_or_else(|| format!("W_{}", Uuid::now_v7().simple()));
        let name = self.name.unwrap_or_else(|| format!("Workflow.{id}"));
        let fail = |kind: ErrorKind, message: String| {
            tracing::error!(workflow_id = %id, %kind, "{message}");
            WorkflowError::new(kind, &id, &name, message)
        };

        let initial_state = match self.initial_state {
            None | Some(Value::Null) => None,
            Some(Value::Object(map)) => Some(Value::Object(map)),
            Some(_) => {
                return Err(fail(
                    ErrorKind::InvalidInitialState,
                    format!("Initial state for workflow {name} must be an object."),
                ));
            }
        };

        if let Some(node) = DependencyGraph::from_root(&id, &self.dependencies).find_cycle() {
            return Err(fail(
                ErrorKind::CircularDependency,
                format!("Circular dependency detected in workflow {name} at {node}"),
            ));
        }

        if self.tasks.is_empty() {
            return Err(fail(
                ErrorKind::ValidationFailed,
                format!("Workflow {name}({id}) must have at least one task."),
            ));
        }

        if !self.jit && self.container.is_none() {
            return Err(fail(
                ErrorKind::ValidationFailed,
                format!("Workflow {name}({id}) of type deferred must have a valid container."),
            ));
        }

        Ok(Workflow {
            id,
            name,
            state: Mutex::new(self.state),
            jit: self.jit,
            execution: Mutex::new(ExecutionState::default()),
            tasks: self.tasks,
            dependencies: self.dependencies,
            task_chain: self.task_chain,
            workflow_chain: self.workflow_chain,
            container: self.container,
            initial_state,
            metadata: self.metadata,
            events: EventChannel::new(self.event_capacity),
            response: Mutex::new(None),
            run_guard: tokio::sync::Mutex::new(()),
        })
    }
}
