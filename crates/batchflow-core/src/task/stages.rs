//! The standard task stages.

use std::panic::AssertUnwindSafe;

use batchflow_types::error::{EngineError, ErrorKind, TaskError};
use batchflow_types::event::TaskEvent;
use batchflow_types::response::TaskResponse;
use batchflow_types::state::{TaskState, WorkflowState};
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use tracing::{error, info, warn};

use super::chain::{TaskNext, TaskStage};
use super::{Task, TaskAction};
use crate::action::ActionResult;
use crate::retry::RetryExecutor;
use crate::telemetry::{ElapsedGuard, panic_message};
use crate::workflow::Workflow;
use crate::workflow::invoker::{DependencyRun, Invoker};

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Checks identity and that the task's action fits the workflow's mode.
pub struct TaskValidationStage;

impl TaskValidationStage {
    fn validate(task: &Task, workflow: &Workflow) -> Result<(), TaskError> {
        let invalid = |message: String| {
            TaskError::new(ErrorKind::ValidationFailed, task.id(), task.name(), message)
        };

        if task.id().is_empty() || task.name().is_empty() {
            return Err(invalid(format!(
                "Task {}({}) must have a valid ID and Name.",
                task.name(),
                task.id()
            )));
        }

        match (workflow.is_jit(), task.action()) {
            (true, TaskAction::Inline(_)) => Ok(()),
            (true, TaskAction::Registered(name)) => Err(invalid(format!(
                "Task {}: Invalid action provided. JIT workflows run inline actions, got registered action '{name}'.",
                task.name()
            ))),
            (false, TaskAction::Inline(_)) => Err(invalid(format!(
                "Task {}: Invalid plugin provided. Deferred workflows run registered actions.",
                task.name()
            ))),
            (false, TaskAction::Registered(name)) if name.is_empty() => Err(invalid(format!(
                "Task {}: Invalid plugin provided.",
                task.name()
            ))),
            (false, TaskAction::Registered(name)) => match workflow.container() {
                Some(container) => container.get(name).map(|_| ()).map_err(|err| {
                    invalid(format!("Task {}: action '{name}' is not registered.", task.name()))
                        .with_cause(err)
                }),
                None => Err(invalid(format!(
                    "Task {}: workflow {} has no action registry.",
                    task.name(),
                    workflow.id()
                ))),
            },
        }
    }
}

impl TaskStage for TaskValidationStage {
    fn name(&self) -> &'static str {
        "validation"
    }

    fn handle<'a>(
        &'a self,
        task: &'a Task,
        workflow: &'a Workflow,
        next: TaskNext<'a>,
    ) -> BoxFuture<'a, TaskResponse> {
        Box::pin(async move {
            info!(task_id = %task.id(), "Task {}({}) validation has started.", task.name(), task.id());

            if let Err(err) = Self::validate(task, workflow) {
                warn!(task_id = %task.id(), error = %err, "task validation failed");
                return TaskResponse::failure(err);
            }

            info!(task_id = %task.id(), "Task {}({}) has passed validation.", task.name(), task.id());
            next.run(task, workflow).await
        })
    }
}

// ---------------------------------------------------------------------------
// Dependency execution
// ---------------------------------------------------------------------------

/// Drives every unfinished dependency workflow through the invoker.
pub struct TaskDependencyExecutionStage {
    invoker: Invoker,
}

impl TaskDependencyExecutionStage {
    pub fn new(invoker: Invoker) -> Self {
        Self { invoker }
    }
}

impl TaskStage for TaskDependencyExecutionStage {
    fn name(&self) -> &'static str {
        "dependency_execution"
    }

    fn handle<'a>(
        &'a self,
        task: &'a Task,
        workflow: &'a Workflow,
        next: TaskNext<'a>,
    ) -> BoxFuture<'a, TaskResponse> {
        Box::pin(async move {
            info!(task_id = %task.id(), "Task {}({}) has started executing dependencies.", task.name(), task.id());

            match self.invoker.run_dependencies(task.dependencies()).await {
                DependencyRun::Ready => {
                    info!(task_id = %task.id(), "Task {}({}) has executed all dependencies successfully.", task.name(), task.id());
                    next.run(task, workflow).await
                }
                DependencyRun::Pending { .. } => TaskResponse::pending(),
                DependencyRun::Failed { workflow_id, error } => {
                    let mut err = TaskError::new(
                        ErrorKind::DependencyExecutionFailed,
                        task.id(),
                        task.name(),
                        format!(
                            "Task {}({}) dependency execution failed: workflow {workflow_id} did not succeed",
                            task.name(),
                            task.id()
                        ),
                    );
                    if let Some(cause) = error {
                        err = err.with_cause(cause);
                    }
                    error!(task_id = %task.id(), dependency = %workflow_id, "task dependency execution failed");
                    TaskResponse::failure(err)
                }
            }
        })
    }
}

// ---------------------------------------------------------------------------
// Dependency check
// ---------------------------------------------------------------------------

/// Fails if any dependency workflow has not completed.
pub struct TaskDependencyCheckStage;

impl TaskStage for TaskDependencyCheckStage {
    fn name(&self) -> &'static str {
        "dependency_check"
    }

    fn handle<'a>(
        &'a self,
        task: &'a Task,
        workflow: &'a Workflow,
        next: TaskNext<'a>,
    ) -> BoxFuture<'a, TaskResponse> {
        Box::pin(async move {
            let incomplete: Vec<&str> = task
                .dependencies()
                .iter()
                .filter(|dependency| !dependency.is_completed())
                .map(|dependency| dependency.id())
                .collect();

            if !incomplete.is_empty() {
                warn!(task_id = %task.id(), ?incomplete, "task dependencies not completed");
                return TaskResponse::failure(TaskError::new(
                    ErrorKind::NotDependenciesCompleted,
                    task.id(),
                    task.name(),
                    format!(
                        "Task {}({}) has dependencies that are not completed: {}",
                        task.name(),
                        task.id(),
                        incomplete.join(", ")
                    ),
                ));
            }

            next.run(task, workflow).await
        })
    }
}

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

/// Runs the task's action with its retry/timeout settings.
///
/// Terminal stage: never delegates to the rest of the chain.
pub struct TaskExecutionStage;

impl TaskExecutionStage {
    async fn perform(task: &Task, workflow: &Workflow) -> ActionResult {
        let on_retry = |attempt: u32, delay: std::time::Duration, remaining: u32| {
            warn!(
                task_id = %task.id(),
                attempt,
                delay_ms = delay.as_millis() as u64,
                remaining,
                "Task {}({}) attempt {attempt} failed, retrying",
                task.name(),
                task.id()
            );
        };

        match task.action() {
            TaskAction::Inline(action) => {
                RetryExecutor::execute(|| action(task, workflow), task.retry(), on_retry).await
            }
            TaskAction::Registered(name) => {
                let container = workflow.container().ok_or_else(|| {
                    EngineError::general(
                        ErrorKind::ActionNotFound,
                        format!("Workflow {} has no action registry", workflow.id()),
                    )
                })?;
                let action = container.get(name)?;
                let payload = task.payload();
                RetryExecutor::execute(
                    || action.execute(task, workflow, payload),
                    task.retry(),
                    on_retry,
                )
                .await
            }
        }
    }
}

impl TaskStage for TaskExecutionStage {
    fn name(&self) -> &'static str {
        "execution"
    }

    fn handle<'a>(
        &'a self,
        task: &'a Task,
        workflow: &'a Workflow,
        _next: TaskNext<'a>,
    ) -> BoxFuture<'a, TaskResponse> {
        Box::pin(async move {
            let _elapsed = ElapsedGuard::start("Task", task.id(), task.name());
            task.events().publish(TaskEvent::Start);
            info!(task_id = %task.id(), "Task {}({}) has started execution.", task.name(), task.id());
            task.events().publish(TaskEvent::Progress { percent: 0 });

            let result = match AssertUnwindSafe(Self::perform(task, workflow))
                .catch_unwind()
                .await
            {
                Ok(result) => result,
                Err(panic) => Err(EngineError::general(
                    ErrorKind::ExecutionFailed,
                    format!("action panicked: {}", panic_message(&*panic)),
                )),
            };

            match result {
                Ok(response) if response.is_pending() => {
                    task.set_state(TaskState::Waiting);
                    workflow.set_state(WorkflowState::Waiting);
                    info!(task_id = %task.id(), "Task {}({}) is waiting.", task.name(), task.id());
                    response
                }
                Ok(response) => {
                    task.set_state(TaskState::Completed);
                    task.set_response(response.clone());
                    task.events().publish(TaskEvent::Complete);
                    task.events().publish(TaskEvent::Progress { percent: 100 });
                    info!(
                        task_id = %task.id(),
                        state = %response.state,
                        "Task {}({}) has executed successfully.",
                        task.name(),
                        task.id()
                    );
                    response
                }
                Err(cause) => {
                    let err = TaskError::new(
                        ErrorKind::ExecutionFailed,
                        task.id(),
                        task.name(),
                        format!(
                            "Task {}({}) execution has failed: {cause}",
                            task.name(),
                            task.id()
                        ),
                    )
                    .with_cause(cause);
                    task.events().publish(TaskEvent::Failure {
                        error: err.clone().into(),
                    });
                    error!(task_id = %task.id(), error = %err, "task execution failed");

                    let response = TaskResponse::failure(err);
                    task.set_response(response.clone());
                    response
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use batchflow_types::event::EventKind;
    use batchflow_types::state::ResponseState;
    use batchflow_types::task::RetryOption;
    use serde_json::Value;

    use super::*;
    use crate::action::registry::ActionRegistry;
    use crate::task::chain::TaskChain;
    use crate::test_support::{
        PollingAction, collect_events, deferred_workflow, failing_task, jit_workflow, noop_task,
    };

    fn execution_only() -> TaskChain {
        TaskChain::new().with(TaskExecutionStage)
    }

    #[tokio::test]
    async fn success_marks_task_completed_and_emits_events() {
        let task = noop_task().build().unwrap();
        let workflow = jit_workflow("W_1", vec![noop_task().build().unwrap()]);
        let mut rx = task.events().subscribe();

        let response = execution_only().handle(&task, &workflow).await;

        assert!(response.is_success());
        assert_eq!(task.state(), TaskState::Completed);
        assert!(task.response().unwrap().is_success());
        let kinds: Vec<EventKind> = collect_events(&mut rx).iter().map(TaskEvent::kind).collect();
        assert_eq!(
            kinds,
            vec![EventKind::Start, EventKind::Progress, EventKind::Complete, EventKind::Progress]
        );
    }

    #[tokio::test]
    async fn explicit_failure_response_still_completes_task() {
        let task = Task::inline(|task, _| {
            Box::pin(async move {
                ActionResult::Ok(TaskResponse::failure(TaskError::new(
                    ErrorKind::TaskFailed,
                    task.id(),
                    task.name(),
                    "rejected",
                )))
            })
        })
        .build()
        .unwrap();
        let workflow = jit_workflow("W_1", vec![noop_task().build().unwrap()]);

        let response = execution_only().handle(&task, &workflow).await;

        assert!(response.is_failure());
        assert_eq!(task.state(), TaskState::Completed);
    }

    #[tokio::test]
    async fn pending_marks_task_and_workflow_waiting() {
        let task = Task::inline(|_, _| {
            Box::pin(async { ActionResult::Ok(TaskResponse::pending()) })
        })
            .build()
            .unwrap();
        let workflow = jit_workflow("W_1", vec![noop_task().build().unwrap()]);
        let mut rx = task.events().subscribe();

        let response = execution_only().handle(&task, &workflow).await;

        assert!(response.is_pending());
        assert_eq!(task.state(), TaskState::Waiting);
        assert_eq!(workflow.state(), WorkflowState::Waiting);
        assert!(task.response().is_none());
        let kinds: Vec<EventKind> = collect_events(&mut rx).iter().map(TaskEvent::kind).collect();
        assert_eq!(kinds, vec![EventKind::Start, EventKind::Progress]);
    }

    #[tokio::test(start_paused = true)]
    async fn thrown_error_becomes_execution_failed_and_keeps_state() {
        let calls = Arc::new(AtomicU32::new(0));
        let task = failing_task(calls.clone())
            .retry(RetryOption {
                maximum_attempts: 3,
                attempt_delay_ms: 100,
                ..RetryOption::default()
            })
            .build()
            .unwrap();
        let workflow = jit_workflow("W_1", vec![noop_task().build().unwrap()]);
        let mut rx = task.events().subscribe();

        let response = execution_only().handle(&task, &workflow).await;

        assert_eq!(response.state, ResponseState::Failure);
        let err = response.error.unwrap();
        assert_eq!(err.kind(), ErrorKind::ExecutionFailed);
        assert!(err.has_kind(ErrorKind::Retry));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(task.state(), TaskState::InProgress);

        let kinds: Vec<EventKind> = collect_events(&mut rx).iter().map(TaskEvent::kind).collect();
        assert_eq!(kinds, vec![EventKind::Start, EventKind::Progress, EventKind::Failure]);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_action_times_out() {
        let task = Task::inline(|_, _| {
            Box::pin(async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                ActionResult::Ok(TaskResponse::success())
            })
        })
        .retry(RetryOption {
            timeout_ms: Some(50),
            ..RetryOption::default()
        })
        .build()
        .unwrap();
        let workflow = jit_workflow("W_1", vec![noop_task().build().unwrap()]);

        let response = execution_only().handle(&task, &workflow).await;

        assert!(response.is_failure());
        assert!(response.error.unwrap().has_kind(ErrorKind::Timeout));
    }

    #[tokio::test]
    async fn panicking_action_is_contained() {
        async fn explode() -> ActionResult {
            panic!("kaboom")
        }

        let task = Task::inline(|_, _| Box::pin(explode())).build().unwrap();
        let workflow = jit_workflow("W_1", vec![noop_task().build().unwrap()]);

        let response = execution_only().handle(&task, &workflow).await;

        assert!(response.is_failure());
        let err = response.error.unwrap();
        assert_eq!(err.kind(), ErrorKind::ExecutionFailed);
        assert!(err.to_string().contains("kaboom"));
    }

    #[tokio::test]
    async fn registered_action_is_resolved_through_container() {
        let registry = ActionRegistry::new();
        registry.register(PollingAction::new("poll"), &Value::Null).await.unwrap();
        let workflow = deferred_workflow(
            "W_1",
            registry,
            vec![Task::registered("poll").build().unwrap()],
        );
        let task = &workflow.tasks()[0];

        let first = execution_only().handle(task, &workflow).await;
        assert!(first.is_pending());
        assert_eq!(task.execution().progress, 10);

        let second = execution_only().handle(task, &workflow).await;
        assert!(second.is_success());
        assert_eq!(task.state(), TaskState::Completed);
    }

    #[tokio::test]
    async fn validation_rejects_registered_action_in_jit_workflow() {
        let task = Task::registered("poll").build().unwrap();
        let workflow = jit_workflow("W_1", vec![noop_task().build().unwrap()]);
        let calls = Arc::new(AtomicU32::new(0));
        let chain = TaskChain::new()
            .with(TaskValidationStage)
            .with(crate::test_support::CountingStage(calls.clone()));

        let response = chain.handle(&task, &workflow).await;

        assert!(response.is_failure());
        assert_eq!(response.error.unwrap().kind(), ErrorKind::ValidationFailed);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn validation_rejects_unknown_registered_action() {
        let registry = ActionRegistry::new();
        let workflow = deferred_workflow(
            "W_1",
            registry,
            vec![Task::registered("missing").build().unwrap()],
        );
        let task = &workflow.tasks()[0];

        let response = TaskChain::new().with(TaskValidationStage).handle(task, &workflow).await;

        let err = response.error.unwrap();
        assert_eq!(err.kind(), ErrorKind::ValidationFailed);
        assert!(err.has_kind(ErrorKind::ActionNotFound));
    }

    #[tokio::test]
    async fn validation_rejects_inline_action_in_deferred_workflow() {
        let registry = ActionRegistry::new();
        let workflow = deferred_workflow("W_1", registry, vec![noop_task().build().unwrap()]);
        let task = &workflow.tasks()[0];

        let response = TaskChain::new().with(TaskValidationStage).handle(task, &workflow).await;
        assert_eq!(response.error.unwrap().kind(), ErrorKind::ValidationFailed);
    }

    #[tokio::test]
    async fn dependency_check_fails_on_incomplete_dependency() {
        let dependency = Arc::new(jit_workflow("W_DEP", vec![noop_task().build().unwrap()]));
        let task = noop_task().depends_on(dependency).build().unwrap();
        let workflow = jit_workflow("W_1", vec![noop_task().build().unwrap()]);
        let calls = Arc::new(AtomicU32::new(0));
        let chain = TaskChain::new()
            .with(TaskDependencyCheckStage)
            .with(crate::test_support::CountingStage(calls.clone()));

        let response = chain.handle(&task, &workflow).await;

        let err = response.error.unwrap();
        assert_eq!(err.kind(), ErrorKind::NotDependenciesCompleted);
        assert!(err.to_string().contains("W_DEP"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn pending_dependency_short_circuits_before_execution() {
        let waiting = Task::inline(|_, _| {
            Box::pin(async { ActionResult::Ok(TaskResponse::pending()) })
        })
            .build()
            .unwrap();
        let dependency = Arc::new(jit_workflow("W_DEP", vec![waiting]));
        let calls = Arc::new(AtomicU32::new(0));
        let task = crate::test_support::counting_task(calls.clone())
            .depends_on(dependency.clone())
            .build()
            .unwrap();
        let workflow = jit_workflow("W_1", vec![noop_task().build().unwrap()]);

        let response = TaskChain::standard(Invoker::default()).handle(&task, &workflow).await;

        assert!(response.is_pending());
        assert_eq!(dependency.state(), WorkflowState::Waiting);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn completed_dependency_lets_task_run() {
        let dependency = Arc::new(jit_workflow("W_DEP", vec![noop_task().build().unwrap()]));
        let calls = Arc::new(AtomicU32::new(0));
        let task = crate::test_support::counting_task(calls.clone())
            .depends_on(dependency.clone())
            .build()
            .unwrap();
        let workflow = jit_workflow("W_1", vec![noop_task().build().unwrap()]);

        let response = TaskChain::standard(Invoker::default()).handle(&task, &workflow).await;

        assert!(response.is_success());
        assert!(dependency.is_completed());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
