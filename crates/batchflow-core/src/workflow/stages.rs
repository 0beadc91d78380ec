//! The standard workflow stages.

use std::panic::AssertUnwindSafe;

use batchflow_types::error::{EngineError, ErrorKind, WorkflowError};
use batchflow_types::event::WorkflowEvent;
use batchflow_types::response::WorkflowResponse;
use batchflow_types::state::WorkflowState;
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use tracing::{error, info, warn};

use super::Workflow;
use super::chain::{WorkflowNext, WorkflowStage};
use super::invoker::{DependencyRun, Invoker};
use crate::telemetry::{ElapsedGuard, panic_message};

/// Checks identity and that a deferred workflow carries an action registry.
pub struct WorkflowValidationStage;

impl WorkflowStage for WorkflowValidationStage {
    fn name(&self) -> &'static str {
        "validation"
    }

    fn handle<'a>(
        &'a self,
        workflow: &'a Workflow,
        next: WorkflowNext<'a>,
    ) -> BoxFuture<'a, WorkflowResponse> {
        Box::pin(async move {
            info!(workflow_id = %workflow.id(), "Starting validation for workflow {}({}).", workflow.name(), workflow.id());

            let message = if workflow.id().is_empty() || workflow.name().is_empty() {
                Some(format!(
                    "Workflow {}({}) must have a valid ID and Name.",
                    workflow.name(),
                    workflow.id()
                ))
            } else if !workflow.is_jit() && workflow.container().is_none() {
                Some(format!(
                    "Workflow {}({}) of type deferred must have a valid container.",
                    workflow.name(),
                    workflow.id()
                ))
            } else {
                None
            };

            if let Some(message) = message {
                warn!(workflow_id = %workflow.id(), "{message}");
                return WorkflowResponse::failure(WorkflowError::new(
                    ErrorKind::ValidationFailed,
                    workflow.id(),
                    workflow.name(),
                    message,
                ));
            }

            info!(workflow_id = %workflow.id(), "Workflow {}({}) passed validation successfully.", workflow.name(), workflow.id());
            next.run(workflow).await
        })
    }
}

/// Drives every unfinished dependency workflow through the invoker.
pub struct WorkflowDependencyExecutionStage {
    invoker: Invoker,
}

impl WorkflowDependencyExecutionStage {
    pub fn new(invoker: Invoker) -> Self {
        Self { invoker }
    }
}

impl WorkflowStage for WorkflowDependencyExecutionStage {
    fn name(&self) -> &'static str {
        "dependency_execution"
    }

    fn handle<'a>(
        &'a self,
        workflow: &'a Workflow,
        next: WorkflowNext<'a>,
    ) -> BoxFuture<'a, WorkflowResponse> {
        Box::pin(async move {
            info!(workflow_id = %workflow.id(), "Workflow {}({}) has started executing dependencies.", workflow.name(), workflow.id());

            match self.invoker.run_dependencies(workflow.dependencies()).await {
                DependencyRun::Ready => {
                    info!(workflow_id = %workflow.id(), "Workflow {}({}) has executed all dependencies successfully.", workflow.name(), workflow.id());
                    next.run(workflow).await
                }
                DependencyRun::Pending { .. } => WorkflowResponse::pending(),
                DependencyRun::Failed { workflow_id, error } => {
                    let mut err = WorkflowError::new(
                        ErrorKind::DependencyExecutionFailed,
                        workflow.id(),
                        workflow.name(),
                        format!(
                            "Workflow {}({}) dependencies execution has failed: workflow {workflow_id} did not succeed",
                            workflow.name(),
                            workflow.id()
                        ),
                    );
                    if let Some(cause) = error {
                        err = err.with_cause(cause);
                    }
                    error!(workflow_id = %workflow.id(), dependency = %workflow_id, "workflow dependency execution failed");
                    WorkflowResponse::failure(err)
                }
            }
        })
    }
}

/// Runs the tasks in list order through the workflow's task chain.
pub struct WorkflowExecutionStage;

impl WorkflowExecutionStage {
    fn failed(
        workflow: &Workflow,
        message: String,
        cause: Option<EngineError>,
    ) -> WorkflowResponse {
        let mut err = WorkflowError::new(
            ErrorKind::ExecutionFailed,
            workflow.id(),
            workflow.name(),
            message,
        );
        if let Some(cause) = cause {
            err = err.with_cause(cause);
        }
        workflow.events().publish(WorkflowEvent::Failure {
            error: err.clone().into(),
        });
        error!(workflow_id = %workflow.id(), error = %err, "Workflow {}({}) execution has failed.", workflow.name(), workflow.id());
        WorkflowResponse::failure(err)
    }
}

impl WorkflowStage for WorkflowExecutionStage {
    fn name(&self) -> &'static str {
        "execution"
    }

    fn handle<'a>(
        &'a self,
        workflow: &'a Workflow,
        next: WorkflowNext<'a>,
    ) -> BoxFuture<'a, WorkflowResponse> {
        Box::pin(async move {
            let elapsed = ElapsedGuard::start("Workflow", workflow.id(), workflow.name());
            workflow.events().publish(WorkflowEvent::Start);
            info!(workflow_id = %workflow.id(), "Workflow {}({}) has started execution.", workflow.name(), workflow.id());
            workflow.events().publish(WorkflowEvent::Progress { percent: 0 });

            let total = workflow.tasks().len();
            for (index, task) in workflow.tasks().iter().enumerate() {
                if task.is_completed() {
                    continue;
                }

                info!(
                    workflow_id = %workflow.id(),
                    task_id = %task.id(),
                    "Workflow {}({}) has started execute task {}({}).",
                    workflow.name(),
                    workflow.id(),
                    task.name(),
                    task.id()
                );
                let outcome = AssertUnwindSafe(workflow.task_chain().handle(task, workflow))
                    .catch_unwind()
                    .await;

                let percent = ((index + 1) as f64 / total as f64 * 100.0).round() as u8;
                workflow.progress(percent);
                workflow.events().publish(WorkflowEvent::Progress { percent });

                let response = match outcome {
                    Ok(response) => response,
                    Err(panic) => {
                        return Self::failed(
                            workflow,
                            format!(
                                "Task {}({}) panicked: {}",
                                task.name(),
                                task.id(),
                                panic_message(&*panic)
                            ),
                            None,
                        );
                    }
                };

                info!(
                    workflow_id = %workflow.id(),
                    task_id = %task.id(),
                    state = %response.state,
                    "Workflow {}({}) has executed task {}({}).",
                    workflow.name(),
                    workflow.id(),
                    task.name(),
                    task.id()
                );

                if response.is_pending() {
                    return WorkflowResponse::pending();
                }
                if response.is_failure() {
                    return Self::failed(
                        workflow,
                        "Not all tasks were completed successfully.".to_string(),
                        response.error,
                    );
                }
            }

            workflow.set_state(WorkflowState::Completed);
            workflow.events().publish(WorkflowEvent::Complete);
            info!(workflow_id = %workflow.id(), "Workflow {}({}) has executed all tasks successfully.", workflow.name(), workflow.id());
            drop(elapsed);
            next.run(workflow).await
        })
    }
}

/// Final safety net: every task must have reached Completed.
///
/// Only checks; the Execution stage is what marks the workflow Completed.
pub struct WorkflowEnsureTasksCompletedStage;

impl WorkflowStage for WorkflowEnsureTasksCompletedStage {
    fn name(&self) -> &'static str {
        "ensure_tasks_completed"
    }

    fn handle<'a>(
        &'a self,
        workflow: &'a Workflow,
        next: WorkflowNext<'a>,
    ) -> BoxFuture<'a, WorkflowResponse> {
        Box::pin(async move {
            if let Some(task) = workflow.tasks().iter().find(|task| !task.is_completed()) {
                warn!(workflow_id = %workflow.id(), task_id = %task.id(), "workflow has unfinished tasks");
                return WorkflowResponse::failure(WorkflowError::new(
                    ErrorKind::NotTasksCompleted,
                    workflow.id(),
                    workflow.name(),
                    "One or more tasks are still in progress.",
                ));
            }

            info!(workflow_id = %workflow.id(), "Workflow {}({}) has passed the task completion check.", workflow.name(), workflow.id());
            next.run(workflow).await
        })
    }
}
