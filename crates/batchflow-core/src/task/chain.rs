//! Ordered handler chain for tasks.
//!
//! A chain is a list of [`TaskStage`]s. Each stage either answers on its own
//! (short-circuit) or hands the task to the rest of the chain through
//! [`TaskNext::run`]. Running past the last stage yields `Success` with a
//! `NoHandler` error attached, so callers must look at `state`, not `error`.

use std::sync::Arc;

use batchflow_types::error::{ErrorKind, TaskError};
use batchflow_types::response::TaskResponse;
use futures_util::future::BoxFuture;

use super::Task;
use super::stages::{
    TaskDependencyCheckStage, TaskDependencyExecutionStage, TaskExecutionStage,
    TaskValidationStage,
};
use crate::workflow::Workflow;
use crate::workflow::invoker::Invoker;

/// One step of the task pipeline.
pub trait TaskStage: Send + Sync {
    /// Short stage name used in logs.
    fn name(&self) -> &'static str;

    fn handle<'a>(
        &'a self,
        task: &'a Task,
        workflow: &'a Workflow,
        next: TaskNext<'a>,
    ) -> BoxFuture<'a, TaskResponse>;
}

/// The remainder of a chain, handed to each stage.
pub struct TaskNext<'a> {
    stages: &'a [Arc<dyn TaskStage>],
}

impl<'a> TaskNext<'a> {
    /// Pass the task to the next stage.
    pub fn run(self, task: &'a Task, workflow: &'a Workflow) -> BoxFuture<'a, TaskResponse> {
        match self.stages.split_first() {
            Some((stage, rest)) => stage.handle(task, workflow, TaskNext { stages: rest }),
            None => Box::pin(async move {
                tracing::debug!(task_id = %task.id(), "task chain exhausted");
                TaskResponse::success_with_error(TaskError::new(
                    ErrorKind::NoHandler,
                    task.id(),
                    task.name(),
                    format!("No handler left for task {}({})", task.name(), task.id()),
                ))
            }),
        }
    }
}

/// An ordered task pipeline.
///
/// Cloning shares the stage list.
#[derive(Clone, Default)]
pub struct TaskChain {
    stages: Arc<Vec<Arc<dyn TaskStage>>>,
}

impl TaskChain {
    /// An empty chain. Handling a task with it yields `Success` + `NoHandler`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a stage.
    pub fn with(self, stage: impl TaskStage + 'static) -> Self {
        let mut stages: Vec<Arc<dyn TaskStage>> = self.stages.iter().cloned().collect();
        stages.push(Arc::new(stage));
        Self {
            stages: Arc::new(stages),
        }
    }

    /// Validation → DependencyExecution → DependencyCheck → Execution.
    pub fn standard(invoker: Invoker) -> Self {
        Self::new()
            .with(TaskValidationStage)
            .with(TaskDependencyExecutionStage::new(invoker))
            .with(TaskDependencyCheckStage)
            .with(TaskExecutionStage)
    }

    /// Run `task` through the whole chain.
    pub fn handle<'a>(
        &'a self,
        task: &'a Task,
        workflow: &'a Workflow,
    ) -> BoxFuture<'a, TaskResponse> {
        TaskNext {
            stages: self.stages.as_slice(),
        }
        .run(task, workflow)
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|stage| stage.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

impl std::fmt::Debug for TaskChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskChain")
            .field("stages", &self.stage_names())
            .finish()
    }
}
