//! Task and workflow orchestration engine for batchflow.
//!
//! Tasks are grouped into workflows, routed through ordered handler chains,
//! and executed either immediately (JIT) or by a heartbeat-driven pool.
//! Actions are supplied inline or resolved by name from an [`ActionRegistry`].
//!
//! Depends only on `batchflow-types` plus async/runtime crates -- never on
//! `batchflow-infra` or any I/O crate.

pub mod action;
pub mod dependency;
pub mod event;
pub mod retry;
pub mod task;
pub mod workflow;

mod sync;
mod telemetry;

#[cfg(test)]
pub(crate) mod test_support;

pub use action::registry::ActionRegistry;
pub use action::{Action, ActionResult};
pub use event::EventChannel;
pub use retry::RetryExecutor;
pub use task::{Task, TaskAction};
pub use workflow::Workflow;
pub use workflow::invoker::Invoker;
pub use workflow::pool::PoolProcessor;
