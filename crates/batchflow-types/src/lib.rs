//! Shared domain types for batchflow.
//!
//! This crate contains the data shared between the orchestration engine and
//! its front ends: entity states, the response envelope, lifecycle events,
//! task/workflow options, engine configuration, and the error taxonomy.
//!
//! Zero runtime dependencies -- only serde, chrono, thiserror.

pub mod config;
pub mod error;
pub mod event;
pub mod response;
pub mod state;
pub mod task;
pub mod workflow;
