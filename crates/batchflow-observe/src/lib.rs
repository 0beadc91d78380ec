//! Observability setup for batchflow binaries.

pub mod tracing_setup;
