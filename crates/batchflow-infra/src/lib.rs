//! Infrastructure layer for batchflow.
//!
//! Everything that touches the filesystem or the environment lives here:
//! data directory resolution and `config.toml` loading. The engine in
//! `batchflow-core` never depends on this crate.

pub mod config;
pub mod filesystem;
