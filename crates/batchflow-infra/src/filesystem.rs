//! Data directory resolution.

use std::path::PathBuf;

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "BATCHFLOW_DATA_DIR";

/// Resolve the batchflow data directory.
///
/// Priority: `BATCHFLOW_DATA_DIR`, then `~/.batchflow`, then `./.batchflow`.
pub fn resolve_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
        return PathBuf::from(dir);
    }

    if let Some(home) = dirs::home_dir() {
        return home.join(".batchflow");
    }

    PathBuf::from(".batchflow")
}
