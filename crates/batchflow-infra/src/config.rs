//! Engine configuration loader.
//!
//! Reads `config.toml` from the data directory (`~/.batchflow/` by default)
//! and deserializes it into [`EngineConfig`]. Falls back to defaults when the
//! file is missing or malformed.

use std::path::{Path, PathBuf};

use batchflow_types::config::EngineConfig;

/// File name of the engine configuration inside the data directory.
pub const CONFIG_FILE: &str = "config.toml";

/// Load engine configuration from `{data_dir}/config.toml`.
///
/// - Missing file: returns [`EngineConfig::default()`].
/// - Unreadable or unparsable file: logs a warning and returns the default.
/// - Otherwise returns the parsed config; absent fields take their defaults.
pub async fn load_engine_config(data_dir: &Path) -> EngineConfig {
    let config_path = data_dir.join(CONFIG_FILE);

    let content = match tokio::fs::read_to_string(&config_path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config.toml found at {}, using defaults", config_path.display());
            return EngineConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", config_path.display());
            return EngineConfig::default();
        }
    };

    match toml::from_str::<EngineConfig>(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!(
                "Failed to parse {}: {err}, using defaults",
                config_path.display()
            );
            EngineConfig::default()
        }
    }
}

/// Write `config` to `{data_dir}/config.toml`, creating the directory if needed.
///
/// Returns the path written.
pub async fn save_engine_config(
    data_dir: &Path,
    config: &EngineConfig,
) -> std::io::Result<PathBuf> {
    let content = toml::to_string_pretty(config).map_err(std::io::Error::other)?;
    tokio::fs::create_dir_all(data_dir).await?;

    let config_path = data_dir.join(CONFIG_FILE);
    tokio::fs::write(&config_path, content).await?;
    tracing::info!("Wrote engine configuration to {}", config_path.display());
    Ok(config_path)
}
