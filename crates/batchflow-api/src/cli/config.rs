//! `bflow config`: show (and optionally persist) the effective configuration.

use std::path::Path;

use anyhow::{Context, Result};
use console::style;

use batchflow_infra::config::{CONFIG_FILE, save_engine_config};
use batchflow_types::config::EngineConfig;

/// Print the effective engine configuration.
pub async fn show_config(
    data_dir: &Path,
    config: &EngineConfig,
    write: bool,
    json: bool,
) -> Result<()> {
    let written = if write {
        Some(
            save_engine_config(data_dir, config)
                .await
                .with_context(|| {
                    format!("failed to write {}", data_dir.join(CONFIG_FILE).display())
                })?,
        )
    } else {
        None
    };

    if json {
        let output = serde_json::json!({
            "data_dir": data_dir.display().to_string(),
            "written": written.as_ref().map(|path| path.display().to_string()),
            "config": config,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!();
    println!("  {}", style("── Engine configuration ──").dim());
    println!("  Data dir: {}", style(data_dir.display()).cyan());
    println!();
    for line in toml::to_string_pretty(config)?.lines() {
        println!("  {line}");
    }
    if let Some(path) = written {
        println!();
        println!(
            "  {} Wrote {}",
            style("*").green().bold(),
            style(path.display()).cyan()
        );
    }
    println!();
    Ok(())
}
