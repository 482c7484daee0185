//! Config command handlers

use std::path::Path;

use anyhow::{Context, Result};

use qsync_core::Config;

use crate::output::{print_json, Output, OutputFormat};

/// Show current configuration
pub fn show(config_path: &Path, output: &Output) -> Result<()> {
    let config = Config::load_from_path(config_path).context("Failed to load configuration")?;

    match output.format {
        OutputFormat::Json => print_json(&config),
        OutputFormat::Quiet => {
            println!("{}", config.data_dir.display());
        }
        OutputFormat::Human => {
            println!("Configuration:");
            println!("  data_dir:          {}", config.data_dir.display());
            println!("  exchange_path:     {}", or_unset(config.exchange_path.as_deref()));
            println!("  max_payload_size:  {}", config.max_payload_size);
            println!("  storage:           {}", config.storage);
            println!("  delete_confirm_ms: {}", config.delete_confirm_ms);
            println!(
                "  station_grid:      {}",
                config.station_grid.as_deref().unwrap_or("(not set)")
            );
            println!("  log_file:          {}", or_unset(config.log_file.as_deref()));
            println!("  log_level:         {}", config.log_level);
            println!();
            println!("Config file: {}", config_path.display());
        }
    }

    Ok(())
}

/// Set a configuration value and save it
pub fn set(key: String, value: String, config_path: &Path, output: &Output) -> Result<()> {
    let mut config = Config::load_from_path(config_path).context("Failed to load configuration")?;

    let value = if value == "none" { String::new() } else { value };
    config.set(&key, &value)?;

    config
        .save_to_path(config_path)
        .context("Failed to save configuration")?;

    output.success(&format!("Set {} = {}", key, value));

    Ok(())
}

fn or_unset(path: Option<&Path>) -> String {
    path.map(|p| p.display().to_string())
        .unwrap_or_else(|| "(not set)".to_string())
}
