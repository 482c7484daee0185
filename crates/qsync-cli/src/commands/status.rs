//! Status command handler

use std::path::Path;

use anyhow::Result;

use qsync_core::{Config, FileExchange, Replica};

use crate::output::{Output, OutputFormat};

/// Show status information
pub fn show(replica: &Replica, config: &Config, config_path: &Path, output: &Output) -> Result<()> {
    let undelivered = count_undelivered(config);
    let records = replica.records().len();

    match output.format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "qsos": records,
                    "transport": replica.transport_name(),
                    "exchange_path": config.exchange_path,
                    "snapshot": replica.snapshot_location(),
                    "storage": config.storage.to_string(),
                    "deliveries_applied": replica.delivered_count(),
                    "last_serial": replica.max_serial(),
                    "undelivered": undelivered,
                    "max_payload_size": config.max_payload_size,
                    "config_file": config_path,
                })
            );
        }
        OutputFormat::Quiet => {
            println!("{}", records);
        }
        OutputFormat::Human => {
            println!("QSYNC Status");
            println!("============");
            println!();
            println!("Log:");
            println!("  QSOs: {}", records);
            println!();
            println!("Replication:");
            match &config.exchange_path {
                Some(path) => {
                    println!("  Exchange:    {}", path.display());
                    println!("  Applied:     {} update(s)", replica.delivered_count());
                    if let Some(serial) = replica.max_serial() {
                        println!("  Last serial: {}", serial);
                    }
                    if undelivered > 0 {
                        println!("  Undelivered: {} (run `qsync sync` to retry)", undelivered);
                    }
                }
                None => println!("  Exchange:    (not set, local only)"),
            }
            println!();
            println!("Storage:");
            println!("  Location: {}", config.data_dir.display());
            if let Some(snapshot) = replica.snapshot_location() {
                println!("  Snapshot: {} ({})", snapshot.display(), config.storage);
            }
            println!();
            println!("Config file: {}", config_path.display());
        }
    }

    Ok(())
}

fn count_undelivered(config: &Config) -> usize {
    FileExchange::new(config.undelivered_path(), config.max_payload_size)
        .read_all()
        .map(|parked| parked.len())
        .unwrap_or(0)
}
