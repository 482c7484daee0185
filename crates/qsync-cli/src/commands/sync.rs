//! Sync command handler

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{info, warn};

use qsync_core::{Config, Dispatch, FileExchange, MergeOutcome, Replica, Transport};

use crate::output::Output;

/// Pull updates into the log
///
/// With `--from`, replays a JSON-lines exchange file into this replica.
/// Otherwise retries undelivered updates and polls the configured exchange.
pub fn sync(
    replica: &mut Replica,
    config: &Config,
    from: Option<PathBuf>,
    output: &Output,
) -> Result<()> {
    if let Some(path) = from {
        let outcome = replay(replica, config, &path)?;
        output.print_outcome(&format!("Replayed {}", path.display()), &outcome);
        return Ok(());
    }

    if !replica.has_transport() {
        output.message(
            "No exchange file configured. Set one with:\n  \
             qsync config set exchange_path /path/to/shared/exchange.jsonl\n\
             or replay a file once with:\n  \
             qsync sync --from /path/to/exchange.jsonl",
        );
        return Ok(());
    }

    let (resent, parked) = retry_undelivered(replica, &config.undelivered_path())?;
    if resent > 0 {
        output.success(&format!("Resent {} undelivered update(s)", resent));
    }
    if parked > 0 {
        output.warn(&format!("{} update(s) still undelivered", parked));
    }

    let outcome = replica.poll();
    output.print_outcome("Sync complete", &outcome);
    Ok(())
}

/// Apply every delivery in an exchange file
fn replay(replica: &mut Replica, config: &Config, path: &Path) -> Result<MergeOutcome> {
    if !path.exists() {
        anyhow::bail!("Exchange file not found: {}", path.display());
    }

    let exchange = FileExchange::new(path, config.max_payload_size);
    let deliveries = exchange
        .read_all()
        .with_context(|| format!("Failed to read exchange file: {:?}", path))?;

    // Serials are per file, so dedup against this file only
    let source = exchange.source();
    let mut outcome = MergeOutcome::default();
    for delivery in deliveries {
        if let Some(applied) = replica.receive_from(&source, delivery) {
            outcome.absorb(applied);
        }
    }
    info!(path = ?path, inserted = outcome.inserted, "Replayed exchange file");
    Ok(outcome)
}

/// Send parked updates again; returns (sent, parked again)
fn retry_undelivered(replica: &mut Replica, path: &Path) -> Result<(usize, usize)> {
    if !path.exists() {
        return Ok((0, 0));
    }

    let parked = FileExchange::new(path, usize::MAX)
        .read_all()
        .with_context(|| format!("Failed to read undelivered log: {:?}", path))?;
    // Failed resends append to the same file, so start it fresh
    std::fs::remove_file(path)
        .with_context(|| format!("Failed to clear undelivered log: {:?}", path))?;

    let mut sent = 0;
    let mut again = 0;
    for delivery in parked {
        match replica.send(delivery.update) {
            Dispatch::Sent | Dispatch::Applied(_) => sent += 1,
            Dispatch::Fallback => again += 1,
            Dispatch::Dropped => {
                warn!("Dropped an undelivered update during retry");
                again += 1;
            }
        }
    }
    Ok((sent, again))
}
