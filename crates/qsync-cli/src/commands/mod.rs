//! Command handlers

pub mod config;
pub mod io;
pub mod qso;
pub mod shell;
pub mod status;
pub mod sync;

use anyhow::{bail, Result};

use qsync_core::{Dispatch, RecordSet};

use crate::output::{short_id, Output};

/// Resolve a full id or unique prefix to a stored id
pub fn resolve_id(records: &RecordSet, id: &str) -> Result<String> {
    let id = id.trim();
    if id.is_empty() {
        bail!("An id is required");
    }
    if records.contains(id) {
        return Ok(id.to_string());
    }

    let matches = records.ids_with_prefix(id);
    match matches.len() {
        0 => bail!("No QSO found matching: {}", id),
        1 => Ok(matches[0].to_string()),
        _ => {
            eprintln!("Multiple QSOs match '{}':", id);
            for candidate in &matches {
                if let Some(qso) = records.get(candidate) {
                    eprintln!("  {} - {} {}", short_id(&qso.id), qso.dt, qso.callsign);
                }
            }
            bail!("Ambiguous ID. Please provide more characters.");
        }
    }
}

/// Report what happened to a local change
///
/// A change neither transport accepted is the only failure.
pub fn report_dispatch(output: &Output, dispatch: Dispatch, done: &str) -> Result<()> {
    match dispatch {
        Dispatch::Applied(outcome) if outcome.changed() => output.success(done),
        Dispatch::Applied(outcome) if outcome.rejected > 0 => {
            output.warn("Duplicate QSO, nothing logged")
        }
        Dispatch::Applied(_) => output.message("Nothing to change"),
        Dispatch::Sent => output.success(done),
        Dispatch::Fallback => output.warn(
            "Exchange file unavailable; update kept in undelivered log. Run `qsync sync` to retry.",
        ),
        Dispatch::Dropped => bail!("Update could not be delivered"),
    }
    Ok(())
}
