//! QSO command handlers

use anyhow::{anyhow, bail, Context, Result};
use chrono::Local;
use clap::Args;

use qsync_core::{Config, Qso, Replica};

use super::{report_dispatch, resolve_id};
use crate::editor::{confirm, edit_qso};
use crate::output::{short_id, Output};

/// Fields shared by `add` and `edit`
#[derive(Args, Debug, Default, Clone)]
pub struct QsoFields {
    /// Date/time, e.g. 2024-01-01T12:00 (local) or 2024-01-01T12:00:00Z
    #[arg(long)]
    pub dt: Option<String>,
    /// Band, e.g. 20m
    #[arg(short, long)]
    pub band: Option<String>,
    /// Frequency; plain numbers are MHz, or use a hz/khz/mhz/ghz suffix
    #[arg(short, long)]
    pub freq: Option<String>,
    /// Mode, e.g. SSB, CW, FT8
    #[arg(short, long)]
    pub mode: Option<String>,
    /// Station setup (rig, antenna, power)
    #[arg(long)]
    pub setup: Option<String>,
    /// Own grid square (defaults to station_grid for new QSOs)
    #[arg(long)]
    pub my_grid: Option<String>,
    /// Other station's grid square
    #[arg(long)]
    pub their_grid: Option<String>,
    /// Signal report sent
    #[arg(short = 's', long)]
    pub rst_sent: Option<String>,
    /// Signal report received
    #[arg(short = 'r', long)]
    pub rst_received: Option<String>,
    /// Free-form notes
    #[arg(short, long)]
    pub notes: Option<String>,
}

impl QsoFields {
    fn is_empty(&self) -> bool {
        self.dt.is_none()
            && self.band.is_none()
            && self.freq.is_none()
            && self.mode.is_none()
            && self.setup.is_none()
            && self.my_grid.is_none()
            && self.their_grid.is_none()
            && self.rst_sent.is_none()
            && self.rst_received.is_none()
            && self.notes.is_none()
    }

    /// Overwrite the fields that were given
    fn apply_to(self, qso: &mut Qso) {
        let targets = [
            (self.band, &mut qso.band),
            (self.freq, &mut qso.freq),
            (self.mode, &mut qso.mode),
            (self.setup, &mut qso.setup),
            (self.my_grid, &mut qso.my_grid),
            (self.their_grid, &mut qso.their_grid),
            (self.rst_sent, &mut qso.rst_sent),
            (self.rst_received, &mut qso.rst_received),
            (self.notes, &mut qso.notes),
        ];
        for (value, field) in targets {
            if let Some(value) = value {
                *field = value;
            }
        }
        if let Some(dt) = self.dt {
            qso.ts = Some(qsync_core::parse_dt(&dt).unwrap_or_else(|| qso.sort_key()));
            qso.dt = dt;
        }
    }
}

/// Current local time in the log's date/time layout
fn now_dt() -> String {
    Local::now().format("%Y-%m-%dT%H:%M").to_string()
}

/// Log a new QSO
pub fn add(
    replica: &mut Replica,
    config: &Config,
    callsign: String,
    mut fields: QsoFields,
    output: &Output,
) -> Result<()> {
    if callsign.trim().is_empty() {
        bail!("A callsign is required");
    }

    let dt = fields.dt.take().unwrap_or_else(now_dt);
    let mut qso = Qso::new(&callsign, dt);
    if fields.my_grid.is_none() {
        fields.my_grid = config.station_grid.clone();
    }
    fields.apply_to(&mut qso);

    let id = qso.id.clone();
    let callsign = qso.callsign.clone();
    let dispatch = replica.add(qso);
    report_dispatch(
        output,
        dispatch,
        &format!("Logged QSO with {} ({})", callsign, short_id(&id)),
    )
}

/// Edit a QSO from flags, or in $EDITOR when no flags are given
pub fn edit(
    replica: &mut Replica,
    id: String,
    callsign: Option<String>,
    fields: QsoFields,
    output: &Output,
) -> Result<()> {
    let id = resolve_id(replica.records(), &id)?;
    let current = replica
        .get(&id)
        .cloned()
        .ok_or_else(|| anyhow!("QSO not found: {}", id))?;

    let edited = if callsign.is_none() && fields.is_empty() {
        edit_qso(&current).context("Failed to edit QSO")?
    } else {
        let mut edited = current.clone();
        if let Some(callsign) = callsign {
            edited.callsign = callsign;
        }
        fields.apply_to(&mut edited);
        edited
    };

    if edited == current {
        output.message("No changes.");
        return Ok(());
    }

    let dispatch = replica.edit(edited);
    report_dispatch(output, dispatch, &format!("Updated QSO {}", short_id(&id)))
}

/// Delete a QSO after confirmation
pub fn delete(replica: &mut Replica, id: String, yes: bool, output: &Output) -> Result<()> {
    let id = resolve_id(replica.records(), &id)?;
    let qso = replica
        .get(&id)
        .ok_or_else(|| anyhow!("QSO not found: {}", id))?;

    if !yes && output.should_prompt() {
        println!("Delete QSO: {} - {} {}", short_id(&qso.id), qso.dt, qso.callsign);
        if !confirm("Are you sure?")? {
            println!("Cancelled.");
            return Ok(());
        }
    }

    let dispatch = replica.delete(&id);
    report_dispatch(output, dispatch, &format!("Deleted QSO {}", short_id(&id)))
}

/// List QSOs, newest first
pub fn list(
    replica: &Replica,
    callsign: Option<String>,
    limit: Option<usize>,
    output: &Output,
) -> Result<()> {
    let filter = callsign.map(|c| c.trim().to_uppercase());
    let qsos: Vec<Qso> = replica
        .records()
        .iter()
        .filter(|qso| {
            filter
                .as_deref()
                .map_or(true, |call| qso.callsign.contains(call))
        })
        .take(limit.unwrap_or(usize::MAX))
        .cloned()
        .collect();

    output.print_qsos(&qsos);
    Ok(())
}

/// Show a single QSO
pub fn show(replica: &Replica, id: String, output: &Output) -> Result<()> {
    let id = resolve_id(replica.records(), &id)?;
    let qso = replica
        .get(&id)
        .ok_or_else(|| anyhow!("QSO not found: {}", id))?;

    output.print_qso(qso);
    Ok(())
}
