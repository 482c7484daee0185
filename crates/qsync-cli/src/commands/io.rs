//! Import and export handlers

use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use qsync_core::{export_csv, Replica};

use crate::output::Output;

/// Import QSOs from a CSV file, or stdin when the path is `-`
pub fn import(replica: &mut Replica, path: PathBuf, output: &Output) -> Result<()> {
    let text = read_input(&path)?;
    let summary = replica.import_csv(&text);
    output.print_import(&summary);
    Ok(())
}

/// Export every QSO as CSV, oldest first, to a file or stdout
pub fn export(replica: &Replica, path: Option<PathBuf>, output: &Output) -> Result<()> {
    let qsos = replica.records().export_order();
    let csv = export_csv(&qsos);

    match path {
        Some(path) => {
            std::fs::write(&path, csv)
                .with_context(|| format!("Failed to write export file: {:?}", path))?;
            output.success(&format!("Exported {} QSOs to {}", qsos.len(), path.display()));
        }
        None => print!("{}", csv),
    }
    Ok(())
}

fn read_input(path: &Path) -> Result<String> {
    if path.as_os_str() == "-" {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .context("Failed to read CSV from stdin")?;
        return Ok(text);
    }

    std::fs::read_to_string(path).with_context(|| format!("Failed to read CSV file: {:?}", path))
}
