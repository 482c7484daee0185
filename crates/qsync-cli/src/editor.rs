//! Interactive editing support
//!
//! Opens $EDITOR on a QSO rendered as JSON and reads it back, and asks
//! yes/no questions on a terminal.

use std::env;
use std::fs;
use std::io::{self, IsTerminal, Write};
use std::process::Command;

use anyhow::{bail, Context, Result};

use qsync_core::Qso;

/// Let the user edit a QSO in their editor
///
/// The `id` cannot be changed; the returned QSO always keeps the original.
pub fn edit_qso(qso: &Qso) -> Result<Qso> {
    let editor = find_editor()?;

    let mut file = tempfile::Builder::new()
        .prefix("qsync_edit_")
        .suffix(".json")
        .tempfile()
        .context("Failed to create temp file")?;
    let rendered = serde_json::to_string_pretty(qso).context("Failed to render QSO")?;
    file.write_all(rendered.as_bytes())
        .context("Failed to write temp file")?;
    file.flush().context("Failed to write temp file")?;

    let status = Command::new(&editor)
        .arg(file.path())
        .status()
        .with_context(|| format!("Failed to run editor: {}", editor))?;

    if !status.success() {
        bail!(
            "Editor '{}' exited with non-zero status. Check that your editor is configured correctly.",
            editor
        );
    }

    let content = fs::read_to_string(file.path())
        .with_context(|| format!("Failed to read edited file: {:?}", file.path()))?;
    parse_edited(&content, &qso.id)
}

/// Parse the edited JSON, pinning the id
fn parse_edited(content: &str, id: &str) -> Result<Qso> {
    let mut edited: Qso = serde_json::from_str(content).context("Edited QSO is not valid JSON")?;
    edited.id = id.to_string();
    if edited.callsign.trim().is_empty() || edited.dt.trim().is_empty() {
        bail!("A QSO needs both a callsign and a date/time");
    }
    Ok(edited)
}

/// Find the user's preferred editor
fn find_editor() -> Result<String> {
    for var in ["VISUAL", "EDITOR"] {
        if let Ok(editor) = env::var(var) {
            if !editor.trim().is_empty() {
                return Ok(editor);
            }
        }
    }

    for editor in ["nano", "vim", "vi"] {
        if command_exists(editor) {
            return Ok(editor.to_string());
        }
    }

    bail!(
        "No editor found. Set $EDITOR environment variable.\n\
         Example: export EDITOR=nano"
    )
}

/// Check if a command exists in PATH
fn command_exists(cmd: &str) -> bool {
    Command::new("which")
        .arg(cmd)
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Prompt for confirmation
///
/// Returns true if user confirms, false otherwise.
/// In non-interactive mode (no TTY), returns false.
pub fn confirm(prompt: &str) -> Result<bool> {
    if !io::stdin().is_terminal() {
        return Ok(false);
    }

    print!("{} [y/N] ", prompt);
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;

    let input = input.trim().to_lowercase();
    Ok(input == "y" || input == "yes")
}
