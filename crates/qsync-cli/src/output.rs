//! Output formatting for CLI
//!
//! Provides consistent output formatting across all commands:
//! - Human-readable default output
//! - JSON output (--json flag)
//! - Quiet mode for scripting (--quiet flag)

use chrono::{Local, TimeZone};
use serde::Serialize;

use qsync_core::{display_freq, ImportSummary, MergeOutcome, Qso};

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable output (default)
    Human,
    /// JSON output
    Json,
    /// Quiet mode - minimal output
    Quiet,
}

impl OutputFormat {
    /// Create format from CLI flags
    pub fn from_flags(json: bool, quiet: bool) -> Self {
        if quiet {
            OutputFormat::Quiet
        } else if json {
            OutputFormat::Json
        } else {
            OutputFormat::Human
        }
    }
}

/// Output helper for consistent formatting
pub struct Output {
    /// The output format
    pub format: OutputFormat,
}

impl Output {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Check if output is in quiet mode
    pub fn is_quiet(&self) -> bool {
        matches!(self.format, OutputFormat::Quiet)
    }

    /// Print a single QSO with every field
    pub fn print_qso(&self, qso: &Qso) {
        match self.format {
            OutputFormat::Human => {
                println!("ID:        {}", qso.id);
                println!("Callsign:  {}", qso.callsign);
                println!("Date/time: {}", qso.dt);
                if let Some(ts) = qso.ts {
                    println!("Logged at: {}", format_ts(ts));
                }
                print_field("Band:", &qso.band);
                if !qso.freq.is_empty() {
                    println!("Frequency: {}", display_freq(&qso.freq));
                }
                print_field("Mode:", &qso.mode);
                print_field("Setup:", &qso.setup);
                print_field("My grid:", &qso.my_grid);
                print_field("Their grid:", &qso.their_grid);
                if !qso.rst_sent.is_empty() || !qso.rst_received.is_empty() {
                    println!("RST:       {} / {}", dash(&qso.rst_sent), dash(&qso.rst_received));
                }
                if !qso.notes.is_empty() {
                    println!();
                    println!("{}", qso.notes);
                }
            }
            OutputFormat::Json => print_json(qso),
            OutputFormat::Quiet => println!("{}", qso.id),
        }
    }

    /// Print a list of QSOs, one per line
    pub fn print_qsos(&self, qsos: &[Qso]) {
        match self.format {
            OutputFormat::Human => {
                if qsos.is_empty() {
                    println!("No QSOs logged.");
                    return;
                }
                for qso in qsos {
                    println!("{}", summary_line(qso));
                }
                println!("\n{} QSO(s)", qsos.len());
            }
            OutputFormat::Json => print_json(&qsos),
            OutputFormat::Quiet => {
                for qso in qsos {
                    println!("{}", qso.id);
                }
            }
        }
    }

    /// Print the result of an import
    pub fn print_import(&self, summary: &ImportSummary) {
        match self.format {
            OutputFormat::Human => println!("✓ {}", summary),
            OutputFormat::Json => print_json(summary),
            OutputFormat::Quiet => println!("{}", summary.imported),
        }
    }

    /// Print what a batch of deliveries did to the log
    pub fn print_outcome(&self, label: &str, outcome: &MergeOutcome) {
        match self.format {
            OutputFormat::Human => {
                if outcome.changed() {
                    println!(
                        "✓ {}: {} added, {} edited, {} deleted",
                        label, outcome.inserted, outcome.replaced, outcome.removed
                    );
                } else {
                    println!("✓ {}: already up to date", label);
                }
            }
            OutputFormat::Json => print_json(&serde_json::json!({
                "status": "success",
                "message": label,
                "inserted": outcome.inserted,
                "replaced": outcome.replaced,
                "removed": outcome.removed,
                "rejected": outcome.rejected,
            })),
            OutputFormat::Quiet => {}
        }
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        match self.format {
            OutputFormat::Human => println!("✓ {}", message),
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({"status": "success", "message": message})
                );
            }
            OutputFormat::Quiet => {}
        }
    }

    /// Print a warning that does not stop the command
    pub fn warn(&self, message: &str) {
        match self.format {
            OutputFormat::Human => eprintln!("⚠ {}", message),
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({"status": "warning", "message": message})
                );
            }
            OutputFormat::Quiet => {}
        }
    }

    /// Check if we should prompt for confirmation
    pub fn should_prompt(&self) -> bool {
        self.format == OutputFormat::Human
    }

    /// Print an informational message
    pub fn message(&self, msg: &str) {
        match self.format {
            OutputFormat::Human => println!("{}", msg),
            OutputFormat::Json => {
                println!("{}", serde_json::json!({"message": msg}));
            }
            OutputFormat::Quiet => {}
        }
    }
}

/// Print any serializable value as pretty JSON
pub fn print_json<T: Serialize + ?Sized>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Failed to render JSON: {}", e),
    }
}

/// One-line summary used by `list` and the shell
pub fn summary_line(qso: &Qso) -> String {
    let freq = if qso.freq.is_empty() {
        String::new()
    } else {
        display_freq(&qso.freq)
    };
    format!(
        "{} | {:<16} | {:<10} | {:<5} | {:<14} | {:<5} | {}",
        short_id(&qso.id),
        truncate(&qso.dt, 16),
        truncate(&qso.callsign, 10),
        truncate(&qso.band, 5),
        truncate(&freq, 14),
        truncate(&qso.mode, 5),
        truncate_line(&qso.notes, 30)
    )
}

/// First eight characters of an id
pub fn short_id(id: &str) -> &str {
    match id.char_indices().nth(8) {
        Some((end, _)) => &id[..end],
        None => id,
    }
}

fn print_field(label: &str, value: &str) {
    if !value.is_empty() {
        println!("{:<11}{}", label, value);
    }
}

fn dash(value: &str) -> &str {
    if value.is_empty() {
        "-"
    } else {
        value
    }
}

fn format_ts(ts: i64) -> String {
    match Local.timestamp_millis_opt(ts).single() {
        Some(at) => at.format("%Y-%m-%d %H:%M:%S %Z").to_string(),
        None => ts.to_string(),
    }
}

/// Truncate a string to max characters, adding "..." if truncated
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Truncate to first line and max length
fn truncate_line(s: &str, max_len: usize) -> String {
    let first_line = s.lines().next().unwrap_or("");
    truncate(first_line, max_len)
}
