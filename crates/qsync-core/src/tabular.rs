//! CSV import and export
//!
//! Fixed column order, one header row, RFC 4180 style quoting: a value that
//! contains a comma, quote, CR or LF is wrapped in quotes with inner quotes
//! doubled.

use chrono::Utc;
use serde::Serialize;
use tracing::debug;

use crate::models::{parse_dt, Qso};

/// Column order for export and import
pub const COLUMNS: [&str; 13] = [
    "callsign",
    "dt",
    "band",
    "freq",
    "mode",
    "setup",
    "myGrid",
    "theirGrid",
    "rstS",
    "rstR",
    "notes",
    "id",
    "ts",
];

/// Result of an import, the only user-visible summary in the core
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    /// Rows accepted
    pub imported: usize,
    /// Rows dropped for a missing callsign or date
    pub skipped: usize,
    /// Bulk updates produced for the accepted rows
    pub updates: usize,
}

impl std::fmt::Display for ImportSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} QSOs imported", self.imported)?;
        if self.skipped > 0 {
            write!(f, ", {} rows skipped", self.skipped)?;
        }
        Ok(())
    }
}

/// Render contacts as CSV, header first, in the order given
pub fn export_csv<'a>(qsos: impl IntoIterator<Item = &'a Qso>) -> String {
    let mut out = String::new();
    push_row(&mut out, COLUMNS.iter().copied());

    for qso in qsos {
        let ts = qso.ts.map(|ts| ts.to_string()).unwrap_or_default();
        let row: [&str; 13] = [
            &qso.callsign,
            &qso.dt,
            &qso.band,
            &qso.freq,
            &qso.mode,
            &qso.setup,
            &qso.my_grid,
            &qso.their_grid,
            &qso.rst_sent,
            &qso.rst_received,
            &qso.notes,
            &qso.id,
            &ts,
        ];
        push_row(&mut out, row);
    }

    out
}

fn push_row<'a>(out: &mut String, values: impl IntoIterator<Item = &'a str>) {
    for (i, value) in values.into_iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&quote(value));
    }
    out.push('\n');
}

fn quote(value: &str) -> String {
    if value.contains([',', '"', '\r', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Parse CSV text into contacts
///
/// The header row is recognised by its first cell and skipped. Rows without
/// a callsign or date are counted as skipped. Blank lines are ignored.
pub fn parse_csv(text: &str) -> (Vec<Qso>, usize) {
    let mut qsos = Vec::new();
    let mut skipped = 0;

    for (index, row) in split_rows(text).into_iter().enumerate() {
        if index == 0 && is_header(&row) {
            continue;
        }
        if row.iter().all(|cell| cell.trim().is_empty()) {
            continue;
        }
        match row_to_qso(&row) {
            Some(qso) => qsos.push(qso),
            None => {
                debug!(row = index + 1, "Skipping incomplete CSV row");
                skipped += 1;
            }
        }
    }

    (qsos, skipped)
}

fn is_header(row: &[String]) -> bool {
    row.first()
        .is_some_and(|cell| cell.trim().eq_ignore_ascii_case(COLUMNS[0]))
}

fn row_to_qso(row: &[String]) -> Option<Qso> {
    let cell = |i: usize| row.get(i).map(|s| s.trim()).unwrap_or("");

    let callsign = cell(0);
    let dt = cell(1);
    if callsign.is_empty() || dt.is_empty() {
        return None;
    }

    let id = match cell(11) {
        "" => Qso::new_id(),
        id => id.to_string(),
    };
    let ts = cell(12)
        .parse::<i64>()
        .ok()
        .or_else(|| parse_dt(dt))
        .unwrap_or_else(|| Utc::now().timestamp_millis());

    let mut qso = Qso {
        id,
        callsign: callsign.to_string(),
        dt: dt.to_string(),
        ts: Some(ts),
        band: cell(2).to_string(),
        freq: cell(3).to_string(),
        mode: cell(4).to_string(),
        setup: cell(5).to_string(),
        my_grid: cell(6).to_string(),
        their_grid: cell(7).to_string(),
        rst_sent: cell(8).to_string(),
        rst_received: cell(9).to_string(),
        notes: cell(10).to_string(),
    };
    qso.normalize();
    Some(qso)
}

/// Split CSV text into rows of unquoted cells
///
/// A quote opens a quoted cell only as the cell's first character; quoted
/// cells may contain commas, doubled quotes and line breaks. Anywhere else a
/// quote is literal text.
fn split_rows(text: &str) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    let mut row = Vec::new();
    let mut cell = String::new();
    let mut in_quotes = false;
    let mut at_cell_start = true;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    cell.push('"');
                    chars.next();
                }
                '"' => in_quotes = false,
                _ => cell.push(c),
            }
            continue;
        }

        match c {
            '"' if at_cell_start => in_quotes = true,
            ',' => {
                row.push(std::mem::take(&mut cell));
                at_cell_start = true;
                continue;
            }
            '\r' | '\n' => {
                if c == '\r' && chars.peek() == Some(&'\n') {
                    chars.next();
                }
                row.push(std::mem::take(&mut cell));
                rows.push(std::mem::take(&mut row));
                at_cell_start = true;
                continue;
            }
            _ => cell.push(c),
        }
        at_cell_start = false;
    }

    if !cell.is_empty() || !row.is_empty() {
        row.push(cell);
        rows.push(row);
    }

    rows
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Qso {
        let mut qso = Qso::with_id("id-1", "W1AW", "2024-01-01T12:00");
        qso.band = "20m".to_string();
        qso.freq = "14.074".to_string();
        qso.mode = "FT8".to_string();
        qso.my_grid = "FN31".to_string();
        qso.their_grid = "EM10".to_string();
        qso.rst_sent = "-10".to_string();
        qso.rst_received = "-12".to_string();
        qso.notes = "worked on \"dipole\", 100W\nsecond line".to_string();
        qso
    }

    #[test]
    fn test_export_header_and_quoting() {
        let csv = export_csv([&sample()]);
        let mut lines = csv.lines();

        assert_eq!(
            lines.next(),
            Some("callsign,dt,band,freq,mode,setup,myGrid,theirGrid,rstS,rstR,notes,id,ts")
        );
        assert!(csv.contains("\"worked on \"\"dipole\"\", 100W\nsecond line\""));
        assert!(csv.starts_with("callsign,"));
    }

    #[test]
    fn test_round_trip() {
        let mut second = Qso::with_id("id-2", "k1abc", "2024-01-02T08:30:15");
        second.mode = "cw".to_string();
        second.setup = "portable".to_string();
        let originals = vec![sample(), second];

        let csv = export_csv(&originals);
        let (imported, skipped) = parse_csv(&csv);

        assert_eq!(skipped, 0);
        assert_eq!(imported.len(), 2);
        for (original, back) in originals.iter().zip(&imported) {
            let mut expected = original.clone();
            expected.normalize();
            assert_eq!(&expected, back);
        }
    }

    #[test]
    fn test_empty_callsign_row_is_skipped() {
        let csv = "callsign,dt,band\nW1AW,2024-01-01T00:00,20m\n  ,2024-01-01T00:05,40m\n";
        let (qsos, skipped) = parse_csv(csv);

        assert_eq!(qsos.len(), 1);
        assert_eq!(skipped, 1);
        assert_eq!(qsos[0].callsign, "W1AW");
    }

    #[test]
    fn test_missing_dt_is_skipped() {
        let (qsos, skipped) = parse_csv("W1AW,,20m\n");
        assert!(qsos.is_empty());
        assert_eq!(skipped, 1);
    }

    #[test]
    fn test_missing_id_gets_fresh_one() {
        let (qsos, _) = parse_csv("W1AW,2024-01-01T00:00\nW1AW,2024-01-01T00:00\n");
        assert_eq!(qsos.len(), 2);
        assert!(!qsos[0].id.is_empty());
        assert_ne!(qsos[0].id, qsos[1].id);
    }

    #[test]
    fn test_ts_sources() {
        let csv = "\
W1AW,2024-01-01T00:00,,,,,,,,,,a,42
W1AW,2024-01-01T00:00:00Z,,,,,,,,,,b,
W1AW,sometime,,,,,,,,,,c,
";
        let before = Utc::now().timestamp_millis();
        let (qsos, _) = parse_csv(csv);

        assert_eq!(qsos[0].ts, Some(42));
        assert_eq!(qsos[1].ts, Some(1_704_067_200_000));
        assert!(qsos[2].ts.unwrap() >= before);
    }

    #[test]
    fn test_normalizes_case() {
        let (qsos, _) = parse_csv("w1aw,2024-01-01T00:00,20m,,ft8,,fn31,em10\n");
        let qso = &qsos[0];
        assert_eq!(qso.callsign, "W1AW");
        assert_eq!(qso.mode, "FT8");
        assert_eq!(qso.my_grid, "FN31");
        assert_eq!(qso.their_grid, "EM10");
    }

    #[test]
    fn test_crlf_and_blank_lines() {
        let csv = "callsign,dt\r\nW1AW,2024-01-01T00:00\r\n\r\nK1ABC,2024-01-01T00:01";
        let (qsos, skipped) = parse_csv(csv);
        assert_eq!(qsos.len(), 2);
        assert_eq!(skipped, 0);
        assert_eq!(qsos[1].callsign, "K1ABC");
    }

    #[test]
    fn test_stray_quote_inside_cell_is_literal() {
        let csv = "\
W1AW,2024-01-01T00:00,20m,,,,,,,,5\" vertical
K1ABC,2024-01-01T00:01,40m
N0CALL,2024-01-01T00:02,80m
";
        let (qsos, skipped) = parse_csv(csv);

        assert_eq!(skipped, 0);
        assert_eq!(qsos.len(), 3);
        assert_eq!(qsos[0].notes, "5\" vertical");
        assert_eq!(qsos[1].callsign, "K1ABC");
        assert_eq!(qsos[2].callsign, "N0CALL");
    }

    #[test]
    fn test_summary_display() {
        let summary = ImportSummary {
            imported: 3,
            skipped: 1,
            updates: 1,
        };
        assert_eq!(summary.to_string(), "3 QSOs imported, 1 rows skipped");
    }
}
