//! Data models for QSYNC
//!
//! Defines the logged contact (`Qso`) and its derived duplicate key.
//!
//! The `id` is the only identity used for edit and delete addressing. The
//! fingerprint is a secondary identity for contacts logged independently on
//! two replicas that describe the same real-world event.

use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Separator between fingerprint fields (ASCII unit separator)
const FINGERPRINT_SEPARATOR: char = '\u{1f}';

/// Accepted local (offset-less) timestamp layouts for `dt`
const LOCAL_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%d %H:%M:%S",
];

/// Offset-qualified layouts tried after RFC 3339
const OFFSET_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M%:z", "%Y-%m-%dT%H:%M%z"];

/// One logged contact
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct Qso {
    /// Opaque stable identifier, assigned once at creation
    pub id: String,
    /// Station worked, upper-cased
    pub callsign: String,
    /// Display timestamp as entered
    pub dt: String,
    /// Epoch milliseconds derived from `dt` or supplied explicitly
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ts: Option<i64>,
    pub band: String,
    pub freq: String,
    pub mode: String,
    pub setup: String,
    pub my_grid: String,
    pub their_grid: String,
    pub rst_sent: String,
    pub rst_received: String,
    pub notes: String,
}

impl Qso {
    /// Create a new contact with a fresh id
    ///
    /// `ts` is derived from `dt` when it parses, otherwise the current time.
    pub fn new(callsign: impl Into<String>, dt: impl Into<String>) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), callsign, dt)
    }

    /// Create a contact with a specific id (for loading and tests)
    pub fn with_id(
        id: impl Into<String>,
        callsign: impl Into<String>,
        dt: impl Into<String>,
    ) -> Self {
        let dt = dt.into();
        let ts = parse_dt(&dt).unwrap_or_else(|| Utc::now().timestamp_millis());
        Self {
            id: id.into(),
            callsign: callsign.into().trim().to_uppercase(),
            dt,
            ts: Some(ts),
            ..Self::default()
        }
    }

    /// Generate a fresh identifier
    pub fn new_id() -> String {
        Uuid::new_v4().to_string()
    }

    /// Trim every field and upper-case callsign, mode and grids
    pub fn normalize(&mut self) {
        self.callsign = self.callsign.trim().to_uppercase();
        self.mode = self.mode.trim().to_uppercase();
        self.my_grid = self.my_grid.trim().to_uppercase();
        self.their_grid = self.their_grid.trim().to_uppercase();
        for field in [
            &mut self.dt,
            &mut self.band,
            &mut self.freq,
            &mut self.setup,
            &mut self.rst_sent,
            &mut self.rst_received,
            &mut self.notes,
        ] {
            *field = field.trim().to_string();
        }
    }

    /// Sort key for display and export ordering; missing `ts` counts as 0
    pub fn sort_key(&self) -> i64 {
        self.ts.unwrap_or(0)
    }

    /// Fill a missing `ts` from `dt`, else the current time
    ///
    /// Same rule an import applies to a row without a `ts` column.
    pub fn stamp_ts(&mut self) {
        if self.ts.is_none() {
            self.ts = Some(parse_dt(&self.dt).unwrap_or_else(|| Utc::now().timestamp_millis()));
        }
    }

    /// Composite duplicate key
    ///
    /// Returns `None` when `callsign` or `dt` is empty: such contacts can
    /// never be detected as fingerprint duplicates.
    pub fn fingerprint(&self) -> Option<String> {
        if self.callsign.trim().is_empty() || self.dt.trim().is_empty() {
            return None;
        }

        let parts = [
            &self.callsign,
            &self.dt,
            &self.band,
            &self.freq,
            &self.mode,
            &self.my_grid,
            &self.their_grid,
        ];

        let mut key = String::new();
        for (i, part) in parts.iter().enumerate() {
            if i > 0 {
                key.push(FINGERPRINT_SEPARATOR);
            }
            key.push_str(&part.trim().to_uppercase());
        }
        Some(key)
    }

    /// Whether inserting this contact would duplicate an existing one
    ///
    /// True if any existing contact has the same `id`, or the same non-empty
    /// fingerprint. Only insertion is gated by this; edits never are.
    pub fn is_duplicate_of<'a, I>(&self, existing: I) -> bool
    where
        I: IntoIterator<Item = &'a Qso>,
    {
        let fingerprint = self.fingerprint();
        existing.into_iter().any(|other| {
            other.id == self.id
                || (fingerprint.is_some() && other.fingerprint() == fingerprint)
        })
    }
}

/// Parse a display timestamp into epoch milliseconds
///
/// Accepts the strict local layout `YYYY-MM-DDTHH:MM` (optionally with
/// seconds, or a space instead of `T`), interpreted in the local time zone,
/// and any offset- or zulu-qualified timestamp.
pub fn parse_dt(dt: &str) -> Option<i64> {
    let dt = dt.trim();
    if dt.is_empty() {
        return None;
    }

    for format in LOCAL_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(dt, format) {
            return Local
                .from_local_datetime(&naive)
                .earliest()
                .map(|t| t.timestamp_millis());
        }
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(dt) {
        return Some(parsed.timestamp_millis());
    }

    if let Some(naive) = dt.strip_suffix('Z').or_else(|| dt.strip_suffix('z')) {
        for format in LOCAL_FORMATS {
            if let Ok(naive) = NaiveDateTime::parse_from_str(naive, format) {
                return Some(Utc.from_utc_datetime(&naive).timestamp_millis());
            }
        }
    }

    OFFSET_FORMATS
        .iter()
        .find_map(|format| DateTime::parse_from_str(dt, format).ok())
        .map(|t| t.timestamp_millis())
}
