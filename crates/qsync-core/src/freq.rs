//! Frequency display normalization
//!
//! The `freq` field is free text. A bare number is read as MHz; a number with
//! a `hz`, `khz`, `mhz` or `ghz` suffix is converted to MHz. Anything else that
//! contains letters (a band label such as `20m`) is kept as opaque text.

use std::fmt;

/// A display-ready frequency value
#[derive(Debug, Clone, PartialEq)]
pub enum Frequency {
    /// A numeric frequency in MHz
    Mhz(f64),
    /// Opaque text that is not a recognizable frequency
    Label(String),
}

impl Frequency {
    /// Interpret a free-text frequency value
    pub fn parse(input: &str) -> Self {
        let trimmed = input.trim();
        let lower = trimmed.to_ascii_lowercase();

        // Longest suffix first so "khz" is not read as "hz"
        let units: [(&str, f64); 4] = [
            ("ghz", 1_000.0),
            ("mhz", 1.0),
            ("khz", 0.001),
            ("hz", 0.000_001),
        ];

        let (number, scale) = units
            .iter()
            .find_map(|(suffix, scale)| lower.strip_suffix(suffix).map(|n| (n, *scale)))
            .unwrap_or((lower.as_str(), 1.0));

        let number = number.trim();
        if number.is_empty() || number.chars().any(|c| c.is_alphabetic()) {
            return Frequency::Label(trimmed.to_string());
        }

        match number.replace(',', ".").parse::<f64>() {
            Ok(value) if value.is_finite() => Frequency::Mhz(value * scale),
            _ => Frequency::Label(trimmed.to_string()),
        }
    }

    /// Frequency in MHz, if numeric
    pub fn mhz(&self) -> Option<f64> {
        match self {
            Frequency::Mhz(value) => Some(*value),
            Frequency::Label(_) => None,
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Frequency::Mhz(value) => write!(f, "{} MHz", trim_number(*value)),
            Frequency::Label(text) => write!(f, "{}", text),
        }
    }
}

/// Shorthand for `Frequency::parse(input).to_string()`
pub fn display_freq(input: &str) -> String {
    Frequency::parse(input).to_string()
}

/// Render with up to six decimals and no trailing zeros
fn trim_number(value: f64) -> String {
    let formatted = format!("{:.6}", value);
    let trimmed = formatted.trim_end_matches('0').trim_end_matches('.');
    if trimmed == "-0" {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}
