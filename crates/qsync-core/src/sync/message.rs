//! Replication message types
//!
//! Updates exchanged between replicas, JSON-encoded:
//!
//! ```text
//! { "payload": { "type": "add_qso", "qso": { ... } }, "info": "..." }
//! ```
//!
//! A delivered update additionally carries the transport-assigned `serial`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::Qso;

/// Errors encoding or decoding updates
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Failed to encode update: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("Failed to decode update: {0}")]
    Decode(#[source] serde_json::Error),
}

/// Result type for protocol operations
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// A replicated change to the contact set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Mutation {
    /// Insert a contact unless it duplicates an existing one
    #[serde(rename = "add_qso")]
    Add { qso: Qso },

    /// Replace (or insert) the contact with the same id
    #[serde(rename = "edit_qso")]
    Edit { qso: Qso },

    /// Insert each contact unless it duplicates an existing one
    #[serde(rename = "bulk_add")]
    BulkAdd { qsos: Vec<Qso> },

    /// Remove the contact with this id
    #[serde(rename = "delete_qso")]
    Delete { id: String },

    /// A tag this version does not understand
    #[serde(other)]
    Unknown,
}

impl Mutation {
    /// Wire name of this mutation
    pub fn kind(&self) -> &'static str {
        match self {
            Mutation::Add { .. } => "add_qso",
            Mutation::Edit { .. } => "edit_qso",
            Mutation::BulkAdd { .. } => "bulk_add",
            Mutation::Delete { .. } => "delete_qso",
            Mutation::Unknown => "unknown",
        }
    }
}

/// An update as handed to the transport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Update {
    pub payload: Mutation,
    #[serde(default)]
    pub info: String,
}

impl Update {
    /// Create an add update
    pub fn add(qso: Qso) -> Self {
        let info = format!("QSO with {} logged", qso.callsign);
        Self {
            payload: Mutation::Add { qso },
            info,
        }
    }

    /// Create an edit update
    pub fn edit(qso: Qso) -> Self {
        let info = format!("QSO with {} edited", qso.callsign);
        Self {
            payload: Mutation::Edit { qso },
            info,
        }
    }

    /// Create a bulk add update
    pub fn bulk_add(qsos: Vec<Qso>) -> Self {
        let info = bulk_add_info(qsos.len());
        Self {
            payload: Mutation::BulkAdd { qsos },
            info,
        }
    }

    /// Create a delete update
    pub fn delete(id: impl Into<String>) -> Self {
        Self {
            payload: Mutation::Delete { id: id.into() },
            info: "QSO deleted".to_string(),
        }
    }

    /// Encode to compact JSON bytes
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(ProtocolError::Encode)
    }

    /// Decode from JSON bytes
    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        serde_json::from_slice(bytes).map_err(ProtocolError::Decode)
    }
}

/// Info line for a bulk add of `count` contacts
pub(crate) fn bulk_add_info(count: usize) -> String {
    format!("{} QSOs imported", count)
}

/// An update as received from the transport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Delivery {
    /// Transport-assigned sequence number, used only for dedup
    pub serial: u64,
    #[serde(flatten)]
    pub update: Update,
}

impl Delivery {
    pub fn new(serial: u64, update: Update) -> Self {
        Self { serial, update }
    }

    /// Encode to a single JSON line (no trailing newline)
    pub fn encode(&self) -> ProtocolResult<String> {
        serde_json::to_string(self).map_err(ProtocolError::Encode)
    }

    /// Decode from a JSON line
    pub fn decode(line: &str) -> ProtocolResult<Self> {
        serde_json::from_str(line).map_err(ProtocolError::Decode)
    }
}
