//! Transport abstraction
//!
//! A transport broadcasts opaque updates to every replica, the sender
//! included, and assigns each a serial. It promises nothing about ordering
//! or exactly-once delivery; the replica copes with both.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use super::message::{Delivery, ProtocolError, Update};

/// Errors raised by a transport
#[derive(Error, Debug)]
pub enum TransportError {
    /// The channel is currently unavailable
    #[error("Transport is offline")]
    Offline,

    /// Exchange file could not be read or appended
    #[error("Exchange file '{path}' is not accessible: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Result type for transport operations
pub type TransportResult<T> = Result<T, TransportError>;

/// A broadcast channel between replicas
pub trait Transport: Send {
    /// Largest update, in encoded bytes, the channel accepts
    fn max_payload_size(&self) -> usize;

    /// Broadcast an update
    ///
    /// `description` is a reserved field kept for older channel versions that
    /// require it. Replicas always pass an empty string.
    fn send_update(&mut self, update: &Update, description: &str) -> TransportResult<()>;

    /// Take deliveries that arrived since the last poll
    fn poll(&mut self) -> TransportResult<Vec<Delivery>>;

    /// Short name for logs and status output
    fn name(&self) -> &str;

    /// Key that scopes this transport's serials for dedup
    fn source(&self) -> String {
        self.name().to_string()
    }
}
