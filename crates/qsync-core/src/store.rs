//! Replica store
//!
//! The `Replica` owns everything one participant in the log holds: the
//! contact set, the delivery tracker, the pending-delete marker, and its
//! collaborators (transport, fallback transport, snapshot persistence).
//!
//! ## Two modes
//!
//! - **With a transport**: local changes are only broadcast. The replica's
//!   own state changes when the update comes back through `poll`, exactly
//!   like on every other replica.
//! - **Without a transport**: local changes go straight through the merge
//!   engine and the whole set is written to the snapshot.
//!
//! ## Usage
//!
//! ```ignore
//! let hub = LocalHub::new(128_000);
//! let mut replica = Replica::new().with_transport(hub.endpoint());
//! replica.add(Qso::new("W1AW", "2024-01-01T12:00"));
//! replica.poll();
//! assert_eq!(replica.records().len(), 1);
//! ```

use std::path::PathBuf;

use tracing::{debug, info, warn};

use crate::config::Config;
use crate::merge::{MergeOutcome, RecordSet};
use crate::models::Qso;
use crate::storage::Persistence;
use crate::sync::{ChunkEncoder, Delivery, DeliveryTracker, FileExchange, Transport, Update};
use crate::tabular::{parse_csv, ImportSummary};

/// Dedup key for deliveries handed in without a transport
const LOCAL_SOURCE: &str = "local";

/// What happened to a local change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// No transport: merged into the local set
    Applied(MergeOutcome),
    /// Handed to the transport
    Sent,
    /// The transport refused it; written to the fallback transport
    Fallback,
    /// Neither transport took it
    Dropped,
}

/// Result of a delete request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteRequest {
    /// First request: waiting for confirmation under this token
    Armed { token: u64 },
    /// Second request for the same id: the delete went out
    Confirmed(Dispatch),
    /// No contact with that id
    NotFound,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct PendingDelete {
    id: String,
    token: u64,
}

/// One replica of the contact log
pub struct Replica {
    records: RecordSet,
    tracker: DeliveryTracker,
    pending_delete: Option<PendingDelete>,
    next_token: u64,
    transport: Option<Box<dyn Transport>>,
    fallback: Option<Box<dyn Transport>>,
    persistence: Option<Persistence>,
    encoder: ChunkEncoder,
}

impl Default for Replica {
    fn default() -> Self {
        Self::new()
    }
}

impl Replica {
    /// An in-memory replica with no collaborators
    pub fn new() -> Self {
        Self {
            records: RecordSet::new(),
            tracker: DeliveryTracker::new(),
            pending_delete: None,
            next_token: 0,
            transport: None,
            fallback: None,
            persistence: None,
            encoder: ChunkEncoder::new(crate::config::DEFAULT_MAX_PAYLOAD_SIZE),
        }
    }

    /// Open the replica described by the configuration
    ///
    /// With an exchange file the replica starts empty and rebuilds its state
    /// by polling; undelivered updates go to `undelivered.jsonl`. Without one
    /// it loads the snapshot.
    pub fn open(config: &Config) -> Self {
        match &config.exchange_path {
            Some(path) => {
                info!(path = ?path, "Opening replica on exchange file");
                Self::new()
                    .with_transport(FileExchange::new(path, config.max_payload_size))
                    .with_fallback(FileExchange::new(
                        config.undelivered_path(),
                        config.max_payload_size,
                    ))
            }
            None => {
                info!(storage = %config.storage, "Opening replica on local snapshot");
                Self::new()
                    .with_persistence(Persistence::from_config(config))
                    .with_max_payload_size(config.max_payload_size)
            }
        }
    }

    /// Attach a transport; chunking follows its payload limit
    pub fn with_transport(mut self, transport: impl Transport + 'static) -> Self {
        self.encoder = ChunkEncoder::new(transport.max_payload_size());
        self.transport = Some(Box::new(transport));
        self
    }

    /// Attach a transport that receives updates the main one refuses
    pub fn with_fallback(mut self, fallback: impl Transport + 'static) -> Self {
        self.fallback = Some(Box::new(fallback));
        self
    }

    /// Attach snapshot persistence and load whatever it holds
    pub fn with_persistence(mut self, persistence: Persistence) -> Self {
        self.records = RecordSet::from_records(persistence.load());
        self.persistence = Some(persistence);
        self
    }

    pub fn with_max_payload_size(mut self, max_payload_size: usize) -> Self {
        self.encoder = ChunkEncoder::new(max_payload_size);
        self
    }

    // ==================== Queries ====================

    pub fn records(&self) -> &RecordSet {
        &self.records
    }

    pub fn get(&self, id: &str) -> Option<&Qso> {
        self.records.get(id)
    }

    pub fn has_transport(&self) -> bool {
        self.transport.is_some()
    }

    pub fn transport_name(&self) -> Option<&str> {
        self.transport.as_deref().map(|t| t.name())
    }

    /// Number of distinct serials applied so far
    pub fn delivered_count(&self) -> usize {
        self.tracker.len()
    }

    /// Highest serial applied from the current transport
    pub fn max_serial(&self) -> Option<u64> {
        self.tracker.max_serial(&self.transport_source())
    }

    fn transport_source(&self) -> String {
        self.transport
            .as_deref()
            .map(|t| t.source())
            .unwrap_or_else(|| LOCAL_SOURCE.to_string())
    }

    pub fn snapshot_location(&self) -> Option<PathBuf> {
        self.persistence.as_ref().map(Persistence::location)
    }

    /// Id currently waiting for delete confirmation
    pub fn pending_delete(&self) -> Option<&str> {
        self.pending_delete.as_ref().map(|p| p.id.as_str())
    }

    // ==================== Local changes ====================

    /// Log a new contact
    pub fn add(&mut self, mut qso: Qso) -> Dispatch {
        qso.normalize();
        qso.stamp_ts();
        debug!(id = %qso.id, callsign = %qso.callsign, "Local add");
        self.send(Update::add(qso))
    }

    /// Replace a contact wholesale
    pub fn edit(&mut self, mut qso: Qso) -> Dispatch {
        qso.normalize();
        qso.stamp_ts();
        debug!(id = %qso.id, "Local edit");
        self.send(Update::edit(qso))
    }

    /// Remove a contact by id
    pub fn delete(&mut self, id: &str) -> Dispatch {
        debug!(id, "Local delete");
        self.send(Update::delete(id))
    }

    /// Import CSV text as chunked bulk updates
    pub fn import_csv(&mut self, text: &str) -> ImportSummary {
        let (qsos, skipped) = parse_csv(text);
        let imported = qsos.len();
        if qsos.is_empty() {
            return ImportSummary {
                imported,
                skipped,
                updates: 0,
            };
        }

        let updates = match self.encoder.split(qsos) {
            Ok(updates) => updates,
            Err(e) => {
                warn!("Failed to encode import: {}", e);
                return ImportSummary {
                    imported: 0,
                    skipped: skipped + imported,
                    updates: 0,
                };
            }
        };
        let count = updates.len();

        if self.transport.is_some() {
            for update in &updates {
                self.broadcast(update);
            }
        } else {
            let mut outcome = MergeOutcome::default();
            for update in updates {
                outcome.absorb(self.records.apply(update.payload));
            }
            self.save();
            debug!(inserted = outcome.inserted, "Applied import locally");
        }

        info!(imported, skipped, updates = count, "Imported CSV");
        ImportSummary {
            imported,
            skipped,
            updates: count,
        }
    }

    /// Broadcast an update, or merge it locally when there is no transport
    ///
    /// Also used to retry updates parked in the fallback.
    pub fn send(&mut self, update: Update) -> Dispatch {
        if self.transport.is_some() {
            return self.broadcast(&update);
        }

        let outcome = self.records.apply(update.payload);
        self.save();
        Dispatch::Applied(outcome)
    }

    fn broadcast(&mut self, update: &Update) -> Dispatch {
        let Some(transport) = self.transport.as_mut() else {
            return Dispatch::Dropped;
        };

        let err = match transport.send_update(update, "") {
            Ok(()) => return Dispatch::Sent,
            Err(e) => e,
        };
        warn!(
            "{} transport refused {} update: {}",
            transport.name(),
            update.payload.kind(),
            err
        );

        match self.fallback.as_mut() {
            Some(fallback) => match fallback.send_update(update, "") {
                Ok(()) => {
                    info!("Update kept in {} fallback", fallback.name());
                    Dispatch::Fallback
                }
                Err(e) => {
                    warn!("Fallback refused update: {}", e);
                    Dispatch::Dropped
                }
            },
            None => Dispatch::Dropped,
        }
    }

    fn save(&self) {
        if let Some(persistence) = &self.persistence {
            persistence.save(&self.records.to_vec());
        }
    }

    // ==================== Inbound ====================

    /// Apply one delivery from the current transport unless already seen
    pub fn receive(&mut self, delivery: Delivery) -> Option<MergeOutcome> {
        let source = self.transport_source();
        self.receive_from(&source, delivery)
    }

    /// Apply one delivery unless its serial was already seen from `source`
    ///
    /// Serials restart in every exchange file, so replaying a second file
    /// must use its own source key.
    pub fn receive_from(&mut self, source: &str, delivery: Delivery) -> Option<MergeOutcome> {
        if !self.tracker.observe(source, delivery.serial) {
            debug!(source, serial = delivery.serial, "Dropping duplicate delivery");
            return None;
        }

        let outcome = self.records.apply(delivery.update.payload);
        if outcome.changed() {
            self.save();
        }
        Some(outcome)
    }

    /// Drain the transport and apply what arrived
    pub fn poll(&mut self) -> MergeOutcome {
        let deliveries = match self.transport.as_mut().map(|t| t.poll()) {
            Some(Ok(deliveries)) => deliveries,
            Some(Err(e)) => {
                warn!("Failed to poll transport: {}", e);
                return MergeOutcome::default();
            }
            None => return MergeOutcome::default(),
        };

        let source = self.transport_source();
        let mut outcome = MergeOutcome::default();
        for delivery in deliveries {
            if let Some(applied) = self.receive_from(&source, delivery) {
                outcome.absorb(applied);
            }
        }
        outcome
    }

    // ==================== Confirmed delete ====================

    /// First call arms a marker, a second call for the same id deletes
    ///
    /// A request for a different id re-arms the marker for that id.
    pub fn request_delete(&mut self, id: &str) -> DeleteRequest {
        if !self.records.contains(id) {
            return DeleteRequest::NotFound;
        }

        if self.pending_delete.as_ref().is_some_and(|p| p.id == id) {
            self.pending_delete = None;
            return DeleteRequest::Confirmed(self.delete(id));
        }

        self.next_token += 1;
        let token = self.next_token;
        self.pending_delete = Some(PendingDelete {
            id: id.to_string(),
            token,
        });
        debug!(id, token, "Delete armed");
        DeleteRequest::Armed { token }
    }

    /// Clear the marker if it is still the one armed under `token`
    pub fn expire_pending(&mut self, token: u64) -> bool {
        if self.pending_delete.as_ref().is_some_and(|p| p.token == token) {
            self.pending_delete = None;
            debug!(token, "Delete request expired");
            true
        } else {
            false
        }
    }

    /// Forget all state: contacts, seen serials, pending delete
    pub fn reset(&mut self) {
        self.records.clear();
        self.tracker.clear();
        self.pending_delete = None;
    }
}

impl std::fmt::Debug for Replica {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Replica")
            .field("records", &self.records.len())
            .field("delivered", &self.tracker.len())
            .field("pending_delete", &self.pending_delete)
            .field("transport", &self.transport_name())
            .field("persistence", &self.persistence)
            .finish()
    }
}
