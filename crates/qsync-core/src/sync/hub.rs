//! In-process broadcast hub
//!
//! Every endpoint of a hub sees every update, its own included, in the order
//! the hub accepted them. Serials are assigned by the hub. Used to run
//! several replicas in one process and to exercise duplicate delivery and
//! offline sends.

use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;

use super::message::{Delivery, Update};
use super::transport::{Transport, TransportError, TransportResult};

#[derive(Debug, Default)]
struct HubLog {
    entries: Vec<Delivery>,
    descriptions: Vec<String>,
    next_serial: u64,
    offline: bool,
}

/// Shared broadcast log
#[derive(Debug, Clone)]
pub struct LocalHub {
    log: Arc<Mutex<HubLog>>,
    max_payload_size: usize,
}

impl LocalHub {
    pub fn new(max_payload_size: usize) -> Self {
        Self {
            log: Arc::new(Mutex::new(HubLog::default())),
            max_payload_size,
        }
    }

    /// Create an endpoint that starts reading from the first update
    pub fn endpoint(&self) -> HubEndpoint {
        HubEndpoint {
            hub: self.clone(),
            cursor: 0,
        }
    }

    /// Reject sends until switched back online
    pub fn set_online(&self, online: bool) {
        self.lock().offline = !online;
    }

    /// Deliver an already-sent update a second time, same serial
    pub fn redeliver(&self, serial: u64) -> bool {
        let mut log = self.lock();
        let Some(position) = log.entries.iter().position(|d| d.serial == serial) else {
            return false;
        };
        let delivery = log.entries[position].clone();
        let description = log.descriptions[position].clone();
        log.entries.push(delivery);
        log.descriptions.push(description);
        true
    }

    /// Number of deliveries in the log (redeliveries included)
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    /// Descriptions passed alongside each update, in log order
    pub fn descriptions(&self) -> Vec<String> {
        self.lock().descriptions.clone()
    }

    /// Snapshot of every delivery in log order
    pub fn deliveries(&self) -> Vec<Delivery> {
        self.lock().entries.clone()
    }

    fn lock(&self) -> MutexGuard<'_, HubLog> {
        self.log.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// One replica's connection to a hub
#[derive(Debug)]
pub struct HubEndpoint {
    hub: LocalHub,
    cursor: usize,
}

impl Transport for HubEndpoint {
    fn max_payload_size(&self) -> usize {
        self.hub.max_payload_size
    }

    fn send_update(&mut self, update: &Update, description: &str) -> TransportResult<()> {
        let mut log = self.hub.lock();
        if log.offline {
            return Err(TransportError::Offline);
        }
        log.next_serial += 1;
        let serial = log.next_serial;
        log.entries.push(Delivery::new(serial, update.clone()));
        log.descriptions.push(description.to_string());
        debug!(serial, kind = update.payload.kind(), "Hub accepted update");
        Ok(())
    }

    fn poll(&mut self) -> TransportResult<Vec<Delivery>> {
        let log = self.hub.lock();
        let fresh = log.entries[self.cursor.min(log.entries.len())..].to_vec();
        self.cursor = log.entries.len();
        Ok(fresh)
    }

    fn name(&self) -> &str {
        "hub"
    }
}
