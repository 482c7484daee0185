//! Delivery dedup
//!
//! Remembers every (source, serial) applied during this process lifetime so a
//! re-delivered update is skipped before it reaches the merge engine.
//! Nothing here is persisted: after a restart, replays fall back to the
//! merge engine's own id/fingerprint checks, which only catch adds.

use std::collections::{HashMap, HashSet};

/// Serials already applied in this session, per source
///
/// Serials are only unique within one source (a hub, an exchange file), so
/// each source gets its own set. The sets grow without bound. A windowed
/// structure would make old serials replayable again, so they are kept exact.
#[derive(Debug, Default)]
pub struct DeliveryTracker {
    seen: HashMap<String, HashSet<u64>>,
}

impl DeliveryTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a serial from `source`; returns `false` if it was already applied
    pub fn observe(&mut self, source: &str, serial: u64) -> bool {
        match self.seen.get_mut(source) {
            Some(serials) => serials.insert(serial),
            None => {
                self.seen.insert(source.to_string(), HashSet::from([serial]));
                true
            }
        }
    }

    /// Check without recording
    pub fn has_seen(&self, source: &str, serial: u64) -> bool {
        self.seen
            .get(source)
            .is_some_and(|serials| serials.contains(&serial))
    }

    /// Number of distinct deliveries applied, across sources
    pub fn len(&self) -> usize {
        self.seen.values().map(HashSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.values().all(HashSet::is_empty)
    }

    /// Highest serial applied from `source`
    pub fn max_serial(&self, source: &str) -> Option<u64> {
        self.seen
            .get(source)
            .and_then(|serials| serials.iter().copied().max())
    }

    /// Forget every serial
    pub fn clear(&mut self) {
        self.seen.clear();
    }
}
