//! Merge engine
//!
//! Applies mutations to the local contact set. Application is pure with
//! respect to the log (no I/O) and idempotent for repeated adds and deletes.
//!
//! ## Rules
//!
//! - **Add**: insert unless the contact duplicates an existing one by id or
//!   fingerprint. A duplicate is dropped silently.
//! - **Edit**: upsert by id. No existence or fingerprint check, so the last
//!   edit applied at a replica wins.
//! - **BulkAdd**: the add rule per element, in order.
//! - **Delete**: remove by id; an absent id is a no-op.
//!
//! Because edits are unconditional, an edit arriving after a delete brings
//! the contact back. Two replicas that see `[Delete, Edit]` and
//! `[Edit, Delete]` for the same id end in different states. There is no
//! causal metadata to order them, and this engine does not invent any.

use std::cmp::Reverse;
use std::collections::HashMap;

use tracing::{debug, warn};

use crate::models::Qso;
use crate::sync::Mutation;

/// What applying one mutation did to the set
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    /// Contacts newly inserted
    pub inserted: usize,
    /// Contacts replaced in place by an edit
    pub replaced: usize,
    /// Contacts removed
    pub removed: usize,
    /// Adds dropped as duplicates
    pub rejected: usize,
}

impl MergeOutcome {
    /// Whether the contact set changed
    pub fn changed(&self) -> bool {
        self.inserted + self.replaced + self.removed > 0
    }

    /// Accumulate another outcome into this one
    pub fn absorb(&mut self, other: MergeOutcome) {
        self.inserted += other.inserted;
        self.replaced += other.replaced;
        self.removed += other.removed;
        self.rejected += other.rejected;
    }
}

/// The replica's contact set: keyed by id, with a derived display order
#[derive(Debug, Default, Clone)]
pub struct RecordSet {
    records: HashMap<String, Qso>,
    /// Ids in display order (descending `ts`, stable on ties)
    order: Vec<String>,
    /// Live fingerprint counts, for duplicate checks without a full scan
    fingerprints: HashMap<String, usize>,
}

impl RecordSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set from a snapshot
    ///
    /// Later entries with a repeated id replace earlier ones.
    pub fn from_records(records: Vec<Qso>) -> Self {
        let mut set = Self::new();
        for qso in records {
            set.upsert(qso);
        }
        set.resort();
        set
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Qso> {
        self.records.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.records.contains_key(id)
    }

    /// Contacts in display order (newest first)
    pub fn iter(&self) -> impl Iterator<Item = &Qso> {
        self.order.iter().filter_map(|id| self.records.get(id))
    }

    /// Owned copy in display order
    pub fn to_vec(&self) -> Vec<Qso> {
        self.iter().cloned().collect()
    }

    /// Owned copy in export order (oldest first)
    pub fn export_order(&self) -> Vec<Qso> {
        let mut records: Vec<Qso> = self.iter().cloned().collect();
        records.reverse();
        records.sort_by_key(Qso::sort_key);
        records
    }

    /// Ids that start with `prefix`
    pub fn ids_with_prefix(&self, prefix: &str) -> Vec<&str> {
        self.order
            .iter()
            .filter(|id| id.starts_with(prefix))
            .map(String::as_str)
            .collect()
    }

    pub fn clear(&mut self) {
        self.records.clear();
        self.order.clear();
        self.fingerprints.clear();
    }

    /// Whether inserting `candidate` would duplicate an existing contact
    ///
    /// Same answer as `Qso::is_duplicate_of` over the whole set.
    pub fn is_duplicate(&self, candidate: &Qso) -> bool {
        if self.records.contains_key(&candidate.id) {
            return true;
        }
        candidate
            .fingerprint()
            .is_some_and(|fp| self.fingerprints.contains_key(&fp))
    }

    /// Insert unless duplicate; returns whether it was inserted
    pub fn insert_if_absent(&mut self, qso: Qso) -> bool {
        if self.is_duplicate(&qso) {
            return false;
        }
        self.index(&qso);
        self.order.push(qso.id.clone());
        self.records.insert(qso.id.clone(), qso);
        true
    }

    /// Replace the contact with the same id, or insert it; returns whether
    /// an existing contact was replaced
    pub fn upsert(&mut self, qso: Qso) -> bool {
        self.index(&qso);
        let id = qso.id.clone();
        match self.records.insert(id.clone(), qso) {
            Some(previous) => {
                self.unindex(&previous);
                true
            }
            None => {
                self.order.push(id);
                false
            }
        }
    }

    /// Remove by id
    pub fn remove(&mut self, id: &str) -> Option<Qso> {
        let removed = self.records.remove(id)?;
        self.unindex(&removed);
        self.order.retain(|existing| existing != id);
        Some(removed)
    }

    /// Recompute the display order: descending `ts`, missing as 0
    pub fn resort(&mut self) {
        let records = &self.records;
        self.order
            .sort_by_key(|id| Reverse(records.get(id).map(Qso::sort_key).unwrap_or(0)));
    }

    /// Apply one mutation; see the module docs for the rules
    pub fn apply(&mut self, mutation: Mutation) -> MergeOutcome {
        apply_mutation(self, mutation)
    }

    fn index(&mut self, qso: &Qso) {
        if let Some(fp) = qso.fingerprint() {
            *self.fingerprints.entry(fp).or_insert(0) += 1;
        }
    }

    fn unindex(&mut self, qso: &Qso) {
        if let Some(fp) = qso.fingerprint() {
            if let Some(count) = self.fingerprints.get_mut(&fp) {
                *count -= 1;
                if *count == 0 {
                    self.fingerprints.remove(&fp);
                }
            }
        }
    }
}

/// Apply one mutation to the contact set
pub fn apply_mutation(state: &mut RecordSet, mutation: Mutation) -> MergeOutcome {
    let mut outcome = MergeOutcome::default();

    match mutation {
        Mutation::Add { qso } => add_one(state, qso, &mut outcome),
        Mutation::BulkAdd { qsos } => {
            for qso in qsos {
                add_one(state, qso, &mut outcome);
            }
        }
        Mutation::Edit { qso } => {
            debug!(id = %qso.id, "Applying edit");
            if state.upsert(qso) {
                outcome.replaced += 1;
            } else {
                outcome.inserted += 1;
            }
        }
        Mutation::Delete { id } => {
            if state.remove(&id).is_some() {
                debug!(id = %id, "Deleted QSO");
                outcome.removed += 1;
            } else {
                debug!(id = %id, "Delete for unknown id ignored");
            }
        }
        Mutation::Unknown => {
            warn!("Ignoring update with unrecognized type");
        }
    }

    if outcome.changed() {
        state.resort();
    }
    outcome
}

fn add_one(state: &mut RecordSet, qso: Qso, outcome: &mut MergeOutcome) {
    let id = qso.id.clone();
    if state.insert_if_absent(qso) {
        outcome.inserted += 1;
    } else {
        debug!(id = %id, "Duplicate add rejected");
        outcome.rejected += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn qso(id: &str, callsign: &str, dt: &str) -> Qso {
        Qso::with_id(id, callsign, dt)
    }

    fn ids(set: &RecordSet) -> Vec<String> {
        set.iter().map(|q| q.id.clone()).collect()
    }

    #[test]
    fn test_add_inserts() {
        let mut set = RecordSet::new();
        let outcome = set.apply(Mutation::Add {
            qso: qso("1", "W1AW", "2024-01-01T00:00"),
        });
        assert_eq!(outcome.inserted, 1);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_add_same_id_is_rejected() {
        let mut set = RecordSet::new();
        set.apply(Mutation::Add {
            qso: qso("1", "W1AW", "2024-01-01T00:00"),
        });
        let outcome = set.apply(Mutation::Add {
            qso: qso("1", "K1ABC", "2024-03-01T00:00"),
        });
        assert_eq!(outcome.rejected, 1);
        assert!(!outcome.changed());
        assert_eq!(set.get("1").unwrap().callsign, "W1AW");
    }

    #[test]
    fn test_three_fingerprint_duplicates_insert_once() {
        let mut set = RecordSet::new();
        let mut results = Vec::new();
        for id in ["a", "b", "c"] {
            let mut q = qso(id, "W1AW", "2024-01-01T00:00");
            q.band = "20m".to_string();
            q.freq = "14.074".to_string();
            q.mode = "FT8".to_string();
            q.my_grid = "FN31".to_string();
            q.their_grid = "EM12".to_string();
            results.push(set.apply(Mutation::Add { qso: q }));
        }

        assert_eq!(results[0].inserted, 1);
        assert_eq!(results[1].rejected, 1);
        assert_eq!(results[2].rejected, 1);
        assert_eq!(ids(&set), vec!["a"]);
    }

    #[test]
    fn test_contacts_without_fingerprint_are_never_fingerprint_duplicates() {
        let mut set = RecordSet::new();
        let mut a = qso("a", "W1AW", "2024-01-01T00:00");
        a.dt.clear();
        let mut b = a.clone();
        b.id = "b".to_string();

        set.apply(Mutation::Add { qso: a });
        set.apply(Mutation::Add { qso: b });
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_edit_replaces_wholesale() {
        let mut set = RecordSet::new();
        let mut original = qso("1", "W1AW", "2024-01-01T00:00");
        original.notes = "first".to_string();
        original.band = "20m".to_string();
        set.apply(Mutation::Add { qso: original });

        let mut edited = qso("1", "W1AW", "2024-01-01T00:00");
        edited.notes = "second".to_string();
        let outcome = set.apply(Mutation::Edit { qso: edited });

        assert_eq!(outcome.replaced, 1);
        let stored = set.get("1").unwrap();
        assert_eq!(stored.notes, "second");
        assert!(stored.band.is_empty());
    }

    #[test]
    fn test_edit_inserts_when_missing() {
        let mut set = RecordSet::new();
        let outcome = set.apply(Mutation::Edit {
            qso: qso("9", "K1ABC", "2024-01-01T00:00"),
        });
        assert_eq!(outcome.inserted, 1);
        assert!(set.contains("9"));
    }

    #[test]
    fn test_edit_bypasses_fingerprint_gate() {
        let mut set = RecordSet::new();
        set.apply(Mutation::Add {
            qso: qso("1", "W1AW", "2024-01-01T00:00"),
        });
        set.apply(Mutation::Edit {
            qso: qso("2", "W1AW", "2024-01-01T00:00"),
        });
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_edit_frees_old_fingerprint() {
        let mut set = RecordSet::new();
        set.apply(Mutation::Add {
            qso: qso("1", "W1AW", "2024-01-01T00:00"),
        });
        set.apply(Mutation::Edit {
            qso: qso("1", "K1ABC", "2024-01-01T00:00"),
        });

        let outcome = set.apply(Mutation::Add {
            qso: qso("2", "W1AW", "2024-01-01T00:00"),
        });
        assert_eq!(outcome.inserted, 1);
    }

    #[test]
    fn test_bulk_add_rejects_in_batch_duplicates() {
        let mut set = RecordSet::new();
        let outcome = set.apply(Mutation::BulkAdd {
            qsos: vec![
                qso("1", "W1AW", "2024-01-01T00:00"),
                qso("2", "K1ABC", "2024-01-01T01:00"),
                qso("3", "w1aw", "2024-01-01T00:00"),
                qso("2", "N0CALL", "2024-01-02T00:00"),
            ],
        });
        assert_eq!(outcome.inserted, 2);
        assert_eq!(outcome.rejected, 2);
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_delete_is_idempotent() {
        let mut set = RecordSet::new();
        set.apply(Mutation::Add {
            qso: qso("1", "W1AW", "2024-01-01T00:00"),
        });

        let first = set.apply(Mutation::Delete { id: "1".to_string() });
        let second = set.apply(Mutation::Delete { id: "1".to_string() });
        assert_eq!(first.removed, 1);
        assert_eq!(second, MergeOutcome::default());
        assert!(set.is_empty());
    }

    #[test]
    fn test_delete_frees_fingerprint() {
        let mut set = RecordSet::new();
        set.apply(Mutation::Add {
            qso: qso("1", "W1AW", "2024-01-01T00:00"),
        });
        set.apply(Mutation::Delete { id: "1".to_string() });

        let outcome = set.apply(Mutation::Add {
            qso: qso("2", "W1AW", "2024-01-01T00:00"),
        });
        assert_eq!(outcome.inserted, 1);
    }

    #[test]
    fn test_edit_after_delete_resurrects() {
        let mut set = RecordSet::new();
        set.apply(Mutation::Add {
            qso: qso("1", "W1AW", "2024-01-01T00:00"),
        });
        set.apply(Mutation::Delete { id: "1".to_string() });

        let mut edited = qso("1", "W1AW", "2024-01-01T00:00");
        edited.notes = "x".to_string();
        set.apply(Mutation::Edit { qso: edited });

        assert_eq!(set.get("1").unwrap().notes, "x");
    }

    #[test]
    fn test_delete_edit_order_diverges() {
        let edit = Mutation::Edit {
            qso: qso("1", "W1AW", "2024-01-01T00:00"),
        };
        let delete = Mutation::Delete { id: "1".to_string() };

        let mut left = RecordSet::new();
        left.apply(delete.clone());
        left.apply(edit.clone());

        let mut right = RecordSet::new();
        right.apply(edit);
        right.apply(delete);

        assert_eq!(left.len(), 1);
        assert_eq!(right.len(), 0);
    }

    #[test]
    fn test_unknown_is_noop() {
        let mut set = RecordSet::new();
        set.apply(Mutation::Add {
            qso: qso("1", "W1AW", "2024-01-01T00:00"),
        });
        let outcome = set.apply(Mutation::Unknown);
        assert!(!outcome.changed());
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_display_order_descending_ts() {
        let mut set = RecordSet::new();
        set.apply(Mutation::Add {
            qso: qso("old", "W1AW", "2023-06-01T00:00"),
        });
        set.apply(Mutation::Add {
            qso: qso("new", "K1ABC", "2024-06-01T00:00"),
        });
        let mut undated = qso("none", "N0CALL", "2024-01-01T00:00");
        undated.ts = None;
        set.apply(Mutation::Add { qso: undated });

        assert_eq!(ids(&set), vec!["new", "old", "none"]);
    }

    #[test]
    fn test_ties_keep_insertion_order() {
        let mut set = RecordSet::new();
        for id in ["x", "y", "z"] {
            let mut q = qso(id, id, "2024-01-01T00:00");
            q.ts = Some(100);
            set.apply(Mutation::Add { qso: q });
        }
        assert_eq!(ids(&set), vec!["x", "y", "z"]);
    }

    #[test]
    fn test_edit_reorders_on_new_ts() {
        let mut set = RecordSet::new();
        set.apply(Mutation::Add {
            qso: qso("a", "W1AW", "2024-01-01T00:00"),
        });
        set.apply(Mutation::Add {
            qso: qso("b", "K1ABC", "2024-02-01T00:00"),
        });
        assert_eq!(ids(&set), vec!["b", "a"]);

        set.apply(Mutation::Edit {
            qso: qso("a", "W1AW", "2024-03-01T00:00"),
        });
        assert_eq!(ids(&set), vec!["a", "b"]);
    }

    #[test]
    fn test_export_order_ascending() {
        let set = RecordSet::from_records(vec![
            qso("b", "K1ABC", "2024-02-01T00:00"),
            qso("a", "W1AW", "2024-01-01T00:00"),
            qso("c", "N0CALL", "2024-03-01T00:00"),
        ]);
        let exported: Vec<String> = set.export_order().into_iter().map(|q| q.id).collect();
        assert_eq!(exported, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_indexed_check_matches_scan() {
        let records = vec![
            qso("1", "W1AW", "2024-01-01T00:00"),
            qso("2", "K1ABC", "2024-01-01T00:00"),
        ];
        let set = RecordSet::from_records(records.clone());

        let candidates = [
            qso("1", "N0CALL", "2025-01-01T00:00"),
            qso("3", "w1aw", "2024-01-01T00:00"),
            qso("4", "W1AW", "2024-01-01T00:01"),
        ];
        for candidate in &candidates {
            assert_eq!(set.is_duplicate(candidate), candidate.is_duplicate_of(&records));
        }
    }

    #[test]
    fn test_ids_with_prefix() {
        let set = RecordSet::from_records(vec![
            qso("abc-1", "W1AW", "2024-01-01T00:00"),
            qso("abd-2", "K1ABC", "2024-01-02T00:00"),
        ]);
        assert_eq!(set.ids_with_prefix("ab").len(), 2);
        assert_eq!(set.ids_with_prefix("abc"), vec!["abc-1"]);
    }
}
