//! Chunked bulk-add encoding
//!
//! The transport caps the size of a single update. A large batch of new
//! contacts (typically an import) is split greedily into several `bulk_add`
//! updates that each fit, preserving the original order across chunks.
//!
//! A contact whose own encoding exceeds the cap is still sent, alone.

use std::mem;

use tracing::debug;

use super::message::{bulk_add_info, Mutation, ProtocolError, ProtocolResult, Update};
use crate::models::Qso;

/// Splits batches of contacts into size-limited `bulk_add` updates
#[derive(Debug, Clone, Copy)]
pub struct ChunkEncoder {
    max_payload_size: usize,
}

impl ChunkEncoder {
    /// Create an encoder for a transport cap of `max_payload_size` bytes
    pub fn new(max_payload_size: usize) -> Self {
        Self { max_payload_size }
    }

    pub fn max_payload_size(&self) -> usize {
        self.max_payload_size
    }

    /// Split `qsos` into updates of at most `max_payload_size` encoded bytes
    ///
    /// Every update holding more than one contact fits the cap. Concatenating
    /// the updates' contacts yields the input in its original order.
    pub fn split(&self, qsos: Vec<Qso>) -> ProtocolResult<Vec<Update>> {
        let mut chunks: Vec<Vec<Qso>> = Vec::new();
        let mut working: Vec<Qso> = Vec::new();
        let mut working_bytes = 0usize;

        for qso in qsos {
            let len = encoded_qso_len(&qso)?;
            working.push(qso);
            working_bytes += len;

            if working.len() > 1
                && self.bulk_len(working.len(), working_bytes)? > self.max_payload_size
            {
                if let Some(last) = working.pop() {
                    chunks.push(mem::take(&mut working));
                    working.push(last);
                    working_bytes = len;
                }
            }
        }

        if !working.is_empty() {
            chunks.push(working);
        }

        debug!(
            chunks = chunks.len(),
            max_payload_size = self.max_payload_size,
            "Split bulk add"
        );

        Ok(chunks.into_iter().map(Update::bulk_add).collect())
    }

    /// Encoded size of a bulk add holding `count` contacts whose own
    /// encodings total `qso_bytes`
    fn bulk_len(&self, count: usize, qso_bytes: usize) -> ProtocolResult<usize> {
        let envelope = Update {
            payload: Mutation::BulkAdd { qsos: Vec::new() },
            info: bulk_add_info(count),
        };
        let separators = count.saturating_sub(1);
        Ok(encoded_len(&envelope)? + qso_bytes + separators)
    }
}

/// Encoded size of an update in bytes
pub fn encoded_len(update: &Update) -> ProtocolResult<usize> {
    Ok(update.encode()?.len())
}

fn encoded_qso_len(qso: &Qso) -> ProtocolResult<usize> {
    serde_json::to_vec(qso)
        .map(|bytes| bytes.len())
        .map_err(ProtocolError::Encode)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch(n: usize) -> Vec<Qso> {
        (0..n)
            .map(|i| {
                let mut qso = Qso::with_id(
                    format!("id-{i:04}"),
                    format!("W{}AW", i % 10),
                    format!("2024-01-{:02}T{:02}:00", i % 28 + 1, i % 24),
                );
                qso.notes = "n".repeat(i % 7 * 10);
                qso
            })
            .collect()
    }

    fn contents(updates: &[Update]) -> Vec<Vec<Qso>> {
        updates
            .iter()
            .map(|u| match &u.payload {
                Mutation::BulkAdd { qsos } => qsos.clone(),
                other => panic!("Expected BulkAdd, got {:?}", other),
            })
            .collect()
    }

    #[test]
    fn test_everything_fits_in_one_chunk() {
        let encoder = ChunkEncoder::new(1_000_000);
        let updates = encoder.split(batch(20)).unwrap();
        assert_eq!(updates.len(), 1);
        assert_eq!(contents(&updates)[0].len(), 20);
    }

    #[test]
    fn test_order_preserved_and_sizes_respected() {
        let input = batch(60);
        for max in [300, 700, 1500, 4000] {
            let encoder = ChunkEncoder::new(max);
            let updates = encoder.split(input.clone()).unwrap();

            let flattened: Vec<Qso> = contents(&updates).into_iter().flatten().collect();
            assert_eq!(flattened, input, "max={max}");

            for (update, chunk) in updates.iter().zip(contents(&updates)) {
                if chunk.len() > 1 {
                    assert!(encoded_len(update).unwrap() <= max, "max={max}");
                }
            }
        }
    }

    #[test]
    fn test_chunks_are_greedy() {
        let input = batch(40);
        let max = 1500;
        let updates = ChunkEncoder::new(max).split(input).unwrap();
        let chunks = contents(&updates);

        // Adding the next contact to any sealed chunk would overflow
        for pair in chunks.windows(2) {
            let mut grown = pair[0].clone();
            grown.push(pair[1][0].clone());
            assert!(encoded_len(&Update::bulk_add(grown)).unwrap() > max);
        }
    }

    #[test]
    fn test_oversized_single_contact_sent_alone() {
        let mut input = batch(3);
        input[1].notes = "x".repeat(5_000);

        let updates = ChunkEncoder::new(1_000).split(input.clone()).unwrap();
        let chunks = contents(&updates);

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[1], vec![input[1].clone()]);
        assert!(encoded_len(&updates[1]).unwrap() > 1_000);
    }

    #[test]
    fn test_computed_size_matches_encoding() {
        let encoder = ChunkEncoder::new(10_000);
        for n in [1, 2, 9, 10, 11, 25] {
            let qsos = batch(n);
            let bytes: usize = qsos.iter().map(|q| encoded_qso_len(q).unwrap()).sum();
            let expected = encoded_len(&Update::bulk_add(qsos)).unwrap();
            assert_eq!(encoder.bulk_len(n, bytes).unwrap(), expected, "n={n}");
        }
    }

    #[test]
    fn test_empty_input() {
        let updates = ChunkEncoder::new(100).split(Vec::new()).unwrap();
        assert!(updates.is_empty());
    }
}
