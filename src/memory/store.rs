//! Fixed-capacity episodic memory of (embedding, output) pairs.
//!
//! Writes go through a monotonically increasing cursor; the physical slot is
//! `cursor % capacity`. The reported length is `min(cursor, capacity)`, so
//! once the store is full every new record evicts the oldest one in true
//! ring order.
//!
//! # Example
//!
//! ```rust
//! use mnemo::memory::MemoryStore;
//!
//! let mut store = MemoryStore::new(2, 4, 1).unwrap();
//! store.add(&[1.0], &[0.1], 0, Some("a")).unwrap();
//! store.add(&[2.0], &[0.2], 1, Some("b")).unwrap();
//! store.add(&[3.0], &[0.3], 2, Some("c")).unwrap(); // evicts "a"
//!
//! assert_eq!(store.len(), 2);
//! assert!(store.get("a").is_none());
//! let ids: Vec<_> = store.iter().filter_map(|r| r.id()).collect();
//! assert_eq!(ids, vec!["b", "c"]);
//! ```

use crate::error::{MnemoError, Result};
use crate::linalg::Similarity;
use std::time::{SystemTime, UNIX_EPOCH};

/// Default number of records a store holds.
pub const DEFAULT_CAPACITY: usize = 1024;

/// Default embedding width `E`.
pub const DEFAULT_EMBED_WIDTH: usize = 64;

/// Hard upper bound on any store capacity, including capacities read from disk.
pub const MAX_CAPACITY: usize = 1 << 20;

/// Record identifiers longer than this many bytes are truncated.
pub const MAX_RECORD_ID_LEN: usize = 32;

/// Current wall-clock time in nanoseconds since the Unix epoch.
pub fn now_nanos() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as i64)
        .unwrap_or(0)
}

/// A single stored (embedding, output) pair.
///
/// Records are immutable once written. Both vectors are zero-padded to the
/// store's fixed widths.
#[derive(Clone, Debug, PartialEq)]
pub struct MemoryRecord {
    embedding: Vec<f32>,
    output: Vec<f32>,
    timestamp: i64,
    id: Option<String>,
}

impl MemoryRecord {
    pub fn embedding(&self) -> &[f32] {
        &self.embedding
    }

    pub fn output(&self) -> &[f32] {
        &self.output
    }

    /// Creation time in nanoseconds since the Unix epoch.
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }
}

/// Truncate to at most `max` bytes without splitting a UTF-8 character.
pub(crate) fn truncate_utf8(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Ring buffer of [`MemoryRecord`]s.
#[derive(Clone, Debug)]
pub struct MemoryStore {
    capacity: usize,
    embed_width: usize,
    output_width: usize,
    /// Physical slots; grows to `capacity` then is overwritten in place.
    slots: Vec<MemoryRecord>,
    /// Total writes since creation or the last `clear`.
    cursor: u64,
    /// Unit-normalized embeddings, parallel to `slots`, present only after
    /// [`MemoryStore::build_index`].
    unit_index: Option<Vec<Vec<f32>>>,
}

impl MemoryStore {
    /// Create an empty store.
    ///
    /// `capacity` must be in `1..=MAX_CAPACITY`.
    pub fn new(capacity: usize, embed_width: usize, output_width: usize) -> Result<Self> {
        if capacity == 0 || capacity > MAX_CAPACITY {
            return Err(MnemoError::InvalidArgument(format!(
                "memory capacity {capacity} outside 1..={MAX_CAPACITY}"
            )));
        }
        Ok(Self {
            capacity,
            embed_width,
            output_width,
            slots: Vec::new(),
            cursor: 0,
            unit_index: None,
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn embed_width(&self) -> usize {
        self.embed_width
    }

    pub fn output_width(&self) -> usize {
        self.output_width
    }

    /// Number of valid records, never more than `capacity`.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Total number of writes ever made (not reduced by eviction).
    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    /// Append a record, evicting the oldest one when full.
    ///
    /// Rejects an embedding wider than `embed_width` or an output wider than
    /// `output_width`; shorter vectors are zero-padded. Ids are truncated to
    /// [`MAX_RECORD_ID_LEN`] bytes.
    pub fn add(
        &mut self,
        embedding: &[f32],
        output: &[f32],
        timestamp: i64,
        id: Option<&str>,
    ) -> Result<()> {
        if embedding.len() > self.embed_width {
            return Err(MnemoError::DimensionMismatch {
                expected: self.embed_width,
                got: embedding.len(),
            });
        }
        if output.len() > self.output_width {
            return Err(MnemoError::DimensionMismatch {
                expected: self.output_width,
                got: output.len(),
            });
        }

        let mut padded_embedding = vec![0.0; self.embed_width];
        padded_embedding[..embedding.len()].copy_from_slice(embedding);
        let mut padded_output = vec![0.0; self.output_width];
        padded_output[..output.len()].copy_from_slice(output);

        let unit = self
            .unit_index
            .as_ref()
            .map(|_| Similarity::normalized(&padded_embedding));

        let record = MemoryRecord {
            embedding: padded_embedding,
            output: padded_output,
            timestamp,
            id: id.map(|s| truncate_utf8(s, MAX_RECORD_ID_LEN).to_string()),
        };

        let slot = (self.cursor % self.capacity as u64) as usize;
        if slot < self.slots.len() {
            self.slots[slot] = record;
        } else {
            self.slots.push(record);
        }
        if let (Some(index), Some(unit)) = (self.unit_index.as_mut(), unit) {
            if slot < index.len() {
                index[slot] = unit;
            } else {
                index.push(unit);
            }
        }

        self.cursor += 1;
        Ok(())
    }

    /// Physical slot of the oldest record.
    fn oldest_slot(&self) -> usize {
        if self.cursor <= self.capacity as u64 {
            0
        } else {
            (self.cursor % self.capacity as u64) as usize
        }
    }

    /// Physical slots in ring order, oldest first.
    fn ring_order(&self) -> impl Iterator<Item = usize> + '_ {
        let start = self.oldest_slot();
        let len = self.slots.len();
        (0..len).map(move |i| (start + i) % len)
    }

    /// Iterate over records oldest first. Each call starts a fresh pass.
    pub fn iter(&self) -> impl Iterator<Item = &MemoryRecord> + '_ {
        self.ring_order().map(move |i| &self.slots[i])
    }

    /// First record with the given id, searching oldest first.
    ///
    /// Lookup compares against the stored (possibly truncated) id.
    pub fn get(&self, id: &str) -> Option<&MemoryRecord> {
        let id = truncate_utf8(id, MAX_RECORD_ID_LEN);
        self.iter().find(|r| r.id.as_deref() == Some(id))
    }

    /// Build the unit-norm embedding index used by nearest-neighbour recall.
    ///
    /// Once built, the index is kept current by every subsequent `add`.
    pub fn build_index(&mut self) {
        let index = self
            .slots
            .iter()
            .map(|r| Similarity::normalized(&r.embedding))
            .collect();
        self.unit_index = Some(index);
    }

    pub fn is_indexed(&self) -> bool {
        self.unit_index.is_some()
    }

    /// Records paired with their unit-norm embeddings, oldest first.
    ///
    /// Returns `None` until [`MemoryStore::build_index`] has run.
    pub fn indexed(&self) -> Option<impl Iterator<Item = (&MemoryRecord, &[f32])> + '_> {
        let index = self.unit_index.as_ref()?;
        Some(
            self.ring_order()
                .map(move |i| (&self.slots[i], index[i].as_slice())),
        )
    }

    /// Drop every record and reset the write cursor and index.
    pub fn clear(&mut self) {
        self.slots.clear();
        self.cursor = 0;
        self.unit_index = None;
    }
}
