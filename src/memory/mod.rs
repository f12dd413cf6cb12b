//! Memory layer: episodic recall of past (input, output) pairs.
//!
//! This module provides:
//!
//! - [`MemoryStore`] — a fixed-capacity ring buffer of [`MemoryRecord`]s with
//!   a monotonic write cursor, so eviction is oldest-first once full.
//!
//! - An optional unit-norm embedding index ([`MemoryStore::build_index`])
//!   used by nearest-neighbour recall.
//!
//! # Usage
//!
//! ```rust
//! use mnemo::memory::{MemoryStore, now_nanos};
//!
//! let mut store = MemoryStore::new(1024, 64, 4).unwrap();
//! store.add(&[0.1, 0.2, 0.3], &[1.0, 0.0], now_nanos(), Some("greeting")).unwrap();
//!
//! let hit = store.get("greeting").unwrap();
//! assert_eq!(hit.output()[0], 1.0);
//! ```

pub mod store;

pub use store::{
    now_nanos, MemoryRecord, MemoryStore, DEFAULT_CAPACITY, DEFAULT_EMBED_WIDTH, MAX_CAPACITY,
    MAX_RECORD_ID_LEN,
};
