//! Embedding table: deterministic token → projection-row mapping.
//!
//! The table is owned by the caller and passed explicitly to [`embed`] and
//! [`reinforce`]; there is no process-wide projection state. The same token
//! always starts from the same row for a given seed, and only the table it
//! lives in is ever changed by reinforcement.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use sha2::{Digest, Sha256};
use std::collections::HashMap;

/// Caller-owned map from tokens to `width`-dimensional projection rows.
#[derive(Clone, Debug)]
pub struct EmbeddingTable {
    width: usize,
    seed: u64,
    rows: HashMap<String, Vec<f32>>,
}

impl EmbeddingTable {
    /// Create an empty table producing rows of `width` entries.
    pub fn new(width: usize, seed: u64) -> Self {
        Self {
            width,
            seed,
            rows: HashMap::new(),
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Number of tokens that have a materialized row.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Get the row for a token, deriving it on first use.
    pub fn row(&mut self, token: &str) -> &[f32] {
        if !self.rows.contains_key(token) {
            let row = self.derive_row(token);
            self.rows.insert(token.to_string(), row);
        }
        &self.rows[token]
    }

    /// Derive a deterministic row for a token.
    ///
    /// Uses SHA-256 of (seed || token) to seed a ChaCha8 RNG, then draws
    /// values uniformly from [-1, 1).
    fn derive_row(&self, token: &str) -> Vec<f32> {
        let mut hasher = Sha256::new();
        hasher.update(self.seed.to_le_bytes());
        hasher.update(token.as_bytes());
        let hash = hasher.finalize();

        let mut seed = [0u8; 8];
        seed.copy_from_slice(&hash[0..8]);
        let mut rng = ChaCha8Rng::seed_from_u64(u64::from_le_bytes(seed));

        (0..self.width).map(|_| rng.gen_range(-1.0f32..1.0)).collect()
    }
}

/// Embed a token sequence as the mean of its rows.
///
/// An empty sequence yields the zero vector.
pub fn embed(table: &mut EmbeddingTable, tokens: &[&str]) -> Vec<f32> {
    let mut out = vec![0.0f32; table.width()];
    if tokens.is_empty() {
        return out;
    }

    for token in tokens {
        for (acc, &v) in out.iter_mut().zip(table.row(token)) {
            *acc += v;
        }
    }

    let n = tokens.len() as f32;
    out.iter_mut().for_each(|v| *v /= n);
    out
}

/// Move each token's row toward `target` by `rate` (0 = no change,
/// 1 = replace). Only the first `width` entries of `target` are used.
pub fn reinforce(table: &mut EmbeddingTable, tokens: &[&str], target: &[f32], rate: f32) {
    for token in tokens {
        table.row(token);
        if let Some(row) = table.rows.get_mut(*token) {
            for (r, &t) in row.iter_mut().zip(target) {
                *r += rate * (t - *r);
            }
        }
    }
}
