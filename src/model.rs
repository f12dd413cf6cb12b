//! Model: a linear map `y = W x` plus its episodic memory.
//!
//! The weight matrix is stored row-major with `output_size` rows of
//! `input_size` columns, so `W[j, i]` lives at `j * input_size + i`. Its
//! length is always exactly `input_size * output_size`.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::MemoryConfig;
use crate::error::{MnemoError, Result};
use crate::linalg::Similarity;
use crate::memory::store::truncate_utf8;
use crate::memory::{now_nanos, MemoryStore};

/// Model ids and type strings longer than this many bytes are truncated.
pub const MAX_NAME_LEN: usize = 255;

/// Summary of a model's shape and state, cheap to copy around.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    pub model_type: String,
    pub version: u64,
    pub input_size: usize,
    pub output_size: usize,
    pub parameter_count: usize,
    pub memory_len: usize,
}

/// A linear model with an attached [`MemoryStore`].
#[derive(Clone, Debug)]
pub struct Model {
    id: String,
    model_type: String,
    version: u64,
    input_size: usize,
    output_size: usize,
    weights: Vec<f32>,
    memory: MemoryStore,
}

impl Model {
    /// Create a model with all-zero weights and an empty memory.
    ///
    /// The memory output width is `min(output_size, memory.embed_width)`.
    pub fn new(
        id: &str,
        model_type: &str,
        input_size: usize,
        output_size: usize,
        memory: MemoryConfig,
    ) -> Result<Self> {
        let params = input_size.checked_mul(output_size).ok_or_else(|| {
            MnemoError::InvalidArgument(format!(
                "weight matrix {output_size}x{input_size} overflows"
            ))
        })?;
        let store = MemoryStore::new(
            memory.capacity,
            memory.embed_width,
            output_size.min(memory.embed_width),
        )?;

        Ok(Self {
            id: truncate_utf8(id, MAX_NAME_LEN).to_string(),
            model_type: truncate_utf8(model_type, MAX_NAME_LEN).to_string(),
            version: 0,
            input_size,
            output_size,
            weights: vec![0.0; params],
            memory: store,
        })
    }

    /// Reassemble a model from decoded parts. Fails closed when the weight
    /// length does not match the declared sizes.
    pub(crate) fn from_parts(
        id: String,
        model_type: String,
        version: u64,
        input_size: usize,
        output_size: usize,
        weights: Vec<f32>,
        memory: MemoryStore,
    ) -> Result<Self> {
        if Some(weights.len()) != input_size.checked_mul(output_size) {
            return Err(MnemoError::Corrupt(format!(
                "{} weights for a {output_size}x{input_size} matrix",
                weights.len()
            )));
        }
        Ok(Self {
            id,
            model_type,
            version,
            input_size,
            output_size,
            weights,
            memory,
        })
    }

    /// Fill the weights with seeded uniform values in `[-scale/2, scale/2)`.
    pub fn init_weights(&mut self, scale: f32, seed: u64) {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        for w in self.weights.iter_mut() {
            *w = (rng.gen::<f32>() - 0.5) * scale;
        }
    }

    // --- Accessors ---

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn model_type(&self) -> &str {
        &self.model_type
    }

    /// Training revision: 0 at creation, +1 per successful training run.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn input_size(&self) -> usize {
        self.input_size
    }

    pub fn output_size(&self) -> usize {
        self.output_size
    }

    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    pub(crate) fn weights_mut(&mut self) -> &mut [f32] {
        &mut self.weights
    }

    pub(crate) fn bump_version(&mut self) {
        self.version += 1;
    }

    pub fn memory(&self) -> &MemoryStore {
        &self.memory
    }

    pub fn memory_mut(&mut self) -> &mut MemoryStore {
        &mut self.memory
    }

    /// Store an (embedding, output) pair stamped with the current time.
    pub fn add_memory(&mut self, embedding: &[f32], output: &[f32], id: Option<&str>) -> Result<()> {
        self.memory.add(embedding, output, now_nanos(), id)
    }

    /// Pure linear prediction `W x`, ignoring memory.
    pub fn forward(&self, input: &[f32]) -> Result<Vec<f32>> {
        if input.len() != self.input_size {
            return Err(MnemoError::DimensionMismatch {
                expected: self.input_size,
                got: input.len(),
            });
        }
        Ok(Similarity::matvec(&self.weights, input, self.output_size))
    }

    pub fn info(&self) -> ModelInfo {
        ModelInfo {
            id: self.id.clone(),
            model_type: self.model_type.clone(),
            version: self.version,
            input_size: self.input_size,
            output_size: self.output_size,
            parameter_count: self.weights.len(),
            memory_len: self.memory.len(),
        }
    }

    /// `"<id>@v<version>"`.
    pub fn version_string(&self) -> String {
        format!("{}@v{}", self.id, self.version)
    }

    /// SHA-256 over id, type, sizes and weights. Memory is excluded, so the
    /// fingerprint only changes when learned parameters change.
    pub fn fingerprint(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update((self.id.len() as u32).to_le_bytes());
        hasher.update(self.id.as_bytes());
        hasher.update((self.model_type.len() as u32).to_le_bytes());
        hasher.update(self.model_type.as_bytes());
        hasher.update((self.input_size as u64).to_le_bytes());
        hasher.update((self.output_size as u64).to_le_bytes());
        for w in &self.weights {
            hasher.update(w.to_le_bytes());
        }
        hasher.finalize().into()
    }

    pub fn fingerprint_hex(&self) -> String {
        hex::encode(self.fingerprint())
    }
}
