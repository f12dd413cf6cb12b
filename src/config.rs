//! Runtime configuration.
//!
//! Every field has a default, so a partial JSON document is enough:
//!
//! ```rust
//! use mnemo::config::RuntimeConfig;
//!
//! let cfg = RuntimeConfig::from_json_str(r#"{"train": {"epochs": 50}}"#).unwrap();
//! assert_eq!(cfg.train.epochs, 50);
//! assert_eq!(cfg.memory.capacity, 1024);
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::engine::{RecallMode, TrainConfig};
use crate::error::{MnemoError, Result};
use crate::memory::{DEFAULT_CAPACITY, DEFAULT_EMBED_WIDTH, MAX_CAPACITY};

/// Shape of every model's memory store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Records held before the oldest is evicted. Default: 1024.
    pub capacity: usize,
    /// Embedding width `E`. Default: 64.
    pub embed_width: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            embed_width: DEFAULT_EMBED_WIDTH,
        }
    }
}

/// Top-level configuration consumed by [`Runtime`](crate::highlevel::Runtime).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub memory: MemoryConfig,
    pub train: TrainConfig,
    /// Active recall policy for inference.
    pub recall: RecallMode,
    /// Weights start uniform in `[-init_scale / 2, init_scale / 2)`. Default: 0.1.
    pub init_scale: f32,
    /// Directory that holds audit log files. Default: `audit`.
    pub audit_dir: PathBuf,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            memory: MemoryConfig::default(),
            train: TrainConfig::default(),
            recall: RecallMode::Attention,
            init_scale: 0.1,
            audit_dir: PathBuf::from("audit"),
        }
    }
}

impl RuntimeConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from JSON, filling unspecified fields with defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(json)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load from a JSON file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Serialize to pretty JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Reject settings no model could be built with.
    pub fn validate(&self) -> Result<()> {
        if self.memory.capacity == 0 || self.memory.capacity > MAX_CAPACITY {
            return Err(MnemoError::InvalidArgument(format!(
                "memory.capacity must be in 1..={MAX_CAPACITY}, got {}",
                self.memory.capacity
            )));
        }
        if let RecallMode::NearestNeighbors { k } = self.recall {
            if k == 0 {
                return Err(MnemoError::InvalidArgument(
                    "recall.k must be positive".to_string(),
                ));
            }
        }
        if !self.train.learning_rate.is_finite() || self.train.learning_rate <= 0.0 {
            return Err(MnemoError::InvalidArgument(format!(
                "train.learning_rate must be positive, got {}",
                self.train.learning_rate
            )));
        }
        Ok(())
    }

    #[must_use]
    pub fn with_memory(mut self, capacity: usize, embed_width: usize) -> Self {
        self.memory = MemoryConfig {
            capacity,
            embed_width,
        };
        self
    }

    #[must_use]
    pub fn with_train(mut self, train: TrainConfig) -> Self {
        self.train = train;
        self
    }

    #[must_use]
    pub const fn with_recall(mut self, recall: RecallMode) -> Self {
        self.recall = recall;
        self
    }

    #[must_use]
    pub const fn with_init_scale(mut self, scale: f32) -> Self {
        self.init_scale = scale;
        self
    }

    #[must_use]
    pub fn with_audit_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.audit_dir = dir.into();
        self
    }
}
