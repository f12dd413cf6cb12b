//! # Mnemo: a small model runtime with episodic memory
//!
//! Mnemo owns a linear model's learned weights together with an episodic
//! memory of past (input, output) pairs. Training updates the weights by
//! SGD; inference blends the linear prediction with similarity-weighted
//! recall from memory and writes every answer back. Models persist to a
//! versioned binary file sealed with SHA-256, and every training
//! control-plane call lands in a hash-chained audit log.
//!
//! ## Quick Start
//!
//! ```rust
//! use mnemo::{Runtime, RuntimeConfig};
//!
//! let dir = std::env::temp_dir().join("mnemo-quickstart");
//! let rt = Runtime::new("quickstart", RuntimeConfig::new().with_audit_dir(&dir))?;
//!
//! let model = rt.create_model("sensor", "linear", 2, 1)?;
//! rt.train(&model, "calibration-1", &[[0.0f32, 0.0], [1.0, 1.0]], &[[0.0f32], [1.0]])?;
//!
//! // Blended with memory, then remembered
//! let y = rt.infer(&model, &[1.0, 1.0])?;
//! assert!(y[0] > 0.5);
//!
//! let path = dir.join("sensor.mnemo");
//! rt.checkpoint(&model, &path)?;
//! let restored = rt.load_model(&path)?;
//! assert_eq!(restored.read().fingerprint(), model.read().fingerprint());
//! # std::fs::remove_dir_all(&dir).ok();
//! # Ok::<(), mnemo::MnemoError>(())
//! ```
//!
//! ## Layers
//!
//! - **linalg / embedding**: dense `f32` similarity helpers and a caller-owned
//!   token embedding table
//! - **memory**: fixed-capacity ring buffer of records
//! - **model**: weights plus memory, fingerprinting
//! - **engine**: [`Trainer`] and [`InferenceEngine`]
//! - **persist**: the model file format
//! - **audit**: hash-chained logs, content hashes, input contexts
//! - **kernel**: locked model registry and caller-driven task queue
//! - **highlevel**: the [`Runtime`] facade

pub mod audit;
pub mod config;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod highlevel;
pub mod kernel;
pub mod linalg;
pub mod memory;
pub mod model;
pub mod persist;

// Re-exports for convenience
pub use audit::{AuditEntry, AuditLog, AuditRecord, Blob, Context, Core, OpTag};
pub use config::{MemoryConfig, RuntimeConfig};
pub use embedding::EmbeddingTable;
pub use engine::{
    Contribution, Explanation, InferenceEngine, RecallMode, TrainConfig, TrainReport, Trainer,
};
pub use error::{MnemoError, Result};
pub use highlevel::Runtime;
pub use kernel::{Kernel, KernelSnapshot, KernelState, ModelHandle, Task};
pub use linalg::{Metric, Similarity};
pub use memory::{MemoryRecord, MemoryStore};
pub use model::{Model, ModelInfo};
