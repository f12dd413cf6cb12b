//! Error types for Mnemo.

use thiserror::Error;

/// Mnemo error types.
#[derive(Error, Debug)]
pub enum MnemoError {
    /// JSON parsing error (configuration files)
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// Filesystem error from persistence or audit logging
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid vector dimensions
    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    /// Argument rejected before any side effect took place
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Empty input where non-empty was required
    #[error("Empty input: {0}")]
    EmptyInput(String),

    /// Model file does not start with the expected magic token
    #[error("invalid magic bytes")]
    InvalidMagic,

    /// Model file was written by an unknown format version
    #[error("unsupported format version: {0}")]
    UnsupportedVersion(u32),

    /// Trailing content hash does not match the bytes that precede it
    #[error("content hash mismatch")]
    HashMismatch,

    /// Structurally malformed model file
    #[error("corrupt model file: {0}")]
    Corrupt(String),

    /// Audit log entry whose chained hash does not verify
    #[error("audit chain broken at entry {index}")]
    ChainBroken { index: usize },

    /// Kernel used before `init` or after `shutdown`
    #[error("kernel is {0}")]
    KernelState(&'static str),

    /// `step` called with an empty task queue
    #[error("no task queued")]
    NoTask,

    /// Unregistering a model handle the kernel does not hold
    #[error("model handle not registered")]
    NotRegistered,
}

/// Result type alias for Mnemo operations.
pub type Result<T> = std::result::Result<T, MnemoError>;
