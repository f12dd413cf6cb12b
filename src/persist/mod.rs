//! Persistence layer: model files with integrity checking.
//!
//! - [`bytes`]: bounds-checked little-endian reader and writer.
//! - [`codec`]: the versioned model file format, `save_model`/`load_model`
//!   and the atomic [`save_atomic`] variant used for checkpoints.

pub mod bytes;
pub mod codec;

pub use codec::{decode, encode, load_model, save_atomic, save_model, FORMAT_VERSION, MAGIC};
