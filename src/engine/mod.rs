//! Engine layer: training and inference over a [`Model`](crate::model::Model).
//!
//! - [`Trainer`] runs seeded SGD with learning-rate decay and L2 weight decay.
//! - [`InferenceEngine`] blends the linear forward pass with memory recall
//!   and writes each answer back into memory.
//!
//! Neither type holds model state; both borrow the model per call.

pub mod infer;
pub mod train;

pub use infer::{Contribution, Explanation, InferenceEngine, RecallMode, DEFAULT_K};
pub use train::{TrainConfig, TrainReport, Trainer};
