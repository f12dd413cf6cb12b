//! High-level convenience API.
//!
//! This layer provides [`Runtime`], an ergonomic wrapper that owns a
//! [`Trainer`](crate::engine::Trainer),
//! [`InferenceEngine`](crate::engine::InferenceEngine), audit
//! [`Core`](crate::audit::Core) and [`Kernel`](crate::kernel::Kernel), and
//! delegates to the lower layers.
//!
//! For library code that needs finer control, prefer importing from
//! [`engine`](crate::engine), [`persist`](crate::persist) and
//! [`audit`](crate::audit) directly.

pub mod client;

pub use client::Runtime;
