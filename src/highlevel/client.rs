//! Convenience wrapper that owns a [`Trainer`], an [`InferenceEngine`], an
//! audit [`Core`] and a [`Kernel`], and delegates to the lower layers.
//!
//! For full control, use [`model`](crate::model), [`engine`](crate::engine),
//! [`persist`](crate::persist), [`audit`](crate::audit) and
//! [`kernel`](crate::kernel) directly.

use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::info;

use crate::audit::{AuditRecord, Core};
use crate::config::RuntimeConfig;
use crate::engine::{Explanation, InferenceEngine, TrainReport, Trainer};
use crate::error::Result;
use crate::kernel::{Kernel, KernelSnapshot, ModelHandle};
use crate::model::Model;
use crate::persist;

/// The collaborator-facing surface of the model runtime.
///
/// Every model created or loaded through a `Runtime` is registered with its
/// kernel, and every training control-plane call is appended to the audit
/// log of that model under this runtime's core.
///
/// # Example
///
/// ```rust
/// use mnemo::{Runtime, RuntimeConfig};
///
/// let dir = std::env::temp_dir().join("mnemo-runtime-doc");
/// let rt = Runtime::new("doc", RuntimeConfig::new().with_audit_dir(&dir)).unwrap();
/// let model = rt.create_model("xor", "linear", 2, 1).unwrap();
///
/// rt.train(&model, "pairs-v1", &[[0.0f32, 0.0], [1.0, 1.0]], &[[0.0f32], [1.0]]).unwrap();
/// let y = rt.infer(&model, &[1.0, 1.0]).unwrap();
/// assert!(y[0] > 0.5);
/// # std::fs::remove_dir_all(&dir).ok();
/// ```
pub struct Runtime {
    config: RuntimeConfig,
    trainer: Trainer,
    engine: InferenceEngine,
    core: Core,
    kernel: Kernel,
}

impl Runtime {
    /// Validate `config` and start an initialized kernel.
    pub fn new(core_id: &str, config: RuntimeConfig) -> Result<Self> {
        config.validate()?;
        let kernel = Kernel::new();
        kernel.init()?;

        info!(
            core = core_id,
            recall = config.recall.name(),
            audit_dir = %config.audit_dir.display(),
            "runtime started"
        );
        Ok(Self {
            trainer: Trainer::new(config.train.clone()),
            engine: InferenceEngine::new(config.recall),
            core: Core::new(core_id, &config.audit_dir),
            kernel,
            config,
        })
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn core(&self) -> &Core {
        &self.core
    }

    pub fn kernel(&self) -> &Kernel {
        &self.kernel
    }

    pub fn engine(&self) -> &InferenceEngine {
        &self.engine
    }

    pub fn trainer(&self) -> &Trainer {
        &self.trainer
    }

    // =========================================================================
    // Model lifecycle
    // =========================================================================

    /// Create a model with seeded random weights and register it.
    pub fn create_model(
        &self,
        id: &str,
        model_type: &str,
        input_size: usize,
        output_size: usize,
    ) -> Result<ModelHandle> {
        let mut model = Model::new(id, model_type, input_size, output_size, self.config.memory)?;
        model.init_weights(self.config.init_scale, self.config.train.seed);
        self.adopt(model)
    }

    /// Unregister a model. The model itself lives until the last handle drops.
    pub fn free_model(&self, handle: &ModelHandle) -> Result<()> {
        self.kernel.unregister_model(handle)
    }

    fn adopt(&self, model: Model) -> Result<ModelHandle> {
        let handle = Arc::new(RwLock::new(model));
        self.kernel.register_model(&handle)?;
        Ok(handle)
    }

    fn reset(&self, model: &mut Model) {
        model.init_weights(self.config.init_scale, self.config.train.seed);
        model.memory_mut().clear();
    }

    // =========================================================================
    // Training control plane
    // =========================================================================

    /// Train on a dataset and record a `train` entry.
    ///
    /// Training runs on a copy of the model that replaces it only once the
    /// audit entry is written, so a failed call leaves the model untouched.
    pub fn train<I, T>(
        &self,
        handle: &ModelHandle,
        dataset_id: &str,
        inputs: &[I],
        targets: &[T],
    ) -> Result<TrainReport>
    where
        I: AsRef<[f32]>,
        T: AsRef<[f32]>,
    {
        let mut model = handle.write();
        let mut next = model.clone();
        let report = self.trainer.train(&mut next, inputs, targets)?;
        self.core.train_op(next.id(), dataset_id)?;
        *model = next;
        Ok(report)
    }

    /// Reinitialize weights, clear memory, train from scratch on a dataset,
    /// and record a `retrain` entry.
    ///
    /// Like [`train`](Self::train), a failure leaves the model untouched.
    pub fn retrain<I, T>(
        &self,
        handle: &ModelHandle,
        dataset_id: &str,
        inputs: &[I],
        targets: &[T],
    ) -> Result<TrainReport>
    where
        I: AsRef<[f32]>,
        T: AsRef<[f32]>,
    {
        let mut model = handle.write();
        let mut next = model.clone();
        self.reset(&mut next);
        let report = self.trainer.train(&mut next, inputs, targets)?;
        self.core.retrain_op(next.id(), dataset_id)?;
        *model = next;
        Ok(report)
    }

    /// Discard everything the model learned: weights return to their seeded
    /// initial values, memory is cleared, and an `untrain` entry is recorded.
    ///
    /// The model version is kept, so a later training run still moves it forward.
    pub fn untrain(&self, handle: &ModelHandle, dataset_id: &str) -> Result<()> {
        let mut model = handle.write();
        let mut next = model.clone();
        self.reset(&mut next);
        self.core.untrain_op(next.id(), dataset_id)?;
        *model = next;
        Ok(())
    }

    /// Remove every audit reference to a dataset across this core's models.
    pub fn erase(&self, dataset_id: &str) -> Result<usize> {
        self.core.erase(dataset_id)
    }

    // =========================================================================
    // Memory and inference
    // =========================================================================

    pub fn add_memory(
        &self,
        handle: &ModelHandle,
        embedding: &[f32],
        output: &[f32],
        id: Option<&str>,
    ) -> Result<()> {
        handle.write().add_memory(embedding, output, id)
    }

    /// Blend the forward pass with memory recall and write the answer back.
    pub fn infer(&self, handle: &ModelHandle, input: &[f32]) -> Result<Vec<f32>> {
        self.engine.infer(&mut handle.write(), input)
    }

    pub fn infer_batch<I: AsRef<[f32]>>(
        &self,
        handle: &ModelHandle,
        inputs: &[I],
    ) -> Result<Vec<Vec<f32>>> {
        self.engine.infer_batch(&mut handle.write(), inputs)
    }

    /// Best memory similarity for `input`; takes only a read lock.
    pub fn score(&self, handle: &ModelHandle, input: &[f32]) -> Result<Option<f32>> {
        self.engine.score(&handle.read(), input)
    }

    /// Row indices ordered by best memory match.
    pub fn rank<I: AsRef<[f32]>>(&self, handle: &ModelHandle, inputs: &[I]) -> Result<Vec<usize>> {
        self.engine.rank(&handle.read(), inputs)
    }

    /// The prediction for `input` with the records that shaped it. Read-only.
    pub fn explain(&self, handle: &ModelHandle, input: &[f32]) -> Result<Explanation> {
        self.engine.explain(&handle.read(), input)
    }

    /// Build the memory index nearest-neighbour recall needs.
    pub fn index_memory(&self, handle: &ModelHandle) {
        self.engine.index_memory(&mut handle.write());
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    pub fn save_model<P: AsRef<Path>>(&self, handle: &ModelHandle, path: P) -> Result<()> {
        persist::save_model(&handle.read(), path)
    }

    /// Save through a temporary file and rename, so `path` always holds a
    /// complete file.
    pub fn checkpoint<P: AsRef<Path>>(&self, handle: &ModelHandle, path: P) -> Result<()> {
        persist::save_atomic(&handle.read(), path)
    }

    /// Load, verify and register a model.
    pub fn load_model<P: AsRef<Path>>(&self, path: P) -> Result<ModelHandle> {
        let model = persist::load_model(path)?;
        self.adopt(model)
    }

    // =========================================================================
    // Audit and introspection
    // =========================================================================

    /// Content hash of a target id. Pure.
    pub fn audit(&self, target_id: &str) -> AuditRecord {
        self.core.audit(target_id)
    }

    pub fn snapshot(&self) -> KernelSnapshot {
        self.kernel.audit_snapshot()
    }

    /// Shut the kernel down, dropping pending tasks and registrations.
    pub fn shutdown(&self) -> Result<usize> {
        self.kernel.shutdown()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::OpTag;
    use crate::error::MnemoError;

    fn runtime(dir: &tempfile::TempDir) -> Runtime {
        let cfg = RuntimeConfig::new().with_audit_dir(dir.path());
        Runtime::new("test", cfg).unwrap()
    }

    #[test]
    fn test_create_registers_and_free_unregisters() {
        let dir = tempfile::tempdir().unwrap();
        let rt = runtime(&dir);
        let m = rt.create_model("m", "linear", 3, 2).unwrap();
        assert!(rt.kernel().is_registered(&m));
        assert!(m.read().weights().iter().any(|&w| w != 0.0));

        rt.free_model(&m).unwrap();
        assert_eq!(rt.snapshot().models_registered, 0);
        assert!(rt.free_model(&m).is_err());
    }

    #[test]
    fn test_train_logs_after_success() {
        let dir = tempfile::tempdir().unwrap();
        let rt = runtime(&dir);
        let m = rt.create_model("m", "linear", 2, 1).unwrap();

        let bad = rt.train(&m, "bad", &[[1.0f32]], &[[1.0f32]]);
        assert!(matches!(bad, Err(MnemoError::DimensionMismatch { .. })));
        assert!(rt.core().log_for("m").entries().unwrap().is_empty());

        rt.train(&m, "good", &[[1.0f32, 0.0]], &[[1.0f32]]).unwrap();
        let entries = rt.core().log_for("m").entries().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].op, OpTag::Train);
        assert_eq!(m.read().version(), 1);
    }

    #[test]
    fn test_retrain_starts_from_scratch() {
        let dir = tempfile::tempdir().unwrap();
        let rt = runtime(&dir);
        let m = rt.create_model("m", "linear", 2, 1).unwrap();
        let inputs = [[0.0f32, 0.0], [1.0, 1.0]];
        let targets = [[0.0f32], [1.0]];

        rt.train(&m, "d1", &inputs, &targets).unwrap();
        rt.infer(&m, &[1.0, 0.0]).unwrap();
        assert_eq!(m.read().memory().len(), 3);

        rt.retrain(&m, "d2", &inputs, &targets).unwrap();
        // Memory holds only the retraining samples
        assert_eq!(m.read().memory().len(), 2);
        assert_eq!(m.read().version(), 2);

        let ops: Vec<OpTag> = rt.core().log_for("m").entries().unwrap().iter().map(|e| e.op).collect();
        assert_eq!(ops, vec![OpTag::Train, OpTag::Retrain]);
    }

    #[test]
    fn test_untrain_resets_state() {
        let dir = tempfile::tempdir().unwrap();
        let rt = runtime(&dir);
        let m = rt.create_model("m", "linear", 2, 1).unwrap();
        let initial = m.read().weights().to_vec();

        rt.train(&m, "d1", &[[1.0f32, 1.0]], &[[1.0f32]]).unwrap();
        assert_ne!(m.read().weights(), initial.as_slice());

        rt.untrain(&m, "d1").unwrap();
        assert_eq!(m.read().weights(), initial.as_slice());
        assert!(m.read().memory().is_empty());
        assert_eq!(rt.core().log_for("m").verify().unwrap(), 2);
    }

    #[test]
    fn test_save_load_registers() {
        let dir = tempfile::tempdir().unwrap();
        let rt = runtime(&dir);
        let m = rt.create_model("m", "linear", 2, 2).unwrap();
        rt.add_memory(&m, &[1.0, 2.0], &[3.0, 4.0], Some("k")).unwrap();

        let path = dir.path().join("m.bin");
        rt.checkpoint(&m, &path).unwrap();
        let loaded = rt.load_model(&path).unwrap();

        assert!(rt.kernel().is_registered(&loaded));
        assert_eq!(loaded.read().info(), m.read().info());
        assert_eq!(loaded.read().fingerprint(), m.read().fingerprint());
        assert_eq!(rt.snapshot().models_registered, 2);
    }

    #[test]
    fn test_audit_is_content_hash() {
        let dir = tempfile::tempdir().unwrap();
        let rt = runtime(&dir);
        let a = rt.audit("model@v1");
        assert_eq!(a, rt.audit("model@v1"));
        assert_ne!(a.hash, rt.audit("model@v2").hash);
    }

    fn broken_audit_runtime(dir: &tempfile::TempDir) -> Runtime {
        // A regular file where the audit directory should be
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"x").unwrap();
        Runtime::new("test", RuntimeConfig::new().with_audit_dir(&blocker)).unwrap()
    }

    #[test]
    fn test_failed_audit_leaves_model_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let rt = broken_audit_runtime(&dir);
        let m = rt.create_model("m", "linear", 2, 1).unwrap();
        let before = m.read().clone();
        let inputs = [[1.0f32, 1.0]];
        let targets = [[1.0f32]];

        assert!(matches!(rt.train(&m, "d1", &inputs, &targets), Err(MnemoError::Io(_))));
        assert!(rt.retrain(&m, "d1", &inputs, &targets).is_err());

        let after = m.read();
        assert_eq!(after.version(), before.version());
        assert_eq!(after.weights(), before.weights());
        assert!(after.memory().is_empty());
    }

    #[test]
    fn test_failed_untrain_keeps_learned_state() {
        let dir = tempfile::tempdir().unwrap();
        let rt = runtime(&dir);
        let m = rt.create_model("m", "linear", 2, 1).unwrap();
        rt.train(&m, "d1", &[[1.0f32, 1.0]], &[[1.0f32]]).unwrap();
        let trained = m.read().clone();

        let broken = broken_audit_runtime(&dir);
        assert!(broken.untrain(&m, "d1").is_err());
        assert_eq!(m.read().weights(), trained.weights());
        assert_eq!(m.read().memory().len(), trained.memory().len());
    }

    #[test]
    fn test_rank_and_explain_are_read_only() {
        let dir = tempfile::tempdir().unwrap();
        let rt = runtime(&dir);
        let m = rt.create_model("m", "linear", 1, 1).unwrap();
        rt.add_memory(&m, &[0.0], &[1.0], Some("origin")).unwrap();

        assert_eq!(rt.rank(&m, &[[3.0f32], [0.1]]).unwrap(), vec![1, 0]);
        let why = rt.explain(&m, &[0.1]).unwrap();
        assert_eq!(why.contributions.len(), 1);
        assert_eq!(why.contributions[0].id.as_deref(), Some("origin"));
        assert!((why.contributions[0].weight - 1.0).abs() < 1e-6);
        assert_eq!(why.output, rt.engine().predict(&m.read(), &[0.1]).unwrap());
        assert_eq!(m.read().memory().len(), 1);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut cfg = RuntimeConfig::new();
        cfg.memory.capacity = 0;
        assert!(Runtime::new("x", cfg).is_err());
    }
}
