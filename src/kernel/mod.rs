//! Kernel layer: a locked model registry and a caller-driven task queue.
//!
//! The [`Kernel`] moves through `Uninitialized → Initialized → ShutDown`.
//! One [`parking_lot::Mutex`] guards the registry, the queue and the
//! counters; it is held only long enough to touch them. [`Kernel::step`]
//! pops a task under the lock, releases it, and runs the task inline on the
//! calling thread. There is no background worker: nothing runs unless a
//! caller steps.
//!
//! Models are opaque to the kernel. A [`ModelHandle`] is an
//! `Arc<RwLock<Model>>` and registry membership is pointer identity.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use parking_lot::RwLock;
//! use mnemo::kernel::{Kernel, Task};
//! use mnemo::config::MemoryConfig;
//! use mnemo::Model;
//!
//! let kernel = Kernel::new();
//! kernel.init().unwrap();
//!
//! let model = Arc::new(RwLock::new(
//!     Model::new("m", "linear", 2, 1, MemoryConfig::default()).unwrap(),
//! ));
//! kernel.register_model(&model).unwrap();
//! kernel.run_on(&model, "warm", |m| m.init_weights(0.1, 1)).unwrap();
//! kernel.run(Task::new("noop", || {})).unwrap();
//!
//! assert_eq!(kernel.step().unwrap(), "warm");
//! assert_eq!(kernel.step().unwrap(), "noop");
//! assert!(kernel.step().is_err());
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tracing::{debug, info};

use crate::error::{MnemoError, Result};
use crate::model::Model;

/// Shared, lockable model owned jointly by the caller and the kernel.
pub type ModelHandle = Arc<RwLock<Model>>;

/// A labeled unit of work.
pub struct Task {
    label: String,
    job: Box<dyn FnOnce() + Send + 'static>,
}

impl Task {
    pub fn new<L, F>(label: L, job: F) -> Self
    where
        L: Into<String>,
        F: FnOnce() + Send + 'static,
    {
        Self {
            label: label.into(),
            job: Box::new(job),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task").field("label", &self.label).finish()
    }
}

/// Lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum KernelState {
    Uninitialized,
    Initialized,
    ShutDown,
}

/// Counters read under the lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct KernelSnapshot {
    pub state: KernelState,
    pub models_registered: usize,
    pub tasks_pending: usize,
    pub steps_executed: u64,
}

impl fmt::Display for KernelSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "state={:?} models={} pending={} steps={}",
            self.state, self.models_registered, self.tasks_pending, self.steps_executed
        )
    }
}

struct Inner {
    state: KernelState,
    registry: Vec<ModelHandle>,
    queue: VecDeque<Task>,
    steps: u64,
}

impl Inner {
    fn require_initialized(&self) -> Result<()> {
        match self.state {
            KernelState::Initialized => Ok(()),
            KernelState::Uninitialized => Err(MnemoError::KernelState("not initialized")),
            KernelState::ShutDown => Err(MnemoError::KernelState("shut down")),
        }
    }

    fn position(&self, handle: &ModelHandle) -> Option<usize> {
        self.registry.iter().position(|h| Arc::ptr_eq(h, handle))
    }
}

/// Model registry plus FIFO task queue.
pub struct Kernel {
    inner: Mutex<Inner>,
}

impl Default for Kernel {
    fn default() -> Self {
        Self::new()
    }
}

impl Kernel {
    /// A kernel in the `Uninitialized` state.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: KernelState::Uninitialized,
                registry: Vec::new(),
                queue: VecDeque::new(),
                steps: 0,
            }),
        }
    }

    pub fn state(&self) -> KernelState {
        self.inner.lock().state
    }

    pub fn init(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        match inner.state {
            KernelState::Uninitialized => {
                inner.state = KernelState::Initialized;
                info!("kernel initialized");
                Ok(())
            }
            KernelState::Initialized => Err(MnemoError::KernelState("already initialized")),
            KernelState::ShutDown => Err(MnemoError::KernelState("shut down")),
        }
    }

    /// Drop every pending task and registration. Terminal.
    ///
    /// Returns the number of tasks discarded. Their closures are dropped
    /// after the lock is released.
    pub fn shutdown(&self) -> Result<usize> {
        let (tasks, models) = {
            let mut inner = self.inner.lock();
            inner.require_initialized()?;
            inner.state = KernelState::ShutDown;
            (
                std::mem::take(&mut inner.queue),
                std::mem::take(&mut inner.registry),
            )
        };
        let discarded = tasks.len();
        info!(discarded, models = models.len(), "kernel shut down");
        Ok(discarded)
    }

    /// Add a handle. Registering one already present is a successful no-op;
    /// the return value says whether it was newly added.
    pub fn register_model(&self, handle: &ModelHandle) -> Result<bool> {
        let mut inner = self.inner.lock();
        inner.require_initialized()?;
        if inner.position(handle).is_some() {
            return Ok(false);
        }
        inner.registry.push(Arc::clone(handle));
        Ok(true)
    }

    /// Remove a handle. Fails with [`MnemoError::NotRegistered`] if absent.
    pub fn unregister_model(&self, handle: &ModelHandle) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.require_initialized()?;
        let pos = inner.position(handle).ok_or(MnemoError::NotRegistered)?;
        inner.registry.remove(pos);
        Ok(())
    }

    pub fn is_registered(&self, handle: &ModelHandle) -> bool {
        self.inner.lock().position(handle).is_some()
    }

    /// Clones of every registered handle, in registration order.
    pub fn models(&self) -> Vec<ModelHandle> {
        self.inner.lock().registry.clone()
    }

    /// Enqueue a task at the tail and return immediately.
    pub fn run(&self, task: Task) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.require_initialized()?;
        inner.queue.push_back(task);
        Ok(())
    }

    /// Enqueue a task that takes the write lock on a registered model.
    pub fn run_on<L, F>(&self, handle: &ModelHandle, label: L, f: F) -> Result<()>
    where
        L: Into<String>,
        F: FnOnce(&mut Model) + Send + 'static,
    {
        let mut inner = self.inner.lock();
        inner.require_initialized()?;
        if inner.position(handle).is_none() {
            return Err(MnemoError::NotRegistered);
        }
        let model = Arc::clone(handle);
        inner.queue.push_back(Task::new(label, move || f(&mut model.write())));
        Ok(())
    }

    /// Dequeue one task and run it on this thread, outside the lock.
    ///
    /// Returns the task's label, or [`MnemoError::NoTask`] without blocking
    /// when the queue is empty.
    pub fn step(&self) -> Result<String> {
        let task = {
            let mut inner = self.inner.lock();
            inner.require_initialized()?;
            inner.queue.pop_front().ok_or(MnemoError::NoTask)?
        };

        let Task { label, job } = task;
        job();

        self.inner.lock().steps += 1;
        debug!(task = %label, "task stepped");
        Ok(label)
    }

    /// Step until the queue is empty. Returns the number of tasks run.
    pub fn drain(&self) -> Result<usize> {
        let mut n = 0;
        loop {
            match self.step() {
                Ok(_) => n += 1,
                Err(MnemoError::NoTask) => return Ok(n),
                Err(e) => return Err(e),
            }
        }
    }

    pub fn audit_snapshot(&self) -> KernelSnapshot {
        let inner = self.inner.lock();
        KernelSnapshot {
            state: inner.state,
            models_registered: inner.registry.len(),
            tasks_pending: inner.queue.len(),
            steps_executed: inner.steps,
        }
    }

    /// One-line human-readable summary of [`audit_snapshot`](Self::audit_snapshot).
    pub fn introspect(&self) -> String {
        self.audit_snapshot().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MemoryConfig;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn handle(id: &str) -> ModelHandle {
        Arc::new(RwLock::new(
            Model::new(id, "linear", 2, 1, MemoryConfig::default()).unwrap(),
        ))
    }

    fn ready() -> Kernel {
        let k = Kernel::new();
        k.init().unwrap();
        k
    }

    #[test]
    fn test_lifecycle() {
        let k = Kernel::new();
        assert_eq!(k.state(), KernelState::Uninitialized);
        assert!(matches!(k.run(Task::new("x", || {})), Err(MnemoError::KernelState(_))));
        assert!(k.shutdown().is_err());

        k.init().unwrap();
        assert!(k.init().is_err());
        k.run(Task::new("pending", || {})).unwrap();
        assert_eq!(k.shutdown().unwrap(), 1);

        assert_eq!(k.state(), KernelState::ShutDown);
        assert!(k.init().is_err());
        assert!(k.step().is_err());
        assert!(k.register_model(&handle("m")).is_err());
    }

    #[test]
    fn test_register_is_idempotent() {
        let k = ready();
        let a = handle("a");
        assert!(k.register_model(&a).unwrap());
        assert!(!k.register_model(&a).unwrap());
        assert_eq!(k.audit_snapshot().models_registered, 1);

        // Same contents, different handle
        let twin = handle("a");
        assert!(!k.is_registered(&twin));
        assert!(matches!(k.unregister_model(&twin), Err(MnemoError::NotRegistered)));

        k.unregister_model(&a).unwrap();
        assert!(k.models().is_empty());
    }

    #[test]
    fn test_fifo_order() {
        let k = ready();
        for label in ["a", "b", "c"] {
            k.run(Task::new(label, || {})).unwrap();
        }
        let order: Vec<String> = (0..3).map(|_| k.step().unwrap()).collect();
        assert_eq!(order, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_empty_step_is_no_task() {
        let k = ready();
        assert!(matches!(k.step(), Err(MnemoError::NoTask)));
        assert_eq!(k.drain().unwrap(), 0);
    }

    #[test]
    fn test_run_on_mutates_registered_model() {
        let k = ready();
        let m = handle("m");
        assert!(matches!(
            k.run_on(&m, "init", |m| m.init_weights(1.0, 5)),
            Err(MnemoError::NotRegistered)
        ));

        k.register_model(&m).unwrap();
        k.run_on(&m, "init", |m| m.init_weights(1.0, 5)).unwrap();
        assert!(m.read().weights().iter().all(|&w| w == 0.0));

        k.step().unwrap();
        assert!(m.read().weights().iter().any(|&w| w != 0.0));
    }

    #[test]
    fn test_task_may_use_kernel() {
        // The lock is released while a task runs, so tasks can enqueue more work
        let k = Arc::new(ready());
        let inner = Arc::clone(&k);
        k.run(Task::new("outer", move || {
            inner.run(Task::new("inner", || {})).unwrap();
        }))
        .unwrap();

        assert_eq!(k.drain().unwrap(), 2);
        assert_eq!(k.audit_snapshot().steps_executed, 2);
    }

    #[test]
    fn test_concurrent_registry_and_queue() {
        const THREADS: usize = 8;
        const PER_THREAD: usize = 200;

        let k = ready();
        let counter = Arc::new(AtomicUsize::new(0));
        let handles: Vec<ModelHandle> = (0..THREADS).map(|i| handle(&format!("m{i}"))).collect();

        std::thread::scope(|s| {
            for h in &handles {
                let k = &k;
                let counter = &counter;
                s.spawn(move || {
                    for _ in 0..PER_THREAD {
                        k.register_model(h).unwrap();
                        let c = Arc::clone(counter);
                        k.run(Task::new("inc", move || {
                            c.fetch_add(1, Ordering::SeqCst);
                        }))
                        .unwrap();
                        k.unregister_model(h).unwrap();
                    }
                    k.register_model(h).unwrap();
                });
            }
        });

        let snap = k.audit_snapshot();
        assert_eq!(snap.models_registered, THREADS);
        assert_eq!(snap.tasks_pending, THREADS * PER_THREAD);

        std::thread::scope(|s| {
            for _ in 0..THREADS {
                let k = &k;
                s.spawn(move || while k.step().is_ok() {});
            }
        });

        assert_eq!(counter.load(Ordering::SeqCst), THREADS * PER_THREAD);
        let snap = k.audit_snapshot();
        assert_eq!(snap.tasks_pending, 0);
        assert_eq!(snap.steps_executed, (THREADS * PER_THREAD) as u64);
    }

    #[test]
    fn test_introspect() {
        let k = ready();
        k.register_model(&handle("m")).unwrap();
        assert_eq!(k.introspect(), "state=Initialized models=1 pending=0 steps=0");
    }
}
