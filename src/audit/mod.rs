//! Audit layer: tamper-evident records of the training control plane.
//!
//! - [`Core`] owns one directory of audit logs, one file per model, and
//!   exposes the control-plane operations (`train_op`, `retrain_op`,
//!   `untrain_op`, `erase`) plus the side-effect-free [`Core::audit`].
//! - [`log`]: the hash-chained append-only file format.
//! - [`context`]: input bundles and [`context_hash`].
//!
//! # Example
//!
//! ```rust
//! use mnemo::audit::Core;
//!
//! let dir = std::env::temp_dir().join("mnemo-audit-doc");
//! let core = Core::new("core-a", &dir);
//! let log = core.log_for("model-1");
//! core.train_op("model-1", "dataset-2024").unwrap();
//! assert!(log.verify().unwrap() >= 1);
//!
//! let rec = core.audit("model-1@v1");
//! assert_eq!(rec.hash, Core::new("elsewhere", &dir).audit("model-1@v1").hash);
//! # std::fs::remove_dir_all(&dir).ok();
//! ```

pub mod context;
pub mod log;

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::info;

use crate::error::Result;

pub use context::{context_hash, Blob, Context};
pub use log::{chain_hash, AuditEntry, AuditLog, OpTag, GENESIS_HASH};

const LOG_EXTENSION: &str = "audit";

/// Content hash of a target, produced on demand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub target_id: String,
    pub algorithm: String,
    pub hash: [u8; 32],
}

impl AuditRecord {
    pub fn hash_hex(&self) -> String {
        hex::encode(self.hash)
    }
}

/// Filesystem-safe name: ASCII alphanumerics, `-` and `_` survive, the rest
/// become `_`. A short digest of the raw name keeps distinct names distinct.
fn file_stem(name: &str) -> String {
    let clean: String = name
        .chars()
        .take(64)
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let digest = Sha256::digest(name.as_bytes());
    format!("{clean}-{}", &hex::encode(digest)[..8])
}

/// A named audit domain rooted at one directory.
#[derive(Debug, Clone)]
pub struct Core {
    id: String,
    dir: PathBuf,
}

impl Core {
    /// Logs for this core live in a subdirectory of `root` derived from `id`.
    pub fn new<P: AsRef<Path>>(id: &str, root: P) -> Self {
        Self {
            id: id.to_string(),
            dir: root.as_ref().join(file_stem(id)),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// The log for one model. The file name is a pure function of the core
    /// and model ids.
    pub fn log_for(&self, model_id: &str) -> AuditLog {
        let name = format!("{}.{LOG_EXTENSION}", file_stem(model_id));
        AuditLog::new(self.dir.join(name))
    }

    pub fn train_op(&self, model_id: &str, dataset_id: &str) -> Result<AuditEntry> {
        self.log_for(model_id).append(OpTag::Train, dataset_id)
    }

    pub fn retrain_op(&self, model_id: &str, dataset_id: &str) -> Result<AuditEntry> {
        self.log_for(model_id).append(OpTag::Retrain, dataset_id)
    }

    pub fn untrain_op(&self, model_id: &str, dataset_id: &str) -> Result<AuditEntry> {
        self.log_for(model_id).append(OpTag::Untrain, dataset_id)
    }

    /// Every log file this core holds.
    pub fn logs(&self) -> Result<Vec<AuditLog>> {
        let read = match fs::read_dir(&self.dir) {
            Ok(r) => r,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut logs = Vec::new();
        for entry in read {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == LOG_EXTENSION) {
                logs.push(AuditLog::new(path));
            }
        }
        logs.sort_by(|a, b| a.path().cmp(b.path()));
        Ok(logs)
    }

    /// Remove references to `dataset_id` from every model log of this core.
    ///
    /// Each log that lost entries gets one `Erase` entry appended, recording
    /// that the removal happened. Returns the total number removed.
    pub fn erase(&self, dataset_id: &str) -> Result<usize> {
        let mut total = 0;
        for log in self.logs()? {
            let removed = log.erase(dataset_id)?;
            if removed > 0 {
                log.append(OpTag::Erase, dataset_id)?;
                total += removed;
            }
        }
        info!(core = %self.id, dataset = dataset_id, removed = total, "dataset erased");
        Ok(total)
    }

    /// SHA-256 of a target identifier. Pure: nothing is written.
    pub fn audit(&self, target_id: &str) -> AuditRecord {
        AuditRecord {
            target_id: target_id.to_string(),
            algorithm: "sha256".to_string(),
            hash: Sha256::digest(target_id.as_bytes()).into(),
        }
    }
}
