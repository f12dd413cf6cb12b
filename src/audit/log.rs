//! Append-only, hash-chained audit log.
//!
//! Each record is `op_tag u8 | dataset_id_len u32 | dataset_id | hash [u8; 32]`
//! where `hash = sha256(previous_hash ‖ op_tag ‖ dataset_id)` and the first
//! entry chains from 32 zero bytes. Removing, reordering or editing any
//! entry breaks every hash after it, which [`AuditLog::verify`] reports.
//!
//! Within a process, appends and erases on one file are serialized, and an
//! append reads the chain head and writes its record through a single
//! handle opened in append mode. Separate processes are ordered only by the
//! filesystem's append atomicity.

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};

use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::error::{MnemoError, Result};
use crate::persist::bytes::{ByteReader, ByteWriter};
use crate::persist::codec::replace_file;

/// One writer lock per log file, shared by every [`AuditLog`] handle in
/// the process that names it.
static WRITE_LOCKS: LazyLock<Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

fn write_lock(path: &Path) -> Arc<Mutex<()>> {
    let key = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    Arc::clone(WRITE_LOCKS.lock().entry(key).or_default())
}

/// Hash every chain starts from.
pub const GENESIS_HASH: [u8; 32] = [0; 32];

/// Training control-plane operation recorded in the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OpTag {
    Train = 1,
    Retrain = 2,
    Untrain = 3,
    Erase = 4,
}

impl OpTag {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            1 => Some(OpTag::Train),
            2 => Some(OpTag::Retrain),
            3 => Some(OpTag::Untrain),
            4 => Some(OpTag::Erase),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OpTag::Train => "train",
            OpTag::Retrain => "retrain",
            OpTag::Untrain => "untrain",
            OpTag::Erase => "erase",
        }
    }
}

/// One parsed log record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEntry {
    pub op: OpTag,
    pub dataset_id: String,
    pub hash: [u8; 32],
}

impl AuditEntry {
    pub fn hash_hex(&self) -> String {
        hex::encode(self.hash)
    }
}

/// `sha256(prev ‖ op ‖ dataset_id)`.
pub fn chain_hash(prev: &[u8; 32], op: OpTag, dataset_id: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(prev);
    hasher.update([op as u8]);
    hasher.update(dataset_id.as_bytes());
    hasher.finalize().into()
}

fn parse_entries(data: &[u8]) -> Result<Vec<AuditEntry>> {
    let mut r = ByteReader::new(data);
    let mut entries = Vec::new();
    while r.remaining() > 0 {
        let raw = r.u8()?;
        let op = OpTag::from_u8(raw)
            .ok_or_else(|| MnemoError::Corrupt(format!("unknown audit op tag {raw}")))?;
        let len = r.len_u32()?;
        let dataset_id = r.str(len)?;
        let mut hash = [0u8; 32];
        hash.copy_from_slice(r.take(32)?);
        entries.push(AuditEntry {
            op,
            dataset_id,
            hash,
        });
    }
    Ok(entries)
}

fn encode_entry(w: &mut ByteWriter, entry: &AuditEntry) -> Result<()> {
    w.put_u8(entry.op as u8);
    w.put_len(entry.dataset_id.len())?;
    w.put_bytes(entry.dataset_id.as_bytes());
    w.put_bytes(&entry.hash);
    Ok(())
}

/// Handle to one log file. Holds no open descriptor between calls.
#[derive(Debug, Clone)]
pub struct AuditLog {
    path: PathBuf,
}

impl AuditLog {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parse every entry. A missing file is an empty log.
    pub fn entries(&self) -> Result<Vec<AuditEntry>> {
        let data = match fs::read(&self.path) {
            Ok(d) => d,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        parse_entries(&data)
    }

    /// Append one entry chained to the current tail.
    pub fn append(&self, op: OpTag, dataset_id: &str) -> Result<AuditEntry> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let lock = write_lock(&self.path);
        let _guard = lock.lock();

        let mut file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&self.path)?;
        let mut data = Vec::new();
        file.read_to_end(&mut data)?;
        let head = parse_entries(&data)?
            .last()
            .map_or(GENESIS_HASH, |e| e.hash);

        let entry = AuditEntry {
            op,
            dataset_id: dataset_id.to_string(),
            hash: chain_hash(&head, op, dataset_id),
        };
        let mut w = ByteWriter::new();
        encode_entry(&mut w, &entry)?;
        file.write_all(w.as_slice())?;
        file.flush()?;

        debug!(
            log = %self.path.display(),
            op = op.as_str(),
            dataset = dataset_id,
            "audit entry appended"
        );
        Ok(entry)
    }

    /// Recompute the chain. Returns the number of entries on success.
    pub fn verify(&self) -> Result<usize> {
        let entries = self.entries()?;
        let mut prev = GENESIS_HASH;
        for (index, entry) in entries.iter().enumerate() {
            if chain_hash(&prev, entry.op, &entry.dataset_id) != entry.hash {
                warn!(log = %self.path.display(), index, "audit chain broken");
                return Err(MnemoError::ChainBroken { index });
            }
            prev = entry.hash;
        }
        Ok(entries.len())
    }

    /// Drop the train/retrain/untrain entries that reference `dataset_id`,
    /// re-chain the survivors and replace the file via temp file + rename.
    ///
    /// Earlier erase entries are kept. Returns the number removed; the file
    /// is left untouched when nothing matches.
    pub fn erase(&self, dataset_id: &str) -> Result<usize> {
        let lock = write_lock(&self.path);
        let _guard = lock.lock();

        let entries = self.entries()?;
        let before = entries.len();
        let kept: Vec<AuditEntry> = entries
            .into_iter()
            .filter(|e| e.op == OpTag::Erase || e.dataset_id != dataset_id)
            .collect();
        let removed = before - kept.len();
        if removed == 0 {
            return Ok(0);
        }

        let mut w = ByteWriter::new();
        let mut prev = GENESIS_HASH;
        for mut entry in kept {
            entry.hash = chain_hash(&prev, entry.op, &entry.dataset_id);
            prev = entry.hash;
            encode_entry(&mut w, &entry)?;
        }

        replace_file(&self.path, w.as_slice())?;

        info!(
            log = %self.path.display(),
            dataset = dataset_id,
            removed,
            "audit entries erased"
        );
        Ok(removed)
    }
}
