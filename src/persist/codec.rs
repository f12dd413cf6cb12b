//! Versioned binary model file with a trailing SHA-256 digest.
//!
//! Layout (all integers little-endian):
//!
//! ```text
//! MAGIC "MNEMOMF" (7)
//! format version    u32
//! id_len            u32
//! type_len          u32
//! id                [u8; id_len]
//! type              [u8; type_len]
//! input_size        u32
//! output_size       u32
//! model version     u64
//! embed_width       u32     E
//! capacity          u32
//! flags             u8      bit 0: memory index built
//! weights           f32 × (input_size * output_size)
//! memory_count      u64
//! records           fixed-size record × memory_count, oldest first
//! sha256            [u8; 32] over every preceding byte
//! ```
//!
//! A record is `embedding f32×E | output f32×W | timestamp i64 | has_id u8 |
//! id_len u32 | id [u8; 32]` with `W = min(output_size, E)`.
//!
//! Loading checks magic and version first, then the digest, then parses
//! with bounds checks. Any failure returns an error and no model.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::{info, warn};

use super::bytes::{ByteReader, ByteWriter};
use crate::error::{MnemoError, Result};
use crate::memory::{MemoryRecord, MemoryStore, MAX_CAPACITY, MAX_RECORD_ID_LEN};
use crate::model::{Model, MAX_NAME_LEN};

/// File magic.
pub const MAGIC: &[u8; 7] = b"MNEMOMF";

/// Current (and only) format version.
pub const FORMAT_VERSION: u32 = 1;

/// Length of the trailing digest.
pub const HASH_LEN: usize = 32;

/// Widest embedding a file may declare.
pub const MAX_EMBED_WIDTH: usize = 1 << 16;

const FLAG_INDEXED: u8 = 0b0000_0001;

/// Serialize a model and its memory.
pub fn encode(model: &Model) -> Result<Vec<u8>> {
    let store = model.memory();
    let mut w = ByteWriter::with_capacity(64 + model.weights().len() * 4);

    w.put_bytes(MAGIC);
    w.put_u32(FORMAT_VERSION);
    w.put_len(model.id().len())?;
    w.put_len(model.model_type().len())?;
    w.put_bytes(model.id().as_bytes());
    w.put_bytes(model.model_type().as_bytes());
    w.put_len(model.input_size())?;
    w.put_len(model.output_size())?;
    w.put_u64(model.version());
    w.put_len(store.embed_width())?;
    w.put_len(store.capacity())?;
    w.put_u8(if store.is_indexed() { FLAG_INDEXED } else { 0 });
    w.put_f32s(model.weights());

    w.put_u64(store.len() as u64);
    for record in store.iter() {
        put_record(&mut w, record);
    }

    let digest = Sha256::digest(w.as_slice());
    w.put_bytes(&digest);
    Ok(w.into_inner())
}

fn put_record(w: &mut ByteWriter, record: &MemoryRecord) {
    w.put_f32s(record.embedding());
    w.put_f32s(record.output());
    w.put_i64(record.timestamp());

    let id = record.id().unwrap_or("");
    w.put_u8(u8::from(record.id().is_some()));
    w.put_u32(id.len() as u32);
    let mut padded = [0u8; MAX_RECORD_ID_LEN];
    padded[..id.len()].copy_from_slice(id.as_bytes());
    w.put_bytes(&padded);
}

/// Parse a model file. Fails closed on any inconsistency.
pub fn decode(data: &[u8]) -> Result<Model> {
    if data.len() < MAGIC.len() || &data[..MAGIC.len()] != MAGIC {
        return Err(MnemoError::InvalidMagic);
    }
    let mut r = ByteReader::new(data);
    r.take(MAGIC.len())?;
    let version = r.u32()?;
    if version != FORMAT_VERSION {
        return Err(MnemoError::UnsupportedVersion(version));
    }

    if data.len() < r.position() + HASH_LEN {
        return Err(MnemoError::Corrupt("missing content hash".to_string()));
    }
    let (body, stored) = data.split_at(data.len() - HASH_LEN);
    if Sha256::digest(body).as_slice() != stored {
        warn!(bytes = data.len(), "model file content hash mismatch");
        return Err(MnemoError::HashMismatch);
    }

    let mut r = ByteReader::new(body);
    r.take(MAGIC.len() + 4)?;

    let id_len = bounded(r.len_u32()?, MAX_NAME_LEN, "id length")?;
    let type_len = bounded(r.len_u32()?, MAX_NAME_LEN, "type length")?;
    let id = r.str(id_len)?;
    let model_type = r.str(type_len)?;

    let input_size = r.len_u32()?;
    let output_size = r.len_u32()?;
    let model_version = r.u64()?;
    let embed_width = bounded(r.len_u32()?, MAX_EMBED_WIDTH, "embed width")?;
    let capacity = r.len_u32()?;
    if capacity == 0 || capacity > MAX_CAPACITY {
        return Err(MnemoError::Corrupt(format!("capacity {capacity}")));
    }
    let flags = r.u8()?;

    let params = input_size
        .checked_mul(output_size)
        .ok_or_else(|| MnemoError::Corrupt("weight matrix size overflows".to_string()))?;
    let weights = r.f32s(params)?;

    let output_width = output_size.min(embed_width);
    let mut store = MemoryStore::new(capacity, embed_width, output_width)?;

    let declared = r.u64()?;
    let count = if declared > capacity as u64 {
        warn!(declared, capacity, "memory count exceeds capacity, clamping");
        capacity
    } else {
        declared as usize
    };
    for _ in 0..count {
        read_record(&mut r, &mut store)?;
    }

    if r.remaining() != 0 {
        warn!(trailing = r.remaining(), "model file has unconsumed payload");
        return Err(MnemoError::Corrupt(format!(
            "{} unconsumed bytes after memory records",
            r.remaining()
        )));
    }

    if flags & FLAG_INDEXED != 0 {
        store.build_index();
    }

    Model::from_parts(
        id,
        model_type,
        model_version,
        input_size,
        output_size,
        weights,
        store,
    )
}

fn read_record(r: &mut ByteReader<'_>, store: &mut MemoryStore) -> Result<()> {
    let embedding = r.f32s(store.embed_width())?;
    let output = r.f32s(store.output_width())?;
    let timestamp = r.i64()?;
    let has_id = r.u8()?;
    let id_len = bounded(r.len_u32()?, MAX_RECORD_ID_LEN, "record id length")?;
    let raw = r.take(MAX_RECORD_ID_LEN)?;

    let id = match has_id {
        0 => None,
        1 => Some(
            std::str::from_utf8(&raw[..id_len])
                .map_err(|e| MnemoError::Corrupt(format!("record id: {e}")))?,
        ),
        other => return Err(MnemoError::Corrupt(format!("record id flag {other}"))),
    };
    store.add(&embedding, &output, timestamp, id)
}

fn bounded(value: usize, max: usize, what: &str) -> Result<usize> {
    if value > max {
        return Err(MnemoError::Corrupt(format!("{what} {value} exceeds {max}")));
    }
    Ok(value)
}

/// Write a model file.
///
/// Not atomic: a crash mid-write can leave a truncated file, which a later
/// [`load_model`] rejects. Use [`save_atomic`] when that matters.
pub fn save_model<P: AsRef<Path>>(model: &Model, path: P) -> Result<()> {
    let path = path.as_ref();
    let bytes = encode(model)?;
    fs::write(path, &bytes)?;
    info!(
        model = %model.version_string(),
        path = %path.display(),
        bytes = bytes.len(),
        "model saved"
    );
    Ok(())
}

/// Write to a sibling temporary file, sync it, then rename over `path`.
pub fn save_atomic<P: AsRef<Path>>(model: &Model, path: P) -> Result<()> {
    let path = path.as_ref();
    let bytes = encode(model)?;
    replace_file(path, &bytes)?;

    info!(
        model = %model.version_string(),
        path = %path.display(),
        "checkpoint written"
    );
    Ok(())
}

/// Replace `path` with `bytes` through a synced temporary file. On failure
/// the temporary file is removed and `path` keeps its old contents.
pub(crate) fn replace_file(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = temp_path(path);
    let write = || -> Result<()> {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        fs::rename(&tmp, path)?;
        Ok(())
    };

    write().map_err(|e| {
        match fs::remove_file(&tmp) {
            Ok(()) => {}
            Err(cleanup) if cleanup.kind() == ErrorKind::NotFound => {}
            Err(cleanup) => warn!(
                tmp = %tmp.display(),
                error = %cleanup,
                "failed to remove temporary file"
            ),
        }
        e
    })
}

/// Read and verify a model file.
pub fn load_model<P: AsRef<Path>>(path: P) -> Result<Model> {
    let path = path.as_ref();
    let data = fs::read(path)?;
    let model = decode(&data)?;
    info!(
        model = %model.version_string(),
        path = %path.display(),
        records = model.memory().len(),
        "model loaded"
    );
    Ok(model)
}

pub(crate) fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
