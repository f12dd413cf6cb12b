//! Input bundles and their content hash.
//!
//! A [`Context`] collects the blobs fed to one training or inference call.
//! [`context_hash`] concatenates their payloads in insertion order and hashes
//! the result, so the same bundle always fingerprints the same way. Media
//! types label blobs but do not enter the hash.

use sha2::{Digest, Sha256};

/// A binary payload with a media type such as `"text/plain"` or `"image/png"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    pub data: Vec<u8>,
    pub media_type: String,
}

impl Blob {
    pub fn new<D: Into<Vec<u8>>, M: Into<String>>(data: D, media_type: M) -> Self {
        Self {
            data: data.into(),
            media_type: media_type.into(),
        }
    }

    /// UTF-8 text blob.
    pub fn text(text: &str) -> Self {
        Self::new(text.as_bytes(), "text/plain")
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// SHA-256 over the concatenated payloads.
pub fn context_hash(blobs: &[Blob]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for blob in blobs {
        hasher.update(&blob.data);
    }
    hasher.finalize().into()
}

/// An identified, ordered bundle of blobs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Context {
    id: String,
    blobs: Vec<Blob>,
}

impl Context {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            blobs: Vec::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn add(&mut self, blob: Blob) -> &mut Self {
        self.blobs.push(blob);
        self
    }

    pub fn blobs(&self) -> &[Blob] {
        &self.blobs
    }

    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }

    pub fn hash(&self) -> [u8; 32] {
        context_hash(&self.blobs)
    }

    pub fn hash_hex(&self) -> String {
        hex::encode(self.hash())
    }
}
