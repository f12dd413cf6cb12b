//! Little-endian byte buffers with bounds-checked reads.
//!
//! [`ByteReader`] never panics on short input: every read checks the
//! remaining length first and reports [`MnemoError::Corrupt`] instead.

use crate::error::{MnemoError, Result};

/// Append-only little-endian writer over a `Vec<u8>`.
#[derive(Debug, Default)]
pub struct ByteWriter {
    buf: Vec<u8>,
}

impl ByteWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }

    pub fn put_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn put_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn put_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_i64(&mut self, v: i64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_f32s(&mut self, values: &[f32]) {
        self.buf.reserve(values.len() * 4);
        for v in values {
            self.buf.extend_from_slice(&v.to_le_bytes());
        }
    }

    /// Write `value` as a `usize` that must fit in `u32`.
    pub fn put_len(&mut self, value: usize) -> Result<()> {
        let v = u32::try_from(value)
            .map_err(|_| MnemoError::InvalidArgument(format!("length {value} exceeds u32")))?;
        self.put_u32(v);
        Ok(())
    }
}

/// Cursor over a borrowed byte slice.
#[derive(Debug)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Take the next `n` bytes.
    pub fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if n > self.remaining() {
            return Err(MnemoError::Corrupt(format!(
                "need {n} bytes at offset {}, {} left",
                self.pos,
                self.remaining()
            )));
        }
        let out = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn u8(&mut self) -> Result<u8> {
        Ok(self.array::<1>()?[0])
    }

    pub fn u32(&mut self) -> Result<u32> {
        self.array().map(u32::from_le_bytes)
    }

    pub fn u64(&mut self) -> Result<u64> {
        self.array().map(u64::from_le_bytes)
    }

    pub fn i64(&mut self) -> Result<i64> {
        self.array().map(i64::from_le_bytes)
    }

    /// A `u32` widened to `usize`.
    pub fn len_u32(&mut self) -> Result<usize> {
        Ok(self.u32()? as usize)
    }

    /// `count` consecutive `f32`s. The byte length is checked against the
    /// remaining input before anything is allocated.
    pub fn f32s(&mut self, count: usize) -> Result<Vec<f32>> {
        let bytes = count
            .checked_mul(4)
            .ok_or_else(|| MnemoError::Corrupt(format!("f32 count {count} overflows")))?;
        let raw = self.take(bytes)?;
        Ok(raw
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect())
    }

    /// A UTF-8 string of exactly `len` bytes.
    pub fn str(&mut self, len: usize) -> Result<String> {
        let raw = self.take(len)?;
        std::str::from_utf8(raw)
            .map(str::to_string)
            .map_err(|e| MnemoError::Corrupt(format!("invalid UTF-8: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_little_endian_layout() {
        let mut w = ByteWriter::new();
        w.put_u32(1);
        w.put_u64(2);
        assert_eq!(w.as_slice(), &[1, 0, 0, 0, 2, 0, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_read_back() {
        let mut w = ByteWriter::new();
        w.put_u8(7);
        w.put_i64(-3);
        w.put_f32s(&[1.5, -2.0]);
        w.put_bytes(b"hi");

        let bytes = w.into_inner();
        let mut r = ByteReader::new(&bytes);
        assert_eq!(r.u8().unwrap(), 7);
        assert_eq!(r.i64().unwrap(), -3);
        assert_eq!(r.f32s(2).unwrap(), vec![1.5, -2.0]);
        assert_eq!(r.str(2).unwrap(), "hi");
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn test_short_read_is_corrupt() {
        let mut r = ByteReader::new(&[1, 2, 3]);
        assert!(matches!(r.u32(), Err(MnemoError::Corrupt(_))));
        // A failed read does not advance
        assert_eq!(r.position(), 0);
    }

    #[test]
    fn test_huge_count_rejected_before_alloc() {
        let mut r = ByteReader::new(&[0; 8]);
        assert!(r.f32s(usize::MAX).is_err());
        assert!(r.f32s(1 << 40).is_err());
    }

    #[test]
    fn test_invalid_utf8() {
        let mut r = ByteReader::new(&[0xff, 0xfe]);
        assert!(matches!(r.str(2), Err(MnemoError::Corrupt(_))));
    }
}
