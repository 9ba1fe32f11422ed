//! Little-endian state encoding for snapshots.
//!
//! Every component writes its state with [`StateWriter`] and reads it back
//! with [`StateReader`]. Reads are bounds-checked; a short buffer is an
//! error, never a panic.

use thiserror::Error;

/// Component state could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    #[error("state truncated: needed {needed} bytes at offset {offset}, {available} available")]
    Truncated {
        offset: usize,
        needed: usize,
        available: usize,
    },
    #[error("invalid state value: {0}")]
    Invalid(&'static str),
    #[error("{0} unread trailing bytes")]
    TrailingBytes(usize),
}

pub type Result<T> = std::result::Result<T, StateError>;

/// A component whose complete state can be saved and restored.
pub trait SaveState {
    fn save_state(&self, w: &mut StateWriter);

    /// Restore state written by `save_state`. On error the component may
    /// be partially overwritten; callers restore into a staging copy.
    fn load_state(&mut self, r: &mut StateReader<'_>) -> Result<()>;
}

/// Append-only little-endian encoder.
#[derive(Debug, Default)]
pub struct StateWriter {
    buf: Vec<u8>,
}

impl StateWriter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn put_bool(&mut self, v: bool) {
        self.buf.push(u8::from(v));
    }

    pub fn put_u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_i32(&mut self, v: i32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_f32(&mut self, v: f32) {
        self.put_u32(v.to_bits());
    }

    /// Raw bytes, no length prefix.
    pub fn put_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// `u32` length prefix followed by the bytes.
    pub fn put_blob(&mut self, bytes: &[u8]) {
        self.put_u32(bytes.len() as u32);
        self.buf.extend_from_slice(bytes);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// Bounds-checked little-endian decoder over a borrowed buffer.
#[derive(Debug)]
pub struct StateReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> StateReader<'a> {
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    #[must_use]
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        if len > self.remaining() {
            return Err(StateError::Truncated {
                offset: self.pos,
                needed: len,
                available: self.remaining(),
            });
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    pub fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.bytes(N)?);
        Ok(out)
    }

    pub fn u8(&mut self) -> Result<u8> {
        Ok(self.array::<1>()?[0])
    }

    pub fn bool(&mut self) -> Result<bool> {
        match self.u8()? {
            0 => Ok(false),
            1 => Ok(true),
            _ => Err(StateError::Invalid("boolean out of range")),
        }
    }

    pub fn u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.array()?))
    }

    pub fn u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    pub fn u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.array()?))
    }

    pub fn i32(&mut self) -> Result<i32> {
        Ok(i32::from_le_bytes(self.array()?))
    }

    pub fn f32(&mut self) -> Result<f32> {
        Ok(f32::from_bits(self.u32()?))
    }

    /// Length-prefixed bytes written by `put_blob`.
    pub fn blob(&mut self) -> Result<&'a [u8]> {
        let len = self.u32()? as usize;
        self.bytes(len)
    }

    /// Require that every byte was consumed.
    pub fn finish(&self) -> Result<()> {
        match self.remaining() {
            0 => Ok(()),
            n => Err(StateError::TrailingBytes(n)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mixed_fields_read_back_in_order() {
        let mut w = StateWriter::new();
        w.put_u8(0x12);
        w.put_bool(true);
        w.put_u16(0xBEEF);
        w.put_u64(1 << 40);
        w.put_i32(-5);
        w.put_f32(0.25);
        w.put_blob(b"abc");
        let bytes = w.into_bytes();

        let mut r = StateReader::new(&bytes);
        assert_eq!(r.u8().unwrap(), 0x12);
        assert!(r.bool().unwrap());
        assert_eq!(r.u16().unwrap(), 0xBEEF);
        assert_eq!(r.u64().unwrap(), 1 << 40);
        assert_eq!(r.i32().unwrap(), -5);
        assert!((r.f32().unwrap() - 0.25).abs() < f32::EPSILON);
        assert_eq!(r.blob().unwrap(), b"abc");
        r.finish().unwrap();
    }

    #[test]
    fn short_buffer_is_truncated_error() {
        let mut r = StateReader::new(&[1, 2, 3]);
        assert_eq!(
            r.u32(),
            Err(StateError::Truncated {
                offset: 0,
                needed: 4,
                available: 3
            })
        );
    }

    #[test]
    fn blob_length_past_end_is_truncated() {
        let mut w = StateWriter::new();
        w.put_u32(100);
        w.put_bytes(&[0; 10]);
        let bytes = w.into_bytes();
        let mut r = StateReader::new(&bytes);
        assert!(matches!(r.blob(), Err(StateError::Truncated { needed: 100, .. })));
    }

    #[test]
    fn invalid_bool_rejected() {
        let mut r = StateReader::new(&[2]);
        assert_eq!(r.bool(), Err(StateError::Invalid("boolean out of range")));
    }

    #[test]
    fn trailing_bytes_detected() {
        let mut r = StateReader::new(&[0, 0]);
        r.u8().unwrap();
        assert_eq!(r.finish(), Err(StateError::TrailingBytes(1)));
    }
}
