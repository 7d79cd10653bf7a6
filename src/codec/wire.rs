//! Low-level big-endian reading and writing.
//!
//! Every multi-byte integer on the wire is Big Endian. Strings and byte
//! blobs carry a `u32` length prefix.
//!
//! [`WireReader`] borrows its input and never mutates it, so a decode that
//! fails with [`CodecError::InsufficientData`] can simply be retried from
//! the same starting slice once more bytes have arrived.

use bytes::{BufMut, BytesMut};

use crate::error::CodecError;

/// Cursor over a borrowed byte slice.
#[derive(Debug, Clone)]
pub struct WireReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Bytes consumed so far.
    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes not yet consumed.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Unconsumed tail of the input.
    #[inline]
    pub fn rest(&self) -> &'a [u8] {
        &self.buf[self.pos..]
    }

    /// Consume exactly `n` bytes.
    pub fn take(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        if self.remaining() < n {
            return Err(CodecError::InsufficientData {
                needed: self.pos + n,
                available: self.buf.len(),
            });
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u32(&mut self) -> Result<u32, CodecError> {
        Ok(u32::from_be_bytes(self.take_array()?))
    }

    pub fn read_u64(&mut self) -> Result<u64, CodecError> {
        Ok(u64::from_be_bytes(self.take_array()?))
    }

    pub fn read_i64(&mut self) -> Result<i64, CodecError> {
        Ok(i64::from_be_bytes(self.take_array()?))
    }

    pub fn read_f64(&mut self) -> Result<f64, CodecError> {
        Ok(f64::from_bits(self.read_u64()?))
    }

    /// Read a 0/1 flag byte.
    pub fn read_flag(&mut self) -> Result<bool, CodecError> {
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(CodecError::Malformed(format!(
                "flag byte must be 0 or 1, got {}",
                other
            ))),
        }
    }

    /// Read a `u32`-length-prefixed byte blob.
    pub fn read_blob(&mut self) -> Result<&'a [u8], CodecError> {
        let len = self.read_u32()? as usize;
        self.take(len)
    }

    /// Read a `u32`-length-prefixed UTF-8 string.
    pub fn read_string(&mut self) -> Result<String, CodecError> {
        let raw = self.read_blob()?;
        std::str::from_utf8(raw)
            .map(str::to_owned)
            .map_err(|e| CodecError::Malformed(format!("invalid UTF-8: {}", e)))
    }

    /// Read a fixed-size byte array.
    pub fn read_fixed<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        self.take_array()
    }

    /// Fail with `Malformed` unless all input was consumed.
    pub fn expect_end(&self) -> Result<(), CodecError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(CodecError::Malformed(format!(
                "{} trailing bytes",
                self.remaining()
            )))
        }
    }
}

/// Append a `u32`-length-prefixed byte blob.
#[inline]
pub fn put_blob(buf: &mut BytesMut, data: &[u8]) {
    buf.put_u32(data.len() as u32);
    buf.put_slice(data);
}

/// Append a `u32`-length-prefixed UTF-8 string.
#[inline]
pub fn put_string(buf: &mut BytesMut, s: &str) {
    put_blob(buf, s.as_bytes());
}
