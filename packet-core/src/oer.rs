//! Octet Encoding Rules (OER) primitives
//!
//! Deterministic byte representation used by ILP packets and the peer
//! protocols. Fixed-width integers are big-endian; variable-length octet
//! strings carry a length prefix that is a single byte below 128 and
//! `0x80 | n` followed by `n` length bytes otherwise.

use crate::{Error, Result};
use bytes::{BufMut, Bytes, BytesMut};

/// Largest length-of-length we accept when reading (8 bytes covers usize on 64-bit).
const MAX_LENGTH_PREFIX_BYTES: usize = 8;

/// OER writer
#[derive(Debug, Default)]
pub struct Writer {
    buffer: BytesMut,
}

impl Writer {
    /// Create new writer
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::new(),
        }
    }

    /// Create new writer with preallocated capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(capacity),
        }
    }

    /// Write raw bytes
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buffer.put_slice(bytes);
    }

    /// Write u8
    pub fn write_u8(&mut self, n: u8) {
        self.buffer.put_u8(n);
    }

    /// Write u16 (big-endian)
    pub fn write_u16(&mut self, n: u16) {
        self.buffer.put_u16(n);
    }

    /// Write u32 (big-endian)
    pub fn write_u32(&mut self, n: u32) {
        self.buffer.put_u32(n);
    }

    /// Write u64 (big-endian)
    pub fn write_u64(&mut self, n: u64) {
        self.buffer.put_u64(n);
    }

    /// Write a length prefix
    pub fn write_length_prefix(&mut self, len: usize) {
        if len < 128 {
            self.buffer.put_u8(len as u8);
        } else {
            let bytes = minimal_be_bytes(len as u64);
            self.buffer.put_u8(0x80 | bytes.len() as u8);
            self.buffer.put_slice(&bytes);
        }
    }

    /// Write variable-length octet string
    pub fn write_var_octet_string(&mut self, bytes: &[u8]) {
        self.write_length_prefix(bytes.len());
        self.buffer.put_slice(bytes);
    }

    /// Write variable-length unsigned integer (minimal big-endian bytes, at least one)
    pub fn write_var_uint(&mut self, n: u64) {
        let bytes = minimal_be_bytes(n);
        self.write_var_octet_string(&bytes);
    }

    /// Bytes written so far
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Whether nothing has been written
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Finalize and return bytes
    pub fn finalize(self) -> Bytes {
        self.buffer.freeze()
    }
}

/// OER reader over a borrowed buffer
#[derive(Debug)]
pub struct Reader<'a> {
    buffer: &'a [u8],
    position: usize,
}

impl<'a> Reader<'a> {
    /// Create new reader
    pub fn new(buffer: &'a [u8]) -> Self {
        Self {
            buffer,
            position: 0,
        }
    }

    /// Bytes not yet consumed
    pub fn remaining(&self) -> usize {
        self.buffer.len() - self.position
    }

    /// Current offset into the buffer
    pub fn position(&self) -> usize {
        self.position
    }

    /// Fail unless the whole buffer has been consumed
    pub fn ensure_empty(&self) -> Result<()> {
        match self.remaining() {
            0 => Ok(()),
            n => Err(Error::TrailingBytes(n)),
        }
    }

    /// Read `len` raw bytes
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.remaining() < len {
            return Err(Error::UnexpectedEof {
                needed: len,
                remaining: self.remaining(),
            });
        }
        let slice = &self.buffer[self.position..self.position + len];
        self.position += len;
        Ok(slice)
    }

    /// Read a fixed-size array
    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    /// Read u8
    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_bytes(1)?[0])
    }

    /// Read u16 (big-endian)
    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(u16::from_be_bytes(self.read_array()?))
    }

    /// Read u32 (big-endian)
    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(u32::from_be_bytes(self.read_array()?))
    }

    /// Read u64 (big-endian)
    pub fn read_u64(&mut self) -> Result<u64> {
        Ok(u64::from_be_bytes(self.read_array()?))
    }

    /// Read a length prefix
    pub fn read_length_prefix(&mut self) -> Result<usize> {
        let first = self.read_u8()?;
        if first & 0x80 == 0 {
            return Ok(first as usize);
        }

        let len_of_len = (first & 0x7f) as usize;
        if len_of_len == 0 || len_of_len > MAX_LENGTH_PREFIX_BYTES {
            return Err(Error::InvalidPacket(format!(
                "invalid length prefix: {} length bytes",
                len_of_len
            )));
        }

        let bytes = self.read_bytes(len_of_len)?;
        if bytes[0] == 0 {
            return Err(Error::InvalidPacket(
                "length prefix is not minimally encoded".to_string(),
            ));
        }
        let len = bytes.iter().fold(0u64, |acc, b| (acc << 8) | *b as u64);
        if len < 128 {
            return Err(Error::InvalidPacket(
                "length below 128 must use the short form".to_string(),
            ));
        }
        usize::try_from(len)
            .map_err(|_| Error::InvalidPacket(format!("length {} too large", len)))
    }

    /// Read variable-length octet string
    pub fn read_var_octet_string(&mut self) -> Result<&'a [u8]> {
        let len = self.read_length_prefix()?;
        self.read_bytes(len)
    }

    /// Read variable-length unsigned integer
    pub fn read_var_uint(&mut self) -> Result<u64> {
        let bytes = self.read_var_octet_string()?;
        if bytes.is_empty() {
            return Err(Error::InvalidPacket("empty var-uint".to_string()));
        }
        if bytes.len() > 8 {
            return Err(Error::InvalidPacket(format!(
                "var-uint of {} bytes exceeds u64",
                bytes.len()
            )));
        }
        Ok(bytes.iter().fold(0u64, |acc, b| (acc << 8) | *b as u64))
    }
}

/// Minimal big-endian representation, at least one byte
fn minimal_be_bytes(n: u64) -> Vec<u8> {
    let bytes = n.to_be_bytes();
    let first_nonzero = bytes.iter().position(|b| *b != 0).unwrap_or(7);
    bytes[first_nonzero..].to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_length_prefix() {
        let mut writer = Writer::new();
        writer.write_var_octet_string(b"abc");
        assert_eq!(&writer.finalize()[..], &[3, b'a', b'b', b'c']);
    }

    #[test]
    fn test_long_length_prefix() {
        let payload = vec![7u8; 300];
        let mut writer = Writer::new();
        writer.write_var_octet_string(&payload);
        let bytes = writer.finalize();

        // 300 = 0x012c -> 0x82 0x01 0x2c
        assert_eq!(&bytes[..3], &[0x82, 0x01, 0x2c]);
        assert_eq!(bytes.len(), 303);

        let mut reader = Reader::new(&bytes);
        assert_eq!(reader.read_var_octet_string().unwrap(), &payload[..]);
        assert!(reader.ensure_empty().is_ok());
    }

    #[test]
    fn test_var_uint() {
        let mut writer = Writer::new();
        writer.write_var_uint(0);
        writer.write_var_uint(256);
        let bytes = writer.finalize();
        assert_eq!(&bytes[..], &[1, 0, 2, 1, 0]);

        let mut reader = Reader::new(&bytes);
        assert_eq!(reader.read_var_uint().unwrap(), 0);
        assert_eq!(reader.read_var_uint().unwrap(), 256);
    }

    #[test]
    fn test_truncated_buffer() {
        let mut reader = Reader::new(&[5, 1, 2]);
        let err = reader.read_var_octet_string().unwrap_err();
        assert_eq!(
            err,
            Error::UnexpectedEof {
                needed: 5,
                remaining: 2
            }
        );
    }

    #[test]
    fn test_non_minimal_length_rejected() {
        // 0x81 0x05 encodes 5 in the long form
        let mut reader = Reader::new(&[0x81, 0x05, 0, 0, 0, 0, 0]);
        assert!(reader.read_length_prefix().is_err());
    }
}
