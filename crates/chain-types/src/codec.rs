//! Fixed-layout binary codec helpers
//!
//! All integers are little-endian. Strings carry a u16 length prefix.
//! Decoding is strict: short buffers and leftover bytes are errors.

use thiserror::Error;

/// Binary decoding errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("unexpected end of buffer: need {needed} bytes, {remaining} left")]
    UnexpectedEnd { needed: usize, remaining: usize },

    #[error("{0} trailing bytes after value")]
    TrailingBytes(usize),

    #[error("invalid utf-8 string")]
    InvalidUtf8,

    #[error("string of {0} bytes exceeds u16 length prefix")]
    StringTooLong(usize),

    #[error("invalid length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("invalid encoding: {0}")]
    Invalid(String),
}

/// Cursor over an immutable byte buffer
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        if self.remaining() < n {
            return Err(CodecError::UnexpectedEnd {
                needed: n,
                remaining: self.remaining(),
            });
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        let mut arr = [0u8; N];
        arr.copy_from_slice(self.read_bytes(N)?);
        Ok(arr)
    }

    pub fn read_u16(&mut self) -> Result<u16, CodecError> {
        Ok(u16::from_le_bytes(self.read_array()?))
    }

    pub fn read_u32(&mut self) -> Result<u32, CodecError> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    pub fn read_i64(&mut self) -> Result<i64, CodecError> {
        Ok(i64::from_le_bytes(self.read_array()?))
    }

    /// u16 length prefix followed by UTF-8 bytes
    pub fn read_string16(&mut self) -> Result<String, CodecError> {
        let len = self.read_u16()? as usize;
        let bytes = self.read_bytes(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| CodecError::InvalidUtf8)
    }

    /// Fail if anything is left unread
    pub fn finish(self) -> Result<(), CodecError> {
        match self.remaining() {
            0 => Ok(()),
            n => Err(CodecError::TrailingBytes(n)),
        }
    }
}

pub fn write_u16(buf: &mut Vec<u8>, v: u16) {
    buf.extend_from_slice(&v.to_le_bytes());
}

pub fn write_u32(buf: &mut Vec<u8>, v: u32) {
    buf.extend_from_slice(&v.to_le_bytes());
}

pub fn write_i64(buf: &mut Vec<u8>, v: i64) {
    buf.extend_from_slice(&v.to_le_bytes());
}

pub fn write_string16(buf: &mut Vec<u8>, s: &str) -> Result<(), CodecError> {
    let len = u16::try_from(s.len()).map_err(|_| CodecError::StringTooLong(s.len()))?;
    write_u16(buf, len);
    buf.extend_from_slice(s.as_bytes());
    Ok(())
}

// Single-value encodings used for params, results and state variables.

pub fn encode_i64(v: i64) -> Vec<u8> {
    v.to_le_bytes().to_vec()
}

pub fn decode_i64(bytes: &[u8]) -> Result<i64, CodecError> {
    let mut r = Reader::new(bytes);
    let v = r.read_i64()?;
    r.finish()?;
    Ok(v)
}

pub fn encode_string(s: &str) -> Vec<u8> {
    s.as_bytes().to_vec()
}

pub fn decode_string(bytes: &[u8]) -> Result<String, CodecError> {
    String::from_utf8(bytes.to_vec()).map_err(|_| CodecError::InvalidUtf8)
}
