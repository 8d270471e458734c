//! Serialization utilities for order-preserving storage keys.

pub mod terminated_bytes;

/// Error type for deserialization failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeserializeError {
    pub message: String,
}

impl DeserializeError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl std::error::Error for DeserializeError {}

impl std::fmt::Display for DeserializeError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Reads a big-endian `u64`, advancing the buffer.
pub fn read_u64(buf: &mut &[u8]) -> Result<u64, DeserializeError> {
    let (head, rest) = split(buf, 8, "u64")?;
    *buf = rest;
    Ok(u64::from_be_bytes(head.try_into().map_err(|_| {
        DeserializeError::new("unexpected end of input reading u64")
    })?))
}

/// Reads a big-endian `i64`, advancing the buffer.
pub fn read_i64(buf: &mut &[u8]) -> Result<i64, DeserializeError> {
    read_u64(buf).map(|v| v as i64)
}

/// Reads a big-endian `u32`, advancing the buffer.
pub fn read_u32(buf: &mut &[u8]) -> Result<u32, DeserializeError> {
    let (head, rest) = split(buf, 4, "u32")?;
    *buf = rest;
    Ok(u32::from_be_bytes(head.try_into().map_err(|_| {
        DeserializeError::new("unexpected end of input reading u32")
    })?))
}

/// Reads a single byte, advancing the buffer.
pub fn read_u8(buf: &mut &[u8]) -> Result<u8, DeserializeError> {
    let (head, rest) = split(buf, 1, "u8")?;
    *buf = rest;
    Ok(head[0])
}

/// Splits `len` bytes off the front of the buffer, advancing it.
pub fn read_slice<'a>(buf: &mut &'a [u8], len: usize) -> Result<&'a [u8], DeserializeError> {
    let (head, rest) = split(buf, len, "slice")?;
    *buf = rest;
    Ok(head)
}

fn split<'a>(
    buf: &&'a [u8],
    len: usize,
    what: &str,
) -> Result<(&'a [u8], &'a [u8]), DeserializeError> {
    if buf.len() < len {
        return Err(DeserializeError::new(format!(
            "unexpected end of input reading {}: need {} bytes, got {}",
            what,
            len,
            buf.len()
        )));
    }
    Ok(buf.split_at(len))
}
