//! Order-preserving encoding for variable-length byte strings.
//!
//! Bytes are escaped and terminated with `0x00`:
//!
//! - `0x00` → `0x01 0x01`
//! - `0x01` → `0x01 0x02`
//! - `0xFF` → `0x01 0x03`
//! - All other bytes unchanged
//!
//! Using `0x00` as the terminator makes shorter strings sort before longer
//! strings sharing their prefix, so byte comparison of encodings matches
//! byte comparison of the originals, and an encoded string can be followed
//! by further key fields.

use bytes::{BufMut, Bytes, BytesMut};

use super::DeserializeError;

const TERMINATOR: u8 = 0x00;
const ESCAPE: u8 = 0x01;

/// Appends the escaped, terminated encoding of `value` to `buf`.
pub fn serialize(value: &[u8], buf: &mut BytesMut) {
    for &b in value {
        match b {
            0x00 => buf.put_slice(&[ESCAPE, 0x01]),
            0x01 => buf.put_slice(&[ESCAPE, 0x02]),
            0xFF => buf.put_slice(&[ESCAPE, 0x03]),
            other => buf.put_u8(other),
        }
    }
    buf.put_u8(TERMINATOR);
}

/// Decodes a terminated byte string, advancing past the terminator.
pub fn deserialize(buf: &mut &[u8]) -> Result<Bytes, DeserializeError> {
    let mut out = BytesMut::new();
    let mut i = 0;
    while i < buf.len() {
        match buf[i] {
            TERMINATOR => {
                *buf = &buf[i + 1..];
                return Ok(out.freeze());
            }
            ESCAPE => {
                let escaped = buf.get(i + 1).ok_or_else(|| {
                    DeserializeError::new("unexpected end of input after escape byte")
                })?;
                let original = match escaped {
                    0x01 => 0x00,
                    0x02 => 0x01,
                    0x03 => 0xFF,
                    other => {
                        return Err(DeserializeError::new(format!(
                            "invalid escape sequence: 0x01 0x{:02x}",
                            other
                        )));
                    }
                };
                out.put_u8(original);
                i += 2;
            }
            other => {
                out.put_u8(other);
                i += 1;
            }
        }
    }
    Err(DeserializeError::new(
        "unexpected end of input: missing terminator",
    ))
}
