//! # Keyed Field Serialization
//!
//! Events are property bags of length-prefixed fields:
//!
//! ```text
//! ┌─────┬──────────────┬───────────────┐
//! │ key │ len (u32 LE) │ bytes[len]    │  × n
//! └─────┴──────────────┴───────────────┘
//! ```
//!
//! A reader can skip any field it does not understand, so new optional keys
//! never break older peers. All integers are little-endian.

use bytemuck::{bytes_of, Pod};

use crate::error::{WireError, WireResult};

/// Largest event this peer will encode or accept.
pub const MAX_EVENT_SIZE: usize = 64 * 1024;

/// Field writer over a growable buffer capped at [`MAX_EVENT_SIZE`].
///
/// Writes return `false` once the cap would be exceeded; the buffer is left
/// as it was before the failed write.
#[derive(Debug, Default)]
pub struct WireWriter {
    buffer: Vec<u8>,
}

impl WireWriter {
    /// Creates an empty writer.
    #[must_use]
    pub const fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Returns the number of bytes written.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Returns true if no bytes have been written.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Returns the written data.
    #[inline]
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.buffer
    }

    /// Consumes the writer, returning its buffer.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    /// Writes raw bytes.
    #[inline]
    pub fn write_bytes(&mut self, bytes: &[u8]) -> bool {
        if self.buffer.len() + bytes.len() > MAX_EVENT_SIZE {
            return false;
        }
        self.buffer.extend_from_slice(bytes);
        true
    }

    /// Writes a single byte.
    #[inline]
    pub fn write_u8(&mut self, value: u8) -> bool {
        self.write_bytes(&[value])
    }

    /// Writes a u32 in little-endian format.
    #[inline]
    pub fn write_u32(&mut self, value: u32) -> bool {
        self.write_bytes(&value.to_le_bytes())
    }

    /// Writes a u64 in little-endian format.
    #[inline]
    pub fn write_u64(&mut self, value: u64) -> bool {
        self.write_bytes(&value.to_le_bytes())
    }

    /// Writes a Pod type directly.
    #[inline]
    pub fn write_pod<T: Pod>(&mut self, value: &T) -> bool {
        self.write_bytes(bytes_of(value))
    }

    /// Writes a u32 length followed by the bytes.
    pub fn write_len_prefixed(&mut self, bytes: &[u8]) -> bool {
        let Ok(len) = u32::try_from(bytes.len()) else {
            return false;
        };
        let start = self.buffer.len();
        if self.write_u32(len) && self.write_bytes(bytes) {
            return true;
        }
        self.buffer.truncate(start);
        false
    }

    /// Writes one keyed field whose body is produced by `body`.
    pub fn write_field(&mut self, key: u8, body: impl FnOnce(&mut Self) -> bool) -> bool {
        let start = self.buffer.len();
        if !(self.write_u8(key) && self.write_u32(0)) {
            self.buffer.truncate(start);
            return false;
        }
        let body_start = self.buffer.len();
        if !body(self) {
            self.buffer.truncate(start);
            return false;
        }
        let Ok(len) = u32::try_from(self.buffer.len() - body_start) else {
            self.buffer.truncate(start);
            return false;
        };
        self.buffer[start + 1..body_start].copy_from_slice(&len.to_le_bytes());
        true
    }
}

/// Field reader over a borrowed buffer.
#[derive(Clone, Debug)]
pub struct WireReader<'a> {
    buffer: &'a [u8],
    position: usize,
}

impl<'a> WireReader<'a> {
    /// Creates a reader positioned at the start of `buffer`.
    #[must_use]
    pub const fn new(buffer: &'a [u8]) -> Self {
        Self { buffer, position: 0 }
    }

    /// Returns the number of bytes remaining.
    #[inline]
    #[must_use]
    pub const fn remaining(&self) -> usize {
        self.buffer.len().saturating_sub(self.position)
    }

    /// Reads `len` raw bytes.
    #[inline]
    pub fn read_bytes(&mut self, len: usize) -> Option<&'a [u8]> {
        let end = self.position.checked_add(len)?;
        let slice = self.buffer.get(self.position..end)?;
        self.position = end;
        Some(slice)
    }

    /// Reads a single byte.
    #[inline]
    pub fn read_u8(&mut self) -> Option<u8> {
        self.read_bytes(1).map(|b| b[0])
    }

    /// Reads a u32 in little-endian format.
    #[inline]
    pub fn read_u32(&mut self) -> Option<u32> {
        let bytes = self.read_bytes(4)?;
        Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Reads a u64 in little-endian format.
    #[inline]
    pub fn read_u64(&mut self) -> Option<u64> {
        let bytes = self.read_bytes(8)?;
        let mut array = [0u8; 8];
        array.copy_from_slice(bytes);
        Some(u64::from_le_bytes(array))
    }

    /// Reads a Pod type directly.
    #[inline]
    pub fn read_pod<T: Pod>(&mut self) -> Option<T> {
        let bytes = self.read_bytes(std::mem::size_of::<T>())?;
        bytemuck::try_pod_read_unaligned(bytes).ok()
    }

    /// Reads a u32 length followed by that many bytes.
    pub fn read_len_prefixed(&mut self) -> Option<&'a [u8]> {
        let len = self.read_u32()?;
        self.read_bytes(usize::try_from(len).ok()?)
    }

    /// Reads one keyed field. `None` at the end of the buffer.
    ///
    /// # Errors
    ///
    /// [`WireError::Truncated`] if a field header or body is cut short.
    pub fn read_field(&mut self) -> WireResult<Option<(u8, &'a [u8])>> {
        if self.remaining() == 0 {
            return Ok(None);
        }
        let key = self.read_u8().ok_or(WireError::Truncated)?;
        let body = self.read_len_prefixed().ok_or(WireError::Truncated)?;
        Ok(Some((key, body)))
    }
}

/// The fields of one property bag, in wire order.
#[derive(Clone, Debug, Default)]
pub struct FieldBag<'a> {
    fields: Vec<(u8, &'a [u8])>,
}

impl<'a> FieldBag<'a> {
    /// Splits `buffer` into fields.
    ///
    /// # Errors
    ///
    /// [`WireError::Oversized`] past [`MAX_EVENT_SIZE`], or
    /// [`WireError::Truncated`].
    pub fn parse(buffer: &'a [u8]) -> WireResult<Self> {
        if buffer.len() > MAX_EVENT_SIZE {
            return Err(WireError::Oversized {
                size: buffer.len(),
                max: MAX_EVENT_SIZE,
            });
        }
        let mut reader = WireReader::new(buffer);
        let mut fields = Vec::new();
        while let Some(field) = reader.read_field()? {
            fields.push(field);
        }
        Ok(Self { fields })
    }

    /// Body of the first field with `key`.
    #[must_use]
    pub fn get(&self, key: u8) -> Option<&'a [u8]> {
        self.fields.iter().find(|(k, _)| *k == key).map(|(_, body)| *body)
    }

    /// Body of a required field.
    ///
    /// # Errors
    ///
    /// [`WireError::MissingField`] if absent.
    pub fn require(&self, key: u8) -> WireResult<&'a [u8]> {
        self.get(key).ok_or(WireError::MissingField { key })
    }

    /// Whether every field of `filter` appears here with identical contents.
    #[must_use]
    pub fn contains_all(&self, filter: &FieldBag<'_>) -> bool {
        filter
            .fields
            .iter()
            .all(|(key, body)| self.get(*key) == Some(*body))
    }
}

/// Decodes a fixed-size little-endian u32 field.
///
/// # Errors
///
/// [`WireError::Malformed`] if the body is not four bytes.
pub fn decode_u32(key: u8, body: &[u8]) -> WireResult<u32> {
    let array: [u8; 4] = body.try_into().map_err(|_| WireError::Malformed {
        key,
        reason: "expected 4 bytes",
    })?;
    Ok(u32::from_le_bytes(array))
}

/// Decodes a single-byte field.
///
/// # Errors
///
/// [`WireError::Malformed`] if the body is not one byte.
pub fn decode_u8(key: u8, body: &[u8]) -> WireResult<u8> {
    match body {
        [value] => Ok(*value),
        _ => Err(WireError::Malformed {
            key,
            reason: "expected 1 byte",
        }),
    }
}

/// Decodes a Pod field of exactly `size_of::<T>()` bytes.
///
/// # Errors
///
/// [`WireError::Malformed`] on a size mismatch.
pub fn decode_pod<T: Pod>(key: u8, body: &[u8]) -> WireResult<T> {
    bytemuck::try_pod_read_unaligned(body).map_err(|_| WireError::Malformed {
        key,
        reason: "unexpected size",
    })
}
