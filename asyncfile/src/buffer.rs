//! Growable byte buffer exchanged with file operations.

use crate::error::{FileError, Result};

use std::fmt;
use std::ops::Deref;

/// A growable byte buffer.
///
/// Buffers are moved into file operations and handed back through their
/// callbacks, so no copy is shared between the caller and the background
/// threads while an operation is in flight.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Buffer {
    bytes: Vec<u8>,
}

impl Buffer {
    /// Creates an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty buffer with room for `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    /// Appends `data` at the end of the buffer.
    pub fn append(&mut self, data: &[u8]) -> &mut Self {
        self.bytes.extend_from_slice(data);
        self
    }

    /// Copies `data` into the buffer starting at `offset`.
    ///
    /// The buffer grows as needed; a gap between the current end and
    /// `offset` is zero-filled.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if the range ends beyond the largest possible
    /// buffer. The buffer is left untouched.
    pub fn set_bytes(&mut self, offset: usize, data: &[u8]) -> Result<&mut Self> {
        let end = offset
            .checked_add(data.len())
            .filter(|&end| end <= isize::MAX as usize)
            .ok_or_else(|| {
                FileError::invalid_argument(format!(
                    "cannot place {} bytes at offset {offset}",
                    data.len()
                ))
            })?;

        if self.bytes.len() < end {
            self.bytes.resize(end, 0);
        }

        self.bytes[offset..end].copy_from_slice(data);
        Ok(self)
    }

    /// Consumes the buffer, returning its bytes.
    pub fn into_vec(self) -> Vec<u8> {
        self.bytes
    }
}

impl Deref for Buffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.bytes
    }
}

impl From<Vec<u8>> for Buffer {
    fn from(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }
}

impl From<&[u8]> for Buffer {
    fn from(bytes: &[u8]) -> Self {
        Self {
            bytes: bytes.to_vec(),
        }
    }
}

impl<const N: usize> From<&[u8; N]> for Buffer {
    fn from(bytes: &[u8; N]) -> Self {
        Self {
            bytes: bytes.to_vec(),
        }
    }
}

impl From<&str> for Buffer {
    fn from(text: &str) -> Self {
        Self {
            bytes: text.as_bytes().to_vec(),
        }
    }
}

impl fmt::Debug for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer").field("len", &self.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_bytes_past_the_end_zero_fills_the_gap() {
        let mut buffer = Buffer::from("ab");
        buffer.set_bytes(4, b"xy").unwrap();

        assert_eq!(buffer.as_slice(), b"ab\0\0xy");
    }

    #[test]
    fn set_bytes_overwrites_in_place() {
        let mut buffer = Buffer::from("hello");
        buffer.set_bytes(1, b"EL").unwrap();

        assert_eq!(buffer.as_slice(), b"hELlo");
        assert_eq!(buffer.len(), 5);
    }

    #[test]
    fn set_bytes_rejects_an_overflowing_range() {
        let mut buffer = Buffer::from("keep");

        assert!(matches!(
            buffer.set_bytes(usize::MAX, b"x"),
            Err(FileError::InvalidArgument { .. })
        ));
        assert!(buffer.set_bytes(isize::MAX as usize, b"x").is_err());
        assert_eq!(buffer.as_slice(), b"keep");
    }
}
