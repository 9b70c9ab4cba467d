//! Bounds-checked little-endian reads over an image buffer.
//!
//! Every structure in this crate is decoded through an [`ImageReader`]; no
//! offset is ever turned into a pointer.  A read that does not fit inside the
//! buffer yields [`PeError::OutOfBounds`] instead of touching memory.

use crate::error::{PeError, Result};

/// A read-only view over the raw bytes of a PE image.
#[derive(Debug, Clone, Copy)]
pub struct ImageReader<'a> {
    data: &'a [u8],
}

impl<'a> ImageReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Check that `len` bytes starting at `offset` lie inside the buffer and
    /// return the exclusive end offset.
    pub fn check_range(&self, offset: usize, len: usize) -> Result<usize> {
        match offset.checked_add(len) {
            Some(end) if end <= self.data.len() => Ok(end),
            _ => Err(PeError::out_of_bounds(offset as u64, len, self.data.len())),
        }
    }

    /// Borrow `len` bytes at `offset`.
    pub fn read_bytes(&self, offset: usize, len: usize) -> Result<&'a [u8]> {
        let end = self.check_range(offset, len)?;
        Ok(&self.data[offset..end])
    }

    /// Copy `N` bytes at `offset` into a fixed-size array.
    pub fn read_array<const N: usize>(&self, offset: usize) -> Result<[u8; N]> {
        let mut buf = [0u8; N];
        buf.copy_from_slice(self.read_bytes(offset, N)?);
        Ok(buf)
    }

    pub fn read_u8(&self, offset: usize) -> Result<u8> {
        Ok(self.read_array::<1>(offset)?[0])
    }

    /// Read a `u16` at `offset` (little-endian).
    pub fn read_u16(&self, offset: usize) -> Result<u16> {
        self.read_array(offset).map(u16::from_le_bytes)
    }

    /// Read a `u32` at `offset` (little-endian).
    pub fn read_u32(&self, offset: usize) -> Result<u32> {
        self.read_array(offset).map(u32::from_le_bytes)
    }

    /// Read an `i32` at `offset` (little-endian).
    pub fn read_i32(&self, offset: usize) -> Result<i32> {
        self.read_array(offset).map(i32::from_le_bytes)
    }

    /// Read a `u64` at `offset` (little-endian).
    pub fn read_u64(&self, offset: usize) -> Result<u64> {
        self.read_array(offset).map(u64::from_le_bytes)
    }

    /// Read a 4- or 8-byte word, zero-extended to `u64`.
    pub fn read_word(&self, offset: usize, width: usize) -> Result<u64> {
        match width {
            8 => self.read_u64(offset),
            _ => self.read_u32(offset).map(u64::from),
        }
    }

    /// Read a NUL-terminated string starting at `offset`, scanning at most
    /// `max_len` bytes (terminator excluded) before giving up.
    ///
    /// A scan that runs off the end of the buffer is `OutOfBounds`; one that
    /// stays in bounds but finds no terminator is `UnterminatedString`.
    pub fn read_cstring(&self, offset: usize, max_len: usize) -> Result<&'a [u8]> {
        if offset >= self.data.len() {
            return Err(PeError::out_of_bounds(offset as u64, 1, self.data.len()));
        }
        let window_end = offset
            .saturating_add(max_len)
            .saturating_add(1)
            .min(self.data.len());
        let window = &self.data[offset..window_end];
        match window.iter().position(|&b| b == 0) {
            Some(len) => Ok(&window[..len]),
            None if window.len() > max_len => Err(PeError::UnterminatedString { offset, max_len }),
            None => Err(PeError::out_of_bounds(
                offset as u64,
                window.len() + 1,
                self.data.len(),
            )),
        }
    }

    /// Like [`read_cstring`](Self::read_cstring), decoded lossily to UTF-8.
    pub fn read_string(&self, offset: usize, max_len: usize) -> Result<String> {
        self.read_cstring(offset, max_len)
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
    }
}
