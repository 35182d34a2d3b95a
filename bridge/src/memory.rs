//! Views over the module's linear memory.
//!
//! Views borrow the [`Bridge`], so they cannot outlive an operation that may
//! grow or move the memory.

use std::borrow::Cow;
use std::ops::Range;

use crate::{Bridge, Error, Result};

/// Validates `offset..offset + len` against a memory of `memory_len` bytes.
pub(crate) fn checked_range(memory_len: usize, offset: u32, len: usize) -> Result<Range<usize>> {
    let start = offset as usize;
    match start.checked_add(len) {
        Some(end) if end <= memory_len => Ok(start..end),
        _ => Err(Error::OutOfRange {
            offset: u64::from(offset),
            len: len as u64,
            memory: memory_len as u64,
        }),
    }
}

/// Decodes guest text the way a browser `TextDecoder` does: a leading UTF-8
/// byte order mark is dropped and malformed sequences become U+FFFD.
pub(crate) fn decode_lossy(bytes: &[u8]) -> Cow<'_, str> {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    String::from_utf8_lossy(bytes)
}

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// Little-endian 32-bit words over a byte range of linear memory.
#[derive(Debug, Clone, Copy)]
pub struct Words<'a> {
    bytes: &'a [u8],
}

impl<'a> Words<'a> {
    pub fn len(&self) -> usize {
        self.bytes.len() / 4
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<u32> {
        let start = index.checked_mul(4)?;
        let word = self.bytes.get(start..start.checked_add(4)?)?;
        Some(u32::from_le_bytes([word[0], word[1], word[2], word[3]]))
    }

    pub fn iter(&self) -> impl Iterator<Item = u32> + 'a {
        self.bytes
            .chunks_exact(4)
            .map(|word| u32::from_le_bytes([word[0], word[1], word[2], word[3]]))
    }

    pub fn to_vec(&self) -> Vec<u32> {
        self.iter().collect()
    }

    pub fn as_bytes(&self) -> &'a [u8] {
        self.bytes
    }
}

impl Bridge {
    /// Current size of linear memory in bytes.
    pub fn memory_size(&self) -> usize {
        self.memory.data_size(&self.store)
    }

    /// Byte view of `len` bytes at `offset`.
    pub fn memory_bytes(&self, offset: u32, len: usize) -> Result<&[u8]> {
        let data = self.memory.data(&self.store);
        let range = checked_range(data.len(), offset, len)?;
        Ok(&data[range])
    }

    /// View of `len` 32-bit words at `offset`, which must be 4-byte aligned.
    pub fn memory_words(&self, offset: u32, len: usize) -> Result<Words<'_>> {
        if offset % 4 != 0 {
            return Err(Error::Misaligned { offset });
        }
        let byte_len = len.checked_mul(4).ok_or(Error::OutOfRange {
            offset: u64::from(offset),
            len: u64::MAX,
            memory: self.memory_size() as u64,
        })?;
        Ok(Words {
            bytes: self.memory_bytes(offset, byte_len)?,
        })
    }

    /// Decodes `len` bytes at `offset` as UTF-8, replacing malformed sequences.
    pub fn decode_utf8(&self, offset: u32, len: usize) -> Result<Cow<'_, str>> {
        Ok(decode_lossy(self.memory_bytes(offset, len)?))
    }

    /// Copies `bytes` into linear memory at `offset`.
    pub fn write_bytes(&mut self, offset: u32, bytes: &[u8]) -> Result<()> {
        let data = self.memory.data_mut(&mut self.store);
        let range = checked_range(data.len(), offset, bytes.len())?;
        data[range].copy_from_slice(bytes);
        Ok(())
    }
}
