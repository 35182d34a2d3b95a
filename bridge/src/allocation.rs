//! Handles to regions claimed from the module's allocator.

use std::ops::Range;
use tracing::{trace, warn};

use crate::{Bridge, Error, Result};

/// A region of linear memory owned by the host until [`Allocation::free`].
///
/// The handle is not `Clone`: `free` consumes it, so a region cannot be
/// released twice through the same handle.
#[must_use = "allocations are only returned to the module by `free`"]
#[derive(Debug, PartialEq, Eq)]
pub struct Allocation {
    offset: u32,
    size: u32,
    align: u32,
}

impl Allocation {
    pub fn offset(&self) -> u32 {
        self.offset
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn align(&self) -> u32 {
        self.align
    }

    /// Absolute byte range in linear memory.
    pub fn range(&self) -> Range<usize> {
        let start = self.offset as usize;
        start..start + self.size as usize
    }

    /// Borrowed view of the whole region.
    pub fn bytes<'a>(&self, bridge: &'a Bridge) -> Result<&'a [u8]> {
        if self.size == 0 {
            return Ok(&[]);
        }
        bridge.memory_bytes(self.offset, self.size as usize)
    }

    /// Copies `start..end` of the region, relative to its offset.
    ///
    /// `end` defaults to the size. A negative `end` counts back from the size
    /// and stops at zero, `end` past the size is capped, and `start` is capped
    /// at the resulting `end`.
    pub fn slice(&self, bridge: &Bridge, start: usize, end: Option<isize>) -> Result<Vec<u8>> {
        let range = clamp_range(self.size, start, end);
        if range.is_empty() {
            return Ok(Vec::new());
        }
        let bytes = bridge.memory_bytes(self.offset + range.start as u32, range.len())?;
        Ok(bytes.to_vec())
    }

    /// Copies the whole region.
    pub fn to_vec(&self, bridge: &Bridge) -> Result<Vec<u8>> {
        self.slice(bridge, 0, None)
    }

    /// Returns the region to the module's allocator.
    pub fn free(self, bridge: &mut Bridge) -> Result<()> {
        if self.size == 0 {
            return Ok(());
        }
        bridge.call_dealloc(self.size, self.align, self.offset)?;
        trace!(offset = self.offset, size = self.size, "freed");
        Ok(())
    }
}

pub(crate) fn clamp_range(size: u32, start: usize, end: Option<isize>) -> Range<usize> {
    let size = size as usize;
    let end = match end {
        None => size,
        Some(end) if end < 0 => size.saturating_sub(end.unsigned_abs()),
        Some(end) => (end as usize).min(size),
    };
    start.min(end)..end
}

impl Bridge {
    /// Asks the module for `size` bytes aligned to `align`.
    ///
    /// Zero-size requests never reach the module: they yield an empty handle
    /// whose offset is the alignment.
    pub fn alloc(&mut self, size: u32, align: u32) -> Result<Allocation> {
        if !align.is_power_of_two() {
            return Err(Error::InvalidAlignment(align));
        }
        if size == 0 {
            return Ok(Allocation {
                offset: align,
                size,
                align,
            });
        }

        let failed = |reason: String| Error::Allocation {
            size: u64::from(size),
            align,
            reason,
        };

        let offset = self
            .call_alloc(size, align)
            .map_err(|e| failed(format!("{e:#}")))?;
        if offset == 0 {
            return Err(failed("module allocator returned null".to_string()));
        }

        let memory = self.memory_size() as u64;
        if u64::from(offset) + u64::from(size) > memory {
            // The module still considers the region claimed.
            if let Err(err) = self.call_dealloc(size, align, offset) {
                warn!(offset, size, align, error = %err, "failed to release out-of-range allocation");
            }
            return Err(failed(format!(
                "module returned {offset}+{size} outside {memory} bytes of memory"
            )));
        }

        trace!(offset, size, align, "allocated");
        Ok(Allocation {
            offset,
            size,
            align,
        })
    }

    /// Byte-aligned allocation.
    pub fn alloc_bytes(&mut self, size: u32) -> Result<Allocation> {
        self.alloc(size, 1)
    }
}
