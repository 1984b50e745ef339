//! Bounded chunk walking over a byte range.
//!
//! Splits `[start, start + total)` into ascending chunks of at most
//! `chunk_size` bytes: full chunks first, then the remainder. Used wherever
//! the engine must keep individual buffers bounded (cache region splitting,
//! gap synthesis, chunked medium I/O, payload writes).

use crate::offset::MediumOffset;

/// Iterator over `(chunk_start, chunk_size)` pairs covering a byte range.
#[derive(Debug, Clone)]
pub struct RangeChunks {
    next: MediumOffset,
    remaining: u64,
    chunk_size: u32,
}

/// Walks `[start, start + total)` in ascending chunks of at most
/// `chunk_size` bytes. An empty range yields nothing.
///
/// # Panics
///
/// Panics if `chunk_size` is zero.
#[must_use]
pub fn chunks(start: MediumOffset, total: u64, chunk_size: u32) -> RangeChunks {
    assert!(chunk_size > 0, "chunk size must be positive");
    RangeChunks {
        next: start,
        remaining: total,
        chunk_size,
    }
}

impl Iterator for RangeChunks {
    type Item = (MediumOffset, u32);

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let len = self.remaining.min(u64::from(self.chunk_size)) as u32;
        let chunk = (self.next, len);
        self.next = self.next.advance(i64::from(len));
        self.remaining -= u64::from(len);
        Some(chunk)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let count = self.remaining.div_ceil(u64::from(self.chunk_size)) as usize;
        (count, Some(count))
    }
}

impl ExactSizeIterator for RangeChunks {}
