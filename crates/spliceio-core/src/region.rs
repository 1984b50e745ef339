//! Contiguous byte ranges on a medium.
//!
//! A [`MediumRegion`] is a half-open range `[start, start + size)`. It is
//! *cached* when it carries the bytes of that range, and *uncached* when it
//! only describes the range. Overlap classification and clipping are the
//! workhorses of the region cache and the change set.

use std::fmt;

use bytes::Bytes;

use crate::offset::MediumOffset;

/// How a `left` region relates to a `right` region on the same medium.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionOverlap {
    /// The regions share no byte.
    NoOverlap,
    /// Both regions cover exactly the same range.
    SameRange,
    /// The left region lies fully inside the right one (boundaries may
    /// touch, the ranges are not equal).
    LeftInsideRight,
    /// The right region lies fully inside the left one.
    RightInsideLeft,
    /// The left region starts first and covers the right region's front.
    LeftOverlapsFront,
    /// The left region starts inside the right one and covers its back.
    LeftOverlapsBack,
}

/// Result of clipping a region against an overlapping one.
///
/// `front` and `back` are the parts of the clipped region that lie outside
/// the other region; `overlap` is the shared part. Cached regions keep
/// their (sliced) bytes in every part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClipResult {
    pub front: Option<MediumRegion>,
    pub overlap: MediumRegion,
    pub back: Option<MediumRegion>,
}

/// A contiguous byte range on one medium, optionally carrying its bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediumRegion {
    start: MediumOffset,
    size: u32,
    bytes: Option<Bytes>,
}

impl MediumRegion {
    /// A region describing `[start, start + size)` without byte content.
    #[must_use]
    pub fn uncached(start: MediumOffset, size: u32) -> Self {
        Self {
            start,
            size,
            bytes: None,
        }
    }

    /// A region carrying the bytes of `[start, start + bytes.len())`.
    ///
    /// # Panics
    ///
    /// Panics if `bytes` is longer than `u32::MAX`.
    #[must_use]
    pub fn cached(start: MediumOffset, bytes: Bytes) -> Self {
        let size = u32::try_from(bytes.len()).unwrap_or_else(|_| {
            panic!("region at {start} exceeds the maximum region size");
        });
        Self {
            start,
            size,
            bytes: Some(bytes),
        }
    }

    /// Start offset (inclusive).
    #[must_use]
    pub fn start(&self) -> MediumOffset {
        self.start
    }

    /// Size in bytes.
    #[must_use]
    pub fn size(&self) -> u32 {
        self.size
    }

    /// End offset (exclusive).
    #[must_use]
    pub fn end(&self) -> MediumOffset {
        self.start.advance(i64::from(self.size))
    }

    /// The cached bytes, if any.
    #[must_use]
    pub fn bytes(&self) -> Option<&Bytes> {
        self.bytes.as_ref()
    }

    /// Whether this region carries its bytes.
    #[must_use]
    pub fn is_cached(&self) -> bool {
        self.bytes.is_some()
    }

    /// Whether `offset` lies within `[start, end)`.
    ///
    /// # Panics
    ///
    /// Panics if `offset` belongs to a different medium.
    #[must_use]
    pub fn contains(&self, offset: &MediumOffset) -> bool {
        offset.behind_or_equal(&self.start) && offset.before(&self.end())
    }

    /// Number of bytes shared with `other`.
    ///
    /// # Panics
    ///
    /// Panics if the regions belong to different media.
    #[must_use]
    pub fn overlapping_byte_count(&self, other: &Self) -> u32 {
        self.start.assert_same_medium(&other.start);
        let start = self.start.absolute().max(other.start.absolute());
        let end = self.end().absolute().min(other.end().absolute());
        end.saturating_sub(start) as u32
    }

    /// Classifies how this region (left) overlaps `other` (right).
    ///
    /// # Panics
    ///
    /// Panics if the regions belong to different media.
    #[must_use]
    pub fn overlap_kind(&self, other: &Self) -> RegionOverlap {
        let shared = self.overlapping_byte_count(other);
        if shared == 0 {
            RegionOverlap::NoOverlap
        } else if shared == self.size && shared == other.size {
            RegionOverlap::SameRange
        } else if shared == self.size {
            RegionOverlap::LeftInsideRight
        } else if shared == other.size {
            RegionOverlap::RightInsideLeft
        } else if self.start.before(&other.start) {
            RegionOverlap::LeftOverlapsFront
        } else {
            RegionOverlap::LeftOverlapsBack
        }
    }

    /// Splits this region at `at` into a front and a back part.
    ///
    /// # Panics
    ///
    /// Panics unless `start < at < end`.
    #[must_use]
    pub fn split(&self, at: MediumOffset) -> (Self, Self) {
        assert!(
            self.start.before(&at) && at.before(&self.end()),
            "split point {at} outside the interior of {self}"
        );
        let front_len = self.start.distance_to(&at) as u64;
        (
            self.slice(self.start, front_len as u32),
            self.slice(at, self.size - front_len as u32),
        )
    }

    /// Clips this region against an overlapping `other`, returning the
    /// parts outside `other` and the shared part.
    ///
    /// # Panics
    ///
    /// Panics if the regions do not overlap.
    #[must_use]
    pub fn clip_against(&self, other: &Self) -> ClipResult {
        assert!(
            self.overlapping_byte_count(other) > 0,
            "cannot clip {self} against non-overlapping {other}"
        );
        let front = if self.start.before(&other.start) {
            let len = self.start.distance_to(&other.start) as u32;
            Some(self.slice(self.start, len))
        } else {
            None
        };
        let back = if other.end().before(&self.end()) {
            let len = other.end().distance_to(&self.end()) as u32;
            Some(self.slice(other.end(), len))
        } else {
            None
        };
        let overlap_start = if self.start.behind_or_equal(&other.start) {
            self.start
        } else {
            other.start
        };
        let overlap_end = if self.end().before(&other.end()) {
            self.end()
        } else {
            other.end()
        };
        let overlap_len = overlap_start.distance_to(&overlap_end) as u32;
        ClipResult {
            front,
            overlap: self.slice(overlap_start, overlap_len),
            back,
        }
    }

    /// The sub-region of length `len` starting at `at`, with bytes sliced
    /// when this region is cached. `at` must lie within this region and
    /// `at + len` must not exceed its end.
    fn slice(&self, at: MediumOffset, len: u32) -> Self {
        let skip = self.start.distance_to(&at) as usize;
        let bytes = self
            .bytes
            .as_ref()
            .map(|b| b.slice(skip..skip + len as usize));
        Self {
            start: at,
            size: len,
            bytes,
        }
    }
}

impl fmt::Display for MediumRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}, +{}){}",
            self.start,
            self.size,
            if self.is_cached() { " cached" } else { "" }
        )
    }
}
