//! Absolute byte offsets on a medium.

use std::fmt;

use crate::medium::MediumId;

/// An absolute byte position on one specific medium.
///
/// Offsets are plain copyable values. Comparisons are only defined between
/// offsets of the same medium.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MediumOffset {
    medium: MediumId,
    position: u64,
}

impl MediumOffset {
    /// Creates an offset at `position` on the given medium.
    #[must_use]
    pub fn new(medium: MediumId, position: u64) -> Self {
        Self { medium, position }
    }

    /// The medium this offset belongs to.
    #[must_use]
    pub fn medium(&self) -> MediumId {
        self.medium
    }

    /// The absolute byte position.
    #[must_use]
    pub fn absolute(&self) -> u64 {
        self.position
    }

    /// A new offset moved by `delta` bytes.
    ///
    /// # Panics
    ///
    /// Panics if the result would be negative.
    #[must_use]
    pub fn advance(&self, delta: i64) -> Self {
        let moved = self
            .position
            .checked_add_signed(delta)
            .unwrap_or_else(|| panic!("offset {self} cannot advance by {delta}"));
        Self {
            medium: self.medium,
            position: moved,
        }
    }

    /// Whether this offset lies strictly before `other`.
    ///
    /// # Panics
    ///
    /// Panics if the offsets belong to different media.
    #[must_use]
    pub fn before(&self, other: &Self) -> bool {
        self.assert_same_medium(other);
        self.position < other.position
    }

    /// Whether this offset lies at or behind `other`.
    ///
    /// # Panics
    ///
    /// Panics if the offsets belong to different media.
    #[must_use]
    pub fn behind_or_equal(&self, other: &Self) -> bool {
        self.assert_same_medium(other);
        self.position >= other.position
    }

    /// The signed distance from this offset to `other` (`other − self`).
    ///
    /// # Panics
    ///
    /// Panics if the offsets belong to different media.
    #[must_use]
    pub fn distance_to(&self, other: &Self) -> i64 {
        self.assert_same_medium(other);
        other.position as i64 - self.position as i64
    }

    pub(crate) fn assert_same_medium(&self, other: &Self) {
        assert!(
            self.medium == other.medium,
            "offsets belong to different media: {self} vs {other}"
        );
    }
}

impl fmt::Display for MediumOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.medium, self.position)
    }
}
