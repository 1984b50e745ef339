//! Logical edits and physical plan steps.
//!
//! A [`PendingAction`] is either a staged logical edit (insert, remove,
//! replace) or a physical step of a flush plan (read, write, truncate).
//! Logical edits carry a sequence number assigned at submission; the total
//! order over actions is `(start offset, sequence)` first, then a fixed
//! comparison of the remaining fields so that distinct actions never
//! compare equal.

use std::cmp::Ordering;
use std::fmt;

use bytes::Bytes;

use crate::region::MediumRegion;

/// What an action does to the medium.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ActionKind {
    /// Insert the payload at the region start, shifting later bytes back.
    Insert,
    /// Remove the region's bytes, shifting later bytes forward.
    Remove,
    /// Replace the region's bytes with the payload (sizes may differ).
    Replace,
    /// Physically read the region's bytes (plan step).
    Read,
    /// Physically write the payload, or the previously read bytes, at the
    /// region start (plan step).
    Write,
    /// Physically cut the medium at the region start (plan step).
    Truncate,
}

impl ActionKind {
    /// Whether this is a logical edit rather than a physical plan step.
    #[must_use]
    pub fn is_edit(&self) -> bool {
        matches!(self, Self::Insert | Self::Remove | Self::Replace)
    }

    pub(crate) fn name(self) -> &'static str {
        match self {
            Self::Insert => "insert",
            Self::Remove => "remove",
            Self::Replace => "replace",
            Self::Read => "read",
            Self::Write => "write",
            Self::Truncate => "truncate",
        }
    }
}

/// One staged edit or one physical plan step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingAction {
    kind: ActionKind,
    region: MediumRegion,
    sequence: u64,
    payload: Option<Bytes>,
}

impl PendingAction {
    /// Creates an action over `region`.
    ///
    /// For inserts the region describes the insertion point and the payload
    /// length; for removes and replaces it describes the affected existing
    /// bytes. Plan steps use sequence 0.
    #[must_use]
    pub fn new(
        kind: ActionKind,
        region: MediumRegion,
        sequence: u64,
        payload: Option<Bytes>,
    ) -> Self {
        Self {
            kind,
            region,
            sequence,
            payload,
        }
    }

    #[must_use]
    pub fn kind(&self) -> ActionKind {
        self.kind
    }

    /// The affected region, in pre-flush medium coordinates.
    #[must_use]
    pub fn region(&self) -> &MediumRegion {
        &self.region
    }

    /// Submission order among the staged edits of one medium.
    #[must_use]
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Bytes to be written, for inserts, replaces and payload plan writes.
    #[must_use]
    pub fn payload(&self) -> Option<&Bytes> {
        self.payload.as_ref()
    }

    /// How many bytes this action grows (positive) or shrinks (negative)
    /// the medium by.
    #[must_use]
    pub fn size_delta(&self) -> i64 {
        let payload_len = self.payload.as_ref().map_or(0, Bytes::len) as i64;
        match self.kind {
            ActionKind::Insert => payload_len,
            ActionKind::Remove => -i64::from(self.region.size()),
            ActionKind::Replace => payload_len - i64::from(self.region.size()),
            ActionKind::Read | ActionKind::Write | ActionKind::Truncate => 0,
        }
    }
}

impl Ord for PendingAction {
    /// Total order: start offset, then sequence; the remaining fields only
    /// break ties deterministically and carry no meaning.
    ///
    /// # Panics
    ///
    /// Panics if the actions belong to different media.
    fn cmp(&self, other: &Self) -> Ordering {
        self.region
            .start()
            .assert_same_medium(&other.region.start());
        self.region
            .start()
            .absolute()
            .cmp(&other.region.start().absolute())
            .then_with(|| self.sequence.cmp(&other.sequence))
            .then_with(|| self.kind.cmp(&other.kind))
            .then_with(|| self.region.size().cmp(&other.region.size()))
            .then_with(|| self.payload.cmp(&other.payload))
    }
}

impl PartialOrd for PendingAction {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for PendingAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} (seq {})", self.kind.name(), self.region, self.sequence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::medium::{Medium, MediumConfig};
    use crate::region::MediumRegion;

    fn test_medium() -> Medium {
        Medium::new("test".into(), false, true, Some(1000), MediumConfig::default())
    }

    fn insert(medium: &Medium, at: u64, payload: &'static [u8], seq: u64) -> PendingAction {
        PendingAction::new(
            ActionKind::Insert,
            MediumRegion::uncached(medium.offset_at(at), payload.len() as u32),
            seq,
            Some(Bytes::from_static(payload)),
        )
    }

    fn remove(medium: &Medium, at: u64, len: u32, seq: u64) -> PendingAction {
        PendingAction::new(
            ActionKind::Remove,
            MediumRegion::uncached(medium.offset_at(at), len),
            seq,
            None,
        )
    }

    #[test]
    fn test_size_delta() {
        let medium = test_medium();
        assert_eq!(insert(&medium, 0, b"hello", 0).size_delta(), 5);
        assert_eq!(remove(&medium, 0, 7, 0).size_delta(), -7);
        let replace = PendingAction::new(
            ActionKind::Replace,
            MediumRegion::uncached(medium.offset_at(0), 10),
            0,
            Some(Bytes::from_static(b"abc")),
        );
        assert_eq!(replace.size_delta(), -7);
    }

    #[test]
    fn test_order_by_offset_then_sequence() {
        let medium = test_medium();
        let a = insert(&medium, 100, b"x", 3);
        let b = insert(&medium, 200, b"x", 1);
        let c = insert(&medium, 100, b"x", 5);
        assert!(a < b);
        assert!(a < c);
        assert!(c < b);
    }

    #[test]
    fn test_distinct_actions_never_tie() {
        let medium = test_medium();
        let a = remove(&medium, 100, 5, 1);
        let b = insert(&medium, 100, b"abcde", 1);
        assert_ne!(a.cmp(&b), Ordering::Equal);
        assert_eq!(a.cmp(&a.clone()), Ordering::Equal);
    }
}
