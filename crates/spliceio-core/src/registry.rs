//! Offset rebasing across flushed edits.
//!
//! Callers hand out [`MediumOffset`] values that refer to positions on the
//! medium. Once an edit is flushed, every position at or behind the edit
//! moves. The [`ReferenceRegistry`] keeps the offsets a store has handed
//! out and rebases them wholesale after each flushed edit; the arithmetic
//! itself is the pure [`rebase_offset`] function, usable on any offset.

use crate::action::{ActionKind, PendingAction};
use crate::medium::MediumId;
use crate::offset::MediumOffset;

/// Rebases one offset across one flushed edit.
///
/// Offsets strictly before the edit are unaffected. Behind an insert,
/// offsets move back by the payload length; behind a remove, they move
/// forward by the removed length, clamping to the removal start when they
/// pointed into the removed range. A replace acts as an insert of the
/// grown tail or a remove of the shrunk tail; a same-size replace moves
/// nothing.
///
/// # Panics
///
/// Panics if `action` is not a logical edit or the offset belongs to a
/// different medium than the action.
#[must_use]
pub fn rebase_offset(action: &PendingAction, offset: MediumOffset) -> MediumOffset {
    assert!(
        action.kind().is_edit(),
        "only logical edits rebase offsets"
    );
    let region = action.region();
    let payload_len = action.payload().map_or(0, bytes::Bytes::len) as u64;

    let (edit_start, moved, is_insert) = match action.kind() {
        ActionKind::Insert => (region.start(), payload_len, true),
        ActionKind::Remove => (region.start(), u64::from(region.size()), false),
        ActionKind::Replace => {
            let old = u64::from(region.size());
            if payload_len > old {
                (region.start().advance(old as i64), payload_len - old, true)
            } else if payload_len < old {
                (
                    region.start().advance(payload_len as i64),
                    old - payload_len,
                    false,
                )
            } else {
                return offset;
            }
        }
        _ => unreachable!(),
    };

    if offset.before(&edit_start) {
        return offset;
    }
    if is_insert {
        offset.advance(moved as i64)
    } else if offset.behind_or_equal(&edit_start.advance(moved as i64)) {
        offset.advance(-(moved as i64))
    } else {
        // The offset pointed into the removed range; it collapses onto the
        // removal start.
        edit_start
    }
}

/// The offsets a store has handed out for one medium.
#[derive(Debug)]
pub struct ReferenceRegistry {
    medium: MediumId,
    offsets: Vec<MediumOffset>,
}

impl ReferenceRegistry {
    /// Creates an empty registry for one medium.
    #[must_use]
    pub fn new(medium: MediumId) -> Self {
        Self {
            medium,
            offsets: Vec::new(),
        }
    }

    /// Creates and tracks an offset at the given absolute position.
    #[must_use]
    pub fn create(&mut self, position: u64) -> MediumOffset {
        let offset = MediumOffset::new(self.medium, position);
        self.offsets.push(offset);
        offset
    }

    /// Tracks an existing offset.
    ///
    /// # Panics
    ///
    /// Panics if the offset belongs to a different medium.
    pub fn track(&mut self, offset: MediumOffset) {
        assert!(
            offset.medium() == self.medium,
            "offset {offset} belongs to another medium"
        );
        self.offsets.push(offset);
    }

    /// All tracked offsets, in tracking order.
    #[must_use]
    pub fn offsets(&self) -> &[MediumOffset] {
        &self.offsets
    }

    /// Rebases every tracked offset across one flushed edit.
    pub fn rebase(&mut self, action: &PendingAction) {
        for offset in &mut self.offsets {
            *offset = rebase_offset(action, *offset);
        }
    }

    /// Drops all tracked offsets.
    pub fn clear(&mut self) {
        self.offsets.clear();
    }
}
