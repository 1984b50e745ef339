//! Bookkeeping of staged, not yet flushed edits.
//!
//! A [`ChangeSet`] holds the logical edits of one medium in submission
//! order and keeps them consistent: a new remove or replace swallows edits
//! it fully contains, and partially overlapping removes or replaces are
//! rejected outright so a flush plan never sees conflicting regions.

use std::collections::BTreeSet;

use bytes::Bytes;
use tracing::debug;

use crate::action::{ActionKind, PendingAction};
use crate::error::{MediumError, MediumResult};
use crate::medium::MediumId;
use crate::offset::MediumOffset;
use crate::region::{MediumRegion, RegionOverlap};

/// The staged edits of one medium.
#[derive(Debug)]
pub struct ChangeSet {
    medium: MediumId,
    actions: BTreeSet<PendingAction>,
    next_sequence: u64,
}

impl ChangeSet {
    /// Creates an empty change set for one medium.
    #[must_use]
    pub fn new(medium: MediumId) -> Self {
        Self {
            medium,
            actions: BTreeSet::new(),
            next_sequence: 0,
        }
    }

    /// The medium this change set belongs to.
    #[must_use]
    pub fn medium(&self) -> MediumId {
        self.medium
    }

    /// Number of staged edits.
    #[must_use]
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Staged edits in ascending `(start, sequence)` order.
    pub fn iter(&self) -> impl Iterator<Item = &PendingAction> {
        self.actions.iter()
    }

    /// Drops all staged edits.
    pub fn clear(&mut self) {
        self.actions.clear();
    }

    /// Stages an insert of `payload` at `offset`. Later bytes will shift
    /// back by the payload length on flush.
    ///
    /// Fails with [`MediumError::OverlappingEdit`] when the insertion point
    /// lies inside a staged remove or replace region. The reverse order is
    /// fine: a remove or replace staged *after* an insert at its start
    /// keeps that insert, and the flushed result places the payload before
    /// the removed span.
    ///
    /// # Panics
    ///
    /// Panics if the payload is empty, longer than `u32::MAX`, or `offset`
    /// belongs to another medium.
    pub fn schedule_insert(
        &mut self,
        offset: MediumOffset,
        payload: Bytes,
    ) -> MediumResult<PendingAction> {
        self.assert_own_medium(offset);
        assert!(!payload.is_empty(), "insert payload must not be empty");
        let size = region_size(offset, payload.len());
        for existing in &self.actions {
            if matches!(existing.kind(), ActionKind::Remove | ActionKind::Replace)
                && existing.region().contains(&offset)
            {
                return Err(overlap_error(offset, size, existing));
            }
        }
        let region = MediumRegion::uncached(offset, size);
        Ok(self.stage(ActionKind::Insert, region, Some(payload)))
    }

    /// Stages a remove of `len` existing bytes at `offset`.
    ///
    /// Staged inserts strictly inside the removed region and staged removes
    /// or replaces fully contained in it are undone (the new edit covers
    /// them). A partial overlap with a staged remove or replace fails with
    /// [`MediumError::OverlappingEdit`].
    ///
    /// # Panics
    ///
    /// Panics if `len` is zero or `offset` belongs to another medium.
    pub fn schedule_remove(
        &mut self,
        offset: MediumOffset,
        len: u32,
    ) -> MediumResult<PendingAction> {
        self.assert_own_medium(offset);
        assert!(len > 0, "removed range must not be empty");
        let region = MediumRegion::uncached(offset, len);
        self.swallow_covered_edits(&region)?;
        Ok(self.stage(ActionKind::Remove, region, None))
    }

    /// Stages a replace of `len` existing bytes at `offset` with `payload`
    /// (sizes may differ). Overlap handling as for [`Self::schedule_remove`].
    ///
    /// # Panics
    ///
    /// Panics if `len` is zero, the payload is longer than `u32::MAX`, or
    /// `offset` belongs to another medium.
    pub fn schedule_replace(
        &mut self,
        offset: MediumOffset,
        len: u32,
        payload: Bytes,
    ) -> MediumResult<PendingAction> {
        self.assert_own_medium(offset);
        assert!(len > 0, "replaced range must not be empty");
        let _ = region_size(offset, payload.len());
        let region = MediumRegion::uncached(offset, len);
        self.swallow_covered_edits(&region)?;
        Ok(self.stage(ActionKind::Replace, region, Some(payload)))
    }

    /// Withdraws a staged edit.
    ///
    /// # Errors
    ///
    /// Fails with [`MediumError::UnknownAction`] when the action is not (or
    /// no longer) staged.
    pub fn undo(&mut self, action: &PendingAction) -> MediumResult<()> {
        if self.actions.remove(action) {
            debug!(action = %action, "undoing staged edit");
            Ok(())
        } else {
            Err(MediumError::UnknownAction)
        }
    }

    /// Undoes staged edits the new remove/replace region fully covers and
    /// rejects partial overlaps.
    fn swallow_covered_edits(&mut self, new_region: &MediumRegion) -> MediumResult<()> {
        let mut covered = Vec::new();
        for existing in &self.actions {
            match existing.kind() {
                ActionKind::Insert => {
                    let at = existing.region().start();
                    if new_region.contains(&at) && at != new_region.start() {
                        covered.push(existing.clone());
                    }
                }
                ActionKind::Remove | ActionKind::Replace => {
                    match existing.region().overlap_kind(new_region) {
                        RegionOverlap::NoOverlap => {}
                        RegionOverlap::SameRange | RegionOverlap::LeftInsideRight => {
                            covered.push(existing.clone());
                        }
                        RegionOverlap::RightInsideLeft
                        | RegionOverlap::LeftOverlapsFront
                        | RegionOverlap::LeftOverlapsBack => {
                            return Err(overlap_error(
                                new_region.start(),
                                new_region.size(),
                                existing,
                            ));
                        }
                    }
                }
                ActionKind::Read | ActionKind::Write | ActionKind::Truncate => {}
            }
        }
        for action in covered {
            debug!(action = %action, "new edit covers staged edit");
            self.actions.remove(&action);
        }
        Ok(())
    }

    fn stage(
        &mut self,
        kind: ActionKind,
        region: MediumRegion,
        payload: Option<Bytes>,
    ) -> PendingAction {
        let action = PendingAction::new(kind, region, self.next_sequence, payload);
        self.next_sequence += 1;
        debug!(action = %action, "staging edit");
        self.actions.insert(action.clone());
        action
    }

    fn assert_own_medium(&self, offset: MediumOffset) {
        assert!(
            offset.medium() == self.medium,
            "offset {offset} belongs to another medium"
        );
    }
}

fn region_size(offset: MediumOffset, payload_len: usize) -> u32 {
    u32::try_from(payload_len).unwrap_or_else(|_| {
        panic!("payload at {offset} exceeds the maximum region size");
    })
}

fn overlap_error(start: MediumOffset, size: u32, existing: &PendingAction) -> MediumError {
    MediumError::OverlappingEdit {
        new_start: start,
        new_size: size,
        existing_kind: existing.kind().name(),
        existing_start: existing.region().start(),
        existing_size: existing.region().size(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::medium::{Medium, MediumConfig};

    fn test_medium() -> Medium {
        Medium::new("test".into(), false, true, Some(1000), MediumConfig::default())
    }

    fn payload(len: usize) -> Bytes {
        Bytes::from(vec![b'p'; len])
    }

    #[test]
    fn test_sequence_numbers_increase_with_submission() {
        let medium = test_medium();
        let mut changes = ChangeSet::new(medium.id());
        let a = changes.schedule_insert(medium.offset_at(500), payload(2)).unwrap();
        let b = changes.schedule_remove(medium.offset_at(100), 10).unwrap();
        assert_eq!(a.sequence(), 0);
        assert_eq!(b.sequence(), 1);
        // Iteration is by offset, not submission.
        let offsets: Vec<u64> = changes.iter().map(|a| a.region().start().absolute()).collect();
        assert_eq!(offsets, vec![100, 500]);
    }

    #[test]
    fn test_remove_swallows_insert_strictly_inside() {
        let medium = test_medium();
        let mut changes = ChangeSet::new(medium.id());
        let _ = changes.schedule_insert(medium.offset_at(105), payload(3)).unwrap();
        let at_start = changes.schedule_insert(medium.offset_at(100), payload(3)).unwrap();
        let _ = changes.schedule_remove(medium.offset_at(100), 10).unwrap();
        // The insert at the region start survives, the inner one is gone.
        assert_eq!(changes.len(), 2);
        assert!(changes.iter().any(|a| *a == at_start));
    }

    #[test]
    fn test_remove_swallows_contained_remove() {
        let medium = test_medium();
        let mut changes = ChangeSet::new(medium.id());
        let inner = changes.schedule_remove(medium.offset_at(110), 5).unwrap();
        let _ = changes.schedule_remove(medium.offset_at(100), 50).unwrap();
        assert_eq!(changes.len(), 1);
        assert!(changes.undo(&inner).is_err());
    }

    #[test]
    fn test_partial_overlap_is_rejected() {
        let medium = test_medium();
        let mut changes = ChangeSet::new(medium.id());
        let _ = changes.schedule_remove(medium.offset_at(100), 10).unwrap();
        let result = changes.schedule_replace(medium.offset_at(105), 10, payload(4));
        assert!(matches!(result, Err(MediumError::OverlappingEdit { .. })));
        let result = changes.schedule_remove(medium.offset_at(102), 5);
        assert!(matches!(result, Err(MediumError::OverlappingEdit { .. })));
        assert_eq!(changes.len(), 1);
    }

    #[test]
    fn test_insert_inside_staged_remove_is_rejected() {
        let medium = test_medium();
        let mut changes = ChangeSet::new(medium.id());
        let _ = changes.schedule_remove(medium.offset_at(100), 10).unwrap();
        let inside = changes.schedule_insert(medium.offset_at(104), payload(2));
        assert!(matches!(inside, Err(MediumError::OverlappingEdit { .. })));
        let at_start = changes.schedule_insert(medium.offset_at(100), payload(2));
        assert!(matches!(at_start, Err(MediumError::OverlappingEdit { .. })));
        // The first byte after the removed range is free again.
        assert!(changes.schedule_insert(medium.offset_at(110), payload(2)).is_ok());
    }

    #[test]
    fn test_undo_unknown_action_fails() {
        let medium = test_medium();
        let mut changes = ChangeSet::new(medium.id());
        let action = changes.schedule_remove(medium.offset_at(0), 1).unwrap();
        changes.undo(&action).unwrap();
        assert!(matches!(changes.undo(&action), Err(MediumError::UnknownAction)));
        assert!(changes.is_empty());
    }
}
