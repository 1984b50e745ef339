//! The flush planner: from logical edits to bounded physical I/O.
//!
//! Every staged edit shifts all bytes behind it. The planner models one
//! *shifted block* per causing edit: the edit itself plus the follow-up
//! bytes between the edit and the next one, which move as a unit by the
//! shift accumulated so far.
//!
//! ```text
//!   insert "xx" at 4, medium length 12:
//!
//!   source:  0 1 2 3 [4 .. 11]          follow-up bytes
//!                     └─────┴──┐  shift +2, back-to-front
//!   target:  0 1 2 3 x x [6 .. 13]
//! ```
//!
//! Follow-up bytes are moved through chunked READ/WRITE pairs of at most
//! `max_io_block_size` bytes: back-to-front when the shift is positive,
//! front-to-back otherwise, so a write never clobbers unread source bytes
//! of its own block. Across blocks the same hazard exists, so blocks are
//! ordered for emission such that a block whose source bytes lie in
//! another block's target range runs first.

use std::cmp::Ordering;

use tracing::debug;

use crate::action::{ActionKind, PendingAction};
use crate::chunk::chunks;
use crate::offset::MediumOffset;
use crate::region::MediumRegion;

/// One causing edit plus the follow-up bytes it shifts.
#[derive(Debug, Clone)]
struct ShiftedBlock {
    causing: PendingAction,
    /// First unmodified physical byte behind the causing edit's own span.
    follow_up_start: MediumOffset,
    /// Accumulated shift including this edit's own size delta.
    total_shift: i64,
    /// Number of follow-up bytes, zero while the accumulated shift at this
    /// point is zero (nothing behind needs to move).
    follow_up_len: u64,
}

impl ShiftedBlock {
    fn new(causing: PendingAction, total_shift: i64) -> Self {
        let region = causing.region();
        let follow_up_start = match causing.kind() {
            ActionKind::Insert => region.start(),
            ActionKind::Remove | ActionKind::Replace => region.end(),
            kind => panic!("flush plans are built from logical edits, not {}", kind.name()),
        };
        Self {
            causing,
            follow_up_start,
            total_shift,
            follow_up_len: 0,
        }
    }

    fn payload_len(&self) -> u64 {
        self.causing.payload().map_or(0, bytes::Bytes::len) as u64
    }

    /// Absolute source range of the follow-up bytes.
    fn source(&self) -> (u64, u64) {
        let start = self.follow_up_start.absolute();
        (start, start + self.follow_up_len)
    }

    /// Absolute target range: payload bytes first, then the shifted
    /// follow-up bytes.
    fn target(&self) -> (u64, u64) {
        let start = self
            .causing
            .region()
            .start()
            .advance(self.total_shift - self.causing.size_delta())
            .absolute();
        (start, start + self.payload_len() + self.follow_up_len)
    }

    /// The plan steps of this block: chunked READ/WRITE pairs moving the
    /// follow-up bytes in the safe direction, then chunked payload writes,
    /// then the causing edit itself as a marker.
    fn resulting_actions(&self, max_block: u32) -> Vec<PendingAction> {
        let mut out = Vec::new();
        let max = u64::from(max_block);
        let full_blocks = self.follow_up_len / max;
        let remainder = self.follow_up_len % max;
        let backward = self.total_shift > 0;

        let mut read_at = if backward && full_blocks > 0 {
            self.follow_up_start.advance(self.follow_up_len as i64)
        } else {
            self.follow_up_start
        };
        let mut write_at = read_at.advance(self.total_shift);
        for _ in 0..full_blocks {
            if backward {
                read_at = read_at.advance(-(max as i64));
                write_at = write_at.advance(-(max as i64));
            }
            out.push(read_step(read_at, max_block));
            out.push(write_step(write_at, max_block, None));
            if !backward {
                read_at = read_at.advance(max as i64);
                write_at = write_at.advance(max as i64);
            }
        }
        if remainder > 0 {
            if backward && full_blocks > 0 {
                read_at = read_at.advance(-(remainder as i64));
                write_at = write_at.advance(-(remainder as i64));
            }
            out.push(read_step(read_at, remainder as u32));
            out.push(write_step(write_at, remainder as u32, None));
        }

        if let Some(payload) = self.causing.payload() {
            let payload_start = self
                .causing
                .region()
                .start()
                .advance(self.total_shift - self.causing.size_delta());
            for (chunk_start, chunk_len) in chunks(payload_start, payload.len() as u64, max_block) {
                let skip = payload_start.distance_to(&chunk_start) as usize;
                out.push(write_step(
                    chunk_start,
                    chunk_len,
                    Some(payload.slice(skip..skip + chunk_len as usize)),
                ));
            }
        }
        out.push(self.causing.clone());
        out
    }
}

fn read_step(at: MediumOffset, len: u32) -> PendingAction {
    PendingAction::new(ActionKind::Read, MediumRegion::uncached(at, len), 0, None)
}

fn write_step(at: MediumOffset, len: u32, payload: Option<bytes::Bytes>) -> PendingAction {
    PendingAction::new(ActionKind::Write, MediumRegion::uncached(at, len), 0, payload)
}

/// Emission order of two blocks: a block runs first when its source bytes
/// would otherwise be clobbered by the other block's target range, or when
/// the other's target starts at or behind its source. Same-offset inserts
/// run in descending sequence order so the earliest submission ends up at
/// the lowest final offset.
fn emission_order(left: &ShiftedBlock, right: &ShiftedBlock) -> Ordering {
    if left.causing == right.causing {
        return Ordering::Equal;
    }
    if left.causing.kind() == ActionKind::Insert
        && right.causing.kind() == ActionKind::Insert
        && left.causing.region().start() == right.causing.region().start()
    {
        return if left.causing.sequence() > right.causing.sequence() {
            Ordering::Less
        } else {
            Ordering::Greater
        };
    }
    let (left_src_start, left_src_end) = left.source();
    let (right_tgt_start, right_tgt_end) = right.target();
    let clobbers_source_start =
        right_tgt_start <= left_src_start && left_src_start < right_tgt_end;
    let clobbers_source_end = right_tgt_start <= left_src_end && right_tgt_end > left_src_end;
    if clobbers_source_start || clobbers_source_end || right_tgt_start >= left_src_start {
        Ordering::Less
    } else {
        Ordering::Greater
    }
}

/// Binary insertion sort under [`emission_order`]. The relation is only a
/// pairwise rule, not a total order, so the generic sorts cannot be used;
/// each block is placed by binary search among the already placed ones.
fn sort_for_emission(blocks: &mut [ShiftedBlock]) {
    for i in 1..blocks.len() {
        let mut lo = 0;
        let mut hi = i;
        while lo < hi {
            let mid = (lo + hi) / 2;
            if emission_order(&blocks[i], &blocks[mid]) == Ordering::Less {
                hi = mid;
            } else {
                lo = mid + 1;
            }
        }
        blocks[lo..=i].rotate_right(1);
    }
}

/// Builds the physical flush plan for a batch of logical edits.
///
/// The returned plan consists of READ/WRITE steps of at most
/// `max_io_block_size` bytes, the causing edits themselves as markers, and
/// a final TRUNCATE when the medium shrinks. Executing the steps in order
/// against the medium's current bytes produces exactly the content implied
/// by applying the edits logically. Edit regions must not overlap (the
/// change set guarantees this for staged edits).
///
/// # Panics
///
/// Panics if `max_io_block_size` is zero, an action is not a logical edit,
/// or the edits belong to different media.
#[must_use]
pub fn create_flush_plan(
    actions: impl IntoIterator<Item = PendingAction>,
    medium_length: u64,
    max_io_block_size: u32,
) -> Vec<PendingAction> {
    assert!(max_io_block_size > 0, "I/O block size must be positive");
    let mut edits: Vec<PendingAction> = actions.into_iter().collect();
    edits.sort();

    let mut blocks: Vec<ShiftedBlock> = Vec::with_capacity(edits.len());
    let mut delta = 0i64;
    for action in edits {
        if let Some(last) = blocks.last_mut() {
            last.follow_up_len = if delta == 0 {
                0
            } else {
                let len = last.follow_up_start.distance_to(&action.region().start());
                assert!(len >= 0, "edit regions overlap at {}", action.region().start());
                len as u64
            };
        }
        delta += action.size_delta();
        blocks.push(ShiftedBlock::new(action, delta));
    }
    let Some(last) = blocks.last_mut() else {
        return Vec::new();
    };
    last.follow_up_len = if delta == 0 {
        0
    } else {
        medium_length - last.follow_up_start.absolute()
    };

    sort_for_emission(&mut blocks);

    let mut plan = Vec::new();
    for block in &blocks {
        plan.extend(block.resulting_actions(max_io_block_size));
    }
    if delta < 0 {
        let medium = blocks[0].causing.region().start().medium();
        let new_end = MediumOffset::new(medium, (medium_length as i64 + delta) as u64);
        plan.push(PendingAction::new(
            ActionKind::Truncate,
            MediumRegion::uncached(new_end, (-delta) as u32),
            0,
            None,
        ));
    }
    debug!(steps = plan.len(), net_delta = delta, "flush plan created");
    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::medium::{Medium, MediumConfig};
    use bytes::Bytes;

    fn test_medium() -> Medium {
        Medium::new("test".into(), false, true, Some(1000), MediumConfig::default())
    }

    fn insert(medium: &Medium, at: u64, payload: &[u8], seq: u64) -> PendingAction {
        PendingAction::new(
            ActionKind::Insert,
            MediumRegion::uncached(medium.offset_at(at), payload.len() as u32),
            seq,
            Some(Bytes::copy_from_slice(payload)),
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

    fn replace(medium: &Medium, at: u64, len: u32, payload: &[u8], seq: u64) -> PendingAction {
        PendingAction::new(
            ActionKind::Replace,
            MediumRegion::uncached(medium.offset_at(at), len),
            seq,
            Some(Bytes::copy_from_slice(payload)),
        )
    }

    fn steps(plan: &[PendingAction]) -> Vec<(ActionKind, u64, u32)> {
        plan.iter()
            .map(|a| (a.kind(), a.region().start().absolute(), a.region().size()))
            .collect()
    }

    /// Executes a plan against an in-memory model of the medium.
    fn apply(plan: &[PendingAction], data: &mut Vec<u8>) {
        let mut last_read: Option<Vec<u8>> = None;
        for step in plan {
            let at = step.region().start().absolute() as usize;
            match step.kind() {
                ActionKind::Read => {
                    let len = step.region().size() as usize;
                    last_read = Some(data[at..at + len].to_vec());
                }
                ActionKind::Write => {
                    let bytes = step.payload().map_or_else(
                        || last_read.take().unwrap(),
                        |payload| payload.to_vec(),
                    );
                    if data.len() < at + bytes.len() {
                        data.resize(at + bytes.len(), 0);
                    }
                    data[at..at + bytes.len()].copy_from_slice(&bytes);
                }
                ActionKind::Truncate => data.truncate(at),
                _ => {}
            }
        }
    }

    /// Applies edits by naive splicing: descending start order keeps the
    /// earlier offsets valid while later ones are spliced.
    fn spliced(data: &[u8], edits: &[PendingAction]) -> Vec<u8> {
        let mut sorted = edits.to_vec();
        sorted.sort();
        let mut out = data.to_vec();
        for edit in sorted.iter().rev() {
            let at = edit.region().start().absolute() as usize;
            let len = edit.region().size() as usize;
            match edit.kind() {
                ActionKind::Insert => {
                    let payload = edit.payload().unwrap().to_vec();
                    out.splice(at..at, payload);
                }
                ActionKind::Remove => {
                    out.drain(at..at + len);
                }
                ActionKind::Replace => {
                    let payload = edit.payload().unwrap().to_vec();
                    out.splice(at..at + len, payload);
                }
                _ => unreachable!(),
            }
        }
        out
    }

    fn sample(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    fn check_model(medium_len: usize, max_block: u32, edits: Vec<PendingAction>) {
        let data = sample(medium_len);
        let expected = spliced(&data, &edits);
        let plan = create_flush_plan(edits, medium_len as u64, max_block);
        for step in &plan {
            if matches!(step.kind(), ActionKind::Read | ActionKind::Write) {
                assert!(step.region().size() <= max_block, "oversized step {step}");
            }
        }
        let mut actual = data;
        apply(&plan, &mut actual);
        assert_eq!(actual, expected);
    }

    #[test]
    fn test_empty_batch_yields_empty_plan() {
        assert!(create_flush_plan(Vec::new(), 1000, 10).is_empty());
    }

    #[test]
    fn test_single_insert_moves_follow_up_back_to_front() {
        let medium = test_medium();
        let action = insert(&medium, 10, b"xy", 0);
        let plan = create_flush_plan(vec![action.clone()], 30, 8);
        assert_eq!(
            steps(&plan),
            vec![
                (ActionKind::Read, 22, 8),
                (ActionKind::Write, 24, 8),
                (ActionKind::Read, 14, 8),
                (ActionKind::Write, 16, 8),
                (ActionKind::Read, 10, 4),
                (ActionKind::Write, 12, 4),
                (ActionKind::Write, 10, 2),
                (ActionKind::Insert, 10, 2),
            ]
        );
        assert_eq!(plan[6].payload().unwrap().as_ref(), b"xy");
        assert_eq!(plan[7], action);
    }

    #[test]
    fn test_single_remove_moves_forward_and_truncates() {
        let medium = test_medium();
        let plan = create_flush_plan(vec![remove(&medium, 5, 3, 0)], 20, 8);
        assert_eq!(
            steps(&plan),
            vec![
                (ActionKind::Read, 8, 8),
                (ActionKind::Write, 5, 8),
                (ActionKind::Read, 16, 4),
                (ActionKind::Write, 13, 4),
                (ActionKind::Remove, 5, 3),
                (ActionKind::Truncate, 17, 3),
            ]
        );
    }

    #[test]
    fn test_same_size_replace_writes_payload_only() {
        let medium = test_medium();
        let plan = create_flush_plan(vec![replace(&medium, 4, 3, b"abc", 0)], 20, 8);
        assert_eq!(
            steps(&plan),
            vec![(ActionKind::Write, 4, 3), (ActionKind::Replace, 4, 3)]
        );
    }

    #[test]
    fn test_insert_then_remove_example() {
        // 1000-byte medium: insert 5 bytes at 100, remove 3 bytes at 200.
        // Bytes [105, 200) shift back by 5, bytes [203, 1000) by 2 net.
        let medium = test_medium();
        let edits = vec![
            insert(&medium, 100, b"ABCDE", 0),
            remove(&medium, 200, 3, 1),
        ];
        check_model(1000, 128, edits.clone());

        let plan = create_flush_plan(edits, 1000, 4096);
        // The remove block runs first: its source starts at 203, inside
        // the insert block's target range [100, 205).
        assert_eq!(
            steps(&plan),
            vec![
                (ActionKind::Read, 203, 797),
                (ActionKind::Write, 205, 797),
                (ActionKind::Remove, 200, 3),
                (ActionKind::Read, 100, 100),
                (ActionKind::Write, 105, 100),
                (ActionKind::Write, 100, 5),
                (ActionKind::Insert, 100, 5),
            ]
        );
    }

    #[test]
    fn test_inserts_at_same_offset_apply_in_submission_order() {
        let medium = test_medium();
        let edits = vec![
            insert(&medium, 10, b"first", 0),
            insert(&medium, 10, b"second", 1),
        ];
        let data = sample(40);
        let plan = create_flush_plan(edits, 40, 16);
        let mut actual = data.clone();
        apply(&plan, &mut actual);
        let mut expected = data[..10].to_vec();
        expected.extend_from_slice(b"first");
        expected.extend_from_slice(b"second");
        expected.extend_from_slice(&data[10..]);
        assert_eq!(actual, expected);
    }

    #[test]
    fn test_growing_replace_model() {
        let medium = test_medium();
        check_model(100, 8, vec![replace(&medium, 20, 4, b"0123456789", 0)]);
    }

    #[test]
    fn test_shrinking_replace_truncates() {
        let medium = test_medium();
        let edits = vec![replace(&medium, 20, 10, b"ab", 0)];
        let plan = create_flush_plan(edits.clone(), 100, 8);
        assert_eq!(plan.last().unwrap().kind(), ActionKind::Truncate);
        assert_eq!(plan.last().unwrap().region().start().absolute(), 92);
        check_model(100, 8, edits);
    }

    #[test]
    fn test_mixed_batch_model() {
        let medium = test_medium();
        check_model(
            500,
            32,
            vec![
                insert(&medium, 20, b"..insert..", 0),
                remove(&medium, 100, 40, 1),
                replace(&medium, 200, 10, b"xyz", 2),
                insert(&medium, 400, b"tail", 3),
            ],
        );
    }

    #[test]
    fn test_remove_at_very_end_needs_no_moves() {
        let medium = test_medium();
        let plan = create_flush_plan(vec![remove(&medium, 90, 10, 0)], 100, 8);
        assert_eq!(
            steps(&plan),
            vec![(ActionKind::Remove, 90, 10), (ActionKind::Truncate, 90, 10)]
        );
    }

    #[test]
    fn test_insert_after_remove_at_same_offset() {
        // Insert staged first, then a remove starting at the same offset:
        // the payload ends up where the removed bytes were.
        let medium = test_medium();
        let edits = vec![
            insert(&medium, 10, b"NEW", 0),
            remove(&medium, 10, 3, 1),
        ];
        let data = sample(30);
        let plan = create_flush_plan(edits, 30, 8);
        let mut actual = data.clone();
        apply(&plan, &mut actual);
        let mut expected = data[..10].to_vec();
        expected.extend_from_slice(b"NEW");
        expected.extend_from_slice(&data[13..]);
        assert_eq!(actual, expected);
    }
}
