//! The engine facade: cached reads and staged edits over one medium.
//!
//! A [`MediumStore`] owns one accessor plus the bookkeeping around it: the
//! region cache serving reads, the change set holding staged edits, and
//! the reference registry keeping handed-out offsets valid across flushes.
//!
//! Reads go through the cache; gaps are read from the medium in bounded
//! chunks and cached on the way. Edits are staged only — [`flush`]
//! (MediumStore::flush) builds the physical plan, executes it against the
//! accessor, and then carries cache content and tracked offsets across the
//! resulting byte shifts.

use bytes::{Bytes, BytesMut};
use tracing::debug;

use crate::accessor::MediumAccessor;
use crate::action::{ActionKind, PendingAction};
use crate::cache::RegionCache;
use crate::changes::ChangeSet;
use crate::error::{MediumError, MediumResult};
use crate::medium::Medium;
use crate::offset::MediumOffset;
use crate::planner::create_flush_plan;
use crate::region::MediumRegion;
use crate::registry::{ReferenceRegistry, rebase_offset};

/// Edit engine over one medium.
#[derive(Debug)]
pub struct MediumStore<A: MediumAccessor> {
    accessor: A,
    cache: RegionCache,
    registry: ReferenceRegistry,
    changes: ChangeSet,
    open: bool,
}

impl<A: MediumAccessor> MediumStore<A> {
    /// Creates a store over `accessor`. The store is not open yet.
    #[must_use]
    pub fn new(accessor: A) -> Self {
        let medium = accessor.medium();
        let config = *medium.config();
        let id = medium.id();
        Self {
            accessor,
            cache: RegionCache::new(id, config.max_cache_size, config.max_region_size),
            registry: ReferenceRegistry::new(id),
            changes: ChangeSet::new(id),
            open: false,
        }
    }

    /// Opens the underlying medium for exclusive use.
    pub fn open(&mut self) -> MediumResult<()> {
        self.accessor.open()?;
        self.open = true;
        debug!(medium = %self.medium(), "store opened");
        Ok(())
    }

    /// Closes the store, dropping cache content, staged edits and tracked
    /// offsets.
    pub fn close(&mut self) -> MediumResult<()> {
        self.ensure_open()?;
        self.cache.clear();
        self.changes.clear();
        self.registry.clear();
        self.accessor.close()?;
        self.open = false;
        debug!(medium = %self.medium(), "store closed");
        Ok(())
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.open
    }

    /// The medium this store edits.
    #[must_use]
    pub fn medium(&self) -> &Medium {
        self.accessor.medium()
    }

    /// The underlying accessor.
    #[must_use]
    pub fn accessor(&self) -> &A {
        &self.accessor
    }

    /// The offsets handed out by [`create_offset`](Self::create_offset),
    /// rebased across every flush.
    #[must_use]
    pub fn registry(&self) -> &ReferenceRegistry {
        &self.registry
    }

    /// The staged, not yet flushed edits in ascending order.
    pub fn pending_changes(&self) -> impl Iterator<Item = &PendingAction> {
        self.changes.iter()
    }

    /// Creates an offset at `position` and tracks it for rebasing.
    pub fn create_offset(&mut self, position: u64) -> MediumResult<MediumOffset> {
        self.ensure_open()?;
        Ok(self.registry.create(position))
    }

    /// Whether `offset` lies at (or past) the end of the medium.
    pub fn is_at_end_of_medium(&mut self, offset: MediumOffset) -> MediumResult<bool> {
        self.ensure_open()?;
        if self.medium().is_random_access() {
            self.accessor.set_position(offset)?;
        }
        self.accessor.at_end_of_medium()
    }

    /// Number of consecutive cached bytes available at `offset`.
    #[must_use]
    pub fn cached_byte_count_at(&self, offset: MediumOffset) -> u32 {
        self.cache.cached_byte_count_at(offset)
    }

    /// Drops cached bytes in `[offset, offset + len)`.
    pub fn discard(&mut self, offset: MediumOffset, len: u32) {
        self.cache.discard(offset, len);
    }

    /// Pre-reads `[offset, offset + len)` into the cache, reading only the
    /// gaps. A no-op when caching is disabled. On streams this consumes the
    /// medium forward from the current position.
    pub fn cache(&mut self, offset: MediumOffset, len: u32) -> MediumResult<()> {
        self.ensure_open()?;
        if !self.medium().config().caching_enabled || len == 0 {
            return Ok(());
        }
        if self.medium().is_random_access() {
            let initial = self.cache.total_size();
            let range = MediumRegion::uncached(offset, len);
            for region in self.cache.get_regions_in_range(offset, len) {
                let clipped = region.clip_against(&range).overlap;
                if clipped.is_cached() {
                    // Reading earlier gaps may have evicted this region in
                    // the meantime; re-add it so the whole range is warm.
                    if self.was_evicted_while_filling(&clipped, initial, len) {
                        self.cache.add_region(clipped);
                    }
                } else {
                    self.read_and_cache(clipped.start(), u64::from(clipped.size()))?;
                }
            }
        } else {
            self.read_up_to(offset)?;
            let position = self.accessor.current_position();
            let consumed = offset.distance_to(&position);
            let remaining = i64::from(len) - consumed;
            if remaining > 0 {
                self.read_and_cache(position, remaining as u64)?;
            }
        }
        Ok(())
    }

    /// Reads exactly `len` bytes at `offset`, serving cached ranges from
    /// memory and reading gaps from the medium (caching them on the way).
    ///
    /// # Errors
    ///
    /// Fails with [`MediumError::EndOfMedium`] when the range extends past
    /// the end of the medium; whatever was read up to that point is cached.
    /// On streams, reading behind the current position fails with
    /// [`MediumError::InvalidOffset`] unless the range is still cached.
    pub fn get_data(&mut self, offset: MediumOffset, len: u32) -> MediumResult<Bytes> {
        self.ensure_open()?;
        if len == 0 {
            return Ok(Bytes::new());
        }
        if let Some(length) = self.medium().length()
            && offset.absolute() > length
        {
            return Err(MediumError::EndOfMedium {
                offset,
                requested: len,
                partial: Bytes::new(),
            });
        }
        if !self.medium().is_random_access() {
            self.read_up_to(offset)?;
        }
        if !self.medium().config().caching_enabled {
            let regions = self.read_and_cache(offset, u64::from(len))?;
            return Ok(assemble(len, &regions));
        }

        let range = MediumRegion::uncached(offset, len);
        let range_end = offset.advance(i64::from(len));
        let regions = self.cache.get_regions_in_range(offset, len);

        // Zero-copy fast path: a single cached region covers everything.
        if let [region] = regions.as_slice() {
            if region.is_cached()
                && offset.behind_or_equal(&region.start())
                && region.end().behind_or_equal(&range_end)
            {
                let skip = region.start().distance_to(&offset) as usize;
                let bytes = region.bytes().map(|b| b.slice(skip..skip + len as usize));
                if let Some(bytes) = bytes {
                    return Ok(bytes);
                }
            }
        }

        let mut out = BytesMut::with_capacity(len as usize);
        for region in regions {
            let clipped = region.clip_against(&range).overlap;
            if let Some(bytes) = clipped.bytes() {
                out.extend_from_slice(bytes);
            } else {
                for read in self.read_and_cache(clipped.start(), u64::from(clipped.size()))? {
                    if let Some(bytes) = read.bytes() {
                        out.extend_from_slice(bytes);
                    }
                }
            }
        }
        Ok(out.freeze())
    }

    /// Stages an insert of `payload` at `offset`.
    pub fn insert(&mut self, offset: MediumOffset, payload: Bytes) -> MediumResult<PendingAction> {
        self.ensure_open()?;
        self.ensure_writable()?;
        self.changes.schedule_insert(offset, payload)
    }

    /// Stages a remove of `len` bytes at `offset`.
    pub fn remove(&mut self, offset: MediumOffset, len: u32) -> MediumResult<PendingAction> {
        self.ensure_open()?;
        self.ensure_writable()?;
        self.changes.schedule_remove(offset, len)
    }

    /// Stages a replace of `len` bytes at `offset` with `payload`.
    pub fn replace(
        &mut self,
        offset: MediumOffset,
        len: u32,
        payload: Bytes,
    ) -> MediumResult<PendingAction> {
        self.ensure_open()?;
        self.ensure_writable()?;
        self.changes.schedule_replace(offset, len, payload)
    }

    /// Withdraws a staged edit.
    pub fn undo(&mut self, action: &PendingAction) -> MediumResult<()> {
        self.ensure_open()?;
        self.changes.undo(action)
    }

    /// Applies all staged edits to the medium.
    ///
    /// Builds the flush plan, executes its bounded READ/WRITE/TRUNCATE
    /// steps against the accessor, then per flushed edit updates the cache
    /// (dropping replaced ranges, carrying shifted content, adding
    /// payloads) and rebases all tracked offsets. There is no rollback: a
    /// failure partway leaves the medium partially shifted.
    pub fn flush(&mut self) -> MediumResult<()> {
        self.ensure_open()?;
        self.ensure_writable()?;
        if self.changes.is_empty() {
            return Ok(());
        }
        let medium_length = self.medium().length().unwrap_or(0);
        let max_block = self.medium().config().max_io_block_size;
        let plan = create_flush_plan(
            self.changes.iter().cloned(),
            medium_length,
            max_block,
        );
        debug!(medium = %self.medium(), edits = self.changes.len(), steps = plan.len(), "flushing");

        let mut last_read: Option<Bytes> = None;
        let mut flushed: Vec<PendingAction> = Vec::new();
        for step in plan {
            match step.kind() {
                ActionKind::Read => {
                    last_read =
                        Some(self.get_data(step.region().start(), step.region().size())?);
                }
                ActionKind::Write => {
                    self.accessor.set_position(step.region().start())?;
                    if let Some(payload) = step.payload() {
                        self.accessor.write(payload)?;
                    } else {
                        let bytes = last_read.take().ok_or_else(|| {
                            MediumError::CorruptPlan(
                                "write step without a preceding read".into(),
                            )
                        })?;
                        if bytes.len() != step.region().size() as usize {
                            return Err(MediumError::CorruptPlan(format!(
                                "write of {} bytes paired with a read of {}",
                                step.region().size(),
                                bytes.len()
                            )));
                        }
                        self.accessor.write(&bytes)?;
                    }
                }
                ActionKind::Truncate => {
                    self.accessor.set_position(step.region().start())?;
                    self.accessor.truncate()?;
                }
                _ => flushed.push(step),
            }
        }

        // Apply bookkeeping in ascending edit order. Each edit's
        // coordinates are first carried across the edits already applied,
        // so cache updates and rebases always happen in the medium's
        // current coordinates.
        flushed.sort();
        let mut applied: Vec<PendingAction> = Vec::new();
        for action in flushed {
            self.changes.undo(&action)?;
            let mut adjusted = action;
            for prior in &applied {
                adjusted = rebase_action(prior, &adjusted);
            }
            self.carry_cache_and_offsets(&adjusted);
            applied.push(adjusted);
        }
        Ok(())
    }

    /// Updates cache content and tracked offsets for one flushed edit.
    fn carry_cache_and_offsets(&mut self, action: &PendingAction) {
        let caching = self.medium().config().caching_enabled;
        let region = action.region().clone();
        match action.kind() {
            ActionKind::Insert => {
                if caching {
                    self.split_cached_region_at(region.start());
                }
                self.registry.rebase(action);
                self.cache.rebase_with(|offset| rebase_offset(action, offset));
                if caching {
                    if let Some(payload) = action.payload() {
                        self.cache
                            .add_region(MediumRegion::cached(region.start(), payload.clone()));
                    }
                }
            }
            ActionKind::Remove => {
                self.cache.discard(region.start(), region.size());
                self.registry.rebase(action);
                self.cache.rebase_with(|offset| rebase_offset(action, offset));
            }
            ActionKind::Replace => {
                self.cache.discard(region.start(), region.size());
                self.registry.rebase(action);
                self.cache.rebase_with(|offset| rebase_offset(action, offset));
                if caching {
                    if let Some(payload) = action.payload() {
                        self.cache
                            .add_region(MediumRegion::cached(region.start(), payload.clone()));
                    }
                }
            }
            _ => {}
        }
    }

    /// Splits the cached region containing `at` so that no region
    /// straddles an insertion point about to shift everything behind it.
    fn split_cached_region_at(&mut self, at: MediumOffset) {
        let containing = self
            .cache
            .get_regions_in_range(at, 1)
            .into_iter()
            .next()
            .filter(|r| r.is_cached() && r.start().before(&at));
        if let Some(region) = containing {
            let (front, back) = region.split(at);
            self.cache.discard(region.start(), region.size());
            self.cache.add_region(front);
            self.cache.add_region(back);
        }
    }

    /// Reads `[start, start + total)` from the medium in region-sized
    /// chunks, caching each (when enabled) and returning them. On a
    /// partial read the partial bytes are cached before the error
    /// propagates.
    fn read_and_cache(
        &mut self,
        start: MediumOffset,
        total: u64,
    ) -> MediumResult<Vec<MediumRegion>> {
        let max_region = self.medium().config().max_region_size;
        let caching = self.medium().config().caching_enabled;
        let mut out = Vec::new();
        for (chunk_start, chunk_len) in crate::chunk::chunks(start, total, max_region) {
            let region = self.read_region(chunk_start, chunk_len)?;
            if caching {
                self.cache.add_region(region.clone());
            }
            out.push(region);
        }
        Ok(out)
    }

    /// One physical read of `size` bytes at `start`.
    fn read_region(&mut self, start: MediumOffset, size: u32) -> MediumResult<MediumRegion> {
        if self.medium().is_random_access() {
            self.accessor.set_position(start)?;
        } else {
            self.read_up_to(start)?;
        }
        match self.accessor.read(size) {
            Ok(bytes) => Ok(MediumRegion::cached(start, bytes)),
            Err(MediumError::EndOfMedium {
                offset,
                requested,
                partial,
            }) => {
                if self.medium().config().caching_enabled && !partial.is_empty() {
                    self.cache
                        .add_region(MediumRegion::cached(start, partial.clone()));
                }
                Err(MediumError::EndOfMedium {
                    offset,
                    requested,
                    partial,
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Moves a stream forward to `target`, caching the skipped bytes.
    /// Ranges already passed must still be cached.
    fn read_up_to(&mut self, target: MediumOffset) -> MediumResult<()> {
        let position = self.accessor.current_position();
        if target.absolute() > position.absolute() {
            let distance = position.distance_to(&target) as u64;
            self.read_and_cache(position, distance)?;
        } else if target.absolute() < position.absolute() {
            let needed = target.distance_to(&position) as u64;
            if u64::from(self.cache.cached_byte_count_at(target)) < needed {
                return Err(MediumError::InvalidOffset {
                    offset: target,
                    position,
                });
            }
        }
        Ok(())
    }

    fn was_evicted_while_filling(
        &self,
        clipped: &MediumRegion,
        initial_cache_size: u64,
        range_len: u32,
    ) -> bool {
        initial_cache_size + u64::from(range_len) > self.medium().config().max_cache_size
            && u64::from(self.cache.cached_byte_count_at(clipped.start()))
                < u64::from(clipped.size())
    }

    fn ensure_open(&self) -> MediumResult<()> {
        if self.open {
            Ok(())
        } else {
            Err(MediumError::MediumClosed)
        }
    }

    fn ensure_writable(&self) -> MediumResult<()> {
        if self.medium().is_read_only() {
            return Err(MediumError::ReadOnlyMedium(self.medium().name().to_string()));
        }
        Ok(())
    }
}

/// Carries an edit's region start across an already applied edit.
fn rebase_action(across: &PendingAction, action: &PendingAction) -> PendingAction {
    let start = rebase_offset(across, action.region().start());
    PendingAction::new(
        action.kind(),
        MediumRegion::uncached(start, action.region().size()),
        action.sequence(),
        action.payload().cloned(),
    )
}

fn assemble(len: u32, regions: &[MediumRegion]) -> Bytes {
    let mut out = BytesMut::with_capacity(len as usize);
    for region in regions {
        if let Some(bytes) = region.bytes() {
            out.extend_from_slice(bytes);
        }
    }
    out.freeze()
}
