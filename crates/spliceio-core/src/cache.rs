//! Bounded cache of read medium regions.
//!
//! The cache holds non-overlapping cached [`MediumRegion`]s keyed by start
//! position, with a FIFO insertion queue driving eviction once the total
//! byte budget is exceeded. Newly added regions win over older overlapping
//! ones: the old regions are clipped down to their non-overlapped parts.
//!
//! ```text
//!          ┌────────────┐  ┌──────┐      ┌────────────┐
//! cache:   │  [0, 8k)   │  │ 10k  │      │ [20k, 28k) │
//!          └────────────┘  └──────┘      └────────────┘
//! query:        └───────────── range ──────────┘
//! result:  cached │ gap │ cached │ gap │ cached        (always tiles)
//! ```

use std::collections::{BTreeMap, VecDeque};

use tracing::debug;

use crate::chunk::chunks;
use crate::medium::MediumId;
use crate::offset::MediumOffset;
use crate::region::{MediumRegion, RegionOverlap};

/// Bounded, FIFO-evicting cache of medium regions.
#[derive(Debug)]
pub struct RegionCache {
    medium: MediumId,
    max_cache_size: u64,
    max_region_size: u32,
    /// Cached regions keyed by absolute start position. Invariant: regions
    /// never overlap, and every region is at most `max_region_size` bytes.
    regions: BTreeMap<u64, MediumRegion>,
    /// Start keys in insertion order, oldest first.
    insertion_queue: VecDeque<u64>,
}

impl RegionCache {
    /// Creates an empty cache for one medium.
    ///
    /// # Panics
    ///
    /// Panics if either bound is zero or the cache budget is smaller than
    /// the maximum region size.
    #[must_use]
    pub fn new(medium: MediumId, max_cache_size: u64, max_region_size: u32) -> Self {
        assert!(max_region_size > 0, "maximum region size must be positive");
        assert!(
            max_cache_size >= u64::from(max_region_size),
            "cache budget must hold at least one maximum-size region"
        );
        Self {
            medium,
            max_cache_size,
            max_region_size,
            regions: BTreeMap::new(),
            insertion_queue: VecDeque::new(),
        }
    }

    /// The medium this cache belongs to.
    #[must_use]
    pub fn medium(&self) -> MediumId {
        self.medium
    }

    /// Total number of currently cached bytes.
    #[must_use]
    pub fn total_size(&self) -> u64 {
        self.regions.values().map(|r| u64::from(r.size())).sum()
    }

    /// Number of cached regions.
    #[must_use]
    pub fn region_count(&self) -> usize {
        self.regions.len()
    }

    /// All cached regions in ascending start order.
    pub fn regions(&self) -> impl Iterator<Item = &MediumRegion> {
        self.regions.values()
    }

    /// Drops all cached regions.
    pub fn clear(&mut self) {
        self.regions.clear();
        self.insertion_queue.clear();
    }

    /// Adds a cached region, clipping older overlapping regions down to
    /// their non-overlapped parts. The new region is stored in chunks of at
    /// most the maximum region size; afterwards the oldest regions are
    /// evicted until the cache fits its byte budget again. Adding an empty
    /// region is a no-op. Never fails.
    ///
    /// # Panics
    ///
    /// Panics if the region carries no bytes or belongs to another medium.
    pub fn add_region(&mut self, region: MediumRegion) {
        assert!(region.is_cached(), "cannot cache a region without bytes");
        assert!(
            region.start().medium() == self.medium,
            "region {region} belongs to another medium"
        );
        if region.size() == 0 {
            return;
        }
        debug!(region = %region, "caching region");

        let overlapped: Vec<u64> = self
            .get_regions_in_range(region.start(), region.size())
            .iter()
            .filter(|r| r.is_cached())
            .map(|r| r.start().absolute())
            .collect();
        for key in overlapped {
            self.clip_entry_against(key, &region);
        }

        for (chunk_start, chunk_len) in
            chunks(region.start(), u64::from(region.size()), self.max_region_size)
        {
            let chunk = region
                .clip_against(&MediumRegion::uncached(chunk_start, chunk_len))
                .overlap;
            self.insert_entry(chunk);
        }

        while self.total_size() > self.max_cache_size {
            let Some(oldest) = self.insertion_queue.pop_front() else {
                break;
            };
            if let Some(evicted) = self.regions.remove(&oldest) {
                debug!(region = %evicted, "evicting region");
            }
        }
    }

    /// Returns regions that together tile exactly `[start, start + size)`:
    /// cached regions where bytes are present, uncached gap regions (of at
    /// most the maximum region size each) where they are not. Cached
    /// regions are returned whole, so the first and last entries may extend
    /// beyond the requested range.
    ///
    /// # Panics
    ///
    /// Panics if `size` is zero or `start` belongs to another medium.
    #[must_use]
    pub fn get_regions_in_range(&self, start: MediumOffset, size: u32) -> Vec<MediumRegion> {
        assert!(size > 0, "range size must be positive");
        assert!(
            start.medium() == self.medium,
            "offset {start} belongs to another medium"
        );
        let range = MediumRegion::uncached(start, size);
        let range_end = range.end();
        let mut result = Vec::new();

        // Start at the last region at or before the range start, or the
        // first one after it.
        let first = self
            .regions
            .range(..=start.absolute())
            .next_back()
            .or_else(|| self.regions.range(start.absolute()..).next());
        let Some((&first_key, first_region)) = first else {
            self.push_gap_chunks(&mut result, start, u64::from(size));
            return result;
        };

        // Fast path: one cached region covers the whole range.
        if matches!(
            range.overlap_kind(first_region),
            RegionOverlap::LeftInsideRight | RegionOverlap::SameRange
        ) {
            return vec![first_region.clone()];
        }

        let mut prev_end = start;
        for region in self.regions.range(first_key..).map(|(_, r)| r) {
            if region.start().behind_or_equal(&range_end) {
                break;
            }
            if region.overlap_kind(&range) == RegionOverlap::NoOverlap {
                continue;
            }
            let gap = prev_end.distance_to(&region.start());
            if gap > 0 {
                self.push_gap_chunks(&mut result, prev_end, gap as u64);
            }
            result.push(region.clone());
            prev_end = region.end();
        }
        let tail = prev_end.distance_to(&range_end);
        if tail > 0 {
            self.push_gap_chunks(&mut result, prev_end, tail as u64);
        }
        result
    }

    /// Number of consecutive cached bytes starting at `offset`, walking
    /// across directly adjacent cached regions.
    #[must_use]
    pub fn cached_byte_count_at(&self, offset: MediumOffset) -> u32 {
        let Some((_, region)) = self.regions.range(..=offset.absolute()).next_back() else {
            return 0;
        };
        if !region.contains(&offset) {
            return 0;
        }
        let mut count = offset.distance_to(&region.end()) as u64;
        let mut expected = region.end().absolute();
        for (&key, next) in self.regions.range(expected..) {
            if key != expected {
                break;
            }
            count += u64::from(next.size());
            expected += u64::from(next.size());
        }
        u32::try_from(count).unwrap_or(u32::MAX)
    }

    /// Drops cached bytes within `[start, start + size)`, clipping regions
    /// straddling the boundaries down to their outside parts. A zero size
    /// is a no-op.
    pub fn discard(&mut self, start: MediumOffset, size: u32) {
        if size == 0 {
            return;
        }
        let against = MediumRegion::uncached(start, size);
        let keys: Vec<u64> = self
            .get_regions_in_range(start, size)
            .iter()
            .filter(|r| r.is_cached())
            .map(|r| r.start().absolute())
            .collect();
        for key in keys {
            self.clip_entry_against(key, &against);
        }
    }

    /// Moves every cached region to the start offset `f` maps it to,
    /// preserving insertion order. The mapping must keep regions disjoint
    /// and in ascending order; the store uses this after a flush to carry
    /// cached content across an edit's byte shift.
    pub fn rebase_with(&mut self, f: impl Fn(MediumOffset) -> MediumOffset) {
        let old = std::mem::take(&mut self.regions);
        for (_, region) in old {
            let new_start = f(region.start());
            if let Some(bytes) = region.bytes() {
                self.regions
                    .insert(new_start.absolute(), MediumRegion::cached(new_start, bytes.clone()));
            }
        }
        for key in &mut self.insertion_queue {
            *key = f(MediumOffset::new(self.medium, *key)).absolute();
        }
    }

    /// Removes the entry at `key` and re-adds the parts of it lying outside
    /// `against` as fresh entries.
    fn clip_entry_against(&mut self, key: u64, against: &MediumRegion) {
        let Some(existing) = self.regions.remove(&key) else {
            return;
        };
        self.insertion_queue.retain(|k| *k != key);
        let clipped = existing.clip_against(against);
        if let Some(front) = clipped.front {
            self.insert_entry(front);
        }
        if let Some(back) = clipped.back {
            self.insert_entry(back);
        }
    }

    fn insert_entry(&mut self, region: MediumRegion) {
        let key = region.start().absolute();
        self.regions.insert(key, region);
        self.insertion_queue.push_back(key);
    }

    fn push_gap_chunks(&self, out: &mut Vec<MediumRegion>, from: MediumOffset, len: u64) {
        for (chunk_start, chunk_len) in chunks(from, len, self.max_region_size) {
            out.push(MediumRegion::uncached(chunk_start, chunk_len));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::medium::{Medium, MediumConfig};
    use bytes::Bytes;

    fn test_medium() -> Medium {
        Medium::new("test".into(), false, true, Some(10_000), MediumConfig::default())
    }

    fn test_cache(medium: &Medium, max_cache: u64, max_region: u32) -> RegionCache {
        RegionCache::new(medium.id(), max_cache, max_region)
    }

    fn filled(medium: &Medium, start: u64, len: usize, fill: u8) -> MediumRegion {
        MediumRegion::cached(medium.offset_at(start), Bytes::from(vec![fill; len]))
    }

    fn starts(regions: &[MediumRegion]) -> Vec<(u64, u32, bool)> {
        regions
            .iter()
            .map(|r| (r.start().absolute(), r.size(), r.is_cached()))
            .collect()
    }

    #[test]
    fn test_large_region_is_split_into_chunks() {
        let medium = test_medium();
        let mut cache = test_cache(&medium, 100, 10);
        cache.add_region(filled(&medium, 0, 25, b'a'));
        let all: Vec<_> = cache.regions().cloned().collect();
        assert_eq!(
            starts(&all),
            vec![(0, 10, true), (10, 10, true), (20, 5, true)]
        );
        assert_eq!(cache.total_size(), 25);
    }

    #[test]
    fn test_gap_synthesis_on_empty_cache() {
        let medium = test_medium();
        let cache = test_cache(&medium, 100, 10);
        let regions = cache.get_regions_in_range(medium.offset_at(5), 25);
        assert_eq!(
            starts(&regions),
            vec![(5, 10, false), (15, 10, false), (25, 5, false)]
        );
    }

    #[test]
    fn test_range_query_tiles_cached_and_gaps() {
        let medium = test_medium();
        let mut cache = test_cache(&medium, 1000, 100);
        cache.add_region(filled(&medium, 10, 20, b'a'));
        cache.add_region(filled(&medium, 50, 10, b'b'));
        let regions = cache.get_regions_in_range(medium.offset_at(0), 70);
        assert_eq!(
            starts(&regions),
            vec![
                (0, 10, false),
                (10, 20, true),
                (30, 20, false),
                (50, 10, true),
                (60, 10, false),
            ]
        );
    }

    #[test]
    fn test_single_region_fast_path_returns_whole_region() {
        let medium = test_medium();
        let mut cache = test_cache(&medium, 1000, 100);
        cache.add_region(filled(&medium, 10, 50, b'a'));
        let regions = cache.get_regions_in_range(medium.offset_at(20), 10);
        assert_eq!(starts(&regions), vec![(10, 50, true)]);
    }

    #[test]
    fn test_new_region_wins_over_old_overlap() {
        let medium = test_medium();
        let mut cache = test_cache(&medium, 1000, 100);
        cache.add_region(filled(&medium, 0, 30, b'a'));
        cache.add_region(filled(&medium, 10, 10, b'b'));
        let regions = cache.get_regions_in_range(medium.offset_at(0), 30);
        assert_eq!(
            starts(&regions),
            vec![(0, 10, true), (10, 10, true), (20, 10, true)]
        );
        assert_eq!(regions[0].bytes().unwrap().as_ref(), &[b'a'; 10]);
        assert_eq!(regions[1].bytes().unwrap().as_ref(), &[b'b'; 10]);
        assert_eq!(regions[2].bytes().unwrap().as_ref(), &[b'a'; 10]);
        assert_eq!(cache.total_size(), 30);
    }

    #[test]
    fn test_duplicate_add_is_idempotent() {
        let medium = test_medium();
        let mut cache = test_cache(&medium, 1000, 100);
        cache.add_region(filled(&medium, 5, 40, b'x'));
        cache.add_region(filled(&medium, 5, 40, b'x'));
        assert_eq!(cache.total_size(), 40);
        assert_eq!(cache.region_count(), 1);
        let regions = cache.get_regions_in_range(medium.offset_at(5), 40);
        assert_eq!(starts(&regions), vec![(5, 40, true)]);
    }

    #[test]
    fn test_fifo_eviction_drops_oldest_first() {
        let medium = test_medium();
        let mut cache = test_cache(&medium, 30, 10);
        cache.add_region(filled(&medium, 0, 10, b'a'));
        cache.add_region(filled(&medium, 100, 10, b'b'));
        cache.add_region(filled(&medium, 200, 10, b'c'));
        cache.add_region(filled(&medium, 300, 10, b'd'));
        assert_eq!(cache.total_size(), 30);
        assert_eq!(cache.cached_byte_count_at(medium.offset_at(0)), 0);
        assert_eq!(cache.cached_byte_count_at(medium.offset_at(100)), 10);
        assert_eq!(cache.cached_byte_count_at(medium.offset_at(300)), 10);
    }

    #[test]
    fn test_oversized_region_keeps_trailing_bytes() {
        let medium = test_medium();
        let mut cache = test_cache(&medium, 20, 10);
        cache.add_region(filled(&medium, 0, 30, b'a'));
        assert_eq!(cache.total_size(), 20);
        assert_eq!(cache.cached_byte_count_at(medium.offset_at(0)), 0);
        assert_eq!(cache.cached_byte_count_at(medium.offset_at(10)), 20);
    }

    #[test]
    fn test_cached_byte_count_walks_adjacent_regions() {
        let medium = test_medium();
        let mut cache = test_cache(&medium, 1000, 10);
        cache.add_region(filled(&medium, 0, 20, b'a'));
        cache.add_region(filled(&medium, 20, 10, b'b'));
        cache.add_region(filled(&medium, 40, 10, b'c'));
        assert_eq!(cache.cached_byte_count_at(medium.offset_at(0)), 30);
        assert_eq!(cache.cached_byte_count_at(medium.offset_at(7)), 23);
        assert_eq!(cache.cached_byte_count_at(medium.offset_at(30)), 0);
        assert_eq!(cache.cached_byte_count_at(medium.offset_at(45)), 5);
    }

    #[test]
    fn test_discard_middle_splits_region() {
        let medium = test_medium();
        let mut cache = test_cache(&medium, 1000, 100);
        cache.add_region(filled(&medium, 0, 30, b'a'));
        cache.discard(medium.offset_at(10), 10);
        let regions = cache.get_regions_in_range(medium.offset_at(0), 30);
        assert_eq!(
            starts(&regions),
            vec![(0, 10, true), (10, 10, false), (20, 10, true)]
        );
        assert_eq!(cache.total_size(), 20);
    }

    #[test]
    fn test_rebase_shifts_region_starts() {
        let medium = test_medium();
        let mut cache = test_cache(&medium, 1000, 100);
        cache.add_region(filled(&medium, 10, 10, b'a'));
        cache.add_region(filled(&medium, 50, 10, b'b'));
        cache.rebase_with(|o| if o.absolute() >= 30 { o.advance(5) } else { o });
        let regions = cache.get_regions_in_range(medium.offset_at(0), 80);
        assert_eq!(
            starts(&regions),
            vec![
                (0, 10, false),
                (10, 10, true),
                (20, 35, false),
                (55, 10, true),
                (65, 15, false),
            ]
        );
    }

    #[test]
    fn test_clear() {
        let medium = test_medium();
        let mut cache = test_cache(&medium, 1000, 100);
        cache.add_region(filled(&medium, 0, 10, b'a'));
        cache.clear();
        assert_eq!(cache.total_size(), 0);
        assert_eq!(cache.region_count(), 0);
    }
}
