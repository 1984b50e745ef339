//! Medium descriptors and per-medium configuration.
//!
//! A [`Medium`] describes one editable byte store: its identity, access
//! properties and tuning knobs. The actual I/O lives in the
//! [`accessor`](crate::accessor) implementations; everything else in the
//! engine refers to a medium only through its [`MediumId`].

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::offset::MediumOffset;

/// Default maximum size of a single physical read or write, in bytes.
pub const DEFAULT_MAX_IO_BLOCK_SIZE: u32 = 8192;

/// Default maximum total size of the region cache, in bytes.
pub const DEFAULT_MAX_CACHE_SIZE: u64 = 1_048_576;

/// Default maximum size of a single cached region, in bytes.
pub const DEFAULT_MAX_REGION_SIZE: u32 = 8192;

static NEXT_MEDIUM_ID: AtomicU64 = AtomicU64::new(0);

/// Process-unique identity of a medium.
///
/// Offsets and regions carry the id of the medium they belong to; mixing
/// offsets of different media in one operation is a programmer error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MediumId(u64);

impl MediumId {
    fn next() -> Self {
        Self(NEXT_MEDIUM_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for MediumId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "medium#{}", self.0)
    }
}

/// Tuning parameters of one medium.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediumConfig {
    /// Upper bound for a single physical read or write during flush.
    pub max_io_block_size: u32,
    /// Upper bound for the total number of cached bytes.
    pub max_cache_size: u64,
    /// Upper bound for the size of a single cached region. Larger added
    /// regions are split into chunks of at most this size.
    pub max_region_size: u32,
    /// Whether reads populate the region cache at all.
    pub caching_enabled: bool,
}

impl Default for MediumConfig {
    fn default() -> Self {
        Self {
            max_io_block_size: DEFAULT_MAX_IO_BLOCK_SIZE,
            max_cache_size: DEFAULT_MAX_CACHE_SIZE,
            max_region_size: DEFAULT_MAX_REGION_SIZE,
            caching_enabled: true,
        }
    }
}

/// Descriptor of one editable byte store.
#[derive(Debug, Clone)]
pub struct Medium {
    id: MediumId,
    name: String,
    read_only: bool,
    random_access: bool,
    length: Option<u64>,
    config: MediumConfig,
}

impl Medium {
    pub(crate) fn new(
        name: String,
        read_only: bool,
        random_access: bool,
        length: Option<u64>,
        config: MediumConfig,
    ) -> Self {
        Self {
            id: MediumId::next(),
            name,
            read_only,
            random_access,
            length,
            config,
        }
    }

    /// Unique identity of this medium.
    #[must_use]
    pub fn id(&self) -> MediumId {
        self.id
    }

    /// Human-readable name (file path, or a label for memory/stream media).
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether edits and flushes are rejected for this medium.
    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Whether arbitrary repositioning is supported. Stream media are
    /// forward-only and report `false`.
    #[must_use]
    pub fn is_random_access(&self) -> bool {
        self.random_access
    }

    /// Current length in bytes, or `None` when unknown (streams).
    #[must_use]
    pub fn length(&self) -> Option<u64> {
        self.length
    }

    pub(crate) fn set_length(&mut self, length: Option<u64>) {
        self.length = length;
    }

    /// Tuning parameters of this medium.
    #[must_use]
    pub fn config(&self) -> &MediumConfig {
        &self.config
    }

    /// An offset on this medium at the given absolute position.
    #[must_use]
    pub fn offset_at(&self, position: u64) -> MediumOffset {
        MediumOffset::new(self.id, position)
    }
}

impl fmt::Display for Medium {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.id, self.name)
    }
}
