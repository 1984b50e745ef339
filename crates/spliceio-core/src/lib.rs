//! spliceio-core: staged byte-range edits over large binary media.
//!
//! The engine lets callers stage logical inserts, removes and replaces
//! against a medium (file, memory buffer or forward-only stream) and
//! applies them in one flush as bounded physical I/O, without ever
//! holding the medium in memory:
//!
//! ```text
//!            ┌─────────────┐   staged edits   ┌────────────┐
//!  caller ──▶│ MediumStore │─────────────────▶│  ChangeSet │
//!            └──────┬──────┘                  └─────┬──────┘
//!            reads  │  flush                        │ plan
//!            ┌──────▼──────┐                  ┌─────▼──────┐
//!            │ RegionCache │                  │  planner   │
//!            └──────┬──────┘                  └─────┬──────┘
//!                   │        ┌────────────┐        │ bounded
//!                   └───────▶│  accessor  │◀───────┘ READ/WRITE/
//!                            └────────────┘          TRUNCATE
//! ```
//!
//! Reads go through a bounded [`RegionCache`]; edits shift every byte
//! behind them, so the flush [`planner`] turns a batch of edits into
//! chunked read/write pairs moved in the safe direction, and the
//! [`ReferenceRegistry`] rebases all handed-out offsets afterwards.
//!
//! # Example
//!
//! ```no_run
//! use bytes::Bytes;
//! use spliceio_core::{FileAccessor, MediumConfig, MediumStore};
//!
//! # fn main() -> Result<(), spliceio_core::MediumError> {
//! let accessor = FileAccessor::new("movie.mkv", false, MediumConfig::default());
//! let mut store = MediumStore::new(accessor);
//! store.open()?;
//!
//! let header = store.get_data(store.medium().offset_at(0), 64)?;
//! store.insert(store.medium().offset_at(64), Bytes::from_static(b"tag"))?;
//! store.remove(store.medium().offset_at(1024), 512)?;
//! store.flush()?;
//! store.close()?;
//! # let _ = header;
//! # Ok(())
//! # }
//! ```

pub mod accessor;
pub mod action;
pub mod cache;
pub mod changes;
pub mod chunk;
pub mod error;
pub mod medium;
pub mod offset;
pub mod planner;
pub mod region;
pub mod registry;
pub mod store;

pub use accessor::{FileAccessor, MediumAccessor, MemoryAccessor, StreamAccessor};
pub use action::{ActionKind, PendingAction};
pub use cache::RegionCache;
pub use changes::ChangeSet;
pub use error::{MediumError, MediumResult};
pub use medium::{
    DEFAULT_MAX_CACHE_SIZE, DEFAULT_MAX_IO_BLOCK_SIZE, DEFAULT_MAX_REGION_SIZE, Medium,
    MediumConfig, MediumId,
};
pub use offset::MediumOffset;
pub use planner::create_flush_plan;
pub use region::{ClipResult, MediumRegion, RegionOverlap};
pub use registry::{ReferenceRegistry, rebase_offset};
pub use store::MediumStore;
