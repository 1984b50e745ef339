//! Physical access to media.
//!
//! A [`MediumAccessor`] is the single seam between the engine and real
//! I/O: positional reads and writes against one medium. The store drives
//! it; everything above works on cached regions and staged edits only.
//!
//! Three implementations exist: [`FileAccessor`] (random access, locked
//! while open), [`MemoryAccessor`] (random access over a byte vector) and
//! [`StreamAccessor`] (forward-only, read-only).

mod file;
mod memory;
mod stream;

pub use file::FileAccessor;
pub use memory::MemoryAccessor;
pub use stream::StreamAccessor;

use bytes::Bytes;

use crate::error::{MediumError, MediumResult};
use crate::medium::Medium;
use crate::offset::MediumOffset;

/// Physical access to one medium.
///
/// Positions are tracked by the accessor; on random-access media
/// [`set_position`](Self::set_position) moves it, on streams it only ever
/// moves forward through reads.
pub trait MediumAccessor {
    /// The medium this accessor operates on. `medium().length()` reflects
    /// completed writes and truncations.
    fn medium(&self) -> &Medium;

    /// Acquires the medium for exclusive use.
    fn open(&mut self) -> MediumResult<()>;

    /// Releases the medium. Fails with [`MediumError::MediumClosed`] when
    /// not open.
    fn close(&mut self) -> MediumResult<()>;

    fn is_open(&self) -> bool;

    /// The position the next read or write applies to.
    fn current_position(&self) -> MediumOffset;

    /// Moves the position (random-access media only).
    fn set_position(&mut self, position: MediumOffset) -> MediumResult<()>;

    /// Reads exactly `count` bytes from the current position, advancing
    /// it by the bytes actually read. Reaching the end of the medium
    /// early fails with [`MediumError::EndOfMedium`] carrying the partial
    /// bytes.
    fn read(&mut self, count: u32) -> MediumResult<Bytes>;

    /// Writes all of `bytes` at the current position, advancing it and
    /// growing the medium when writing past its end.
    fn write(&mut self, bytes: &[u8]) -> MediumResult<()>;

    /// Cuts the medium at the current position.
    fn truncate(&mut self) -> MediumResult<()>;

    /// Whether the current position is at (or past) the end of the medium.
    fn at_end_of_medium(&mut self) -> MediumResult<bool>;
}

pub(crate) fn ensure_writable(medium: &Medium) -> MediumResult<()> {
    if medium.is_read_only() {
        return Err(MediumError::ReadOnlyMedium(medium.name().to_string()));
    }
    Ok(())
}

pub(crate) fn ensure_own_offset(medium: &Medium, offset: MediumOffset) {
    assert!(
        offset.medium() == medium.id(),
        "offset {offset} belongs to another medium than {medium}"
    );
}
