//! Medium engine error types

use crate::offset::MediumOffset;
use bytes::Bytes;
use thiserror::Error;

/// Medium engine error
#[derive(Error, Debug)]
pub enum MediumError {
    /// End of medium was reached during a read. The bytes read before the
    /// end, if any, are preserved in `partial`.
    #[error("end of medium at {offset}: read {} of {requested} requested bytes", partial.len())]
    EndOfMedium {
        /// Start offset of the read attempt
        offset: MediumOffset,
        /// Number of bytes the read attempt asked for
        requested: u32,
        /// Bytes actually read before the end of the medium
        partial: Bytes,
    },

    /// Write or truncate attempted on a read-only medium
    #[error("medium is read-only: {0}")]
    ReadOnlyMedium(String),

    /// Operation on a store that is not (or no longer) open
    #[error("medium store is not open")]
    MediumClosed,

    /// The medium is locked by another engine instance
    #[error("medium is already locked: {0}")]
    MediumLocked(String),

    /// Positioning attempted on a non-random-access medium
    #[error("medium does not support random access: {0}")]
    NotRandomAccess(String),

    /// A stream range was already consumed and is no longer cached
    #[error("offset {offset} lies before the current stream position {position} and is not fully cached")]
    InvalidOffset {
        offset: MediumOffset,
        position: MediumOffset,
    },

    /// A staged edit partially overlaps an already staged remove or replace
    #[error("edit over [{new_start}, +{new_size}) overlaps staged {existing_kind} over [{existing_start}, +{existing_size})")]
    OverlappingEdit {
        new_start: MediumOffset,
        new_size: u32,
        existing_kind: &'static str,
        existing_start: MediumOffset,
        existing_size: u32,
    },

    /// Undo of an action that is not (or no longer) staged
    #[error("action is not staged in this change set")]
    UnknownAction,

    /// Flush plan execution hit an inconsistency
    #[error("corrupt flush plan: {0}")]
    CorruptPlan(String),

    /// I/O error from the underlying medium
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for medium operations
pub type MediumResult<T> = Result<T, MediumError>;
