//! In-memory media.

use bytes::Bytes;

use crate::accessor::{MediumAccessor, ensure_own_offset, ensure_writable};
use crate::error::{MediumError, MediumResult};
use crate::medium::{Medium, MediumConfig};
use crate::offset::MediumOffset;

/// Random access to a byte vector, mainly for tests and for editing
/// content assembled in memory.
#[derive(Debug)]
pub struct MemoryAccessor {
    medium: Medium,
    data: Vec<u8>,
    position: u64,
    open: bool,
}

impl MemoryAccessor {
    /// Creates an accessor over `data`.
    #[must_use]
    pub fn new(data: Vec<u8>, read_only: bool, config: MediumConfig) -> Self {
        let medium = Medium::new(
            "in-memory".into(),
            read_only,
            true,
            Some(data.len() as u64),
            config,
        );
        Self {
            medium,
            data,
            position: 0,
            open: false,
        }
    }

    /// The current content of the medium.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Consumes the accessor and returns the content.
    #[must_use]
    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }

    fn ensure_open(&self) -> MediumResult<()> {
        if self.open {
            Ok(())
        } else {
            Err(MediumError::MediumClosed)
        }
    }
}

impl MediumAccessor for MemoryAccessor {
    fn medium(&self) -> &Medium {
        &self.medium
    }

    fn open(&mut self) -> MediumResult<()> {
        self.open = true;
        self.position = 0;
        Ok(())
    }

    fn close(&mut self) -> MediumResult<()> {
        self.ensure_open()?;
        self.open = false;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn current_position(&self) -> MediumOffset {
        self.medium.offset_at(self.position)
    }

    fn set_position(&mut self, position: MediumOffset) -> MediumResult<()> {
        ensure_own_offset(&self.medium, position);
        self.ensure_open()?;
        self.position = position.absolute();
        Ok(())
    }

    fn read(&mut self, count: u32) -> MediumResult<Bytes> {
        self.ensure_open()?;
        let start = self.position as usize;
        let available = self.data.len().saturating_sub(start);
        let taken = available.min(count as usize);
        let bytes = if taken == 0 {
            Bytes::new()
        } else {
            Bytes::copy_from_slice(&self.data[start..start + taken])
        };
        self.position += taken as u64;
        if taken < count as usize {
            return Err(MediumError::EndOfMedium {
                offset: self.medium.offset_at(start as u64),
                requested: count,
                partial: bytes,
            });
        }
        Ok(bytes)
    }

    fn write(&mut self, bytes: &[u8]) -> MediumResult<()> {
        ensure_writable(&self.medium)?;
        self.ensure_open()?;
        let start = self.position as usize;
        let end = start + bytes.len();
        if self.data.len() < end {
            self.data.resize(end, 0);
        }
        self.data[start..end].copy_from_slice(bytes);
        self.position = end as u64;
        self.medium.set_length(Some(self.data.len() as u64));
        Ok(())
    }

    fn truncate(&mut self) -> MediumResult<()> {
        ensure_writable(&self.medium)?;
        self.ensure_open()?;
        self.data.truncate(self.position as usize);
        self.medium.set_length(Some(self.data.len() as u64));
        Ok(())
    }

    fn at_end_of_medium(&mut self) -> MediumResult<bool> {
        self.ensure_open()?;
        Ok(self.position >= self.data.len() as u64)
    }
}
