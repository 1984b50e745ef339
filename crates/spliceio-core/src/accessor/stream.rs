//! Forward-only stream media.

use std::io::Read;

use bytes::Bytes;

use crate::accessor::{MediumAccessor, ensure_own_offset};
use crate::error::{MediumError, MediumResult};
use crate::medium::{Medium, MediumConfig};
use crate::offset::MediumOffset;

/// Read-only, forward-only access to anything implementing [`Read`].
///
/// The length of a stream is unknown and the position only moves forward
/// through reads; already consumed ranges are only available again through
/// the store's cache. The end-of-medium probe peeks a single byte which is
/// held back for the next read.
#[derive(Debug)]
pub struct StreamAccessor<R> {
    medium: Medium,
    reader: R,
    position: u64,
    pushback: Option<u8>,
    open: bool,
}

impl<R: Read> StreamAccessor<R> {
    /// Creates an accessor over `reader`.
    #[must_use]
    pub fn new(reader: R, name: impl Into<String>, config: MediumConfig) -> Self {
        let medium = Medium::new(name.into(), true, false, None, config);
        Self {
            medium,
            reader,
            position: 0,
            pushback: None,
            open: false,
        }
    }

    fn ensure_open(&self) -> MediumResult<()> {
        if self.open {
            Ok(())
        } else {
            Err(MediumError::MediumClosed)
        }
    }
}

impl<R: Read> MediumAccessor for StreamAccessor<R> {
    fn medium(&self) -> &Medium {
        &self.medium
    }

    fn open(&mut self) -> MediumResult<()> {
        self.open = true;
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

    /// Streams cannot reposition; only a no-op move to the current
    /// position is accepted.
    fn set_position(&mut self, position: MediumOffset) -> MediumResult<()> {
        ensure_own_offset(&self.medium, position);
        self.ensure_open()?;
        if position.absolute() == self.position {
            Ok(())
        } else {
            Err(MediumError::NotRandomAccess(self.medium.name().to_string()))
        }
    }

    fn read(&mut self, count: u32) -> MediumResult<Bytes> {
        self.ensure_open()?;
        let start = self.current_position();
        let mut buf = vec![0u8; count as usize];
        let mut filled = 0;
        if let Some(byte) = self.pushback.take() {
            if !buf.is_empty() {
                buf[0] = byte;
                filled = 1;
            } else {
                self.pushback = Some(byte);
            }
        }
        while filled < buf.len() {
            let n = self.reader.read(&mut buf[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        self.position += filled as u64;
        if filled < count as usize {
            buf.truncate(filled);
            return Err(MediumError::EndOfMedium {
                offset: start,
                requested: count,
                partial: Bytes::from(buf),
            });
        }
        Ok(Bytes::from(buf))
    }

    fn write(&mut self, _bytes: &[u8]) -> MediumResult<()> {
        Err(MediumError::ReadOnlyMedium(self.medium.name().to_string()))
    }

    fn truncate(&mut self) -> MediumResult<()> {
        Err(MediumError::ReadOnlyMedium(self.medium.name().to_string()))
    }

    fn at_end_of_medium(&mut self) -> MediumResult<bool> {
        self.ensure_open()?;
        if self.pushback.is_some() {
            return Ok(false);
        }
        let mut probe = [0u8; 1];
        let mut read = 0;
        while read == 0 {
            match self.reader.read(&mut probe)? {
                0 => return Ok(true),
                n => read = n,
            }
        }
        self.pushback = Some(probe[0]);
        Ok(false)
    }
}
