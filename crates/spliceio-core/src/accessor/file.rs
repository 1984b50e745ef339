//! File-backed media.

use std::fs::{File, OpenOptions, TryLockError};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::PathBuf;

use bytes::Bytes;
use tracing::debug;

use crate::accessor::{MediumAccessor, ensure_own_offset, ensure_writable};
use crate::error::{MediumError, MediumResult};
use crate::medium::{Medium, MediumConfig};
use crate::offset::MediumOffset;

/// Random access to a file on disk.
///
/// While open, the accessor holds an advisory whole-file lock so that at
/// most one engine instance works on the file at a time; a second open
/// fails with [`MediumError::MediumLocked`].
#[derive(Debug)]
pub struct FileAccessor {
    medium: Medium,
    path: PathBuf,
    file: Option<File>,
    position: u64,
}

impl FileAccessor {
    /// Creates an accessor for the file at `path`. Nothing is opened or
    /// locked until [`open`](MediumAccessor::open).
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, read_only: bool, config: MediumConfig) -> Self {
        let path = path.into();
        let medium = Medium::new(path.display().to_string(), read_only, true, None, config);
        Self {
            medium,
            path,
            file: None,
            position: 0,
        }
    }

    fn file(&mut self) -> MediumResult<&mut File> {
        self.file.as_mut().ok_or(MediumError::MediumClosed)
    }
}

impl MediumAccessor for FileAccessor {
    fn medium(&self) -> &Medium {
        &self.medium
    }

    fn open(&mut self) -> MediumResult<()> {
        if self.file.is_some() {
            return Ok(());
        }
        let file = OpenOptions::new()
            .read(true)
            .write(!self.medium.is_read_only())
            .open(&self.path)?;
        match file.try_lock() {
            Ok(()) => {}
            Err(TryLockError::WouldBlock) => {
                return Err(MediumError::MediumLocked(self.medium.name().to_string()));
            }
            Err(TryLockError::Error(e)) => return Err(e.into()),
        }
        let length = file.metadata()?.len();
        self.medium.set_length(Some(length));
        self.position = 0;
        self.file = Some(file);
        debug!(medium = %self.medium, length, "opened file medium");
        Ok(())
    }

    fn close(&mut self) -> MediumResult<()> {
        let file = self.file.take().ok_or(MediumError::MediumClosed)?;
        file.unlock()?;
        debug!(medium = %self.medium, "closed file medium");
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.file.is_some()
    }

    fn current_position(&self) -> MediumOffset {
        self.medium.offset_at(self.position)
    }

    fn set_position(&mut self, position: MediumOffset) -> MediumResult<()> {
        ensure_own_offset(&self.medium, position);
        if self.file.is_none() {
            return Err(MediumError::MediumClosed);
        }
        self.position = position.absolute();
        Ok(())
    }

    fn read(&mut self, count: u32) -> MediumResult<Bytes> {
        let start = self.current_position();
        let position = self.position;
        let file = self.file()?;
        file.seek(SeekFrom::Start(position))?;
        let mut buf = vec![0u8; count as usize];
        let mut filled = 0;
        while filled < buf.len() {
            let n = file.read(&mut buf[filled..])?;
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

    fn write(&mut self, bytes: &[u8]) -> MediumResult<()> {
        ensure_writable(&self.medium)?;
        let position = self.position;
        let file = self.file()?;
        file.seek(SeekFrom::Start(position))?;
        file.write_all(bytes)?;
        self.position += bytes.len() as u64;
        let length = self.medium.length().unwrap_or(0).max(self.position);
        self.medium.set_length(Some(length));
        Ok(())
    }

    fn truncate(&mut self) -> MediumResult<()> {
        ensure_writable(&self.medium)?;
        let position = self.position;
        self.file()?.set_len(position)?;
        self.medium.set_length(Some(position));
        Ok(())
    }

    fn at_end_of_medium(&mut self) -> MediumResult<bool> {
        if self.file.is_none() {
            return Err(MediumError::MediumClosed);
        }
        Ok(self.position >= self.medium.length().unwrap_or(0))
    }
}

impl Drop for FileAccessor {
    fn drop(&mut self) {
        if let Some(file) = self.file.take() {
            let _ = file.unlock();
        }
    }
}
