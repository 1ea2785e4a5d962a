//! Advisory-locked file handles.
//!
//! Both stores go through [`LockedFile`]: the lock is taken right after
//! opening and released when the guard drops, so it is held for exactly one
//! read or one write.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, Write};
use std::path::Path;

use fs2::FileExt;

use crate::error::{Result, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LockMode {
    Shared,
    Exclusive,
}

pub(crate) struct LockedFile {
    file: File,
}

impl LockedFile {
    /// Open for reading under a shared lock. A missing file is `Ok(None)`.
    pub fn open_read(path: &Path) -> Result<Option<Self>> {
        match File::open(path) {
            Ok(file) => Self::lock(file, path, LockMode::Shared).map(Some),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::io(path, e)),
        }
    }

    /// Open for appending under an exclusive lock, creating the file.
    pub fn open_append(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| StoreError::io(path, e))?;
        Self::lock(file, path, LockMode::Exclusive)
    }

    /// Open for rewriting under an exclusive lock, creating the file.
    ///
    /// The file is NOT truncated on open; truncation happens via
    /// [`LockedFile::truncate`] once the lock is held, otherwise a reader
    /// holding the shared lock could watch its content vanish.
    pub fn open_rewrite(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)
            .map_err(|e| StoreError::io(path, e))?;
        Self::lock(file, path, LockMode::Exclusive)
    }

    fn lock(file: File, path: &Path, mode: LockMode) -> Result<Self> {
        let locked = match mode {
            LockMode::Shared => FileExt::lock_shared(&file),
            LockMode::Exclusive => FileExt::lock_exclusive(&file),
        };
        locked.map_err(|e| StoreError::io(path, e))?;
        Ok(Self { file })
    }

    pub fn len(&self) -> io::Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    pub fn truncate(&mut self) -> io::Result<()> {
        self.file.set_len(0)?;
        self.file.rewind()
    }

    pub fn sync(&self) -> io::Result<()> {
        self.file.sync_data()
    }
}

impl Read for LockedFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }
}

impl Write for LockedFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

impl Seek for LockedFile {
    fn seek(&mut self, pos: io::SeekFrom) -> io::Result<u64> {
        self.file.seek(pos)
    }
}

impl Drop for LockedFile {
    fn drop(&mut self) {
        // Closing the descriptor releases the lock too; unlocking first just
        // makes the release explicit.
        let _ = FileExt::unlock(&self.file);
    }
}

/// Create `path` if missing and, when a mode is configured, apply it.
pub(crate) fn ensure_file(path: &Path, mode: Option<u32>) -> Result<()> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| StoreError::io(path, e))?;
    if let Some(mode) = mode {
        set_mode(path, mode)?;
    }
    Ok(())
}

#[cfg(unix)]
pub(crate) fn set_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
        .map_err(|e| StoreError::io(path, e))
}

#[cfg(not(unix))]
pub(crate) fn set_mode(path: &Path, mode: u32) -> Result<()> {
    tracing::debug!(path = %path.display(), mode, "File modes are not supported here, skipping");
    Ok(())
}
