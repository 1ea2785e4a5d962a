//! The roster file: the complete set of present users, rewritten whole.
//!
//! [`RosterStore::load_all`] reads under a shared lock and
//! [`RosterStore::save_all`] truncates and rewrites under an exclusive lock,
//! so a lock-honoring reader always sees one complete snapshot.
//!
//! Load, mutate, save is NOT atomic as a sequence. Two writers racing
//! through it can lose one update; entries carry distinct tokens, and the
//! next prune reconciles presence from whatever snapshot won.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::debug;

use flatchat_shared::constants::ROSTER_FORMAT_VERSION;

use crate::error::{Result, StoreError};
use crate::file::LockedFile;
use crate::models::{PresenceEntry, RosterSnapshot};

#[derive(Debug, Clone)]
pub struct RosterStore {
    path: PathBuf,
}

#[derive(Serialize)]
struct SnapshotRef<'a> {
    version: u32,
    entries: &'a [PresenceEntry],
}

impl RosterStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every entry. Empty or corrupt content yields an empty roster;
    /// only open/lock/read failures are errors.
    pub fn load_all(&self) -> Result<Vec<PresenceEntry>> {
        let Some(mut file) = LockedFile::open_read(&self.path)? else {
            return Ok(Vec::new());
        };

        let mut raw = Vec::new();
        file.read_to_end(&mut raw)
            .map_err(|e| StoreError::io(&self.path, e))?;
        drop(file);

        let content = String::from_utf8_lossy(&raw);
        Ok(RosterSnapshot::decode(&content))
    }

    /// Replace the file content with `entries`.
    pub fn save_all(&self, entries: &[PresenceEntry]) -> Result<()> {
        let body = serde_json::to_vec(&SnapshotRef {
            version: ROSTER_FORMAT_VERSION,
            entries,
        })?;

        let mut file = LockedFile::open_rewrite(&self.path)?;
        rewrite(&mut file, &body).map_err(|e| StoreError::io(&self.path, e))?;

        debug!(entries = entries.len(), "Saved roster");
        Ok(())
    }
}

fn rewrite(file: &mut LockedFile, body: &[u8]) -> std::io::Result<()> {
    file.truncate()?;
    file.write_all(body)?;
    file.flush()?;
    file.sync()
}
