//! The message log: an append-only, newline-delimited file.
//!
//! Lock discipline:
//! - [`RecordStore::append`] and [`RecordStore::clear`] take an exclusive lock
//!   for one write.
//! - [`RecordStore::read_since`] takes a shared lock for one tail scan.
//!
//! A reader therefore never sees a half-written record, and the append order
//! is the order every reader observes.

use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use flatchat_shared::constants::TAIL_CHUNK_SIZE;

use crate::error::{Result, StoreError};
use crate::file::LockedFile;
use crate::models::Message;

#[derive(Debug, Clone)]
pub struct RecordStore {
    path: PathBuf,
    chunk_size: u64,
}

impl RecordStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            chunk_size: TAIL_CHUNK_SIZE,
        }
    }

    /// Override the tail-scan chunk size (mostly for tests).
    pub fn with_chunk_size(mut self, chunk_size: u64) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record plus a line terminator.
    pub fn append(&self, message: &Message) -> Result<()> {
        let mut line = message.to_line()?;
        line.push('\n');

        let mut file = LockedFile::open_append(&self.path)?;
        file.write_all(line.as_bytes())
            .map_err(|e| StoreError::io(&self.path, e))?;
        file.flush().map_err(|e| StoreError::io(&self.path, e))?;

        debug!(author = %message.author, ts = message.timestamp, "Appended record");
        Ok(())
    }

    /// Truncate the log to zero length.
    pub fn clear(&self) -> Result<()> {
        let mut file = LockedFile::open_rewrite(&self.path)?;
        file.truncate().map_err(|e| StoreError::io(&self.path, e))?;
        debug!(path = %self.path.display(), "Cleared message log");
        Ok(())
    }

    /// Messages with `timestamp >= min_timestamp`, oldest first, taken from
    /// at most the last `max_lines` lines of the log.
    ///
    /// The line window is a performance bound: qualifying messages older
    /// than the window are not returned. Malformed lines are skipped.
    pub fn read_since(&self, min_timestamp: i64, max_lines: usize) -> Result<Vec<Message>> {
        let Some(mut file) = LockedFile::open_read(&self.path)? else {
            return Ok(Vec::new());
        };

        let len = file.len().map_err(|e| StoreError::io(&self.path, e))?;
        let lines = tail_lines(&mut file, len, max_lines, self.chunk_size)
            .map_err(|e| StoreError::io(&self.path, e))?;
        drop(file);

        let total = lines.len();
        let messages: Vec<Message> = lines
            .iter()
            .filter_map(|line| Message::from_line(line))
            .filter(|m| m.timestamp >= min_timestamp)
            .collect();

        debug!(
            scanned = total,
            returned = messages.len(),
            since = min_timestamp,
            "Read message log"
        );
        Ok(messages)
    }

    /// Current size of the log in bytes (0 when missing).
    pub fn len_bytes(&self) -> Result<u64> {
        match LockedFile::open_read(&self.path)? {
            Some(file) => file.len().map_err(|e| StoreError::io(&self.path, e)),
            None => Ok(0),
        }
    }
}

/// Collect up to `max_lines` trailing non-empty lines of a `len`-byte
/// stream, reading backward in `chunk_size` pieces.
///
/// Reading stops once the buffer holds `max_lines` complete lines or the
/// start of the stream is reached. When the scan stops mid-stream, the
/// leading fragment before the first newline is dropped since it may be the
/// tail of a longer line.
fn tail_lines<R: Read + Seek>(
    reader: &mut R,
    len: u64,
    max_lines: usize,
    chunk_size: u64,
) -> io::Result<Vec<String>> {
    if max_lines == 0 || len == 0 {
        return Ok(Vec::new());
    }

    let mut buf: Vec<u8> = Vec::new();
    let mut pos = len;
    let mut newlines = 0usize;

    // One newline more than `max_lines` guarantees `max_lines` whole lines
    // after the (possibly partial) leading fragment.
    while pos > 0 && newlines <= max_lines {
        let start = pos.saturating_sub(chunk_size);
        let mut chunk = vec![0u8; (pos - start) as usize];
        reader.seek(SeekFrom::Start(start))?;
        reader.read_exact(&mut chunk)?;

        newlines += chunk.iter().filter(|&&b| b == b'\n').count();
        chunk.extend_from_slice(&buf);
        buf = chunk;
        pos = start;
    }

    let text = String::from_utf8_lossy(&buf);
    let mut segments: Vec<&str> = text.split('\n').collect();
    if pos > 0 && !segments.is_empty() {
        segments.remove(0);
    }

    let lines: Vec<String> = segments
        .into_iter()
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string)
        .collect();

    let skip = lines.len().saturating_sub(max_lines);
    Ok(lines.into_iter().skip(skip).collect())
}
