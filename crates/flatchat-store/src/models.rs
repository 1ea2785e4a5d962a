//! Value types persisted in the two data files, and their on-disk encoding.
//!
//! Timestamps are whole seconds since the Unix epoch.

use serde::{Deserialize, Serialize};

use flatchat_shared::constants::{RECORD_FORMAT_VERSION, ROSTER_FORMAT_VERSION, SYSTEM_AUTHOR};
use flatchat_shared::{Nickname, SessionToken};

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// A single chat event as stored in the log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub timestamp: i64,
    /// Nickname of the sender, or [`SYSTEM_AUTHOR`] for join/leave notices.
    pub author: String,
    /// Already normalized text.
    pub text: String,
}

impl Message {
    pub fn new(timestamp: i64, author: &Nickname, text: impl Into<String>) -> Self {
        Self {
            timestamp,
            author: author.as_str().to_string(),
            text: text.into(),
        }
    }

    pub fn system(timestamp: i64, text: impl Into<String>) -> Self {
        Self {
            timestamp,
            author: SYSTEM_AUTHOR.to_string(),
            text: text.into(),
        }
    }

    pub fn is_system(&self) -> bool {
        self.author == SYSTEM_AUTHOR
    }

    /// Encode as one log line, without the terminator.
    pub fn to_line(&self) -> serde_json::Result<String> {
        serde_json::to_string(&RecordLine {
            v: RECORD_FORMAT_VERSION,
            ts: self.timestamp,
            author: &self.author,
            text: &self.text,
        })
    }

    /// Decode one log line. Anything malformed, from another format version,
    /// or missing an author yields `None`.
    pub fn from_line(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        let rec: OwnedRecordLine = serde_json::from_str(line).ok()?;
        if rec.v != RECORD_FORMAT_VERSION || rec.author.is_empty() {
            return None;
        }
        Some(Self {
            timestamp: rec.ts,
            author: rec.author,
            text: rec.text,
        })
    }
}

#[derive(Serialize)]
struct RecordLine<'a> {
    v: u32,
    ts: i64,
    author: &'a str,
    text: &'a str,
}

#[derive(Deserialize)]
struct OwnedRecordLine {
    v: u32,
    ts: i64,
    author: String,
    text: String,
}

// ---------------------------------------------------------------------------
// Presence entry
// ---------------------------------------------------------------------------

/// One user's live session in the roster.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PresenceEntry {
    pub nickname: Nickname,
    pub token: SessionToken,
    /// Visibility horizon: the session sees messages from here on.
    pub joined_at: i64,
    pub last_seen: i64,
}

impl PresenceEntry {
    pub fn new(nickname: Nickname, token: SessionToken, now: i64) -> Self {
        Self {
            nickname,
            token,
            joined_at: now,
            last_seen: now,
        }
    }

    pub fn idle_secs(&self, now: i64) -> i64 {
        now - self.last_seen
    }
}

/// Versioned roster file document, as read back from disk.
#[derive(Debug, Deserialize)]
pub(crate) struct RosterSnapshot {
    pub version: u32,
    pub entries: Vec<PresenceEntry>,
}

impl RosterSnapshot {
    /// Decode file content; empty, corrupt or foreign-version content is an
    /// empty roster.
    pub fn decode(content: &str) -> Vec<PresenceEntry> {
        if content.trim().is_empty() {
            return Vec::new();
        }
        match serde_json::from_str::<RosterSnapshot>(content) {
            Ok(snapshot) if snapshot.version == ROSTER_FORMAT_VERSION => snapshot.entries,
            Ok(snapshot) => {
                tracing::warn!(version = snapshot.version, "Unknown roster version, ignoring");
                Vec::new()
            }
            Err(e) => {
                tracing::warn!(error = %e, "Corrupt roster file, treating as empty");
                Vec::new()
            }
        }
    }
}
