//! Presence policy: who counts as present, and what joining or leaving does
//! to the message log.
//!
//! - An entry lapses once `now - last_seen` exceeds the inactivity threshold.
//! - Nicknames are unique among live entries only (case-insensitive).
//! - Joining appends a system notice; the joiner's `joined_at` is its
//!   visibility horizon.
//! - Leaving appends a system notice, and the log is cleared as soon as no
//!   live entry remains.

use tracing::{debug, info};

use flatchat_shared::constants::INACTIVITY_SECS;
use flatchat_shared::{escape_html, Nickname, SessionToken};

use crate::error::{ChatError, Result};
use crate::models::{Message, PresenceEntry};
use crate::records::RecordStore;
use crate::roster::RosterStore;

/// Roster contents after expiry was applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pruned {
    pub entries: Vec<PresenceEntry>,
    /// Whether any entry was dropped.
    pub changed: bool,
}

impl Pruned {
    pub fn position(&self, token: &SessionToken) -> Option<usize> {
        self.entries.iter().position(|e| &e.token == token)
    }

    pub fn nicknames(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|e| e.nickname.as_str().to_string())
            .collect()
    }
}

/// Drop every entry idle for more than `inactivity_secs`. Pure.
pub fn prune_expired(entries: Vec<PresenceEntry>, now: i64, inactivity_secs: i64) -> Pruned {
    let before = entries.len();
    let entries: Vec<PresenceEntry> = entries
        .into_iter()
        .filter(|e| e.idle_secs(now) <= inactivity_secs)
        .collect();
    Pruned {
        changed: entries.len() != before,
        entries,
    }
}

/// The two stores plus the rules tying them together.
#[derive(Debug, Clone)]
pub struct Presence {
    records: RecordStore,
    roster: RosterStore,
    inactivity_secs: i64,
}

impl Presence {
    pub fn new(records: RecordStore, roster: RosterStore) -> Self {
        Self {
            records,
            roster,
            inactivity_secs: INACTIVITY_SECS,
        }
    }

    pub fn with_inactivity_secs(mut self, secs: i64) -> Self {
        self.inactivity_secs = secs;
        self
    }

    pub fn records(&self) -> &RecordStore {
        &self.records
    }

    pub fn roster(&self) -> &RosterStore {
        &self.roster
    }

    pub fn inactivity_secs(&self) -> i64 {
        self.inactivity_secs
    }

    /// Load the roster and apply expiry. Nothing is written.
    pub fn load_live(&self, now: i64) -> Result<Pruned> {
        let entries = self.roster.load_all()?;
        Ok(prune_expired(entries, now, self.inactivity_secs))
    }

    /// Persist a pruned roster if expiry changed it, and clear the log when
    /// nobody is left. Returns whether the log was cleared.
    pub fn settle(&self, pruned: &Pruned) -> Result<bool> {
        if pruned.changed {
            self.roster.save_all(&pruned.entries)?;
        }
        if pruned.entries.is_empty() {
            self.records.clear()?;
            info!("Room is empty, chat log cleared");
            return Ok(true);
        }
        Ok(false)
    }

    /// Re-read the roster and clear the log if no live entry remains.
    pub fn on_empty_room(&self, now: i64) -> Result<bool> {
        let pruned = self.load_live(now)?;
        self.settle(&pruned)
    }

    /// Admit `nickname` under `token`, unless a live entry already holds the
    /// same nickname.
    pub fn on_join(
        &self,
        nickname: Nickname,
        token: SessionToken,
        now: i64,
    ) -> std::result::Result<PresenceEntry, ChatError> {
        let mut live = self.load_live(now)?;

        if live.entries.iter().any(|e| nickname.eq_folded(e.nickname.as_str())) {
            debug!(nick = %nickname, "Nickname already online");
            return Err(ChatError::DuplicateNickname(nickname.to_string()));
        }

        // Users who lapsed silently never triggered a leave; wipe what they
        // left behind before the first newcomer arrives.
        if live.entries.is_empty() {
            self.records.clear()?;
        }

        let entry = PresenceEntry::new(nickname, token, now);
        live.entries.push(entry.clone());
        self.roster.save_all(&live.entries)?;
        self.records.append(&notice(now, &entry.nickname, "joined"))?;

        info!(
            nick = %entry.nickname,
            token = entry.token.short(),
            online = live.entries.len(),
            "User joined"
        );
        Ok(entry)
    }

    /// Remove the entry for `token`, announce it, and clear the log if the
    /// room is now empty. Unknown tokens are a no-op returning `None`.
    pub fn on_leave(&self, token: &SessionToken, now: i64) -> Result<Option<PresenceEntry>> {
        let mut entries = self.roster.load_all()?;
        let Some(idx) = entries.iter().position(|e| &e.token == token) else {
            debug!(token = token.short(), "Leave for unknown session");
            return Ok(None);
        };

        let entry = entries.remove(idx);
        self.roster.save_all(&entries)?;
        self.records.append(&notice(now, &entry.nickname, "left"))?;
        info!(nick = %entry.nickname, token = token.short(), "User left");

        self.on_empty_room(now)?;
        Ok(Some(entry))
    }
}

/// System notice about `nickname`. Nicknames are stored raw, so escape here
/// to keep the log in rendered form.
fn notice(now: i64, nickname: &Nickname, what: &str) -> Message {
    Message::system(now, format!("{} {what}", escape_html(nickname.as_str())))
}
