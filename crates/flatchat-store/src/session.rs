//! Session layer: the four operations a chat client calls.
//!
//! Every call resolves the caller's token against a freshly loaded and
//! pruned roster; nothing is cached between calls, so any number of
//! processes can serve the same data directory.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use flatchat_shared::constants::{CHAT_LOG_FILE, DEFAULT_POLL_LIMIT, INACTIVITY_SECS, ROSTER_FILE};
use flatchat_shared::{HtmlNormalizer, Nickname, SessionToken, TextNormalizer};

use crate::clock::{Clock, SystemClock};
use crate::error::{ChatError, StoreError};
use crate::file::ensure_file;
use crate::models::Message;
use crate::presence::{Presence, Pruned};
use crate::records::RecordStore;
use crate::roster::RosterStore;

/// Tunables for a [`ChatService`].
#[derive(Debug, Clone)]
pub struct ChatOptions {
    /// Seconds without activity before a session lapses.
    pub inactivity_secs: i64,
    /// How many trailing log lines a poll considers.
    pub poll_limit: usize,
    /// Unix permission bits applied to the data directory and files on open.
    /// `None` leaves the process umask in charge.
    pub file_mode: Option<u32>,
}

impl Default for ChatOptions {
    fn default() -> Self {
        Self {
            inactivity_secs: INACTIVITY_SECS,
            poll_limit: DEFAULT_POLL_LIMIT,
            file_mode: None,
        }
    }
}

/// What a successful login hands back to the client.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Session {
    pub token: SessionToken,
    pub nickname: Nickname,
    pub joined_at: i64,
}

/// Result of a poll.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PollResult {
    /// Messages since the caller joined, oldest first.
    pub messages: Vec<Message>,
    pub online_count: usize,
    pub online_users: Vec<String>,
}

pub struct ChatService {
    presence: Presence,
    poll_limit: usize,
    clock: Arc<dyn Clock>,
    normalizer: Arc<dyn TextNormalizer>,
}

impl ChatService {
    /// Open the chat rooted at `data_dir`, creating the directory and both
    /// files if missing.
    pub fn open(data_dir: &Path, options: ChatOptions) -> Result<Self, StoreError> {
        std::fs::create_dir_all(data_dir).map_err(|e| StoreError::io(data_dir, e))?;
        if let Some(mode) = options.file_mode {
            crate::file::set_mode(data_dir, dir_mode(mode))?;
        }

        let log_path: PathBuf = data_dir.join(CHAT_LOG_FILE);
        let roster_path: PathBuf = data_dir.join(ROSTER_FILE);
        ensure_file(&log_path, options.file_mode)?;
        ensure_file(&roster_path, options.file_mode)?;

        info!(
            dir = %data_dir.display(),
            inactivity_secs = options.inactivity_secs,
            poll_limit = options.poll_limit,
            "Chat store opened"
        );

        let presence = Presence::new(RecordStore::new(log_path), RosterStore::new(roster_path))
            .with_inactivity_secs(options.inactivity_secs);
        Ok(Self::from_presence(presence, options.poll_limit))
    }

    pub fn from_presence(presence: Presence, poll_limit: usize) -> Self {
        Self {
            presence,
            poll_limit,
            clock: Arc::new(SystemClock),
            normalizer: Arc::new(HtmlNormalizer::default()),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_normalizer(mut self, normalizer: Arc<dyn TextNormalizer>) -> Self {
        self.normalizer = normalizer;
        self
    }

    pub fn presence(&self) -> &Presence {
        &self.presence
    }

    pub fn poll_limit(&self) -> usize {
        self.poll_limit
    }

    pub fn inactivity_secs(&self) -> i64 {
        self.presence.inactivity_secs()
    }

    /// Longest message text the active normalizer will store.
    pub fn max_message_chars(&self) -> usize {
        self.normalizer.max_chars()
    }

    /// Join the room as `raw_nickname`.
    pub fn login(&self, raw_nickname: &str) -> Result<Session, ChatError> {
        let nickname = Nickname::parse(raw_nickname)?;
        let now = self.clock.now();
        let entry = self
            .presence
            .on_join(nickname, SessionToken::generate(), now)?;

        Ok(Session {
            token: entry.token,
            nickname: entry.nickname,
            joined_at: entry.joined_at,
        })
    }

    /// Post `raw_text` as the owner of `token`.
    pub fn post(&self, token: Option<&SessionToken>, raw_text: &str) -> Result<Message, ChatError> {
        let token = token.ok_or(ChatError::NotAuthenticated)?;
        let now = self.clock.now();
        let (mut live, idx) = self.resolve(token, now)?;

        let text = self.normalizer.normalize(raw_text);
        if text.is_empty() {
            return Err(ChatError::EmptyMessage);
        }

        // Heartbeat before append: a failed roster write must not leave a
        // stored message behind that a client retry would duplicate.
        live.entries[idx].last_seen = now;
        self.presence.roster().save_all(&live.entries)?;

        let message = Message::new(now, &live.entries[idx].nickname, text);
        self.presence.records().append(&message)?;

        debug!(
            nick = %live.entries[idx].nickname,
            chars = message.text.chars().count(),
            "Message posted"
        );
        Ok(message)
    }

    /// Heartbeat plus fetch: everything since the caller joined, and who is
    /// online.
    pub fn poll(&self, token: Option<&SessionToken>) -> Result<PollResult, ChatError> {
        let token = token.ok_or(ChatError::NotAuthenticated)?;
        let now = self.clock.now();
        let (mut live, idx) = self.resolve(token, now)?;

        live.entries[idx].last_seen = now;
        self.presence.roster().save_all(&live.entries)?;

        let joined_at = live.entries[idx].joined_at;
        let messages = self.presence.records().read_since(joined_at, self.poll_limit)?;
        let online_users = live.nicknames();

        Ok(PollResult {
            messages,
            online_count: online_users.len(),
            online_users,
        })
    }

    /// Leave the room. Unknown or missing tokens succeed quietly.
    pub fn logout(&self, token: Option<&SessionToken>) -> Result<(), ChatError> {
        let Some(token) = token else {
            return Ok(());
        };
        let now = self.clock.now();
        self.presence.on_leave(token, now)?;
        Ok(())
    }

    /// Find the live entry for `token`. On a miss the pruned roster is still
    /// persisted (and the room cleared if it emptied) before reporting the
    /// session as expired.
    fn resolve(&self, token: &SessionToken, now: i64) -> Result<(Pruned, usize), ChatError> {
        let live = self.presence.load_live(now)?;
        match live.position(token) {
            Some(idx) => Ok((live, idx)),
            None => {
                self.presence.settle(&live)?;
                debug!(token = token.short(), "Session not in roster");
                Err(ChatError::SessionExpired)
            }
        }
    }
}

/// Directories need the execute bit wherever the read bit is set.
fn dir_mode(mode: u32) -> u32 {
    mode | ((mode & 0o444) >> 2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use tempfile::TempDir;

    const T0: i64 = 1_700_000_000;

    fn test_service() -> (ChatService, Arc<ManualClock>, TempDir) {
        let dir = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::new(T0));
        let service = ChatService::open(dir.path(), ChatOptions::default())
            .unwrap()
            .with_clock(clock.clone());
        (service, clock, dir)
    }

    fn texts(poll: &PollResult) -> Vec<String> {
        poll.messages.iter().map(|m| m.text.clone()).collect()
    }

    #[test]
    fn test_open_creates_files() {
        let dir = TempDir::new().unwrap();
        let data = dir.path().join("nested").join("chat_data");
        ChatService::open(&data, ChatOptions::default()).unwrap();
        assert!(data.join(CHAT_LOG_FILE).exists());
        assert!(data.join(ROSTER_FILE).exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_open_applies_file_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let data = dir.path().join("chat_data");
        let options = ChatOptions {
            file_mode: Some(0o640),
            ..ChatOptions::default()
        };
        ChatService::open(&data, options).unwrap();

        let mode = std::fs::metadata(data.join(CHAT_LOG_FILE))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o640);
        let mode = std::fs::metadata(&data).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o750);
    }

    #[test]
    fn test_dir_mode() {
        assert_eq!(dir_mode(0o666), 0o777);
        assert_eq!(dir_mode(0o600), 0o700);
        assert_eq!(dir_mode(0o640), 0o750);
    }

    #[test]
    fn test_login_validation() {
        let (svc, _clock, _dir) = test_service();
        assert!(matches!(svc.login("   "), Err(ChatError::EmptyNickname)));
        assert!(matches!(svc.login("System"), Err(ChatError::DuplicateNickname(_))));

        let session = svc.login("  alice ").unwrap();
        assert_eq!(session.nickname.as_str(), "alice");
        assert_eq!(session.joined_at, T0);
    }

    #[test]
    fn test_duplicate_nickname_until_logout() {
        let (svc, clock, _dir) = test_service();
        let alice = svc.login("Alice").unwrap();
        assert!(matches!(svc.login("ALICE"), Err(ChatError::DuplicateNickname(_))));

        clock.advance(5);
        svc.logout(Some(&alice.token)).unwrap();
        assert!(svc.login("alice").is_ok());
    }

    #[test]
    fn test_post_requires_session() {
        let (svc, _clock, _dir) = test_service();
        assert!(matches!(svc.post(None, "hi"), Err(ChatError::NotAuthenticated)));

        let bogus = SessionToken::parse("bogus").unwrap();
        assert!(matches!(svc.post(Some(&bogus), "hi"), Err(ChatError::SessionExpired)));
    }

    #[test]
    fn test_post_rejects_empty_text() {
        let (svc, _clock, _dir) = test_service();
        let alice = svc.login("alice").unwrap();
        assert!(matches!(
            svc.post(Some(&alice.token), "  \n "),
            Err(ChatError::EmptyMessage)
        ));
    }

    #[test]
    fn test_post_normalizes_and_refreshes_last_seen() {
        let (svc, clock, _dir) = test_service();
        let alice = svc.login("alice").unwrap();

        clock.advance(60);
        let msg = svc.post(Some(&alice.token), " <hi> :) ").unwrap();
        assert_eq!(msg.text, "&lt;hi&gt; \u{1F60A}");
        assert_eq!(msg.author, "alice");
        assert_eq!(msg.timestamp, T0 + 60);

        let roster = svc.presence().roster().load_all().unwrap();
        assert_eq!(roster[0].last_seen, T0 + 60);
    }

    struct Shout;

    impl TextNormalizer for Shout {
        fn normalize(&self, raw: &str) -> String {
            raw.trim().trim_matches('!').to_uppercase()
        }

        fn max_chars(&self) -> usize {
            42
        }
    }

    #[test]
    fn test_post_uses_plugged_in_normalizer() {
        let (svc, _clock, _dir) = test_service();
        let svc = svc.with_normalizer(Arc::new(Shout));
        assert_eq!(svc.max_message_chars(), 42);

        let alice = svc.login("alice").unwrap();
        let msg = svc.post(Some(&alice.token), " <hi> ").unwrap();
        assert_eq!(msg.text, "<HI>");
        assert!(matches!(
            svc.post(Some(&alice.token), "!!!"),
            Err(ChatError::EmptyMessage)
        ));

        let view = svc.poll(Some(&alice.token)).unwrap();
        assert_eq!(texts(&view), vec!["alice joined", "<HI>"]);
    }

    #[test]
    fn test_post_after_silent_lapse_expires_and_clears_room() {
        let (svc, clock, _dir) = test_service();
        let a = svc.login("A").unwrap();
        svc.post(Some(&a.token), "hello").unwrap();

        clock.advance(1801);
        assert!(matches!(svc.post(Some(&a.token), "late"), Err(ChatError::SessionExpired)));
        assert!(svc.presence().roster().load_all().unwrap().is_empty());
        assert_eq!(svc.presence().records().len_bytes().unwrap(), 0);
    }

    #[test]
    fn test_reported_limits_follow_options() {
        let dir = TempDir::new().unwrap();
        let options = ChatOptions {
            inactivity_secs: 60,
            poll_limit: 7,
            ..ChatOptions::default()
        };
        let svc = ChatService::open(dir.path(), options).unwrap();
        assert_eq!(svc.inactivity_secs(), 60);
        assert_eq!(svc.poll_limit(), 7);
        assert_eq!(svc.max_message_chars(), 1000);
    }

    #[test]
    fn test_post_caps_length() {
        let (svc, _clock, _dir) = test_service();
        let alice = svc.login("alice").unwrap();
        let msg = svc.post(Some(&alice.token), &"z".repeat(5000)).unwrap();
        assert_eq!(msg.text.chars().count(), 1000);
    }

    #[test]
    fn test_poll_returns_since_join_and_roster() {
        let (svc, clock, _dir) = test_service();
        let alice = svc.login("alice").unwrap();

        clock.advance(1);
        svc.post(Some(&alice.token), "before bob").unwrap();

        clock.advance(1);
        let bob = svc.login("bob").unwrap();
        clock.advance(1);
        svc.post(Some(&bob.token), "hello").unwrap();

        let alice_view = svc.poll(Some(&alice.token)).unwrap();
        assert_eq!(
            texts(&alice_view),
            vec!["alice joined", "before bob", "bob joined", "hello"]
        );
        assert_eq!(alice_view.online_count, 2);
        assert_eq!(alice_view.online_users, vec!["alice", "bob"]);

        let bob_view = svc.poll(Some(&bob.token)).unwrap();
        assert_eq!(texts(&bob_view), vec!["bob joined", "hello"]);
    }

    #[test]
    fn test_joiner_never_sees_earlier_messages() {
        let (svc, clock, _dir) = test_service();
        let alice = svc.login("alice").unwrap();
        svc.post(Some(&alice.token), "secret").unwrap();

        clock.advance(10);
        let carol = svc.login("carol").unwrap();
        let view = svc.poll(Some(&carol.token)).unwrap();
        assert!(view.messages.iter().all(|m| m.timestamp >= carol.joined_at));
        assert_eq!(texts(&view), vec!["carol joined"]);
    }

    #[test]
    fn test_poll_refreshes_last_seen() {
        let (svc, clock, _dir) = test_service();
        let alice = svc.login("alice").unwrap();

        for _ in 0..3 {
            clock.advance(1000);
            svc.poll(Some(&alice.token)).unwrap();
        }
        let roster = svc.presence().roster().load_all().unwrap();
        assert_eq!(roster[0].last_seen, T0 + 3000);
    }

    #[test]
    fn test_scenario_two_users_then_empty_log() {
        let (svc, clock, _dir) = test_service();
        let a = svc.login("A").unwrap();

        clock.set(T0 + 5);
        let b = svc.login("B").unwrap();
        svc.post(Some(&b.token), "hi").unwrap();

        clock.set(T0 + 6);
        let view = svc.poll(Some(&a.token)).unwrap();
        assert!(texts(&view).contains(&"hi".to_string()));

        svc.logout(Some(&a.token)).unwrap();
        svc.logout(Some(&b.token)).unwrap();

        let records = svc.presence().records();
        assert!(records.read_since(0, 10_000).unwrap().is_empty());
        assert_eq!(records.len_bytes().unwrap(), 0);
        assert!(svc.presence().roster().load_all().unwrap().is_empty());
    }

    #[test]
    fn test_scenario_idle_then_poll_expires() {
        let (svc, clock, _dir) = test_service();
        let a = svc.login("A").unwrap();

        clock.advance(1801);
        assert!(matches!(svc.poll(Some(&a.token)), Err(ChatError::SessionExpired)));
        assert!(svc.presence().roster().load_all().unwrap().is_empty());
        // The lapse emptied the room, so the log went with it.
        assert_eq!(svc.presence().records().len_bytes().unwrap(), 0);

        assert!(matches!(svc.post(Some(&a.token), "x"), Err(ChatError::SessionExpired)));
    }

    #[test]
    fn test_idle_exactly_threshold_survives() {
        let (svc, clock, _dir) = test_service();
        let a = svc.login("A").unwrap();
        clock.advance(1800);
        assert!(svc.poll(Some(&a.token)).is_ok());
    }

    #[test]
    fn test_lapsed_user_pruned_by_other_users_poll() {
        let (svc, clock, _dir) = test_service();
        let a = svc.login("A").unwrap();
        clock.advance(1000);
        let b = svc.login("B").unwrap();

        clock.advance(900);
        let view = svc.poll(Some(&b.token)).unwrap();
        assert_eq!(view.online_users, vec!["B"]);
        assert_eq!(svc.presence().roster().load_all().unwrap().len(), 1);

        assert!(matches!(svc.poll(Some(&a.token)), Err(ChatError::SessionExpired)));
    }

    #[test]
    fn test_rejoin_resets_visibility_horizon() {
        let (svc, clock, _dir) = test_service();
        let a = svc.login("A").unwrap();
        let b = svc.login("B").unwrap();

        clock.advance(1000);
        svc.poll(Some(&b.token)).unwrap();
        clock.advance(900);
        // A lapsed; B keeps chatting.
        svc.post(Some(&b.token), "while A was away").unwrap();
        assert!(svc.poll(Some(&a.token)).is_err());

        clock.advance(1);
        let a2 = svc.login("A").unwrap();
        assert!(a2.joined_at > a.joined_at);
        let view = svc.poll(Some(&a2.token)).unwrap();
        assert_eq!(texts(&view), vec!["A joined"]);
    }

    #[test]
    fn test_logout_is_idempotent() {
        let (svc, _clock, _dir) = test_service();
        let a = svc.login("A").unwrap();
        let b = svc.login("B").unwrap();

        svc.logout(Some(&a.token)).unwrap();
        svc.logout(Some(&a.token)).unwrap();
        svc.logout(None).unwrap();

        let view = svc.poll(Some(&b.token)).unwrap();
        let left: Vec<_> = view.messages.iter().filter(|m| m.text == "A left").collect();
        assert_eq!(left.len(), 1);
        assert!(left[0].is_system());
    }

    #[test]
    fn test_poll_window_is_configurable() {
        let dir = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::new(T0));
        let options = ChatOptions {
            poll_limit: 3,
            ..ChatOptions::default()
        };
        let svc = ChatService::open(dir.path(), options)
            .unwrap()
            .with_clock(clock);
        let a = svc.login("A").unwrap();
        for i in 0..10 {
            svc.post(Some(&a.token), &format!("m{i}")).unwrap();
        }
        let view = svc.poll(Some(&a.token)).unwrap();
        assert_eq!(texts(&view), vec!["m7", "m8", "m9"]);
    }

    #[test]
    fn test_two_services_share_one_directory() {
        let dir = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::new(T0));
        let one = ChatService::open(dir.path(), ChatOptions::default())
            .unwrap()
            .with_clock(clock.clone());
        let two = ChatService::open(dir.path(), ChatOptions::default())
            .unwrap()
            .with_clock(clock);

        let a = one.login("A").unwrap();
        assert!(matches!(two.login("a"), Err(ChatError::DuplicateNickname(_))));
        let b = two.login("B").unwrap();
        two.post(Some(&b.token), "from two").unwrap();

        let view = one.poll(Some(&a.token)).unwrap();
        assert!(texts(&view).contains(&"from two".to_string()));
        assert_eq!(view.online_count, 2);
    }

    #[test]
    fn test_concurrent_logins_stay_consistent() {
        let dir = TempDir::new().unwrap();
        let svc = Arc::new(ChatService::open(dir.path(), ChatOptions::default()).unwrap());

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let svc = Arc::clone(&svc);
                std::thread::spawn(move || svc.login(&format!("user{i}")))
            })
            .collect();
        let sessions: Vec<Session> = handles
            .into_iter()
            .filter_map(|h| h.join().unwrap().ok())
            .collect();

        // Racing load-mutate-save may drop entries, but whatever survives is
        // a well-formed roster of distinct tokens from successful logins.
        let roster = svc.presence().roster().load_all().unwrap();
        assert!(!roster.is_empty());
        for entry in &roster {
            assert!(sessions.iter().any(|s| s.token == entry.token));
        }
        let mut tokens: Vec<_> = roster.iter().map(|e| e.token.clone()).collect();
        tokens.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        tokens.dedup();
        assert_eq!(tokens.len(), roster.len());
    }
}
