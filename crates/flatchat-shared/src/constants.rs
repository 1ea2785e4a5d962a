/// Application name
pub const APP_NAME: &str = "flatchat";

/// Reserved author for join/leave notices
pub const SYSTEM_AUTHOR: &str = "SYSTEM";

/// Seconds without a poll or post before a presence entry lapses (30 min)
pub const INACTIVITY_SECS: i64 = 30 * 60;

/// Maximum number of log lines a single poll looks at
pub const DEFAULT_POLL_LIMIT: usize = 2000;

/// Chunk size for the backward tail scan of the message log
pub const TAIL_CHUNK_SIZE: u64 = 4096;

/// Maximum message length in characters, after normalization
pub const MAX_MESSAGE_CHARS: usize = 1000;

/// Maximum nickname length in characters
pub const MAX_NICKNAME_CHARS: usize = 64;

/// On-disk format versions
pub const RECORD_FORMAT_VERSION: u32 = 1;
pub const ROSTER_FORMAT_VERSION: u32 = 1;

/// File names inside the data directory
pub const CHAT_LOG_FILE: &str = "chat.log";
pub const ROSTER_FILE: &str = "users.json";

/// Default HTTP API port (server)
pub const DEFAULT_HTTP_PORT: u16 = 8080;
