use std::path::PathBuf;

use thiserror::Error;

use flatchat_shared::InputError;

/// Errors produced by the file stores.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Opening, locking, reading or writing one of the data files failed.
    #[error("IO error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Encoding a record or the roster snapshot failed.
    #[error("Encode error: {0}")]
    Encode(#[from] serde_json::Error),
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Errors surfaced by the session layer to callers of login/post/poll/logout.
#[derive(Error, Debug)]
pub enum ChatError {
    #[error("Nickname required")]
    EmptyNickname,

    #[error("Nickname already online: {0}")]
    DuplicateNickname(String),

    #[error("Empty message")]
    EmptyMessage,

    #[error("Not logged in")]
    NotAuthenticated,

    #[error("Session expired")]
    SessionExpired,

    /// Lock or I/O failure on a data file. Transient; the request may be
    /// retried.
    #[error("Store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),
}

impl ChatError {
    /// Short machine-readable code for API consumers.
    pub fn code(&self) -> &'static str {
        match self {
            ChatError::EmptyNickname => "empty_nickname",
            ChatError::DuplicateNickname(_) => "duplicate_nickname",
            ChatError::EmptyMessage => "empty_message",
            ChatError::NotAuthenticated => "not_authenticated",
            ChatError::SessionExpired => "session_expired",
            ChatError::StoreUnavailable(_) => "store_unavailable",
        }
    }

    /// Whether the client should drop its session and log in again.
    pub fn requires_relogin(&self) -> bool {
        matches!(self, ChatError::NotAuthenticated | ChatError::SessionExpired)
    }
}

impl From<InputError> for ChatError {
    fn from(err: InputError) -> Self {
        match err {
            InputError::EmptyNickname => ChatError::EmptyNickname,
            // The system author is permanently "online".
            InputError::ReservedNickname(nick) => ChatError::DuplicateNickname(nick),
            InputError::EmptyToken => ChatError::NotAuthenticated,
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;
