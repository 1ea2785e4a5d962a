use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::{MAX_NICKNAME_CHARS, SYSTEM_AUTHOR};
use crate::error::InputError;

/// A chat nickname: trimmed, non-blank, never the system author.
///
/// Uniqueness is only enforced among live presence entries, compared on
/// [`Nickname::folded`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct Nickname(String);

impl Nickname {
    /// Validate raw user input. Overlong input is cut at
    /// [`MAX_NICKNAME_CHARS`] characters.
    pub fn parse(raw: &str) -> Result<Self, InputError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(InputError::EmptyNickname);
        }
        let nick: String = trimmed.chars().take(MAX_NICKNAME_CHARS).collect();
        let nick = nick.trim_end().to_string();
        if fold(&nick) == fold(SYSTEM_AUTHOR) {
            return Err(InputError::ReservedNickname(nick));
        }
        Ok(Self(nick))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Case-folded form used for live-uniqueness checks.
    pub fn folded(&self) -> String {
        fold(&self.0)
    }

    pub fn eq_folded(&self, other: &str) -> bool {
        self.folded() == fold(other)
    }
}

impl std::fmt::Display for Nickname {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

fn fold(s: &str) -> String {
    s.to_lowercase()
}

/// Opaque session identifier handed to a client on login.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct SessionToken(String);

impl SessionToken {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn parse(raw: &str) -> Result<Self, InputError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(InputError::EmptyToken);
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 8 characters, for logs.
    pub fn short(&self) -> &str {
        let end = self
            .0
            .char_indices()
            .nth(8)
            .map(|(i, _)| i)
            .unwrap_or(self.0.len());
        &self.0[..end]
    }
}

impl std::fmt::Display for SessionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
