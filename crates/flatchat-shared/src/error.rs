use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InputError {
    #[error("Nickname is empty")]
    EmptyNickname,

    /// The nickname collides with the reserved system author.
    #[error("Nickname is reserved: {0}")]
    ReservedNickname(String),

    #[error("Session token is empty")]
    EmptyToken,
}
