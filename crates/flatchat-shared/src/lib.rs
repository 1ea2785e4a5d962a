//! # flatchat-shared
//!
//! Types and constants shared by the flatchat store and server: validated
//! nicknames and session tokens, the message text normalizer, and the
//! defaults both sides agree on.

pub mod constants;
pub mod error;
pub mod text;
pub mod types;

pub use error::InputError;
pub use text::{escape_html, HtmlNormalizer, TextNormalizer};
pub use types::{Nickname, SessionToken};
