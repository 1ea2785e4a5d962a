//! # flatchat-store
//!
//! Flat-file persistence and presence for flatchat.
//!
//! Two files hold all state: an append-only message log
//! ([`RecordStore`]) and a whole-file roster snapshot ([`RosterStore`]).
//! [`Presence`] ties them together (expiry, join/leave notices, clearing
//! the log when the room empties) and [`ChatService`] exposes the
//! login/post/poll/logout operations on top.
//!
//! Every operation is synchronous and re-reads from disk; callers in an
//! async runtime should run them on a blocking thread.

pub mod clock;
pub mod models;
pub mod presence;
pub mod records;
pub mod roster;
pub mod session;

mod error;
mod file;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{ChatError, StoreError};
pub use models::*;
pub use presence::{prune_expired, Presence, Pruned};
pub use records::RecordStore;
pub use roster::RosterStore;
pub use session::{ChatOptions, ChatService, PollResult, Session};
