//! Session Lock Module
//!
//! Cross-process ownership of a world directory.
//!
//! ## Responsibilities
//! - Give one session at a time the right to write a world
//! - Let a new session take over from a dead or stale one
//! - Detect that our ownership was taken over before any write lands
//!
//! ## Lock File
//! ```text
//! {world}/session.lock (16 bytes)
//! ┌──────────────────────┬──────────────────────────────┐
//! │ Owner token: i64 BE  │ Heartbeat: i64 BE (ms epoch) │
//! └──────────────────────┴──────────────────────────────┘
//! ```
//!
//! ## States
//! ```text
//! Unlocked ──acquire──▶ Acquiring ──▶ Held ──release──▶ Released
//!     ▲                     │           │
//!     └──── SessionLocked ──┘           └── token overwritten ──▶ Lost
//! ```

mod session;

pub use session::{LockInfo, SessionLock, LOCK_FILE_NAME, LOCK_FILE_SIZE};

use std::fmt;

/// Where a `SessionLock` is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    /// Never acquired, or the last attempt was refused
    Unlocked,

    /// An acquire is in progress
    Acquiring,

    /// We own the world
    Held,

    /// Released by us
    Released,

    /// Another session overwrote our token
    Lost,
}

impl fmt::Display for LockState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LockState::Unlocked => "unlocked",
            LockState::Acquiring => "acquiring",
            LockState::Held => "held",
            LockState::Released => "released",
            LockState::Lost => "lost",
        };
        f.write_str(name)
    }
}
