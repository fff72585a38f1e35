//! Session lock implementation
//!
//! All methods take `&self`; the state lives behind a mutex so the store and
//! its cache can share one lock through an `Arc`.
//!
//! The lock file is never written in place. Each record goes to a private
//! temp file that is synced and then linked (first acquire) or renamed
//! (take-over, heartbeat) onto `session.lock`, so a reader sees either the
//! previous record or the new one.

use std::fs::{self, File, OpenOptions};
use std::io::{self, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;

use crate::error::{Result, StoreError};

use super::LockState;

/// Lock file name inside the world directory
pub const LOCK_FILE_NAME: &str = "session.lock";

/// Owner token + heartbeat
pub const LOCK_FILE_SIZE: usize = 16;

static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

/// Contents of a lock file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockInfo {
    pub owner: i64,
    /// Milliseconds since the Unix epoch
    pub heartbeat_ms: i64,
}

impl LockInfo {
    fn to_bytes(self) -> [u8; LOCK_FILE_SIZE] {
        let mut bytes = [0u8; LOCK_FILE_SIZE];
        bytes[..8].copy_from_slice(&self.owner.to_be_bytes());
        bytes[8..].copy_from_slice(&self.heartbeat_ms.to_be_bytes());
        bytes
    }

    fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != LOCK_FILE_SIZE {
            return None;
        }
        let mut owner = [0u8; 8];
        let mut heartbeat = [0u8; 8];
        owner.copy_from_slice(&bytes[..8]);
        heartbeat.copy_from_slice(&bytes[8..]);
        Some(Self {
            owner: i64::from_be_bytes(owner),
            heartbeat_ms: i64::from_be_bytes(heartbeat),
        })
    }

    /// Milliseconds since the last heartbeat; 0 if it is in the future
    pub fn age_ms(&self, now_ms: i64) -> u64 {
        now_ms.saturating_sub(self.heartbeat_ms).max(0) as u64
    }
}

/// One session's claim on a world directory
pub struct SessionLock {
    path: PathBuf,
    token: i64,
    /// Heartbeats older than this are stale
    timeout_ms: u64,
    state: Mutex<LockState>,
}

impl SessionLock {
    /// A new, unacquired lock for `world_dir` with a unique owner token
    pub fn new(world_dir: &Path, timeout_ms: u64) -> Self {
        Self {
            path: world_dir.join(LOCK_FILE_NAME),
            token: new_token(),
            timeout_ms,
            state: Mutex::new(LockState::Unlocked),
        }
    }

    /// Take the lock without waiting
    ///
    /// Succeeds when:
    /// 1. No lock file exists (created exclusively), or
    /// 2. The existing file is unreadable and was last modified longer ago
    ///    than the timeout, or
    /// 3. Its heartbeat is older than the timeout, or
    /// 4. It already holds our token
    ///
    /// Otherwise fails with `SessionLocked` and stays `Unlocked`. A live but
    /// unreadable file reports owner 0.
    pub fn acquire(&self) -> Result<()> {
        let mut state = self.state.lock();
        if *state == LockState::Held {
            return Ok(());
        }
        *state = LockState::Acquiring;

        match self.try_acquire() {
            Ok(()) => {
                *state = LockState::Held;
                tracing::info!(path = %self.path.display(), token = self.token, "session lock acquired");
                Ok(())
            }
            Err(e) => {
                *state = LockState::Unlocked;
                Err(e)
            }
        }
    }

    /// Write our token unconditionally, taking over from any holder
    pub fn force_acquire(&self) -> Result<()> {
        let mut state = self.state.lock();
        *state = LockState::Acquiring;

        if let Ok(Some(previous)) = Self::read_info(&self.path) {
            if previous.owner != self.token {
                tracing::warn!(
                    path = %self.path.display(),
                    previous = previous.owner,
                    token = self.token,
                    "taking over session lock"
                );
            }
        }

        match self.write_info() {
            Ok(()) => {
                *state = LockState::Held;
                Ok(())
            }
            Err(e) => {
                *state = LockState::Unlocked;
                Err(e)
            }
        }
    }

    /// Confirm we still own the world
    ///
    /// Moves `Held` to `Lost` if the file no longer carries our token.
    pub fn check(&self) -> Result<()> {
        let mut state = self.state.lock();
        self.check_locked(&mut state)
    }

    /// `check`, then refresh the heartbeat
    pub fn heartbeat(&self) -> Result<()> {
        let mut state = self.state.lock();
        self.check_locked(&mut state)?;
        self.write_info()?;
        tracing::trace!(token = self.token, "session lock heartbeat");
        Ok(())
    }

    /// Give the world up; the file is removed only if it still holds our token
    pub fn release(&self) -> Result<()> {
        let mut state = self.state.lock();
        if *state == LockState::Held {
            match Self::read_info(&self.path) {
                Ok(Some(info)) if info.owner == self.token => {
                    fs::remove_file(&self.path)?;
                    tracing::info!(path = %self.path.display(), "session lock released");
                }
                Ok(_) => {
                    tracing::warn!(path = %self.path.display(), "session lock was taken over before release");
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        *state = LockState::Released;
        Ok(())
    }

    pub fn state(&self) -> LockState {
        *self.state.lock()
    }

    pub fn is_held(&self) -> bool {
        self.state() == LockState::Held
    }

    pub fn token(&self) -> i64 {
        self.token
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn timeout_ms(&self) -> u64 {
        self.timeout_ms
    }

    /// Current lock file contents for `world_dir`.
    /// `Ok(None)` if the file exists but is not a valid lock record.
    pub fn inspect(world_dir: &Path) -> io::Result<Option<LockInfo>> {
        Self::read_info(&world_dir.join(LOCK_FILE_NAME))
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn try_acquire(&self) -> Result<()> {
        if self.create_exclusive()? {
            return Ok(());
        }

        match Self::read_info(&self.path) {
            Ok(Some(info)) if info.owner == self.token => {}
            Ok(Some(info)) => {
                let age = info.age_ms(now_ms());
                if age < self.timeout_ms {
                    return Err(StoreError::SessionLocked { owner: info.owner });
                }
                tracing::info!(path = %self.path.display(), owner = info.owner, age_ms = age, "replacing stale session lock");
            }
            Ok(None) => {
                let age = self.modified_age_ms()?;
                if age < self.timeout_ms {
                    return Err(StoreError::SessionLocked { owner: 0 });
                }
                tracing::warn!(path = %self.path.display(), age_ms = age, "replacing unreadable session lock");
            }
            // removed between our create attempt and the read
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        self.write_info()
    }

    fn check_locked(&self, state: &mut LockState) -> Result<()> {
        match *state {
            LockState::Held => {}
            LockState::Lost => {
                return Err(StoreError::SessionLockLost(
                    "another session took over this world".to_string(),
                ))
            }
            other => {
                return Err(StoreError::SessionLockLost(format!(
                    "session lock is {}",
                    other
                )))
            }
        }

        let on_disk = match Self::read_info(&self.path) {
            Ok(info) => info,
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };

        match on_disk {
            Some(info) if info.owner == self.token => Ok(()),
            Some(info) => {
                *state = LockState::Lost;
                tracing::warn!(path = %self.path.display(), token = self.token, owner = info.owner, "session lock lost");
                Err(StoreError::SessionLockLost(format!(
                    "lock now held by {:#018x}",
                    info.owner
                )))
            }
            None => {
                *state = LockState::Lost;
                tracing::warn!(path = %self.path.display(), token = self.token, "session lock file missing or corrupt");
                Err(StoreError::SessionLockLost(
                    "lock file removed or overwritten".to_string(),
                ))
            }
        }
    }

    /// Publish a fresh record only if no lock file exists.
    /// Returns false if one does.
    fn create_exclusive(&self) -> Result<bool> {
        let temp = self.write_temp()?;
        let linked = fs::hard_link(&temp, &self.path);
        let outcome = match linked {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
            // no hard links on this filesystem
            Err(e) => {
                tracing::debug!(path = %self.path.display(), error = %e, "hard link failed, creating lock file directly");
                self.create_new_in_place()
            }
        };
        let _ = fs::remove_file(&temp);
        outcome
    }

    fn create_new_in_place(&self) -> Result<bool> {
        match OpenOptions::new().write(true).create_new(true).open(&self.path) {
            Ok(mut file) => {
                file.write_all(&self.record().to_bytes())?;
                file.sync_all()?;
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Replace the lock file with a fresh record in one rename
    fn write_info(&self) -> Result<()> {
        let temp = self.write_temp()?;
        if let Err(e) = fs::rename(&temp, &self.path) {
            let _ = fs::remove_file(&temp);
            return Err(e.into());
        }
        Ok(())
    }

    /// Fully written and synced record in a temp file next to the lock file
    fn write_temp(&self) -> Result<PathBuf> {
        let mut name = self.path.as_os_str().to_owned();
        name.push(format!(".{:016x}.tmp", self.token));
        let temp = PathBuf::from(name);

        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp)?;
        let written = file
            .write_all(&self.record().to_bytes())
            .and_then(|()| file.sync_all());
        if let Err(e) = written {
            let _ = fs::remove_file(&temp);
            return Err(e.into());
        }
        Ok(temp)
    }

    fn record(&self) -> LockInfo {
        LockInfo {
            owner: self.token,
            heartbeat_ms: now_ms(),
        }
    }

    /// Milliseconds since the lock file was last modified; 0 if in the future
    fn modified_age_ms(&self) -> Result<u64> {
        let modified = match fs::metadata(&self.path).and_then(|m| m.modified()) {
            Ok(modified) => modified,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(u64::MAX),
            Err(e) => return Err(e.into()),
        };
        Ok(SystemTime::now()
            .duration_since(modified)
            .unwrap_or(Duration::ZERO)
            .as_millis() as u64)
    }

    fn read_info(path: &Path) -> io::Result<Option<LockInfo>> {
        let mut bytes = Vec::with_capacity(LOCK_FILE_SIZE);
        File::open(path)?.read_to_end(&mut bytes)?;
        Ok(LockInfo::from_bytes(&bytes))
    }
}

impl Drop for SessionLock {
    fn drop(&mut self) {
        if self.state() == LockState::Held {
            if let Err(e) = self.release() {
                tracing::warn!(path = %self.path.display(), error = %e, "failed to release session lock");
            }
        }
    }
}

impl std::fmt::Debug for SessionLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionLock")
            .field("path", &self.path)
            .field("token", &self.token)
            .field("state", &self.state())
            .finish()
    }
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Unique per instance: wall clock, process id and a process-wide counter
fn new_token() -> i64 {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);
    let pid = std::process::id() as u64;
    let seq = NEXT_TOKEN.fetch_add(1, Ordering::Relaxed);
    (nanos ^ (pid << 40) ^ seq.wrapping_mul(0x9e37_79b9_7f4a_7c15)) as i64
}
