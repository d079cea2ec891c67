//! Re-entrant processing lock.
//!
//! One lock serializes every apply-and-notify sequence of the bridge. A thread
//! that already holds the lock may acquire it again; the nested acquisition
//! reports [`LockStatus::AlreadyHeld`] and its guard does not release.

use attr_core::{Error, Result};
use std::sync::{Condvar, Mutex};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};
use tracing::error;

/// Outcome of a lock acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockStatus {
    /// The calling thread took the lock and must release it.
    Success,
    /// The calling thread already held the lock.
    AlreadyHeld,
    /// The lock could not be taken within the timeout.
    Failed,
}

/// A blocking, timeout-capable lock that tolerates re-entry by its owner.
#[derive(Debug, Default)]
pub struct StackLock {
    owner: Mutex<Option<ThreadId>>,
    released: Condvar,
}

/// Guard returned by [`StackLock::acquire`].
///
/// Only a guard from a [`LockStatus::Success`] acquisition releases the lock
/// when dropped.
#[derive(Debug)]
#[must_use = "the lock is released when the guard is dropped"]
pub struct StackLockGuard<'a> {
    lock: Option<&'a StackLock>,
}

impl StackLockGuard<'_> {
    pub fn status(&self) -> LockStatus {
        if self.lock.is_some() {
            LockStatus::Success
        } else {
            LockStatus::AlreadyHeld
        }
    }
}

impl Drop for StackLockGuard<'_> {
    fn drop(&mut self) {
        if let Some(lock) = self.lock.take() {
            lock.release();
        }
    }
}

impl StackLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the lock, waiting at most `timeout` (`None` waits forever).
    ///
    /// Fails with `LockFailed` when the timeout expires.
    pub fn acquire(&self, timeout: Option<Duration>) -> Result<StackLockGuard<'_>> {
        let me = thread::current().id();
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut owner = self.owner.lock().map_err(|_| Error::LockFailed)?;

        loop {
            match *owner {
                Some(id) if id == me => return Ok(StackLockGuard { lock: None }),
                None => {
                    *owner = Some(me);
                    return Ok(StackLockGuard { lock: Some(self) });
                }
                Some(_) => {}
            }

            owner = match deadline {
                None => self.released.wait(owner).map_err(|_| Error::LockFailed)?,
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        error!("Timed out waiting for the processing lock");
                        return Err(Error::LockFailed);
                    }
                    self.released
                        .wait_timeout(owner, remaining)
                        .map_err(|_| Error::LockFailed)?
                        .0
                }
            };
        }
    }

    /// Whether the calling thread holds the lock.
    pub fn is_held_by_current_thread(&self) -> bool {
        let me = thread::current().id();
        self.owner
            .lock()
            .map(|owner| *owner == Some(me))
            .unwrap_or(false)
    }

    fn release(&self) {
        let mut owner = self.owner.lock().unwrap_or_else(|e| e.into_inner());
        *owner = None;
        drop(owner);
        self.released.notify_one();
    }
}
