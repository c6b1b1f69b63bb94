//! Public named rw-lock.
//!
//! Every operation is total: acquisition and release report success as a
//! `bool`, a lock that could not be created degrades to a stub whose
//! operations fail immediately, and nothing here panics or unwinds. The
//! `try_*` variants carry the reason for callers that want it.

use crate::errors::Error;
use crate::handle::{LockHandle, NamedRwLockHandle, StubHandle};
use crate::name::LockName;
#[cfg(unix)]
use crate::pthread_rwlock::PthreadRwLock;
use crate::shmem_rwlock::ShmemRwLock;
use crate::timeout::WaitBudget;
use crate::types::{Backend, HoldState};
use log::warn;
use metrics::counter;
use std::fmt;

fn open_handle(name: &str, backend: Backend) -> Result<Box<dyn LockHandle>, Error> {
    crate::ensure_logging();
    let name = LockName::new(name)?;
    Ok(match backend {
        #[cfg(unix)]
        Backend::Native => Box::new(NamedRwLockHandle::<PthreadRwLock>::open(name)?),
        Backend::Emulated => Box::new(NamedRwLockHandle::<ShmemRwLock>::open(name)?),
    })
}

/// A reader/writer lock shared between processes by name.
///
/// Each thread that takes part opens its own `NamedRwLock` with the same
/// name; a single value is `Send` but not `Sync`. Moving the value moves the
/// handle; `std::mem::take` moves it out and leaves a stub behind.
///
/// On [`Backend::Native`] a held mode must be released on the thread that
/// took it. A release from any other thread (including a drop) is refused
/// and the lock stays held.
///
/// Dropping the value releases whatever mode it still holds. If this value
/// created the underlying object (see [`has_ownership`](Self::has_ownership))
/// the name is removed as well, so later opens start from a fresh lock.
pub struct NamedRwLock {
    inner: Box<dyn LockHandle>,
}

impl NamedRwLock {
    /// An uncreated lock. Every operation fails until `create_on` succeeds.
    pub fn new() -> Self {
        Self {
            inner: Box::new(StubHandle),
        }
    }

    /// Open or create `name` with the platform's default backend.
    /// Check [`is_created`](Self::is_created) before relying on it.
    pub fn create(name: &str) -> Self {
        Self::create_with(name, Backend::platform_default())
    }

    pub fn create_with(name: &str, backend: Backend) -> Self {
        let mut lock = Self::new();
        lock.create_on_with(name, backend);
        lock
    }

    /// Like `create_with`, but says why it failed instead of handing back a stub.
    pub fn try_create(name: &str, backend: Backend) -> Result<Self, Error> {
        Ok(Self {
            inner: open_handle(name, backend)?,
        })
    }

    /// Point this value at `name`, replacing (and dropping) the current handle.
    pub fn create_on(&mut self, name: &str) -> bool {
        self.create_on_with(name, Backend::platform_default())
    }

    pub fn create_on_with(&mut self, name: &str, backend: Backend) -> bool {
        self.inner = match open_handle(name, backend) {
            Ok(h) => h,
            Err(e) => {
                counter!("named_rwlock_create_failures_total").increment(1);
                warn!("[LOCK] creating '{}' via {:?} failed: {}", name, backend, e);
                Box::new(StubHandle)
            }
        };
        self.is_created()
    }

    /// Release everything and fall back to the stub.
    pub fn destroy(&mut self) {
        self.inner = Box::new(StubHandle);
    }

    pub fn is_created(&self) -> bool {
        self.inner.is_created()
    }

    /// Whether dropping this value removes the named object.
    pub fn has_ownership(&self) -> bool {
        self.inner.has_ownership()
    }

    /// Stop being responsible for removing the named object. The lock mode
    /// currently held is not affected.
    pub fn drop_ownership(&mut self) {
        self.inner.drop_ownership()
    }

    /// Number of shared-mode holders across all processes.
    ///
    /// Exact on [`Backend::Emulated`]. [`Backend::Native`] cannot see its
    /// readers and always reports 0. A stub reports 0.
    pub fn reader_count(&self) -> i32 {
        self.inner.reader_count()
    }

    pub fn backend(&self) -> Option<Backend> {
        self.inner.backend()
    }

    /// The normalized name, e.g. `/ringbuf_rwl`.
    pub fn name(&self) -> Option<&str> {
        self.inner.name().map(LockName::as_str)
    }

    pub fn hold_state(&self) -> HoldState {
        self.inner.hold_state()
    }

    /// Take the shared mode. `timeout_ms < 0` waits forever, `0` polls.
    pub fn lock_read(&mut self, timeout_ms: i64) -> bool {
        self.try_lock_read(timeout_ms).is_ok()
    }

    /// Give the shared mode back, waiting at most `timeout_ms` for the
    /// internal bookkeeping. Refused if this value does not hold it.
    pub fn unlock_read(&mut self, timeout_ms: i64) -> bool {
        self.try_unlock_read(timeout_ms).is_ok()
    }

    /// Take the exclusive mode. `timeout_ms < 0` waits forever, `0` polls.
    pub fn lock(&mut self, timeout_ms: i64) -> bool {
        self.try_lock(timeout_ms).is_ok()
    }

    /// Give the exclusive mode back. Refused if this value does not hold it.
    pub fn unlock(&mut self) -> bool {
        self.try_unlock().is_ok()
    }

    pub fn try_lock_read(&mut self, timeout_ms: i64) -> Result<(), Error> {
        let budget = WaitBudget::from_millis(timeout_ms);
        self.inner.lock_read(budget)
    }

    pub fn try_unlock_read(&mut self, timeout_ms: i64) -> Result<(), Error> {
        let budget = WaitBudget::from_millis(timeout_ms);
        self.inner.unlock_read(budget)
    }

    pub fn try_lock(&mut self, timeout_ms: i64) -> Result<(), Error> {
        let budget = WaitBudget::from_millis(timeout_ms);
        self.inner.lock(budget)
    }

    pub fn try_unlock(&mut self) -> Result<(), Error> {
        self.inner.unlock()
    }

    /// Shared mode for the lifetime of the returned guard.
    pub fn read(&mut self, timeout_ms: i64) -> Option<ReadGuard<'_>> {
        if self.lock_read(timeout_ms) {
            Some(ReadGuard { lock: self })
        } else {
            None
        }
    }

    /// Exclusive mode for the lifetime of the returned guard.
    pub fn write(&mut self, timeout_ms: i64) -> Option<WriteGuard<'_>> {
        if self.lock(timeout_ms) {
            Some(WriteGuard { lock: self })
        } else {
            None
        }
    }
}

impl Default for NamedRwLock {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for NamedRwLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NamedRwLock")
            .field("name", &self.name())
            .field("backend", &self.backend())
            .field("hold", &self.hold_state())
            .field("ownership", &self.has_ownership())
            .finish()
    }
}

/// Represents an acquired shared (read) lock.
/// The lock is released when this guard is dropped.
#[must_use = "if unused the lock will immediately unlock"]
pub struct ReadGuard<'a> {
    lock: &'a mut NamedRwLock,
}

impl ReadGuard<'_> {
    pub fn reader_count(&self) -> i32 {
        self.lock.reader_count()
    }
}

impl Drop for ReadGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.lock.inner.unlock_read(WaitBudget::Forever) {
            warn!("[LOCK] read guard release failed: {}", e);
        }
    }
}

/// Represents an acquired exclusive (write) lock.
/// The lock is released when this guard is dropped.
#[must_use = "if unused the lock will immediately unlock"]
pub struct WriteGuard<'a> {
    lock: &'a mut NamedRwLock,
}

impl Drop for WriteGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.lock.inner.unlock() {
            warn!("[LOCK] write guard release failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_send<T: Send>() {}

    #[test]
    fn lock_is_send() {
        assert_send::<NamedRwLock>();
    }

    #[test]
    fn take_leaves_a_stub() {
        let name = format!("facade_take_{}", std::process::id());
        let mut a = NamedRwLock::create_with(&name, Backend::Emulated);
        assert!(a.is_created());
        let mut b = std::mem::take(&mut a);
        assert!(!a.is_created());
        assert!(!a.lock(0));
        assert!(b.lock(0));
        assert!(b.unlock());
    }

    #[test]
    fn invalid_name_gives_a_stub() {
        let lock = NamedRwLock::create("");
        assert!(!lock.is_created());
        assert!(matches!(
            NamedRwLock::try_create("", Backend::Emulated),
            Err(Error::InvalidName)
        ));
    }
}
