//! Per-handle state machine shared by every backend, plus the stub.
//!
//! ```text
//!   Idle --lock_read--> Reading --unlock_read--> Idle
//!   Idle --lock-------> Writing --unlock-------> Idle
//! ```
//! Anything else is rejected before the backend is touched.

use crate::backend::NamedRwLockBackend;
use crate::errors::Error;
use crate::name::LockName;
use crate::timeout::WaitBudget;
use crate::types::{Backend, HoldState, Mode};
use log::{debug, trace, warn};
use metrics::counter;

/// What the facade needs from whatever it currently holds.
pub(crate) trait LockHandle: Send {
    fn is_created(&self) -> bool;
    fn backend(&self) -> Option<Backend>;
    fn name(&self) -> Option<&LockName>;
    fn hold_state(&self) -> HoldState;
    fn has_ownership(&self) -> bool;
    fn drop_ownership(&mut self);
    fn reader_count(&self) -> i32;
    fn lock_read(&mut self, budget: WaitBudget) -> Result<(), Error>;
    fn unlock_read(&mut self, budget: WaitBudget) -> Result<(), Error>;
    fn lock(&mut self, budget: WaitBudget) -> Result<(), Error>;
    fn unlock(&mut self) -> Result<(), Error>;
}

/// A live handle on a named lock.
pub struct NamedRwLockHandle<B: NamedRwLockBackend> {
    name: LockName,
    hold: HoldState,
    backend: B,
}

impl<B: NamedRwLockBackend> NamedRwLockHandle<B> {
    pub fn open(name: LockName) -> Result<Self, Error> {
        let backend = B::open(&name)?;
        debug!(
            "[HANDLE] {} via {:?} (created={})",
            name,
            B::KIND,
            backend.created()
        );
        Ok(Self {
            name,
            hold: HoldState::Idle,
            backend,
        })
    }

    pub fn created(&self) -> bool {
        self.backend.created()
    }

    fn acquire(&mut self, mode: Mode, budget: WaitBudget) -> Result<(), Error> {
        if self.hold != HoldState::Idle {
            debug!("[HANDLE] {} {} refused: already {:?}", self.name, mode, self.hold);
            return Err(Error::AlreadyHeld);
        }
        let res = match mode {
            Mode::Read => self.backend.lock_shared(&budget),
            Mode::Write => self.backend.lock_exclusive(&budget),
        };
        match res {
            Ok(()) => {
                self.hold = mode.held();
                counter!("named_rwlock_acquired_total", "mode" => mode.as_str()).increment(1);
                if cfg!(feature = "trace") {
                    trace!("[HANDLE] {} {} acquired", self.name, mode);
                }
                Ok(())
            }
            Err(e) => {
                if e.is_timeout() {
                    counter!("named_rwlock_timeouts_total", "mode" => mode.as_str()).increment(1);
                } else {
                    debug!("[HANDLE] {} {} failed: {}", self.name, mode, e);
                }
                Err(e)
            }
        }
    }

    fn release(&mut self, mode: Mode, budget: WaitBudget) -> Result<(), Error> {
        if !self.hold.holds(mode) {
            counter!("named_rwlock_rejected_unlocks_total", "mode" => mode.as_str()).increment(1);
            warn!(
                "[HANDLE] {} {} unlock by non-holder ({:?}) rejected",
                self.name, mode, self.hold
            );
            return Err(Error::NotHeld);
        }
        match mode {
            Mode::Read => self.backend.unlock_shared(&budget)?,
            Mode::Write => self.backend.unlock_exclusive()?,
        }
        self.hold = HoldState::Idle;
        if cfg!(feature = "trace") {
            trace!("[HANDLE] {} {} released", self.name, mode);
        }
        Ok(())
    }
}

impl<B: NamedRwLockBackend> LockHandle for NamedRwLockHandle<B> {
    fn is_created(&self) -> bool {
        true
    }

    fn backend(&self) -> Option<Backend> {
        Some(B::KIND)
    }

    fn name(&self) -> Option<&LockName> {
        Some(&self.name)
    }

    fn hold_state(&self) -> HoldState {
        self.hold
    }

    fn has_ownership(&self) -> bool {
        self.backend.has_ownership()
    }

    fn drop_ownership(&mut self) {
        self.backend.drop_ownership();
    }

    fn reader_count(&self) -> i32 {
        self.backend.reader_count()
    }

    fn lock_read(&mut self, budget: WaitBudget) -> Result<(), Error> {
        self.acquire(Mode::Read, budget)
    }

    fn unlock_read(&mut self, budget: WaitBudget) -> Result<(), Error> {
        self.release(Mode::Read, budget)
    }

    fn lock(&mut self, budget: WaitBudget) -> Result<(), Error> {
        self.acquire(Mode::Write, budget)
    }

    fn unlock(&mut self) -> Result<(), Error> {
        self.release(Mode::Write, WaitBudget::Forever)
    }
}

impl<B: NamedRwLockBackend> Drop for NamedRwLockHandle<B> {
    fn drop(&mut self) {
        let res = match self.hold {
            HoldState::Idle => Ok(()),
            HoldState::Reading => self.release(Mode::Read, WaitBudget::Forever),
            HoldState::Writing => self.release(Mode::Write, WaitBudget::Forever),
        };
        if let Err(e) = res {
            warn!("[HANDLE] {} release on drop failed: {}", self.name, e);
        }
        debug!(
            "[HANDLE] closing {} (removes name: {})",
            self.name,
            self.backend.has_ownership()
        );
    }
}

/// Stand-in for "no lock": every operation fails at once.
#[derive(Debug, Default)]
pub(crate) struct StubHandle;

impl LockHandle for StubHandle {
    fn is_created(&self) -> bool {
        false
    }

    fn backend(&self) -> Option<Backend> {
        None
    }

    fn name(&self) -> Option<&LockName> {
        None
    }

    fn hold_state(&self) -> HoldState {
        HoldState::Idle
    }

    fn has_ownership(&self) -> bool {
        false
    }

    fn drop_ownership(&mut self) {}

    fn reader_count(&self) -> i32 {
        0
    }

    fn lock_read(&mut self, _budget: WaitBudget) -> Result<(), Error> {
        Err(Error::Stub)
    }

    fn unlock_read(&mut self, _budget: WaitBudget) -> Result<(), Error> {
        Err(Error::Stub)
    }

    fn lock(&mut self, _budget: WaitBudget) -> Result<(), Error> {
        Err(Error::Stub)
    }

    fn unlock(&mut self) -> Result<(), Error> {
        Err(Error::Stub)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shmem_rwlock::ShmemRwLock;

    fn open(tag: &str) -> NamedRwLockHandle<ShmemRwLock> {
        let name = LockName::new(&format!("handle_{}_{}", tag, std::process::id())).unwrap();
        NamedRwLockHandle::open(name).unwrap()
    }

    #[test]
    fn no_reentrant_or_mixed_acquisition() {
        let mut h = open("reentrant");
        h.lock_read(WaitBudget::Poll).unwrap();
        assert!(matches!(h.lock_read(WaitBudget::Poll), Err(Error::AlreadyHeld)));
        assert!(matches!(h.lock(WaitBudget::Poll), Err(Error::AlreadyHeld)));
        assert_eq!(h.hold_state(), HoldState::Reading);
        assert_eq!(h.reader_count(), 1);
        h.unlock_read(WaitBudget::Poll).unwrap();
        assert_eq!(h.hold_state(), HoldState::Idle);
    }

    #[test]
    fn wrong_mode_unlock_is_rejected() {
        let mut h = open("wrong_mode");
        h.lock(WaitBudget::Poll).unwrap();
        assert!(matches!(h.unlock_read(WaitBudget::Poll), Err(Error::NotHeld)));
        assert_eq!(h.hold_state(), HoldState::Writing);
        h.unlock().unwrap();
        assert!(matches!(h.unlock(), Err(Error::NotHeld)));
    }

    #[test]
    fn stub_refuses_everything() {
        let mut s = StubHandle;
        assert!(!s.is_created());
        assert!(matches!(s.lock(WaitBudget::Forever), Err(Error::Stub)));
        assert!(matches!(s.lock_read(WaitBudget::Forever), Err(Error::Stub)));
        assert!(matches!(s.unlock_read(WaitBudget::Forever), Err(Error::Stub)));
        assert!(matches!(s.unlock(), Err(Error::Stub)));
        assert_eq!(s.reader_count(), 0);
        s.drop_ownership();
        assert!(!s.has_ownership());
    }
}
