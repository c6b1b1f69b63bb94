//! Cross-process read-write lock emulated with one mutex and one
//! manual-reset event living in a named shared-memory region.
//! Works on Linux, macOS and Windows.
//!
//! The region carries `readers` and `writer_active`; both are only read or
//! written while the mutex is held. The event is the broadcast wake-up:
//! a releasing side signals it, a writer clears it when it takes the lock
//! or before it goes to sleep waiting for readers. Every signal is issued
//! with the mutex held, after the state change it announces.
//!
//! Readers are counted exactly. There is no fairness queue.
use crate::backend::NamedRwLockBackend;
use crate::constants::SYNC_SLOT_SIZE;
use crate::errors::Error;
use crate::name::LockName;
use crate::region;
use crate::timeout::WaitBudget;
use crate::types::Backend;
use core::ptr;
use core::sync::atomic::{AtomicU32, Ordering};
use log::{debug, error, warn};
use raw_sync::events::{Event as RawEvent, EventImpl, EventInit, EventState};
use raw_sync::locks::{LockGuard, LockImpl, LockInit, Mutex as RawMutex};
use raw_sync::Timeout;
use shared_memory::Shmem;
use std::mem::size_of;
use std::ptr::NonNull;

#[repr(C, align(8))]
struct SharedState {
    ready: AtomicU32,
    readers: AtomicU32,
    writer_active: AtomicU32,
    _pad: u32,
    mutex_buf: [u8; SYNC_SLOT_SIZE],
    event_buf: [u8; SYNC_SLOT_SIZE],
}

const _: () = {
    assert!(core::mem::size_of::<SharedState>() % core::mem::align_of::<SharedState>() == 0);
};

pub struct ShmemRwLock {
    // raw_sync objects point into the mapping; they drop before it.
    mutex: Box<dyn LockImpl>,
    event: Box<dyn EventImpl>,
    state: NonNull<SharedState>,
    created: bool,
    shmem: Shmem,
}

// SAFETY: the raw_sync objects and the state pointer all refer to the
// mapping owned by `shmem`, which moves together with them. The OS objects
// behind them are process-shared.
unsafe impl Send for ShmemRwLock {}

fn wait_error(budget: &WaitBudget, e: Box<dyn std::error::Error>) -> Error {
    if budget.expired() {
        budget.exhausted()
    } else {
        Error::Wait(e.to_string())
    }
}

/// raw_sync's timed waits run on the realtime clock and can give up a
/// little before the monotonic deadline.
fn woke_early(budget: &WaitBudget) -> bool {
    matches!(budget, WaitBudget::Until(_)) && !budget.expired()
}

impl ShmemRwLock {
    #[inline(always)]
    fn state(&self) -> &SharedState {
        unsafe { self.state.as_ref() }
    }

    /// Take the state mutex within what is left of the budget.
    fn lock_state(&self, budget: &WaitBudget) -> Result<LockGuard<'_>, Error> {
        loop {
            let res = match budget.raw_timeout()? {
                Timeout::Infinite => self.mutex.lock(),
                t => self.mutex.try_lock(t),
            };
            match res {
                Ok(guard) => return Ok(guard),
                Err(_) if woke_early(budget) => continue,
                Err(e) => return Err(wait_error(budget, e)),
            }
        }
    }

    /// Sleep on the event within what is left of the budget. A wake-up
    /// before the deadline counts as a signal; callers recheck the state.
    fn wait_signal(&self, budget: &WaitBudget) -> Result<(), Error> {
        if budget.is_poll() {
            return Err(Error::WouldBlock);
        }
        let t = budget.raw_timeout()?;
        match self.event.wait(t) {
            Ok(()) => Ok(()),
            Err(_) if woke_early(budget) => Ok(()),
            Err(e) => Err(wait_error(budget, e)),
        }
    }

    fn set_event(&self, state: EventState) {
        if let Err(e) = self.event.set(state) {
            warn!("[EMULATED] event update failed: {}", e);
        }
    }
}

impl NamedRwLockBackend for ShmemRwLock {
    const KIND: Backend = Backend::Emulated;

    fn open(name: &LockName) -> Result<Self, Error> {
        let size = size_of::<SharedState>();
        let os_id = name.region_id(Self::KIND.region_suffix());
        let (shmem, created) = region::create_or_open(&os_id, size)?;
        region::check_len(&shmem, size)?;
        let state = NonNull::new(shmem.as_ptr() as *mut SharedState)
            .ok_or_else(|| Error::from("mapping returned a null pointer"))?;

        let st = state.as_ptr();
        let mptr = unsafe { ptr::addr_of_mut!((*st).mutex_buf) } as *mut u8;
        let eptr = unsafe { ptr::addr_of_mut!((*st).event_buf) } as *mut u8;

        let (mutex, event) = if created {
            let msz = RawMutex::size_of(Some(mptr));
            let esz = RawEvent::size_of(Some(eptr));
            if msz > SYNC_SLOT_SIZE || esz > SYNC_SLOT_SIZE {
                return Err(Error::LockInit(format!(
                    "sync objects need {}/{} bytes, slots hold {}",
                    msz, esz, SYNC_SLOT_SIZE
                )));
            }
            let (mutex, _) = unsafe { RawMutex::new(mptr, ptr::null_mut()) }
                .map_err(|e| Error::LockInit(format!("mutex init failed: {e}")))?;
            // manual reset: one signal wakes every waiter
            let (event, _) = unsafe { RawEvent::new(eptr, false) }
                .map_err(|e| Error::LockInit(format!("event init failed: {e}")))?;
            let st = unsafe { state.as_ref() };
            st.readers.store(0, Ordering::Relaxed);
            st.writer_active.store(0, Ordering::Relaxed);
            region::publish_ready(&st.ready);
            debug!("[EMULATED] initialised {}", os_id);
            (mutex, event)
        } else {
            region::wait_ready(unsafe { &state.as_ref().ready })?;
            let (mutex, _) = unsafe { RawMutex::from_existing(mptr, ptr::null_mut()) }
                .map_err(|e| Error::LockInit(format!("re-open mutex failed: {e}")))?;
            let (event, _) = unsafe { RawEvent::from_existing(eptr) }
                .map_err(|e| Error::LockInit(format!("re-open event failed: {e}")))?;
            (mutex, event)
        };

        Ok(Self {
            mutex,
            event,
            state,
            created,
            shmem,
        })
    }

    fn created(&self) -> bool {
        self.created
    }

    fn has_ownership(&self) -> bool {
        self.shmem.is_owner()
    }

    fn drop_ownership(&mut self) {
        self.shmem.set_owner(false);
    }

    /// Snapshot taken without the mutex; may be stale by the time it is read.
    fn reader_count(&self) -> i32 {
        self.state().readers.load(Ordering::Acquire) as i32
    }

    fn lock_shared(&self, budget: &WaitBudget) -> Result<(), Error> {
        loop {
            let guard = self.lock_state(budget)?;
            let st = self.state();
            if st.writer_active.load(Ordering::Acquire) == 0 {
                st.readers.fetch_add(1, Ordering::AcqRel);
                drop(guard);
                return Ok(());
            }
            // The active writer cleared the event and signals on unlock.
            drop(guard);
            self.wait_signal(budget)?;
        }
    }

    fn unlock_shared(&self, budget: &WaitBudget) -> Result<(), Error> {
        let _guard = self.lock_state(budget)?;
        let st = self.state();
        let prev = st.readers.load(Ordering::Acquire);
        if prev == 0 {
            error!("[EMULATED] reader count underflow");
            return Err(Error::NotHeld);
        }
        st.readers.store(prev - 1, Ordering::Release);
        if prev == 1 {
            self.set_event(EventState::Signaled);
        }
        Ok(())
    }

    fn lock_exclusive(&self, budget: &WaitBudget) -> Result<(), Error> {
        loop {
            let guard = self.lock_state(budget)?;
            let st = self.state();
            if st.readers.load(Ordering::Acquire) == 0
                && st.writer_active.load(Ordering::Acquire) == 0
            {
                st.writer_active.store(1, Ordering::Release);
                self.set_event(EventState::Clear);
                drop(guard);
                return Ok(());
            }
            self.set_event(EventState::Clear);
            drop(guard);
            self.wait_signal(budget)?;
        }
    }

    fn unlock_exclusive(&self) -> Result<(), Error> {
        // TODO: bound this wait once the mutex can be recovered from a dead owner
        let _guard = self
            .mutex
            .lock()
            .map_err(|e| Error::Wait(format!("mutex lock failed: {e}")))?;
        self.state().writer_active.store(0, Ordering::Release);
        self.set_event(EventState::Signaled);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    fn name(tag: &str) -> LockName {
        LockName::new(&format!("emulated_{}_{}", tag, std::process::id())).unwrap()
    }

    #[test]
    fn state_is_initialised_by_creator() {
        let n = name("init");
        let a = ShmemRwLock::open(&n).unwrap();
        assert!(a.created());
        assert_eq!(a.reader_count(), 0);
        assert_eq!(a.state().writer_active.load(Ordering::Relaxed), 0);
        let b = ShmemRwLock::open(&n).unwrap();
        assert!(!b.created());
    }

    #[test]
    fn readers_are_counted_across_handles() {
        let n = name("count");
        let a = ShmemRwLock::open(&n).unwrap();
        let b = ShmemRwLock::open(&n).unwrap();
        a.lock_shared(&WaitBudget::Poll).unwrap();
        b.lock_shared(&WaitBudget::Poll).unwrap();
        assert_eq!(a.reader_count(), 2);
        assert_eq!(b.reader_count(), 2);
        a.unlock_shared(&WaitBudget::Forever).unwrap();
        assert_eq!(b.reader_count(), 1);
        b.unlock_shared(&WaitBudget::Forever).unwrap();
        assert_eq!(a.reader_count(), 0);
    }

    #[test]
    fn failed_write_leaves_counters_alone() {
        let n = name("untouched");
        let a = ShmemRwLock::open(&n).unwrap();
        let b = ShmemRwLock::open(&n).unwrap();
        a.lock_shared(&WaitBudget::Forever).unwrap();
        let start = Instant::now();
        assert!(matches!(
            b.lock_exclusive(&WaitBudget::from_millis(25)),
            Err(Error::Timeout)
        ));
        assert!(start.elapsed() >= Duration::from_millis(25));
        assert_eq!(b.state().writer_active.load(Ordering::Relaxed), 0);
        assert_eq!(b.reader_count(), 1);
        a.unlock_shared(&WaitBudget::Forever).unwrap();
    }

    #[test]
    fn underflow_is_refused() {
        let n = name("underflow");
        let a = ShmemRwLock::open(&n).unwrap();
        assert!(matches!(
            a.unlock_shared(&WaitBudget::Poll),
            Err(Error::NotHeld)
        ));
        assert_eq!(a.reader_count(), 0);
    }
}
