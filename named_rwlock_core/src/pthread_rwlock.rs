//! Named cross-process rw-lock on top of a process-shared `pthread_rwlock_t`.
//!
//! The lock lives in its own shared-memory region, sized to exactly the
//! lock state. The primitive itself does not expose how many readers hold
//! it, so `reader_count` always reports 0 here.
//!
//! Bounded waits use the timed lock calls where the platform has them
//! (Linux) and fall back to try + backoff elsewhere (macOS).
//!
//! glibc tells a write release from a read release by the calling thread,
//! so a held mode may only be released by the thread that acquired it.
//!
//! No starvation prevention: whoever the OS lets through first wins.

use crate::backend::NamedRwLockBackend;
use crate::errors::Error;
use crate::name::LockName;
use crate::region;
use crate::timeout::{Backoff, WaitBudget};
use crate::types::{Backend, Mode};
use libc::{c_int, pthread_rwlock_t, pthread_rwlockattr_t, PTHREAD_PROCESS_SHARED};
use log::debug;
use shared_memory::Shmem;
use std::cell::{Cell, UnsafeCell};
use std::mem::{size_of, MaybeUninit};
use std::ptr::NonNull;
use std::sync::atomic::AtomicU32;
use std::thread::{self, ThreadId};
#[cfg(target_os = "linux")]
use std::time::Duration;

#[cfg(target_os = "linux")]
extern "C" {
    fn pthread_rwlock_timedrdlock(
        lock: *mut pthread_rwlock_t,
        abstime: *const libc::timespec,
    ) -> c_int;
    fn pthread_rwlock_timedwrlock(
        lock: *mut pthread_rwlock_t,
        abstime: *const libc::timespec,
    ) -> c_int;
}

#[repr(C)]
struct NativeState {
    ready: AtomicU32,
    _pad: u32,
    rwlock: UnsafeCell<pthread_rwlock_t>,
}

pub struct PthreadRwLock {
    state: NonNull<NativeState>,
    // Thread that took the mode this value currently holds.
    holder: Cell<Option<ThreadId>>,
    created: bool,
    shmem: Shmem,
}

// SAFETY: the state pointer targets the mapping owned by `shmem`, which
// travels with this value. The pthread primitive is process-shared and
// designed for concurrent use.
unsafe impl Send for PthreadRwLock {}

#[inline]
fn check(rc: c_int) -> Result<(), Error> {
    if rc == 0 {
        Ok(())
    } else {
        Err(Error::Os(errno::Errno(rc)))
    }
}

/// Initialise a zeroed `pthread_rwlock_t` for use across processes.
unsafe fn init_shared(lock: *mut pthread_rwlock_t) -> Result<(), Error> {
    let mut attr: MaybeUninit<pthread_rwlockattr_t> = MaybeUninit::uninit();
    check(libc::pthread_rwlockattr_init(attr.as_mut_ptr()))?;
    let rc = libc::pthread_rwlockattr_setpshared(attr.as_mut_ptr(), PTHREAD_PROCESS_SHARED);
    if rc != 0 {
        libc::pthread_rwlockattr_destroy(attr.as_mut_ptr());
        return Err(Error::Os(errno::Errno(rc)));
    }
    let rc = libc::pthread_rwlock_init(lock, attr.as_ptr());
    libc::pthread_rwlockattr_destroy(attr.as_mut_ptr());
    check(rc)
}

impl PthreadRwLock {
    #[inline(always)]
    fn raw(&self) -> *mut pthread_rwlock_t {
        unsafe { self.state.as_ref().rwlock.get() }
    }

    fn try_once(&self, mode: Mode) -> c_int {
        unsafe {
            match mode {
                Mode::Read => libc::pthread_rwlock_tryrdlock(self.raw()),
                Mode::Write => libc::pthread_rwlock_trywrlock(self.raw()),
            }
        }
    }

    fn block(&self, mode: Mode) -> c_int {
        unsafe {
            match mode {
                Mode::Read => libc::pthread_rwlock_rdlock(self.raw()),
                Mode::Write => libc::pthread_rwlock_wrlock(self.raw()),
            }
        }
    }

    /// Forever blocks in the OS, a poll tries once, a bounded budget uses
    /// the timed calls (or try + backoff where those are missing).
    fn acquire(&self, mode: Mode, budget: &WaitBudget) -> Result<(), Error> {
        if budget.is_forever() {
            check(self.block(mode))?;
        } else if budget.is_poll() {
            match self.try_once(mode) {
                0 => {}
                libc::EBUSY => return Err(Error::WouldBlock),
                rc => return Err(Error::Os(errno::Errno(rc))),
            }
        } else {
            self.acquire_bounded(mode, budget)?;
        }
        self.holder.set(Some(thread::current().id()));
        Ok(())
    }

    #[cfg(target_os = "linux")]
    fn acquire_bounded(&self, mode: Mode, budget: &WaitBudget) -> Result<(), Error> {
        match self.timed(mode, budget) {
            // This thread already holds the lock through another handle.
            // The timed calls refuse at once; wait the budget out instead.
            Err(Error::Os(e)) if e.0 == libc::EDEADLK => self.retry_until(mode, budget),
            res => res,
        }
    }

    #[cfg(not(target_os = "linux"))]
    fn acquire_bounded(&self, mode: Mode, budget: &WaitBudget) -> Result<(), Error> {
        self.retry_until(mode, budget)
    }

    /// One timed call per pass; a pass that ends early because the
    /// realtime clock moved is retried with what is left of the budget.
    #[cfg(target_os = "linux")]
    fn timed(&self, mode: Mode, budget: &WaitBudget) -> Result<(), Error> {
        loop {
            let left = match budget.remaining() {
                Some(left) if !left.is_zero() => left,
                _ => return Err(budget.exhausted()),
            };
            let abstime = realtime_after(left)?;
            let rc = unsafe {
                match mode {
                    Mode::Read => pthread_rwlock_timedrdlock(self.raw(), &abstime),
                    Mode::Write => pthread_rwlock_timedwrlock(self.raw(), &abstime),
                }
            };
            match rc {
                0 => return Ok(()),
                libc::ETIMEDOUT => continue,
                rc => return Err(Error::Os(errno::Errno(rc))),
            }
        }
    }

    fn retry_until(&self, mode: Mode, budget: &WaitBudget) -> Result<(), Error> {
        let mut backoff = Backoff::new();
        loop {
            match self.try_once(mode) {
                0 => return Ok(()),
                libc::EBUSY | libc::EDEADLK => {}
                rc => return Err(Error::Os(errno::Errno(rc))),
            }
            backoff.snooze(budget)?;
        }
    }

    /// Release whichever mode is held, from the thread that took it.
    fn release(&self) -> Result<(), Error> {
        let me = thread::current().id();
        if self.holder.get() != Some(me) {
            return Err(Error::WrongThread);
        }
        check(unsafe { libc::pthread_rwlock_unlock(self.raw()) })?;
        self.holder.set(None);
        Ok(())
    }
}

/// `CLOCK_REALTIME` now plus `left`, as the timed pthread calls want it.
#[cfg(target_os = "linux")]
fn realtime_after(left: Duration) -> Result<libc::timespec, Error> {
    let mut now = MaybeUninit::<libc::timespec>::uninit();
    if unsafe { libc::clock_gettime(libc::CLOCK_REALTIME, now.as_mut_ptr()) } != 0 {
        return Err(Error::Os(errno::errno()));
    }
    let now = unsafe { now.assume_init() };
    let mut secs = now.tv_sec.saturating_add(left.as_secs() as libc::time_t);
    let mut nanos = now.tv_nsec + left.subsec_nanos() as libc::c_long;
    if nanos >= 1_000_000_000 {
        secs = secs.saturating_add(1);
        nanos -= 1_000_000_000;
    }
    Ok(libc::timespec {
        tv_sec: secs,
        tv_nsec: nanos,
    })
}

impl NamedRwLockBackend for PthreadRwLock {
    const KIND: Backend = Backend::Native;

    fn open(name: &LockName) -> Result<Self, Error> {
        let size = size_of::<NativeState>();
        let os_id = name.region_id(Self::KIND.region_suffix());
        let (shmem, created) = region::create_or_open(&os_id, size)?;
        region::check_len(&shmem, size)?;
        let state = NonNull::new(shmem.as_ptr() as *mut NativeState)
            .ok_or_else(|| Error::from("mapping returned a null pointer"))?;

        let st = unsafe { state.as_ref() };
        if created {
            // Fresh mappings are zero-filled; nobody touches the lock
            // before the ready marker goes up.
            unsafe { init_shared(st.rwlock.get()) }?;
            region::publish_ready(&st.ready);
            debug!("[NATIVE] initialised {}", os_id);
        } else {
            region::wait_ready(&st.ready)?;
        }

        Ok(Self {
            state,
            holder: Cell::new(None),
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

    fn reader_count(&self) -> i32 {
        0
    }

    fn lock_shared(&self, budget: &WaitBudget) -> Result<(), Error> {
        self.acquire(Mode::Read, budget)
    }

    fn unlock_shared(&self, _budget: &WaitBudget) -> Result<(), Error> {
        self.release()
    }

    fn lock_exclusive(&self, budget: &WaitBudget) -> Result<(), Error> {
        self.acquire(Mode::Write, budget)
    }

    fn unlock_exclusive(&self) -> Result<(), Error> {
        self.release()
    }
}
