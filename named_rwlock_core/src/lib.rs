//! Named reader/writer locks shared between processes.
//!
//! A lock is identified by a string name; every process (or thread) that
//! opens the same name gets a handle on the same lock. Two backends exist:
//! a process-shared `pthread_rwlock_t` on unix ([`Backend::Native`]) and a
//! mutex + event + counters emulation that works everywhere
//! ([`Backend::Emulated`]).
//!
//! ```no_run
//! use named_rwlock_core::NamedRwLock;
//!
//! let mut lock = NamedRwLock::create("ringbuf");
//! if lock.lock(100) {
//!     // exclusive section
//!     lock.unlock();
//! }
//! ```

pub mod constants;
pub mod errors;
pub mod handle_registry;
pub mod platform;
pub mod telemetry;
pub mod types;

mod backend;
mod handle;
mod name;
mod named_rwlock;
#[cfg(unix)]
mod pthread_rwlock;
mod region;
mod shmem_rwlock;
mod timeout;

pub use crate::errors::{nrwl_last_error, nrwl_strerror, Error, ErrorCode};
pub use crate::name::LockName;
pub use crate::named_rwlock::{NamedRwLock, ReadGuard, WriteGuard};
pub use crate::types::{Backend, HoldState, Mode};

use log::info;
use once_cell::sync::OnceCell;

// ---- logging bootstraper -------------------------------------------------
pub(crate) fn ensure_logging() {
    static INIT: OnceCell<()> = OnceCell::new();
    INIT.get_or_init(|| {
        let _ = env_logger::builder()
            .format_timestamp(None)
            .is_test(std::env::var("RUST_TEST_THREADS").is_ok())
            .try_init();
        telemetry::init();
    });
}

/// Remove every named region a lock called `name` may have left behind, on
/// all backends. Handles that are still open keep working; only later opens
/// start from a fresh lock. Returns whether anything was removed.
pub fn force_destroy(name: &str) -> Result<bool, Error> {
    ensure_logging();
    let name = LockName::new(name)?;
    let mut removed = false;
    for backend in Backend::all() {
        let os_id = name.region_id(backend.region_suffix());
        if platform::platform_drop(&os_id) {
            info!("[LOCK] force-destroyed {}", os_id);
            removed = true;
        }
    }
    Ok(removed)
}

pub mod public_api;

pub use public_api::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn force_destroy_rejects_bad_names() {
        assert!(matches!(force_destroy(""), Err(Error::InvalidName)));
    }

    #[cfg(unix)]
    #[test]
    fn force_destroy_unlinks_a_live_name() {
        let name = format!("lib_force_{}", std::process::id());
        let mut keeper = NamedRwLock::create_with(&name, Backend::Emulated);
        assert!(keeper.has_ownership());
        assert!(force_destroy(&name).unwrap());
        assert!(!force_destroy(&name).unwrap());

        // The old handle still works, a new open starts over.
        assert!(keeper.lock(0));
        let fresh = NamedRwLock::create_with(&name, Backend::Emulated);
        assert!(fresh.has_ownership());
        assert!(keeper.unlock());
        keeper.drop_ownership();
    }
}
