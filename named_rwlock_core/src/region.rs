//! Named shared-memory region that carries a lock's cross-process state.

use crate::constants::{BACKOFF_MIN, INIT_WAIT, OPEN_RETRIES, REGION_READY};
use crate::errors::Error;
use crate::timeout::{Backoff, WaitBudget};
use log::debug;
use shared_memory::{Shmem, ShmemConf, ShmemError};
use std::sync::atomic::{AtomicU32, Ordering};

/// Create the region, or open it when someone else already did.
///
/// Returns the mapping and whether this call created it. Opening can race
/// with a creator that has not sized the region yet, or with a creator that
/// is tearing it down; both cases are retried a bounded number of times.
pub(crate) fn create_or_open(os_id: &str, size: usize) -> Result<(Shmem, bool), Error> {
    let conf = || ShmemConf::new().os_id(os_id).size(size);
    let mut last_err = None;
    for attempt in 0..OPEN_RETRIES {
        match conf().create() {
            Ok(m) => {
                debug!("[REGION] created {} ({} bytes)", os_id, size);
                return Ok((m, true));
            }
            Err(ShmemError::MappingIdExists) => match conf().open() {
                Ok(m) => {
                    debug!("[REGION] opened {} ({} bytes)", os_id, m.len());
                    return Ok((m, false));
                }
                Err(e) => {
                    debug!("[REGION] open of {} failed on attempt {}: {}", os_id, attempt, e);
                    last_err = Some(e);
                }
            },
            Err(e) => return Err(e.into()),
        }
        std::thread::sleep(BACKOFF_MIN * (attempt as u32 + 1));
    }
    Err(last_err.map(Error::from).unwrap_or(Error::InitTimeout))
}

pub(crate) fn check_len(shmem: &Shmem, expected: usize) -> Result<(), Error> {
    if shmem.len() < expected {
        return Err(Error::RegionTooSmall {
            expected,
            actual: shmem.len(),
        });
    }
    Ok(())
}

/// Creator side: make the initialised primitive visible to openers.
pub(crate) fn publish_ready(ready: &AtomicU32) {
    ready.store(REGION_READY, Ordering::Release);
}

/// Opener side: wait (bounded) until the creator published the primitive.
pub(crate) fn wait_ready(ready: &AtomicU32) -> Result<(), Error> {
    let budget = WaitBudget::after(INIT_WAIT);
    let mut backoff = Backoff::new();
    while ready.load(Ordering::Acquire) != REGION_READY {
        backoff.snooze(&budget).map_err(|_| Error::InitTimeout)?;
    }
    Ok(())
}
