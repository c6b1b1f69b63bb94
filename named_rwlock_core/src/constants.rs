//! Constants and configuration for named rw-locks

use std::time::Duration;

pub const NAME_PREFIX: char = '/';
pub const NAME_SUFFIX: &str = "_rwl"; // keeps rw-locks apart from named mutexes

/// Appended to the normalized name for the mutex + event region.
pub const EMULATED_REGION_SUFFIX: &str = "_mev";

/// Ready marker published by the creator once the primitive is initialised.
pub const REGION_READY: u32 = 0x5257_4C4B; // "RWLK"

/// How long an opener waits for the creator to publish `REGION_READY`.
pub const INIT_WAIT: Duration = Duration::from_millis(1000);

/// Attempts at the create / open dance before giving up.
pub const OPEN_RETRIES: usize = 16;

pub const BACKOFF_MIN: Duration = Duration::from_micros(50);
pub const BACKOFF_MAX: Duration = Duration::from_millis(2);

/// Bytes reserved for each raw_sync object inside the emulated region.
pub const SYNC_SLOT_SIZE: usize = 128;
