//! The contract every OS realisation of the lock fulfils.
//!
//! A backend only knows how to take and release the shared primitive; it
//! does not know which mode the calling handle holds. That bookkeeping
//! lives once in [`crate::handle::NamedRwLockHandle`].

use crate::errors::Error;
use crate::name::LockName;
use crate::timeout::WaitBudget;
use crate::types::Backend;

pub trait NamedRwLockBackend: Send + Sized {
    const KIND: Backend;

    /// Open the named primitive, creating it when it does not exist yet.
    fn open(name: &LockName) -> Result<Self, Error>;

    /// True iff this value caused the OS object to come into existence.
    fn created(&self) -> bool;

    /// True while this value is responsible for removing the name on drop.
    fn has_ownership(&self) -> bool;

    fn drop_ownership(&mut self);

    /// Holders of the shared mode, where the backend can know it.
    fn reader_count(&self) -> i32;

    fn lock_shared(&self, budget: &WaitBudget) -> Result<(), Error>;

    fn unlock_shared(&self, budget: &WaitBudget) -> Result<(), Error>;

    fn lock_exclusive(&self, budget: &WaitBudget) -> Result<(), Error>;

    /// Release the exclusive mode. Any internal wait here is unbounded.
    fn unlock_exclusive(&self) -> Result<(), Error>;
}
