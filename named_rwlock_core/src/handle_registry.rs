use crate::{errors::ErrorCode, NamedRwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

/// Handle ID type - safer than raw pointers
pub type HandleId = u64;

type Slot = Arc<Mutex<NamedRwLock>>;

/// Global handle registry for locks opened through the C ABI.
///
/// The registry map is only locked long enough to look a slot up; blocking
/// lock operations run on the per-handle slot, so one caller waiting for
/// its lock never stalls another caller's unlock.
struct HandleRegistry {
    handles: Mutex<HashMap<HandleId, Slot>>,
    next_id: AtomicU64,
}

impl HandleRegistry {
    fn new() -> Self {
        Self {
            handles: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1), // Start from 1, reserve 0 for null/invalid
        }
    }

    fn register(&self, lock: NamedRwLock) -> Result<HandleId, ErrorCode> {
        let handle_id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let mut handles = self.handles.lock().map_err(|_| ErrorCode::InvalidHandle)?;
        handles.insert(handle_id, Arc::new(Mutex::new(lock)));
        Ok(handle_id)
    }

    fn get(&self, handle_id: HandleId) -> Result<Slot, ErrorCode> {
        if handle_id == 0 {
            return Err(ErrorCode::InvalidHandle);
        }
        let handles = self.handles.lock().map_err(|_| ErrorCode::InvalidHandle)?;
        handles
            .get(&handle_id)
            .cloned()
            .ok_or(ErrorCode::InvalidHandle)
    }

    fn unregister(&self, handle_id: HandleId) -> Result<Slot, ErrorCode> {
        if handle_id == 0 {
            return Err(ErrorCode::InvalidHandle);
        }
        let mut handles = self.handles.lock().map_err(|_| ErrorCode::InvalidHandle)?;
        handles.remove(&handle_id).ok_or(ErrorCode::InvalidHandle)
    }
}

static REGISTRY: OnceLock<HandleRegistry> = OnceLock::new();

fn get_registry() -> &'static HandleRegistry {
    REGISTRY.get_or_init(HandleRegistry::new)
}

/// Register a new lock and return its handle ID
pub fn register_handle(lock: NamedRwLock) -> Result<HandleId, ErrorCode> {
    get_registry().register(lock)
}

/// Execute a function with mutable access to the lock identified by handle_id
pub fn with_handle<T, F>(handle_id: HandleId, f: F) -> Result<T, ErrorCode>
where
    F: FnOnce(&mut NamedRwLock) -> T,
{
    let slot = get_registry().get(handle_id)?;
    let mut lock = slot.lock().map_err(|_| ErrorCode::InvalidHandle)?;
    Ok(f(&mut lock))
}

/// Unregister and drop a lock. The drop happens once the last in-flight
/// call on the handle has returned.
pub fn unregister_handle(handle_id: HandleId) -> Result<(), ErrorCode> {
    get_registry().unregister(handle_id).map(drop)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_registry() {
        let registry = HandleRegistry::new();

        assert!(registry.get(0).is_err());
        assert!(registry.unregister(999).is_err());

        let id = registry.register(NamedRwLock::new()).unwrap();
        assert_ne!(id, 0);
        assert!(registry.get(id).is_ok());
        assert!(registry.unregister(id).is_ok());
        assert!(registry.get(id).is_err());
    }

    #[test]
    fn ids_are_never_reused() {
        let a = register_handle(NamedRwLock::new()).unwrap();
        unregister_handle(a).unwrap();
        let b = register_handle(NamedRwLock::new()).unwrap();
        assert_ne!(a, b);
        assert_eq!(with_handle(b, |l| l.is_created()), Ok(false));
        unregister_handle(b).unwrap();
    }
}
