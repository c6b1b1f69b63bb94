//! C ABI over [`NamedRwLock`].
//!
//! Locks are addressed by opaque `u64` handle ids (0 = invalid). Calls that
//! answer with a `bool` store the reason for a `false` in the thread-local
//! last error (`nrwl_last_error`).

use crate::{
    errors::{map_error, set_last_error, ErrorCode},
    handle_registry::{register_handle, unregister_handle, with_handle, HandleId},
    NamedRwLock,
};
use std::{ffi::CStr, os::raw::c_char};

// ─────────────────────────── helpers ─────────────────────────────────── //

#[inline]
fn cstr<'a>(p: *const c_char) -> Result<&'a str, ErrorCode> {
    if p.is_null() {
        return Err(ErrorCode::Utf8Error);
    }
    unsafe { CStr::from_ptr(p) }
        .to_str()
        .map_err(|_| ErrorCode::Utf8Error)
}

/// Run a fallible lock operation and fold it into a bool + last error.
fn report<F>(h: HandleId, f: F) -> bool
where
    F: FnOnce(&mut NamedRwLock) -> Result<(), crate::Error>,
{
    match with_handle(h, f) {
        Ok(Ok(())) => {
            set_last_error(ErrorCode::Success);
            true
        }
        Ok(Err(e)) => {
            set_last_error(map_error(&e));
            false
        }
        Err(code) => {
            set_last_error(code);
            false
        }
    }
}

// ───────────────────────── lifetime ──────────────────────────────────── //

/// Open (or create) a named rw-lock with the platform default backend.
/// Returns 0 and sets the last error on failure.
#[no_mangle]
pub extern "C" fn nrwl_create(name_utf8: *const c_char) -> HandleId {
    let name = match cstr(name_utf8) {
        Ok(n) => n,
        Err(code) => {
            set_last_error(code);
            return 0;
        }
    };
    let lock = match NamedRwLock::try_create(name, crate::Backend::platform_default()) {
        Ok(l) => l,
        Err(e) => {
            set_last_error(map_error(&e));
            return 0;
        }
    };
    match register_handle(lock) {
        Ok(id) => {
            set_last_error(ErrorCode::Success);
            id
        }
        Err(code) => {
            set_last_error(code);
            0
        }
    }
}

/// Release whatever the handle holds and close it.
#[no_mangle]
pub extern "C" fn nrwl_close(h: HandleId) -> ErrorCode {
    match unregister_handle(h) {
        Ok(()) => ErrorCode::Success,
        Err(code) => code,
    }
}

/// Remove the named regions behind `name` regardless of who created them.
/// Meant for cleaning up after a creator that died without unlinking.
#[no_mangle]
pub extern "C" fn nrwl_force_destroy(name_utf8: *const c_char) -> ErrorCode {
    match cstr(name_utf8) {
        Ok(name) => match crate::force_destroy(name) {
            Ok(_) => ErrorCode::Success,
            Err(e) => map_error(&e),
        },
        Err(code) => code,
    }
}

// ───────────────────────── queries ───────────────────────────────────── //

#[no_mangle]
pub extern "C" fn nrwl_is_created(h: HandleId) -> bool {
    with_handle(h, |l| l.is_created()).unwrap_or(false)
}

#[no_mangle]
pub extern "C" fn nrwl_has_ownership(h: HandleId) -> bool {
    with_handle(h, |l| l.has_ownership()).unwrap_or(false)
}

#[no_mangle]
pub extern "C" fn nrwl_drop_ownership(h: HandleId) -> ErrorCode {
    match with_handle(h, |l| l.drop_ownership()) {
        Ok(()) => ErrorCode::Success,
        Err(code) => code,
    }
}

#[no_mangle]
pub extern "C" fn nrwl_reader_count(h: HandleId) -> i32 {
    with_handle(h, |l| l.reader_count()).unwrap_or(0)
}

// ───────────────────────── locking ───────────────────────────────────── //

#[no_mangle]
pub extern "C" fn nrwl_lock_read(h: HandleId, timeout_ms: i64) -> bool {
    report(h, |l| l.try_lock_read(timeout_ms))
}

#[no_mangle]
pub extern "C" fn nrwl_unlock_read(h: HandleId, timeout_ms: i64) -> bool {
    report(h, |l| l.try_unlock_read(timeout_ms))
}

#[no_mangle]
pub extern "C" fn nrwl_lock(h: HandleId, timeout_ms: i64) -> bool {
    report(h, |l| l.try_lock(timeout_ms))
}

#[no_mangle]
pub extern "C" fn nrwl_unlock(h: HandleId) -> bool {
    report(h, |l| l.try_unlock())
}
