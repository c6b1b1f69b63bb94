//! Error handling and C-ABI error codes for named rw-locks

use shared_memory::ShmemError;
use std::cell::RefCell;
use std::fmt;
use std::os::raw::c_char;

/// Internal error. Never crosses the public boolean API; kept for logging
/// and for the C ABI error codes.
#[derive(Debug)]
pub enum Error {
    /// Empty base name or a name with an interior NUL.
    InvalidName,
    /// The backing region could not be created or opened.
    Shmem(ShmemError),
    /// The mapped region is smaller than the lock state.
    RegionTooSmall { expected: usize, actual: usize },
    /// The OS primitive could not be initialised or attached.
    LockInit(String),
    /// The creator never published the ready marker.
    InitTimeout,
    /// The wait budget ran out.
    Timeout,
    /// A poll found the lock busy.
    WouldBlock,
    /// The underlying wait primitive failed.
    Wait(String),
    /// A pthread call returned an error code.
    Os(errno::Errno),
    /// Unlock requested for a mode this handle does not hold.
    NotHeld,
    /// Lock requested while this handle already holds a mode.
    AlreadyHeld,
    /// Release attempted from a thread other than the one that acquired.
    WrongThread,
    /// Operation on an uncreated lock.
    Stub,
}

impl Error {
    /// True when the failure is a plain "did not get it in time".
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout | Error::WouldBlock)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidName => write!(f, "invalid lock name"),
            Error::Shmem(e) => write!(f, "shared memory error: {}", e),
            Error::RegionTooSmall { expected, actual } => write!(
                f,
                "lock region too small: expected {} bytes, mapped {}",
                expected, actual
            ),
            Error::LockInit(s) => write!(f, "lock initialization failed: {}", s),
            Error::InitTimeout => write!(f, "lock creator did not finish initialization"),
            Error::Timeout => write!(f, "timed out"),
            Error::WouldBlock => write!(f, "lock is busy"),
            Error::Wait(s) => write!(f, "wait failed: {}", s),
            Error::Os(e) => write!(f, "os error: {}", e),
            Error::NotHeld => write!(f, "lock mode not held by this handle"),
            Error::AlreadyHeld => write!(f, "handle already holds the lock"),
            Error::WrongThread => write!(f, "lock mode was taken on another thread"),
            Error::Stub => write!(f, "lock was never created"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Shmem(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ShmemError> for Error {
    fn from(err: ShmemError) -> Self {
        Error::Shmem(err)
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::LockInit(s)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::LockInit(s.to_owned())
    }
}

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ErrorCode {
    Success = 0,
    InvalidHandle = 1,
    InvalidName = 2,
    Utf8Error = 3,
    ShmemOpenFailed = 4,
    LockInitFailed = 5,
    Timeout = 6,
    WaitFailed = 7,
    NotHeld = 8,
    AlreadyHeld = 9,
    NotCreated = 10,
    WrongThread = 11,
    Unknown = 255,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::Success => "Success",
            ErrorCode::InvalidHandle => "Invalid handle",
            ErrorCode::InvalidName => "Invalid lock name",
            ErrorCode::Utf8Error => "UTF-8 conversion error",
            ErrorCode::ShmemOpenFailed => "Shared memory open failed",
            ErrorCode::LockInitFailed => "Lock initialization failed",
            ErrorCode::Timeout => "Timed out",
            ErrorCode::WaitFailed => "Wait failed",
            ErrorCode::NotHeld => "Lock not held",
            ErrorCode::AlreadyHeld => "Lock already held",
            ErrorCode::NotCreated => "Lock not created",
            ErrorCode::WrongThread => "Lock held by another thread",
            ErrorCode::Unknown => "Unknown error",
        }
    }

    fn as_cstr(self) -> &'static [u8] {
        match self {
            ErrorCode::Success => b"Success\0",
            ErrorCode::InvalidHandle => b"Invalid handle\0",
            ErrorCode::InvalidName => b"Invalid lock name\0",
            ErrorCode::Utf8Error => b"UTF-8 conversion error\0",
            ErrorCode::ShmemOpenFailed => b"Shared memory open failed\0",
            ErrorCode::LockInitFailed => b"Lock initialization failed\0",
            ErrorCode::Timeout => b"Timed out\0",
            ErrorCode::WaitFailed => b"Wait failed\0",
            ErrorCode::NotHeld => b"Lock not held\0",
            ErrorCode::AlreadyHeld => b"Lock already held\0",
            ErrorCode::NotCreated => b"Lock not created\0",
            ErrorCode::WrongThread => b"Lock held by another thread\0",
            ErrorCode::Unknown => b"Unknown error\0",
        }
    }
}

// Thread-local last error for C-ABI
thread_local! {
    static LAST_ERROR: RefCell<ErrorCode> = RefCell::new(ErrorCode::Success);
}

pub fn set_last_error(code: ErrorCode) {
    LAST_ERROR.with(|cell| *cell.borrow_mut() = code);
}

pub fn get_last_error() -> ErrorCode {
    LAST_ERROR.with(|cell| *cell.borrow())
}

#[no_mangle]
pub extern "C" fn nrwl_last_error() -> ErrorCode {
    get_last_error()
}

#[no_mangle]
pub extern "C" fn nrwl_strerror(code: ErrorCode) -> *const c_char {
    code.as_cstr().as_ptr() as *const c_char
}

// Map internal Error to ErrorCode
pub fn map_error(e: &Error) -> ErrorCode {
    match e {
        Error::InvalidName => ErrorCode::InvalidName,
        Error::Shmem(_) | Error::RegionTooSmall { .. } => ErrorCode::ShmemOpenFailed,
        Error::LockInit(_) | Error::InitTimeout => ErrorCode::LockInitFailed,
        Error::Timeout | Error::WouldBlock => ErrorCode::Timeout,
        Error::Wait(_) | Error::Os(_) => ErrorCode::WaitFailed,
        Error::NotHeld => ErrorCode::NotHeld,
        Error::AlreadyHeld => ErrorCode::AlreadyHeld,
        Error::WrongThread => ErrorCode::WrongThread,
        Error::Stub => ErrorCode::NotCreated,
    }
}
