//! Platform-specific cleanup of named lock regions

#[cfg(target_os = "windows")]
pub mod windows;
#[cfg(unix)]
pub mod unix;

#[cfg(target_os = "windows")]
pub use windows::platform_drop;
#[cfg(unix)]
pub use unix::platform_drop;
