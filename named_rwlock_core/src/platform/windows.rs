//! Windows-specific platform code for named rw-locks

/// Named kernel objects disappear with their last handle on Windows, so
/// there is nothing to unlink.
pub fn platform_drop(_os_id: &str) -> bool {
    false
}
