//! Unix-specific platform code for named rw-locks

/// Unlink a named shared-memory region. Returns whether a name was removed.
/// Existing mappings stay valid; only later opens are affected.
pub fn platform_drop(os_id: &str) -> bool {
    use std::ffi::CString;
    match CString::new(os_id) {
        Ok(c_name) => unsafe { libc::shm_unlink(c_name.as_ptr()) == 0 },
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unlinking_a_missing_name_reports_false() {
        assert!(!platform_drop(&format!("/nrwl_missing_{}", std::process::id())));
        assert!(!platform_drop("/bad\0name"));
    }
}
