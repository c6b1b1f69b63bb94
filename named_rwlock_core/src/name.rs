//! Lock name normalization

use crate::constants::{NAME_PREFIX, NAME_SUFFIX};
use crate::errors::Error;
use std::fmt;

/// A normalized lock name: leading `/`, trailing `_rwl`.
///
/// Every process that normalizes to the same string talks to the same lock.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LockName(String);

impl LockName {
    pub fn new(base: &str) -> Result<Self, Error> {
        if base.is_empty() || base.contains('\0') {
            return Err(Error::InvalidName);
        }
        let mut name = String::with_capacity(base.len() + 1 + NAME_SUFFIX.len());
        if !base.starts_with(NAME_PREFIX) {
            name.push(NAME_PREFIX);
        }
        name.push_str(base);
        name.push_str(NAME_SUFFIX);
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// OS id of the backing region for a backend with the given suffix.
    pub(crate) fn region_id(&self, suffix: &str) -> String {
        format!("{}{}", self.0, suffix)
    }
}

impl fmt::Display for LockName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for LockName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
