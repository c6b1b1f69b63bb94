//! Small value types shared by the backends, the handle and the facade

use crate::constants::EMULATED_REGION_SUFFIX;
use std::fmt;

/// What a single handle currently holds. One value instead of a pair of
/// booleans, so "holds read and write at once" cannot be expressed.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub enum HoldState {
    #[default]
    Idle,
    Reading,
    Writing,
}

impl HoldState {
    pub fn holds(self, mode: Mode) -> bool {
        matches!(
            (self, mode),
            (HoldState::Reading, Mode::Read) | (HoldState::Writing, Mode::Write)
        )
    }
}

/// Acquisition mode.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Mode {
    Read,
    Write,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Read => "read",
            Mode::Write => "write",
        }
    }

    pub(crate) fn held(self) -> HoldState {
        match self {
            Mode::Read => HoldState::Reading,
            Mode::Write => HoldState::Writing,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which OS realisation backs a lock.
///
/// Processes only synchronise with each other when they pick the same
/// backend for the same name.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Backend {
    /// Process-shared `pthread_rwlock_t`. Does not track readers.
    #[cfg(unix)]
    Native,
    /// Process-shared mutex + manual-reset event guarding a reader count and
    /// a writer flag. Tracks readers exactly.
    Emulated,
}

impl Backend {
    /// The backend a plain `NamedRwLock::create` uses on this platform.
    pub const fn platform_default() -> Self {
        #[cfg(unix)]
        {
            Backend::Native
        }
        #[cfg(not(unix))]
        {
            Backend::Emulated
        }
    }

    /// Every backend compiled in on this platform.
    pub fn all() -> &'static [Backend] {
        #[cfg(unix)]
        {
            &[Backend::Native, Backend::Emulated]
        }
        #[cfg(not(unix))]
        {
            &[Backend::Emulated]
        }
    }

    /// Whether `NamedRwLock::reader_count` reports real numbers.
    pub fn tracks_readers(self) -> bool {
        matches!(self, Backend::Emulated)
    }

    /// Suffix of the backing region on top of the normalized lock name.
    pub(crate) fn region_suffix(self) -> &'static str {
        match self {
            #[cfg(unix)]
            Backend::Native => "",
            Backend::Emulated => EMULATED_REGION_SUFFIX,
        }
    }
}

impl Default for Backend {
    fn default() -> Self {
        Backend::platform_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hold_state_matches_only_its_own_mode() {
        assert!(HoldState::Reading.holds(Mode::Read));
        assert!(!HoldState::Reading.holds(Mode::Write));
        assert!(HoldState::Writing.holds(Mode::Write));
        assert!(!HoldState::Idle.holds(Mode::Read));
        assert!(!HoldState::Idle.holds(Mode::Write));
    }

    #[test]
    fn default_backend_is_listed() {
        assert!(Backend::all().contains(&Backend::platform_default()));
        assert!(Backend::Emulated.tracks_readers());
    }
}
