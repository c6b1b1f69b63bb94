//! Relative millisecond timeouts turned into one absolute deadline.
//!
//! Callers hand in `timeout_ms` the classic way: negative waits forever,
//! zero polls, positive bounds the wait. The deadline is fixed when the
//! budget is built; every later wait only asks for what is left of it, so
//! retries and spurious wake-ups never stretch the total wait.

use crate::constants::{BACKOFF_MAX, BACKOFF_MIN};
use crate::errors::Error;
use raw_sync::Timeout;
use std::time::{Duration, Instant};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum WaitBudget {
    Forever,
    Poll,
    Until(Instant),
}

impl WaitBudget {
    pub fn from_millis(timeout_ms: i64) -> Self {
        if timeout_ms < 0 {
            return WaitBudget::Forever;
        }
        if timeout_ms == 0 {
            return WaitBudget::Poll;
        }
        Self::after(Duration::from_millis(timeout_ms as u64))
    }

    pub fn after(timeout: Duration) -> Self {
        if timeout.is_zero() {
            return WaitBudget::Poll;
        }
        // A deadline past what Instant can represent is as good as forever.
        Instant::now()
            .checked_add(timeout)
            .map_or(WaitBudget::Forever, WaitBudget::Until)
    }

    pub fn is_poll(&self) -> bool {
        matches!(self, WaitBudget::Poll)
    }

    pub fn is_forever(&self) -> bool {
        matches!(self, WaitBudget::Forever)
    }

    /// Time left, `None` for an unbounded budget.
    pub fn remaining(&self) -> Option<Duration> {
        match self {
            WaitBudget::Forever => None,
            WaitBudget::Poll => Some(Duration::ZERO),
            WaitBudget::Until(deadline) => {
                Some(deadline.saturating_duration_since(Instant::now()))
            }
        }
    }

    pub fn expired(&self) -> bool {
        match self {
            WaitBudget::Forever => false,
            WaitBudget::Poll => true,
            WaitBudget::Until(deadline) => Instant::now() >= *deadline,
        }
    }

    /// The error to report once this budget gave up.
    pub fn exhausted(&self) -> Error {
        if self.is_poll() {
            Error::WouldBlock
        } else {
            Error::Timeout
        }
    }

    /// What is left of the budget in the form raw_sync waits take.
    /// A bounded budget that already ran out is an error, not a zero wait.
    pub fn raw_timeout(&self) -> Result<Timeout, Error> {
        match self {
            WaitBudget::Forever => Ok(Timeout::Infinite),
            WaitBudget::Poll => Ok(Timeout::Val(Duration::ZERO)),
            WaitBudget::Until(deadline) => {
                let left = deadline.saturating_duration_since(Instant::now());
                if left.is_zero() {
                    Err(Error::Timeout)
                } else {
                    Ok(Timeout::Val(left))
                }
            }
        }
    }
}

/// Capped exponential sleep between non-blocking attempts.
#[derive(Debug)]
pub struct Backoff {
    step: Duration,
}

impl Backoff {
    pub fn new() -> Self {
        Self { step: BACKOFF_MIN }
    }

    /// Sleep for the next step, never past the budget's deadline.
    /// Fails once the budget is used up.
    pub fn snooze(&mut self, budget: &WaitBudget) -> Result<(), Error> {
        let nap = match budget.remaining() {
            None => self.step,
            Some(left) if left.is_zero() => return Err(budget.exhausted()),
            Some(left) => self.step.min(left),
        };
        std::thread::sleep(nap);
        self.step = (self.step * 2).min(BACKOFF_MAX);
        Ok(())
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn sign_selects_the_mode() {
        assert_eq!(WaitBudget::from_millis(-1), WaitBudget::Forever);
        assert_eq!(WaitBudget::from_millis(i64::MIN), WaitBudget::Forever);
        assert_eq!(WaitBudget::from_millis(0), WaitBudget::Poll);
        assert!(matches!(WaitBudget::from_millis(5), WaitBudget::Until(_)));
    }

    #[test]
    fn huge_timeouts_do_not_overflow() {
        let b = WaitBudget::from_millis(i64::MAX);
        assert!(!b.expired());
    }

    #[test]
    fn poll_is_immediately_exhausted() {
        let b = WaitBudget::Poll;
        assert!(b.expired());
        assert!(matches!(b.exhausted(), Error::WouldBlock));
        assert!(matches!(b.raw_timeout(), Ok(Timeout::Val(d)) if d.is_zero()));
    }

    #[test]
    fn bounded_budget_runs_out() {
        let b = WaitBudget::from_millis(10);
        std::thread::sleep(Duration::from_millis(15));
        assert!(b.expired());
        assert!(matches!(b.raw_timeout(), Err(Error::Timeout)));
        assert!(matches!(Backoff::new().snooze(&b), Err(Error::Timeout)));
    }

    #[test]
    fn backoff_never_sleeps_past_deadline() {
        let b = WaitBudget::from_millis(20);
        let start = Instant::now();
        let mut backoff = Backoff::new();
        while backoff.snooze(&b).is_ok() {}
        let waited = start.elapsed();
        assert!(waited >= Duration::from_millis(19), "{:?}", waited);
        assert!(waited < Duration::from_millis(200), "{:?}", waited);
    }

    proptest! {
        #[test]
        fn remaining_never_exceeds_request(ms in 1i64..100_000) {
            let b = WaitBudget::from_millis(ms);
            let left = b.remaining().unwrap();
            prop_assert!(left <= Duration::from_millis(ms as u64));
        }
    }
}
