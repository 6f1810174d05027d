//! Synchronization primitives for interrupt-to-task handoff
//!
//! # Purpose
//! Provides the two wait/wake primitives the rest of SerLink is built on:
//! [`Signal`] (a latched park/notify event an interrupt can raise without
//! blocking) and [`Gate`] (a single-token lock released by a completion
//! interrupt rather than by the holding task). Both accept the same
//! [`Timeout`] vocabulary: poll, bounded wait, or wait forever.
//!
//! # Integration Points
//! - Depends on: nothing above `core` (std backend is feature-gated)
//! - Provides to: serlink-channel (consumer wakeups), serlink-serial
//!   (transmit serialization, single-shot receive completion)
//!
//! # Architecture
//! Dual-backend: the default `std` backend parks on a condvar and times
//! waits with `Instant`, so the full stack runs and tests on a host. With
//! default features disabled everything degrades to atomics plus a
//! millisecond tick source registered once at init (see [`clock`]).
//! Interrupt-side operations (`notify`, `release`) never block and never
//! allocate in either backend.
//!
//! # Testing Strategy
//! - Unit tests: permit latching, poll semantics, timeout expiry
//! - Integration tests: gate exclusion across real threads

#![cfg_attr(not(feature = "std"), no_std)]

pub mod clock;
mod gate;
mod signal;

pub use gate::{Gate, GateError};
pub use signal::Signal;

use static_assertions::assert_impl_all;

/// How long a blocking operation may park the calling task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeout {
    /// Check once and return immediately; never parks.
    Poll,
    /// Park for at most this many milliseconds.
    Millis(u64),
    /// Park until the event arrives, with no deadline.
    Forever,
}

/// Outcome of a timed wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitResult {
    /// The event fired (or a permit was already latched).
    Signaled,
    /// The deadline passed with no event.
    TimedOut,
}

impl WaitResult {
    pub fn is_signaled(self) -> bool {
        self == WaitResult::Signaled
    }
}

/// Absolute expiry computed from a [`Timeout`].
///
/// Blocking loops re-derive the residual wait from the deadline after each
/// wakeup, so spurious wakeups and stale permits never extend the total
/// wait beyond the caller's budget.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    /// Expiry in clock milliseconds; `None` means no deadline.
    expires_at: Option<u64>,
}

impl Deadline {
    /// Compute the deadline for `timeout` starting now.
    ///
    /// Without a running clock (no_std build, no tick source registered)
    /// a bounded wait cannot be measured and degrades to a poll.
    pub fn after(timeout: Timeout) -> Self {
        let expires_at = match timeout {
            Timeout::Forever => None,
            Timeout::Poll => Some(clock::now_millis()),
            Timeout::Millis(ms) => {
                if clock::ticking() {
                    Some(clock::now_millis().saturating_add(ms))
                } else {
                    Some(clock::now_millis())
                }
            }
        };
        Self { expires_at }
    }

    pub fn expired(&self) -> bool {
        match self.expires_at {
            None => false,
            Some(at) => clock::now_millis() >= at,
        }
    }

    /// Residual wait budget, collapsed back into a [`Timeout`].
    ///
    /// Returns `Poll` once expired, so wait loops terminate with a final
    /// non-blocking check instead of parking again.
    pub fn remaining(&self) -> Timeout {
        match self.expires_at {
            None => Timeout::Forever,
            Some(at) => {
                let now = clock::now_millis();
                if now >= at {
                    Timeout::Poll
                } else {
                    Timeout::Millis(at - now)
                }
            }
        }
    }
}

assert_impl_all!(Signal: Send, Sync);
assert_impl_all!(Gate: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deadline_forever_never_expires() {
        let d = Deadline::after(Timeout::Forever);
        assert!(!d.expired());
        assert_eq!(d.remaining(), Timeout::Forever);
    }

    #[test]
    fn deadline_poll_is_already_expired() {
        let d = Deadline::after(Timeout::Poll);
        assert!(d.expired());
        assert_eq!(d.remaining(), Timeout::Poll);
    }

    #[test]
    fn deadline_millis_counts_down() {
        let d = Deadline::after(Timeout::Millis(60_000));
        assert!(!d.expired());
        match d.remaining() {
            Timeout::Millis(ms) => assert!(ms <= 60_000 && ms > 59_000),
            other => panic!("unexpected remaining: {other:?}"),
        }
    }
}
