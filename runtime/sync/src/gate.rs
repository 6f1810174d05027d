//! Transmit completion gate
//!
//! A single-token lock over a hardware transmitter. A task acquires the
//! token before programming a send; the transmit-complete interrupt, not
//! the task, returns it. If the completion interrupt never arrives the
//! token is recovered with [`Gate::force_reset`] after a bounded acquire.

use core::sync::atomic::{AtomicU32, Ordering};

use thiserror::Error;

use crate::{Deadline, Timeout, WaitResult};

/// Errors from gate acquisition.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum GateError {
    #[error("timed out waiting for the transmitter token")]
    TimedOut,
}

#[cfg(feature = "std")]
mod imp {
    use super::*;
    use std::sync::{Condvar, Mutex, MutexGuard};
    use std::time::Duration;

    pub struct Token {
        available: Mutex<bool>,
        released: Condvar,
    }

    impl Token {
        pub const fn new() -> Self {
            Self {
                available: Mutex::new(true),
                released: Condvar::new(),
            }
        }

        fn lock(&self) -> MutexGuard<'_, bool> {
            self.available.lock().unwrap_or_else(|e| e.into_inner())
        }

        pub fn try_take(&self) -> bool {
            let mut available = self.lock();
            core::mem::replace(&mut *available, false)
        }

        pub fn take(&self, timeout: Timeout) -> WaitResult {
            let deadline = Deadline::after(timeout);
            let mut available = self.lock();
            loop {
                if *available {
                    *available = false;
                    return WaitResult::Signaled;
                }
                match deadline.remaining() {
                    Timeout::Poll => return WaitResult::TimedOut,
                    Timeout::Forever => {
                        available = self
                            .released
                            .wait(available)
                            .unwrap_or_else(|e| e.into_inner());
                    }
                    Timeout::Millis(ms) => {
                        available = self
                            .released
                            .wait_timeout(available, Duration::from_millis(ms))
                            .unwrap_or_else(|e| e.into_inner())
                            .0;
                    }
                }
            }
        }

        pub fn put_back(&self) -> bool {
            let mut available = self.lock();
            let double = *available;
            *available = true;
            self.released.notify_one();
            double
        }

        pub fn peek(&self) -> bool {
            *self.lock()
        }
    }
}

#[cfg(not(feature = "std"))]
mod imp {
    use super::*;
    use core::sync::atomic::AtomicBool;

    pub struct Token {
        available: AtomicBool,
    }

    impl Token {
        pub const fn new() -> Self {
            Self {
                available: AtomicBool::new(true),
            }
        }

        pub fn try_take(&self) -> bool {
            self.available.swap(false, Ordering::AcqRel)
        }

        pub fn take(&self, timeout: Timeout) -> WaitResult {
            let deadline = Deadline::after(timeout);
            loop {
                if self.try_take() {
                    return WaitResult::Signaled;
                }
                if matches!(deadline.remaining(), Timeout::Poll) {
                    return WaitResult::TimedOut;
                }
                core::hint::spin_loop();
            }
        }

        pub fn put_back(&self) -> bool {
            self.available.swap(true, Ordering::AcqRel)
        }

        pub fn peek(&self) -> bool {
            self.available.load(Ordering::Acquire)
        }
    }
}

/// Binary mutual-exclusion token combined with completion-event semantics.
///
/// One instance per physical transmitter. Starts available. At most one
/// task holds the token between `acquire` and the matching `release` from
/// the completion interrupt; competing acquirers park until then.
///
/// The token is deliberately not recursive and carries no owner identity:
/// it is a semaphore, not a lock, because the releasing context (the
/// interrupt) is never the acquiring context.
pub struct Gate {
    token: imp::Token,
    resets: AtomicU32,
}

impl Gate {
    /// Create a gate in the available state. Init context only.
    pub const fn new() -> Self {
        Self {
            token: imp::Token::new(),
            resets: AtomicU32::new(0),
        }
    }

    /// Take the token, parking until it is free or the timeout elapses.
    ///
    /// Task context only. On success the caller may program exactly one
    /// transmit; the token comes back via [`release`] when the hardware
    /// finishes.
    ///
    /// [`release`]: Gate::release
    pub fn acquire(&self, timeout: Timeout) -> Result<(), GateError> {
        let result = match timeout {
            Timeout::Poll => {
                if self.token.try_take() {
                    WaitResult::Signaled
                } else {
                    WaitResult::TimedOut
                }
            }
            _ => self.token.take(timeout),
        };
        match result {
            WaitResult::Signaled => Ok(()),
            WaitResult::TimedOut => Err(GateError::TimedOut),
        }
    }

    /// Return the token and wake one waiting task.
    ///
    /// Called from the transmit-complete interrupt path. Never blocks.
    /// Exactly one release corresponds to each acquire that started a
    /// transmit; a release with no matching acquire is a driver bug and is
    /// reported but otherwise ignored.
    pub fn release(&self) {
        if self.token.put_back() {
            log::warn!("gate released while already available");
        }
    }

    /// Stuck-gate recovery: unconditionally make the token available.
    ///
    /// Used after a bounded `acquire` concludes that a completion
    /// interrupt was lost (peripheral fault, unplugged line). The caller
    /// is expected to have aborted the in-flight transmit first.
    pub fn force_reset(&self) {
        self.resets.fetch_add(1, Ordering::Relaxed);
        log::warn!(
            "gate force-reset (total resets: {})",
            self.resets.load(Ordering::Relaxed)
        );
        self.token.put_back();
    }

    /// Number of forced resets since creation.
    pub fn resets(&self) -> u32 {
        self.resets.load(Ordering::Relaxed)
    }

    pub fn is_available(&self) -> bool {
        self.token.peek()
    }
}

impl Default for Gate {
    fn default() -> Self {
        Self::new()
    }
}
