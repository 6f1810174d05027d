//! Latched park/notify event
//!
//! The condition-variable half of the interrupt-to-task handoff: the
//! producer (interrupt context) raises the signal without ever blocking,
//! the consumer (task context) parks on it with a timeout. The permit is
//! latched, so a notify that lands before the wait is never lost.

use crate::{Deadline, Timeout, WaitResult};

#[cfg(feature = "std")]
mod imp {
    use super::*;
    use std::sync::{Condvar, Mutex, MutexGuard};
    use std::time::Duration;

    pub struct Signal {
        permit: Mutex<bool>,
        parked: Condvar,
    }

    impl Signal {
        pub const fn new() -> Self {
            Self {
                permit: Mutex::new(false),
                parked: Condvar::new(),
            }
        }

        fn lock(&self) -> MutexGuard<'_, bool> {
            // A poisoned permit flag is still a valid bool.
            self.permit.lock().unwrap_or_else(|e| e.into_inner())
        }

        pub fn notify(&self) {
            let mut permit = self.lock();
            *permit = true;
            self.parked.notify_one();
        }

        pub fn poll(&self) -> bool {
            let mut permit = self.lock();
            core::mem::replace(&mut *permit, false)
        }

        pub fn wait(&self, timeout: Timeout) -> WaitResult {
            let deadline = Deadline::after(timeout);
            let mut permit = self.lock();
            loop {
                if *permit {
                    *permit = false;
                    return WaitResult::Signaled;
                }
                match deadline.remaining() {
                    Timeout::Poll => return WaitResult::TimedOut,
                    Timeout::Forever => {
                        permit = self
                            .parked
                            .wait(permit)
                            .unwrap_or_else(|e| e.into_inner());
                    }
                    Timeout::Millis(ms) => {
                        permit = self
                            .parked
                            .wait_timeout(permit, Duration::from_millis(ms))
                            .unwrap_or_else(|e| e.into_inner())
                            .0;
                    }
                }
            }
        }
    }
}

#[cfg(not(feature = "std"))]
mod imp {
    use super::*;
    use core::sync::atomic::{AtomicBool, Ordering};

    pub struct Signal {
        permit: AtomicBool,
    }

    impl Signal {
        pub const fn new() -> Self {
            Self {
                permit: AtomicBool::new(false),
            }
        }

        pub fn notify(&self) {
            self.permit.store(true, Ordering::Release);
        }

        pub fn poll(&self) -> bool {
            self.permit.swap(false, Ordering::AcqRel)
        }

        pub fn wait(&self, timeout: Timeout) -> WaitResult {
            let deadline = Deadline::after(timeout);
            loop {
                if self.poll() {
                    return WaitResult::Signaled;
                }
                if matches!(deadline.remaining(), Timeout::Poll) {
                    return WaitResult::TimedOut;
                }
                core::hint::spin_loop();
            }
        }
    }
}

/// Binary park/notify event shared between one notifier and one waiter.
///
/// `notify` is interrupt-safe: it never blocks, never allocates, and wakes
/// at most one parked waiter. `wait` is task-only.
pub struct Signal {
    inner: imp::Signal,
}

impl Signal {
    pub const fn new() -> Self {
        Self {
            inner: imp::Signal::new(),
        }
    }

    /// Latch a permit and wake the parked waiter, if any.
    ///
    /// Callable from interrupt context.
    pub fn notify(&self) {
        self.inner.notify();
    }

    /// Consume a latched permit without parking.
    pub fn poll(&self) -> bool {
        self.inner.poll()
    }

    /// Park until a permit is available or the timeout elapses.
    ///
    /// Task context only. `Timeout::Poll` behaves exactly like [`poll`].
    ///
    /// [`poll`]: Signal::poll
    pub fn wait(&self, timeout: Timeout) -> WaitResult {
        self.inner.wait(timeout)
    }
}

impl Default for Signal {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permit_latched_before_wait_is_not_lost() {
        let sig = Signal::new();
        sig.notify();
        assert_eq!(sig.wait(Timeout::Poll), WaitResult::Signaled);
        // Consumed: a second wait sees nothing.
        assert_eq!(sig.wait(Timeout::Poll), WaitResult::TimedOut);
    }

    #[test]
    fn repeated_notify_latches_a_single_permit() {
        let sig = Signal::new();
        sig.notify();
        sig.notify();
        assert!(sig.poll());
        assert!(!sig.poll());
    }

    #[test]
    fn bounded_wait_times_out_on_silence() {
        let sig = Signal::new();
        assert_eq!(sig.wait(Timeout::Millis(10)), WaitResult::TimedOut);
    }

    #[test]
    fn waiter_wakes_on_cross_thread_notify() {
        let sig = Signal::new();
        crossbeam::thread::scope(|s| {
            s.spawn(|_| {
                std::thread::sleep(std::time::Duration::from_millis(20));
                sig.notify();
            });
            assert_eq!(sig.wait(Timeout::Forever), WaitResult::Signaled);
        })
        .unwrap();
    }
}
