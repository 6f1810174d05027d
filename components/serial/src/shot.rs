//! Single-shot receive descriptor
//!
//! The request/response half of reception: a task arms a fixed-length
//! receive, the interrupt deposits bytes until the length is satisfied,
//! and a completion signal wakes the task exactly once - on full
//! reception or on a fatal line error. Only one receive may be armed per
//! port at a time; arming the next receive implicitly discards a stale
//! uncollected result.

use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicU8, AtomicUsize, Ordering};

use serlink_sync::{Signal, Timeout, WaitResult};

use crate::{LineStatus, PortError, Result};

const IDLE: u8 = 0;
const ARMED: u8 = 1;
const COMPLETE: u8 = 2;
const FAILED: u8 = 3;

/// Fixed-length receive slot shared between one task and one interrupt.
///
/// # Type Parameters
/// * `M` - Largest reply the slot can hold
///
/// # Concurrency Contract
/// The byte buffer is written only by the interrupt while the slot is
/// armed and read only by the task after a terminal state; the state word
/// is published with acquire/release ordering, the same single-writer
/// reasoning as the byte channel.
pub struct SingleShot<const M: usize> {
    state: AtomicU8,
    expected: AtomicUsize,
    received: AtomicUsize,
    /// LineStatus bits of the failure, valid in the FAILED state.
    fault: AtomicU8,
    buf: UnsafeCell<[u8; M]>,
    done: Signal,
}

unsafe impl<const M: usize> Sync for SingleShot<M> {}

impl<const M: usize> SingleShot<M> {
    pub const fn new() -> Self {
        Self {
            state: AtomicU8::new(IDLE),
            expected: AtomicUsize::new(0),
            received: AtomicUsize::new(0),
            fault: AtomicU8::new(0),
            buf: UnsafeCell::new([0; M]),
            done: Signal::new(),
        }
    }

    pub const fn capacity() -> usize {
        M
    }

    pub fn is_armed(&self) -> bool {
        self.state.load(Ordering::Acquire) == ARMED
    }

    /// Arm a receive of exactly `expected` bytes. Task context.
    ///
    /// Fails with [`PortError::ReceiveBusy`] while a receive is in flight;
    /// a stale completed-but-uncollected result is overwritten.
    pub fn arm(&self, expected: usize) -> Result<()> {
        if expected == 0 || expected > M {
            return Err(PortError::ReplyTooLong {
                requested: expected,
                capacity: M,
            });
        }
        if self.state.load(Ordering::Acquire) == ARMED {
            return Err(PortError::ReceiveBusy);
        }
        // Clear the destination and any stale completion permit before
        // publishing the armed state to the interrupt.
        unsafe {
            (*self.buf.get()).fill(0);
        }
        self.expected.store(expected, Ordering::Relaxed);
        self.received.store(0, Ordering::Relaxed);
        self.fault.store(0, Ordering::Relaxed);
        self.done.poll();
        self.state.store(ARMED, Ordering::Release);
        Ok(())
    }

    /// Park until the receive completes or fails, or the timeout elapses.
    pub fn wait(&self, timeout: Timeout) -> WaitResult {
        self.done.wait(timeout)
    }

    /// Collect a terminal result and return the slot to idle.
    ///
    /// On completion, copies the reply into `out` (which must hold the
    /// armed length) and returns the byte count. A receive that failed on
    /// a line error surfaces as [`PortError::ReceiveFault`].
    pub fn take(&self, out: &mut [u8]) -> Result<usize> {
        match self.state.load(Ordering::Acquire) {
            COMPLETE => {
                let len = self.expected.load(Ordering::Relaxed).min(out.len());
                let buf = self.buf.get() as *const u8;
                for (i, slot) in out[..len].iter_mut().enumerate() {
                    *slot = unsafe { buf.add(i).read_volatile() };
                }
                self.state.store(IDLE, Ordering::Release);
                Ok(len)
            }
            FAILED => {
                let errors = LineStatus::from_bits_truncate(self.fault.load(Ordering::Relaxed));
                self.state.store(IDLE, Ordering::Release);
                Err(PortError::ReceiveFault(errors))
            }
            ARMED => Err(PortError::ReceiveBusy),
            _ => Err(PortError::NothingToCollect),
        }
    }

    /// Disarm a pending receive so late-arriving bytes are not
    /// misdelivered into the next operation's buffer. Also discards a
    /// stale terminal result. Hardware reception should be aborted first
    /// (see [`UartHw::abort_rx`]).
    ///
    /// [`UartHw::abort_rx`]: crate::UartHw::abort_rx
    pub fn abort(&self) {
        self.state.swap(IDLE, Ordering::AcqRel);
        self.done.poll();
    }

    /// Deposit one byte from the interrupt. Returns `true` if the slot
    /// consumed it, `false` when no receive is armed (the caller then
    /// routes the byte to the streaming channel).
    pub fn offer(&self, byte: u8) -> bool {
        if self.state.load(Ordering::Acquire) != ARMED {
            return false;
        }
        let index = self.received.load(Ordering::Relaxed);
        let expected = self.expected.load(Ordering::Relaxed);
        if index >= expected {
            return false;
        }
        unsafe {
            (self.buf.get() as *mut u8).add(index).write_volatile(byte);
        }
        self.received.store(index + 1, Ordering::Release);
        if index + 1 == expected {
            // CAS guards against a concurrent task-side abort: a byte that
            // lands after the abort must not complete the descriptor.
            if self
                .state
                .compare_exchange(ARMED, COMPLETE, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                self.done.notify();
            }
        }
        true
    }

    /// Fail an armed receive from the interrupt after a fatal line error.
    /// Returns `true` if a waiter was notified.
    pub fn fail(&self, errors: LineStatus) -> bool {
        self.fault.store(errors.bits(), Ordering::Relaxed);
        if self
            .state
            .compare_exchange(ARMED, FAILED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.done.notify();
            true
        } else {
            false
        }
    }
}

impl<const M: usize> Default for SingleShot<M> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completes_at_exactly_the_armed_length() {
        let shot = SingleShot::<4>::new();
        shot.arm(2).unwrap();
        assert!(shot.offer(b'O'));
        assert_eq!(shot.wait(Timeout::Poll), WaitResult::TimedOut);
        assert!(shot.offer(b'K'));
        assert_eq!(shot.wait(Timeout::Poll), WaitResult::Signaled);

        let mut out = [0u8; 4];
        assert_eq!(shot.take(&mut out).unwrap(), 2);
        assert_eq!(&out[..2], b"OK");
        assert!(!shot.is_armed());
    }

    #[test]
    fn one_receive_outstanding_at_a_time() {
        let shot = SingleShot::<4>::new();
        shot.arm(2).unwrap();
        assert_eq!(shot.arm(2), Err(PortError::ReceiveBusy));
    }

    #[test]
    fn rejects_oversized_replies() {
        let shot = SingleShot::<4>::new();
        assert_eq!(
            shot.arm(5),
            Err(PortError::ReplyTooLong {
                requested: 5,
                capacity: 4
            })
        );
        assert_eq!(
            shot.arm(0),
            Err(PortError::ReplyTooLong {
                requested: 0,
                capacity: 4
            })
        );
    }

    #[test]
    fn unarmed_slot_declines_bytes() {
        let shot = SingleShot::<4>::new();
        assert!(!shot.offer(b'x'));
    }

    #[test]
    fn abort_discards_partial_data_and_permits() {
        let shot = SingleShot::<4>::new();
        shot.arm(2).unwrap();
        assert!(shot.offer(b'a'));
        shot.abort();
        assert!(!shot.is_armed());
        // A late byte after the abort neither completes nor signals.
        assert!(!shot.offer(b'b'));
        assert_eq!(shot.wait(Timeout::Poll), WaitResult::TimedOut);
        // Re-arm starts clean.
        shot.arm(1).unwrap();
        assert!(shot.offer(b'z'));
        let mut out = [0u8; 4];
        assert_eq!(shot.take(&mut out).unwrap(), 1);
        assert_eq!(out[0], b'z');
    }

    #[test]
    fn fatal_error_fails_the_waiter_once() {
        let shot = SingleShot::<4>::new();
        shot.arm(2).unwrap();
        assert!(shot.fail(LineStatus::OVERRUN));
        assert_eq!(shot.wait(Timeout::Poll), WaitResult::Signaled);
        let mut out = [0u8; 4];
        assert_eq!(
            shot.take(&mut out),
            Err(PortError::ReceiveFault(LineStatus::OVERRUN))
        );
        // Second fail has no armed receive to fail.
        assert!(!shot.fail(LineStatus::OVERRUN));
    }

    #[test]
    fn stale_result_is_overwritten_by_the_next_arm() {
        let shot = SingleShot::<4>::new();
        shot.arm(1).unwrap();
        assert!(shot.offer(b'a'));
        // Not collected; next arm discards it.
        shot.arm(1).unwrap();
        assert!(shot.offer(b'b'));
        let mut out = [0u8; 4];
        assert_eq!(shot.take(&mut out).unwrap(), 1);
        assert_eq!(out[0], b'b');
    }

    #[test]
    fn take_without_result_is_an_error() {
        let shot = SingleShot::<4>::new();
        let mut out = [0u8; 4];
        assert_eq!(shot.take(&mut out), Err(PortError::NothingToCollect));
        shot.arm(2).unwrap();
        assert_eq!(shot.take(&mut out), Err(PortError::ReceiveBusy));
    }
}
