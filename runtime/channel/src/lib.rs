//! Bounded byte channel - lossless interrupt-to-task byte transfer
//!
//! # Purpose
//! A fixed-capacity circular byte buffer safely shared between exactly one
//! interrupt producer and one task consumer. The producer side
//! ([`ByteChannel::try_send`]) never blocks; the consumer side
//! ([`ByteChannel::recv`]) parks until a configurable number of bytes (the
//! wake threshold) has accumulated or a timeout elapses.
//!
//! # Integration Points
//! - Depends on: serlink-sync (consumer wakeup signal, timeouts)
//! - Provides to: serlink-serial (receive pump deposits, facade reads)
//!
//! # Architecture
//! Lock-free single-producer/single-consumer ring: the write cursor is
//! advanced only by the producer, the read cursor only by the consumer, so
//! no mutual exclusion is needed between them - only acquire/release
//! ordering on the two cursors. One slot is reserved to distinguish full
//! from empty, so a channel of size `N` holds `N - 1` bytes.
//!
//! Overflow policy: drop-newest. A full channel rejects bytes and counts
//! them in a diagnostic counter; the interrupt never retries and never
//! blocks. Already-buffered data keeps its order.
//!
//! # Testing Strategy
//! - Unit tests: FIFO round-trip across wraparound, threshold validation,
//!   poll semantics, overflow accounting
//! - Integration tests: real producer/consumer threads, wake-at-threshold
//! - Bench: criterion throughput of the send/recv hot path

#![cfg_attr(not(feature = "std"), no_std)]

use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicUsize, Ordering};

use serlink_sync::{Deadline, Signal, Timeout, WaitResult};
use static_assertions::assert_impl_all;
use thiserror::Error;

/// Errors from channel construction and consumption.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ChannelError {
    #[error("wake threshold {given} outside 1..={capacity}")]
    InvalidThreshold { given: usize, capacity: usize },
    #[error("timed out with no data")]
    TimedOut,
}

pub type Result<T> = core::result::Result<T, ChannelError>;

/// Bounded SPSC byte channel with a wake-up threshold.
///
/// # Type Parameters
/// * `N` - Ring size in bytes (must be a power of 2); usable capacity is
///   `N - 1`
///
/// # Concurrency Contract
/// Exactly one context may call producer operations (`try_send`) and
/// exactly one context may call consumer operations (`recv`, `recv_byte`)
/// at a time. The producer is expected to be an interrupt handler; its
/// operations never block, never allocate, and complete in bounded time.
/// Use [`ByteChannel::split`] to hand each side its own role handle.
///
/// # Lifecycle
/// Constructed once during non-concurrent init, shared by reference for
/// the life of the port, never resized.
pub struct ByteChannel<const N: usize> {
    buffer: UnsafeCell<[u8; N]>,
    /// Write cursor, advanced only by the producer.
    head: AtomicUsize,
    /// Read cursor, advanced only by the consumer.
    tail: AtomicUsize,
    /// Buffered bytes required before a parked reader is woken.
    wake_threshold: usize,
    /// Bytes rejected because the ring was full.
    dropped: AtomicUsize,
    data_ready: Signal,
}

// Cursor ownership is split producer/consumer as documented above; the
// buffer cells reachable from each side never overlap while the cursors
// obey acquire/release ordering.
unsafe impl<const N: usize> Sync for ByteChannel<N> {}

impl<const N: usize> ByteChannel<N> {
    /// Create a channel, validating the wake threshold.
    ///
    /// Init context only: the channel must be fully constructed before the
    /// producing interrupt is enabled.
    pub fn new(wake_threshold: usize) -> Result<Self> {
        assert!(N.is_power_of_two(), "ring size must be a power of 2");
        if wake_threshold == 0 || wake_threshold > Self::capacity() {
            return Err(ChannelError::InvalidThreshold {
                given: wake_threshold,
                capacity: Self::capacity(),
            });
        }
        Ok(Self {
            buffer: UnsafeCell::new([0; N]),
            head: AtomicUsize::new(0),
            tail: AtomicUsize::new(0),
            wake_threshold,
            dropped: AtomicUsize::new(0),
            data_ready: Signal::new(),
        })
    }

    /// Heap-allocated variant for hosts, so large rings stay off the stack.
    #[cfg(feature = "std")]
    pub fn boxed(wake_threshold: usize) -> Result<std::boxed::Box<Self>> {
        Self::new(wake_threshold).map(std::boxed::Box::new)
    }

    /// Usable capacity in bytes (`N - 1`; one slot distinguishes full from
    /// empty).
    pub const fn capacity() -> usize {
        N - 1
    }

    pub fn wake_threshold(&self) -> usize {
        self.wake_threshold
    }

    /// Split into role handles for the two sides.
    pub fn split(&self) -> (IsrSender<'_, N>, Receiver<'_, N>) {
        (IsrSender { ring: self }, Receiver { ring: self })
    }

    fn occupancy(head: usize, tail: usize) -> usize {
        if head >= tail {
            head - tail
        } else {
            N - tail + head
        }
    }

    /// Current buffered byte count.
    pub fn len(&self) -> usize {
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Acquire);
        Self::occupancy(head, tail)
    }

    pub fn is_empty(&self) -> bool {
        self.head.load(Ordering::Acquire) == self.tail.load(Ordering::Acquire)
    }

    pub fn is_full(&self) -> bool {
        self.len() == Self::capacity()
    }

    /// Bytes rejected by the drop-newest overflow policy since creation.
    pub fn dropped(&self) -> usize {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Deposit bytes from the producer side. Interrupt-safe: never blocks,
    /// never allocates, bounded time.
    ///
    /// Copies as many bytes as fit and returns the count accepted (0 means
    /// the ring is full; the excess is counted in [`dropped`], not
    /// retried). If the buffered total reaches or exceeds the wake
    /// threshold afterwards, a parked reader is made runnable.
    ///
    /// [`dropped`]: ByteChannel::dropped
    pub fn try_send(&self, bytes: &[u8]) -> usize {
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Acquire);
        let buffered = Self::occupancy(head, tail);
        let free = Self::capacity() - buffered;
        let accepted = bytes.len().min(free);

        let buf = self.buffer.get() as *mut u8;
        for (i, &byte) in bytes[..accepted].iter().enumerate() {
            // Producer-owned cells: the consumer cannot reach them until
            // the head store below publishes the writes.
            unsafe {
                buf.add((head + i) % N).write_volatile(byte);
            }
        }
        self.head.store((head + accepted) % N, Ordering::Release);

        if accepted < bytes.len() {
            self.dropped
                .fetch_add(bytes.len() - accepted, Ordering::Relaxed);
        }
        if accepted > 0 && buffered + accepted >= self.wake_threshold {
            self.data_ready.notify();
        }
        accepted
    }

    /// Copy out whatever is buffered, without parking.
    fn drain(&self, out: &mut [u8]) -> usize {
        let tail = self.tail.load(Ordering::Acquire);
        let head = self.head.load(Ordering::Acquire);
        let available = Self::occupancy(head, tail);
        let count = out.len().min(available);

        let buf = self.buffer.get() as *const u8;
        for (i, slot) in out[..count].iter_mut().enumerate() {
            unsafe {
                *slot = buf.add((tail + i) % N).read_volatile();
            }
        }
        self.tail.store((tail + count) % N, Ordering::Release);
        count
    }

    /// Receive bytes from the consumer side. Task context only.
    ///
    /// Parks the caller until at least one byte is available or `timeout`
    /// elapses, then copies up to `out.len()` bytes in FIFO order and
    /// returns the count - it does not wait to fill `out`. The reader is
    /// woken once the wake threshold is met; on timeout expiry any bytes
    /// that arrived below the threshold are still delivered. A timeout has
    /// no side effects on channel state.
    ///
    /// `Timeout::Poll` on an empty channel returns [`ChannelError::TimedOut`]
    /// immediately without parking.
    pub fn recv(&self, out: &mut [u8], timeout: Timeout) -> Result<usize> {
        if out.is_empty() {
            return Ok(0);
        }
        let count = self.drain(out);
        if count > 0 {
            return Ok(count);
        }
        if matches!(timeout, Timeout::Poll) {
            return Err(ChannelError::TimedOut);
        }

        let deadline = Deadline::after(timeout);
        loop {
            match self.data_ready.wait(deadline.remaining()) {
                WaitResult::Signaled => {
                    let count = self.drain(out);
                    if count > 0 {
                        return Ok(count);
                    }
                    // Stale permit from data already drained; park again.
                }
                WaitResult::TimedOut => {
                    let count = self.drain(out);
                    return if count > 0 {
                        Ok(count)
                    } else {
                        Err(ChannelError::TimedOut)
                    };
                }
            }
        }
    }

    /// Single-byte convenience form of [`recv`].
    ///
    /// [`recv`]: ByteChannel::recv
    pub fn recv_byte(&self, timeout: Timeout) -> Result<u8> {
        let mut byte = [0u8; 1];
        self.recv(&mut byte, timeout).map(|_| byte[0])
    }
}

/// Producer-side handle: the only operations safe from interrupt context.
pub struct IsrSender<'a, const N: usize> {
    ring: &'a ByteChannel<N>,
}

impl<'a, const N: usize> IsrSender<'a, N> {
    pub fn try_send(&self, bytes: &[u8]) -> usize {
        self.ring.try_send(bytes)
    }

    pub fn is_full(&self) -> bool {
        self.ring.is_full()
    }

    pub fn dropped(&self) -> usize {
        self.ring.dropped()
    }
}

/// Consumer-side handle for task context.
pub struct Receiver<'a, const N: usize> {
    ring: &'a ByteChannel<N>,
}

impl<'a, const N: usize> Receiver<'a, N> {
    pub fn recv(&self, out: &mut [u8], timeout: Timeout) -> Result<usize> {
        self.ring.recv(out, timeout)
    }

    pub fn recv_byte(&self, timeout: Timeout) -> Result<u8> {
        self.ring.recv_byte(timeout)
    }

    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }
}

assert_impl_all!(ByteChannel<64>: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_bad_thresholds() {
        assert!(matches!(
            ByteChannel::<8>::new(0),
            Err(ChannelError::InvalidThreshold { given: 0, capacity: 7 })
        ));
        assert!(matches!(
            ByteChannel::<8>::new(8),
            Err(ChannelError::InvalidThreshold { given: 8, capacity: 7 })
        ));
        assert!(ByteChannel::<8>::new(7).is_ok());
    }

    #[test]
    fn fifo_round_trip() {
        let ch = ByteChannel::<16>::new(1).unwrap();
        assert_eq!(ch.try_send(b"hello"), 5);
        let mut out = [0u8; 16];
        let n = ch.recv(&mut out, Timeout::Poll).unwrap();
        assert_eq!(&out[..n], b"hello");
    }

    #[test]
    fn fifo_across_wraparound() {
        let ch = ByteChannel::<8>::new(1).unwrap();
        let mut expected = std::vec::Vec::new();
        let mut actual = std::vec::Vec::new();
        // Push/pop in lockstep so the cursors lap the ring several times.
        for round in 0u16..40 {
            let chunk = [
                (round & 0xff) as u8,
                (round >> 8) as u8,
                round.wrapping_mul(31) as u8,
            ];
            assert_eq!(ch.try_send(&chunk), chunk.len());
            expected.extend_from_slice(&chunk);
            let mut out = [0u8; 3];
            let n = ch.recv(&mut out, Timeout::Poll).unwrap();
            actual.extend_from_slice(&out[..n]);
        }
        assert_eq!(actual, expected);
    }

    #[test]
    fn partial_read_returns_what_is_buffered() {
        let ch = ByteChannel::<64>::new(1).unwrap();
        ch.try_send(b"ab");
        let mut out = [0u8; 10];
        // Asked for 10, only 2 buffered: no waiting for more.
        assert_eq!(ch.recv(&mut out, Timeout::Forever).unwrap(), 2);
    }

    #[test]
    fn poll_on_empty_returns_immediately() {
        let ch = ByteChannel::<8>::new(1).unwrap();
        let mut out = [0u8; 4];
        assert_eq!(ch.recv(&mut out, Timeout::Poll), Err(ChannelError::TimedOut));
        assert_eq!(ch.recv_byte(Timeout::Poll), Err(ChannelError::TimedOut));
    }

    #[test]
    fn overflow_drops_newest_and_counts() {
        let ch = ByteChannel::<8>::new(1).unwrap();
        assert_eq!(ch.try_send(b"0123456789"), 7);
        assert_eq!(ch.dropped(), 3);
        assert!(ch.is_full());
        // Full ring: nothing accepted, nothing blocks.
        assert_eq!(ch.try_send(b"x"), 0);
        assert_eq!(ch.dropped(), 4);
        // Buffered data kept its order.
        let mut out = [0u8; 8];
        let n = ch.recv(&mut out, Timeout::Poll).unwrap();
        assert_eq!(&out[..n], b"0123456");
    }

    #[test]
    fn below_threshold_bytes_are_delivered_on_timeout() {
        let ch = ByteChannel::<64>::new(4).unwrap();
        ch.try_send(b"a");
        let mut out = [0u8; 4];
        // One byte buffered, threshold 4: no wakeup fires, but the timed
        // wait still drains it at expiry.
        assert_eq!(ch.recv(&mut out, Timeout::Millis(10)).unwrap(), 1);
        assert_eq!(out[0], b'a');
    }

    #[test]
    fn timeout_leaves_state_untouched() {
        let ch = ByteChannel::<8>::new(1).unwrap();
        let mut out = [0u8; 4];
        assert!(ch.recv(&mut out, Timeout::Millis(5)).is_err());
        ch.try_send(b"z");
        assert_eq!(ch.recv_byte(Timeout::Poll).unwrap(), b'z');
    }
}
