//! Serial port component - interrupt-driven UART I/O for tasks
//!
//! # Purpose
//! Turns the raw hardware interrupt contract of a UART into the four
//! blocking operations upper layers (shell, terminal, clock demo) actually
//! use: `write_bytes`, `write_byte`, `read_byte`, `send_and_await_reply`.
//! Upper layers never see rings, gates, or interrupts.
//!
//! # Integration Points
//! - Depends on: serlink-channel (streamed receive bytes),
//!   serlink-sync (transmit gate, completion signals, timeouts)
//! - Provides to: any task-level consumer of a serial port
//! - Hardware: anything implementing [`UartHw`]; the std build ships
//!   [`LoopbackUart`], an in-memory backend for host development
//!
//! # Architecture
//! Each physical port owns one [`PortResources`] set (byte channel,
//! single-shot descriptor, gate, fault latch, counters) built during
//! non-concurrent init, before the interrupt is enabled. The set is then
//! split into two halves:
//! - [`SerialIsr`] - the interrupt-context half: drains the receive data
//!   register, routes bytes to the armed single-shot slot or the streaming
//!   channel, applies the line-error policy, and releases the gate on
//!   transmit completion. Never blocks, never allocates.
//! - [`SerialPort`] - the task-context half: the blocking facade.
//!
//! # Testing Strategy
//! - Unit tests: descriptor state transitions, line-error classification,
//!   facade edge cases against the loopback backend
//! - Integration tests: ISR and task as real threads, scripted peer for
//!   the retry protocol

#![cfg_attr(not(feature = "std"), no_std)]

mod hal;
#[cfg(feature = "std")]
mod loopback;
mod port;
mod pump;
mod shot;

pub use hal::{HwError, IrqStatus, LineStatus, UartHw};
#[cfg(feature = "std")]
pub use loopback::LoopbackUart;
pub use port::{PortConfig, PortResources, SerialPort};
pub use pump::{FaultLatch, PumpCounters, PumpStats, SerialIsr};
pub use shot::SingleShot;

use static_assertions::assert_impl_all;
use thiserror::Error;

/// Task-visible failures of the serial port facade.
///
/// Interrupt-level conditions never unwind; they are recorded in counters
/// or surfaced here by waking the waiting task with the failure.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum PortError {
    #[error("timed out with no data")]
    TimedOut,
    #[error("transmitter stuck: completion interrupt never arrived")]
    TxStuck,
    #[error("transmit programming failed: {0}")]
    TxHardware(HwError),
    #[error("a fixed-length receive is already armed")]
    ReceiveBusy,
    #[error("no completed fixed-length receive to collect")]
    NothingToCollect,
    #[error("reply of {requested} bytes exceeds descriptor capacity {capacity}")]
    ReplyTooLong { requested: usize, capacity: usize },
    #[error("reception aborted by line error: {0:?}")]
    ReceiveFault(LineStatus),
    #[error("peer reply did not match the expected token")]
    ReplyMismatch,
    #[error("no matching reply after {attempts} attempts")]
    NoReply { attempts: u32 },
}

pub type Result<T> = core::result::Result<T, PortError>;

assert_impl_all!(SingleShot<8>: Send, Sync);
assert_impl_all!(FaultLatch: Send, Sync);
#[cfg(feature = "std")]
assert_impl_all!(LoopbackUart: Send, Sync);
