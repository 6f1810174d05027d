//! Receive pump - the interrupt-context half of a port
//!
//! One [`SerialIsr`] instance services all interrupt conditions of a
//! port: it drains the receive data register into the armed single-shot
//! slot or the streaming byte channel, applies the line-error policy, and
//! returns the transmit gate token on completion. Everything here runs in
//! interrupt context: no blocking, no allocation, a byte copy plus
//! counter updates per condition.

use core::sync::atomic::{AtomicU32, AtomicU8, Ordering};

use serlink_channel::{ByteChannel, IsrSender};
use serlink_sync::Gate;

use crate::{IrqStatus, LineStatus, SingleShot, UartHw};

/// Latched fatal-receive condition, shared between the interrupt (which
/// sets it) and the task side (which clears it via recovery).
///
/// While latched, reception is off: incoming bytes are discarded until
/// the task explicitly recovers, because data continuity was already lost.
pub struct FaultLatch {
    bits: AtomicU8,
}

impl FaultLatch {
    pub const fn new() -> Self {
        Self {
            bits: AtomicU8::new(0),
        }
    }

    pub(crate) fn set(&self, errors: LineStatus) {
        self.bits.store(errors.bits(), Ordering::Release);
    }

    pub(crate) fn clear(&self) {
        self.bits.store(0, Ordering::Release);
    }

    pub fn get(&self) -> Option<LineStatus> {
        match self.bits.load(Ordering::Acquire) {
            0 => None,
            raw => Some(LineStatus::from_bits_truncate(raw)),
        }
    }

    pub fn is_set(&self) -> bool {
        self.bits.load(Ordering::Acquire) != 0
    }
}

impl Default for FaultLatch {
    fn default() -> Self {
        Self::new()
    }
}

/// Diagnostic counters, updated from interrupt context with relaxed
/// atomics and snapshotted from task context.
pub struct PumpCounters {
    irqs: AtomicU32,
    streamed: AtomicU32,
    soft_errors: AtomicU32,
    overruns: AtomicU32,
}

impl PumpCounters {
    pub const fn new() -> Self {
        Self {
            irqs: AtomicU32::new(0),
            streamed: AtomicU32::new(0),
            soft_errors: AtomicU32::new(0),
            overruns: AtomicU32::new(0),
        }
    }

    pub fn snapshot(&self) -> PumpStats {
        PumpStats {
            irqs: self.irqs.load(Ordering::Relaxed),
            streamed: self.streamed.load(Ordering::Relaxed),
            soft_errors: self.soft_errors.load(Ordering::Relaxed),
            overruns: self.overruns.load(Ordering::Relaxed),
        }
    }

    fn bump(counter: &AtomicU32) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

impl Default for PumpCounters {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time view of [`PumpCounters`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PumpStats {
    /// Interrupt entries that found work pending.
    pub irqs: u32,
    /// Bytes delivered into the streaming channel.
    pub streamed: u32,
    /// Non-fatal line errors (parity/framing/noise), one per flagged byte.
    pub soft_errors: u32,
    /// Fatal overruns that aborted reception.
    pub overruns: u32,
}

/// Interrupt-context half of a serial port.
///
/// Owned by the interrupt handler (or the thread standing in for it);
/// exactly one instance per port. Built after the port's resources and
/// before the hardware interrupt is enabled.
pub struct SerialIsr<'a, U: UartHw, const N: usize, const M: usize> {
    hw: &'a U,
    stream: IsrSender<'a, N>,
    shot: &'a SingleShot<M>,
    gate: &'a Gate,
    fault: &'a FaultLatch,
    counters: &'a PumpCounters,
}

impl<'a, U: UartHw, const N: usize, const M: usize> SerialIsr<'a, U, N, M> {
    pub fn new(
        hw: &'a U,
        channel: &'a ByteChannel<N>,
        shot: &'a SingleShot<M>,
        gate: &'a Gate,
        fault: &'a FaultLatch,
        counters: &'a PumpCounters,
    ) -> Self {
        let (stream, _) = channel.split();
        Self {
            hw,
            stream,
            shot,
            gate,
            fault,
            counters,
        }
    }

    /// Service every pending condition once. The entry point wired to the
    /// port's hardware interrupt.
    pub fn on_interrupt(&mut self) {
        let status = self.hw.irq_status();
        if status.is_empty() {
            return;
        }
        PumpCounters::bump(&self.counters.irqs);

        // Errors first: a flagged byte still sitting in the data register
        // must be dropped before the drain loop would stream it.
        if status.contains(IrqStatus::LINE_ERROR) {
            self.on_line_error();
        }
        if status.contains(IrqStatus::RX_READY) {
            self.drain_rx();
        }
        if status.contains(IrqStatus::TX_DONE) {
            self.gate.release();
        }
        self.hw.ack_irq(status);
    }

    /// Copy bytes out of the data register until it runs dry. Each byte
    /// goes to the armed single-shot slot if there is one, otherwise into
    /// the streaming channel (which applies the overflow policy itself).
    fn drain_rx(&mut self) {
        while let Some(byte) = self.hw.read_data() {
            if self.fault.is_set() {
                // Reception is latched off until the task recovers.
                continue;
            }
            if self.shot.offer(byte) {
                continue;
            }
            if self.stream.try_send(&[byte]) == 1 {
                PumpCounters::bump(&self.counters.streamed);
            }
        }
    }

    /// Apply the line-error policy.
    ///
    /// Non-fatal (parity/framing/noise): clear the flag, drop the byte
    /// that carried it, count, keep receiving. Fatal (overrun, data
    /// already lost): abort reception, fail an armed single-shot, latch
    /// the fault until the task recovers.
    fn on_line_error(&mut self) {
        let errors = self.hw.line_status();
        if errors.is_empty() {
            return;
        }
        self.hw.clear_line_errors(errors);

        if errors.is_fatal() {
            PumpCounters::bump(&self.counters.overruns);
            self.hw.abort_rx();
            self.shot.fail(errors);
            self.fault.set(errors);
        } else {
            PumpCounters::bump(&self.counters.soft_errors);
            // The flagged byte is garbage; pull it out of the register so
            // the drain loop does not deliver it.
            let _ = self.hw.read_data();
        }
    }
}
