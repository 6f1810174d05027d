//! Serial port facade - the task-context half of a port
//!
//! The only interface exposed to upper-layer consumers. Writers serialize
//! on the transmit gate, readers pull from the streaming channel, and the
//! request/response helper drives the single-shot descriptor with a
//! bounded retry loop.

use serlink_channel::{ByteChannel, ChannelError, Receiver};
use serlink_sync::{Gate, GateError, Timeout, WaitResult};

use crate::pump::{FaultLatch, PumpCounters, PumpStats, SerialIsr};
use crate::{PortError, Result, SingleShot, UartHw};

/// Everything one physical port shares between its interrupt and task
/// halves: streaming channel, single-shot descriptor, transmit gate,
/// fault latch, counters.
///
/// Built once during non-concurrent init. Initialization order per port:
/// construct the resources, build [`SerialIsr`] and [`SerialPort`] over
/// them, and only then enable the hardware interrupt.
pub struct PortResources<const N: usize, const M: usize> {
    pub channel: ByteChannel<N>,
    pub single_shot: SingleShot<M>,
    pub gate: Gate,
    pub fault: FaultLatch,
    pub counters: PumpCounters,
}

impl<const N: usize, const M: usize> PortResources<N, M> {
    pub fn new(wake_threshold: usize) -> core::result::Result<Self, ChannelError> {
        Ok(Self {
            channel: ByteChannel::new(wake_threshold)?,
            single_shot: SingleShot::new(),
            gate: Gate::new(),
            fault: FaultLatch::new(),
            counters: PumpCounters::new(),
        })
    }

    /// Build the interrupt-context half over these resources.
    pub fn isr<'a, U: UartHw>(&'a self, hw: &'a U) -> SerialIsr<'a, U, N, M> {
        SerialIsr::new(
            hw,
            &self.channel,
            &self.single_shot,
            &self.gate,
            &self.fault,
            &self.counters,
        )
    }

    /// Build the task-context half over these resources.
    pub fn port<'a, U: UartHw>(&'a self, hw: &'a U, config: PortConfig) -> SerialPort<'a, U, N, M> {
        SerialPort {
            hw,
            rx: self.channel.split().1,
            shot: &self.single_shot,
            gate: &self.gate,
            fault: &self.fault,
            counters: &self.counters,
            config,
        }
    }
}

/// Per-port tuning for the facade.
#[derive(Debug, Clone, Copy)]
pub struct PortConfig {
    /// Bound on waiting for the transmitter token before the stuck-gate
    /// recovery path runs.
    pub gate_timeout: Timeout,
}

impl Default for PortConfig {
    fn default() -> Self {
        Self {
            gate_timeout: Timeout::Millis(500),
        }
    }
}

/// Blocking serial I/O for tasks. One instance per physical port.
///
/// Suspension points: waiting for receive data, waiting for the transmit
/// gate, and waiting for a reply inside [`send_and_await_reply`]. Nothing
/// here is callable from interrupt context.
///
/// [`send_and_await_reply`]: SerialPort::send_and_await_reply
pub struct SerialPort<'a, U: UartHw, const N: usize, const M: usize> {
    hw: &'a U,
    rx: Receiver<'a, N>,
    shot: &'a SingleShot<M>,
    gate: &'a Gate,
    fault: &'a FaultLatch,
    counters: &'a PumpCounters,
    config: PortConfig,
}

impl<'a, U: UartHw, const N: usize, const M: usize> SerialPort<'a, U, N, M> {
    /// Send a buffer, serialized with other writers via the gate.
    ///
    /// Blocks until the previous transmission has completed (gate
    /// acquired), programs the asynchronous send, and returns the
    /// immediate programming status - it does not wait for this
    /// transmission's own on-wire completion.
    ///
    /// A gate that never comes back within the configured bound is
    /// treated as a stuck transmitter: the in-flight send is aborted, the
    /// token force-reset, and [`PortError::TxStuck`] returned.
    pub fn write_bytes(&self, frame: &[u8]) -> Result<()> {
        if frame.is_empty() {
            return Ok(());
        }
        if let Err(GateError::TimedOut) = self.gate.acquire(self.config.gate_timeout) {
            log::warn!("transmit completion never arrived; resetting the gate");
            self.hw.abort_tx();
            self.gate.force_reset();
            return Err(PortError::TxStuck);
        }
        match self.hw.start_tx(frame) {
            Ok(()) => Ok(()),
            Err(e) => {
                // Programming failed, so no completion interrupt will
                // return the token; give it back here.
                self.gate.release();
                Err(PortError::TxHardware(e))
            }
        }
    }

    /// Single-byte convenience form of [`write_bytes`].
    ///
    /// [`write_bytes`]: SerialPort::write_bytes
    pub fn write_byte(&self, byte: u8) -> Result<()> {
        self.write_bytes(&[byte])
    }

    /// Pull exactly zero or one byte from the streaming channel.
    ///
    /// The canonical failure is zero bytes within the timeout. If
    /// reception is latched off after a fatal line error, that fault is
    /// surfaced instead once the channel runs dry.
    pub fn read_byte(&self, timeout: Timeout) -> Result<u8> {
        match self.rx.recv_byte(timeout) {
            Ok(byte) => Ok(byte),
            Err(ChannelError::TimedOut) => match self.fault.get() {
                Some(errors) => Err(PortError::ReceiveFault(errors)),
                None => Err(PortError::TimedOut),
            },
            // Construction-only variant; recv never produces it.
            Err(ChannelError::InvalidThreshold { .. }) => Err(PortError::TimedOut),
        }
    }

    /// Send `frame` and wait for the peer to answer with `expected`,
    /// retrying up to `max_attempts` times.
    ///
    /// Each attempt: write the frame, arm a fixed-length receive for the
    /// expected token, wait up to `timeout_per_attempt`, compare. On a
    /// mismatch or a silent peer the pending receive is aborted before
    /// the retry, so no attempt leaves a receive armed behind it. After
    /// exhausting all attempts the last observed failure is returned
    /// (pure silence maps to [`PortError::NoReply`]).
    pub fn send_and_await_reply(
        &self,
        frame: &[u8],
        expected: &[u8],
        timeout_per_attempt: Timeout,
        max_attempts: u32,
    ) -> Result<()> {
        if expected.is_empty() || expected.len() > M {
            return Err(PortError::ReplyTooLong {
                requested: expected.len(),
                capacity: M,
            });
        }
        if max_attempts == 0 {
            return Err(PortError::NoReply { attempts: 0 });
        }

        let mut last_failure = PortError::TimedOut;
        for attempt in 1..=max_attempts {
            if let Err(e) = self.write_bytes(frame) {
                last_failure = e;
                continue;
            }
            self.shot.arm(expected.len())?;

            match self.shot.wait(timeout_per_attempt) {
                WaitResult::TimedOut => {
                    // Kill the pending receive so a late reply cannot leak
                    // into the next attempt's buffer.
                    self.hw.abort_rx();
                    self.shot.abort();
                    last_failure = PortError::TimedOut;
                    log::debug!("no reply on attempt {attempt}/{max_attempts}");
                }
                WaitResult::Signaled => {
                    let mut reply = [0u8; M];
                    match self.shot.take(&mut reply) {
                        Ok(len) => {
                            if &reply[..len] == expected {
                                return Ok(());
                            }
                            last_failure = PortError::ReplyMismatch;
                            log::debug!("reply mismatch on attempt {attempt}/{max_attempts}");
                        }
                        Err(e) => {
                            last_failure = e;
                            if matches!(e, PortError::ReceiveFault(_)) {
                                // Line fault killed the attempt; recover so
                                // the retry can receive at all.
                                self.recover();
                            }
                        }
                    }
                }
            }
        }

        Err(match last_failure {
            PortError::TimedOut => PortError::NoReply {
                attempts: max_attempts,
            },
            other => other,
        })
    }

    /// Clear a latched receive fault and resume reception.
    ///
    /// The explicit re-arm required after an overrun: buffered pre-fault
    /// bytes stay readable, everything that arrived during the fault was
    /// discarded.
    pub fn recover(&self) {
        self.hw.clear_line_errors(self.hw.line_status());
        self.fault.clear();
    }

    pub fn is_faulted(&self) -> bool {
        self.fault.is_set()
    }

    /// Diagnostic counters of the port's interrupt half.
    pub fn stats(&self) -> PumpStats {
        self.counters.snapshot()
    }
}
