//! UART hardware contract
//!
//! The minimal interface a register-level driver must satisfy for the
//! receive pump and the facade to run on top of it. Implementations are
//! bound per port at configuration time and resolved once (a generic
//! parameter, monomorphized), not re-dispatched per interrupt.

use bitflags::bitflags;
use thiserror::Error;

bitflags! {
    /// Receive line error flags, as reported by the hardware status
    /// register. Cleared by software via [`UartHw::clear_line_errors`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct LineStatus: u8 {
        const PARITY  = 1 << 0;
        const FRAMING = 1 << 1;
        const NOISE   = 1 << 2;
        const OVERRUN = 1 << 3;
    }
}

bitflags! {
    /// Pending interrupt conditions, polled once per interrupt entry.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct IrqStatus: u8 {
        /// At least one byte waits in the receive data register/FIFO.
        const RX_READY   = 1 << 0;
        /// Transmit register can take another byte.
        const TX_EMPTY   = 1 << 1;
        /// The line finished shifting out the programmed transfer.
        const TX_DONE    = 1 << 2;
        /// One or more [`LineStatus`] flags are raised.
        const LINE_ERROR = 1 << 3;
    }
}

impl LineStatus {
    /// Fatal errors invalidate in-flight data and abort the current
    /// operation; non-fatal ones corrupt at most the byte that carried
    /// them. Classified on the error class alone: overrun means data was
    /// already lost, everything else is recoverable in place.
    pub fn is_fatal(self) -> bool {
        self.contains(LineStatus::OVERRUN)
    }
}

/// Immediate transmit-programming failures.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum HwError {
    #[error("transmitter already busy")]
    TxBusy,
    #[error("peripheral fault")]
    Peripheral,
}

/// Register-level driver interface consumed by [`SerialIsr`] and
/// [`SerialPort`].
///
/// All methods take `&self`: implementations are MMIO blocks or otherwise
/// internally synchronized, shared between the interrupt and task
/// contexts.
///
/// [`SerialIsr`]: crate::SerialIsr
/// [`SerialPort`]: crate::SerialPort
pub trait UartHw {
    /// Begin an asynchronous (DMA or interrupt-fed) transmission and
    /// return immediately; completion arrives later as
    /// [`IrqStatus::TX_DONE`].
    fn start_tx(&self, frame: &[u8]) -> core::result::Result<(), HwError>;

    /// Abort an in-flight transmission, suppressing its completion
    /// interrupt.
    fn abort_tx(&self);

    /// Pop one byte from the receive data register, `None` when empty.
    fn read_data(&self) -> Option<u8>;

    /// Snapshot of the pending interrupt conditions.
    fn irq_status(&self) -> IrqStatus;

    /// Acknowledge the conditions just handled so they re-arm.
    fn ack_irq(&self, handled: IrqStatus);

    /// Raised line error flags.
    fn line_status(&self) -> LineStatus;

    /// Clear the given line error flags in hardware.
    fn clear_line_errors(&self, errors: LineStatus);

    /// Abort reception and discard hardware receive state, so stray bytes
    /// of a cancelled transfer are not delivered later.
    fn abort_rx(&self);
}
