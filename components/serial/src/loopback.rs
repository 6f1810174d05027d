//! In-memory UART backend for host development and testing
//!
//! Implements [`UartHw`] over plain queues so the whole stack - pump,
//! channel, gate, facade - runs on a host with ordinary threads standing
//! in for interrupt and task contexts. The test harness plays the wire:
//! it injects receive bytes, raises line errors, and signals transmit
//! completion; transmitted frames are captured for inspection.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use std::vec::Vec;

use crate::{HwError, IrqStatus, LineStatus, UartHw};

#[derive(Default)]
struct Wire {
    rx_fifo: VecDeque<u8>,
    line_errors: LineStatus,
    tx_frames: Vec<Vec<u8>>,
    tx_busy: bool,
    tx_done_pending: bool,
    rx_aborts: u32,
    tx_aborts: u32,
}

/// Simulated UART: a scriptable peer on the far end of the wire.
#[derive(Default)]
pub struct LoopbackUart {
    wire: Mutex<Wire>,
}

impl LoopbackUart {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Wire> {
        self.wire.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Peer sends bytes: they appear in the receive data register.
    pub fn inject_rx(&self, bytes: &[u8]) {
        self.lock().rx_fifo.extend(bytes.iter().copied());
    }

    /// Raise line error flags as the hardware would.
    pub fn raise_line_error(&self, errors: LineStatus) {
        self.lock().line_errors |= errors;
    }

    /// The wire finished shifting out the programmed frame; the next
    /// interrupt will observe `TX_DONE`.
    pub fn complete_tx(&self) {
        let mut wire = self.lock();
        wire.tx_busy = false;
        wire.tx_done_pending = true;
    }

    /// Frames captured from `start_tx`, in programming order.
    pub fn sent_frames(&self) -> Vec<Vec<u8>> {
        self.lock().tx_frames.clone()
    }

    pub fn tx_count(&self) -> usize {
        self.lock().tx_frames.len()
    }

    pub fn rx_abort_count(&self) -> u32 {
        self.lock().rx_aborts
    }

    pub fn tx_abort_count(&self) -> u32 {
        self.lock().tx_aborts
    }
}

impl UartHw for LoopbackUart {
    fn start_tx(&self, frame: &[u8]) -> core::result::Result<(), HwError> {
        let mut wire = self.lock();
        if wire.tx_busy {
            return Err(HwError::TxBusy);
        }
        wire.tx_busy = true;
        wire.tx_frames.push(frame.to_vec());
        Ok(())
    }

    fn abort_tx(&self) {
        let mut wire = self.lock();
        wire.tx_busy = false;
        wire.tx_aborts += 1;
    }

    fn read_data(&self) -> Option<u8> {
        self.lock().rx_fifo.pop_front()
    }

    fn irq_status(&self) -> IrqStatus {
        let wire = self.lock();
        let mut status = IrqStatus::empty();
        if !wire.rx_fifo.is_empty() {
            status |= IrqStatus::RX_READY;
        }
        if !wire.line_errors.is_empty() {
            status |= IrqStatus::LINE_ERROR;
        }
        if wire.tx_done_pending {
            status |= IrqStatus::TX_DONE;
        }
        status
    }

    fn ack_irq(&self, handled: IrqStatus) {
        if handled.contains(IrqStatus::TX_DONE) {
            self.lock().tx_done_pending = false;
        }
    }

    fn line_status(&self) -> LineStatus {
        self.lock().line_errors
    }

    fn clear_line_errors(&self, errors: LineStatus) {
        let mut wire = self.lock();
        wire.line_errors &= !errors;
    }

    fn abort_rx(&self) {
        let mut wire = self.lock();
        wire.rx_fifo.clear();
        wire.rx_aborts += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn captures_frames_and_tracks_busy() {
        let hw = LoopbackUart::new();
        hw.start_tx(b"one").unwrap();
        assert_eq!(hw.start_tx(b"two"), Err(HwError::TxBusy));
        hw.complete_tx();
        hw.start_tx(b"two").unwrap();
        assert_eq!(hw.sent_frames(), vec![b"one".to_vec(), b"two".to_vec()]);
    }

    #[test]
    fn tx_done_is_latched_until_acked() {
        let hw = LoopbackUart::new();
        hw.start_tx(b"x").unwrap();
        hw.complete_tx();
        assert!(hw.irq_status().contains(IrqStatus::TX_DONE));
        hw.ack_irq(IrqStatus::TX_DONE);
        assert!(!hw.irq_status().contains(IrqStatus::TX_DONE));
    }

    #[test]
    fn rx_register_drains_in_order() {
        let hw = LoopbackUart::new();
        hw.inject_rx(b"ab");
        assert!(hw.irq_status().contains(IrqStatus::RX_READY));
        assert_eq!(hw.read_data(), Some(b'a'));
        assert_eq!(hw.read_data(), Some(b'b'));
        assert_eq!(hw.read_data(), None);
        assert!(!hw.irq_status().contains(IrqStatus::RX_READY));
    }

    #[test]
    fn line_errors_raise_and_clear() {
        let hw = LoopbackUart::new();
        hw.raise_line_error(LineStatus::PARITY | LineStatus::OVERRUN);
        assert!(hw.irq_status().contains(IrqStatus::LINE_ERROR));
        hw.clear_line_errors(LineStatus::PARITY);
        assert_eq!(hw.line_status(), LineStatus::OVERRUN);
    }
}
