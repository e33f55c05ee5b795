//! Command wrapper for the BLE module on the asynchronous serial link.
//!
//! The module forwards anything it receives to the paired host, so normal
//! operation is just string transmits through the serial engine. While
//! unpaired it instead answers AT commands, which the link self-test uses.

use core::cell::Cell;
use critical_section::Mutex;
use heapless::String;

use crate::hal::serial::{SerialEngine, SerialTx};

/// Radio link handle.
pub struct Ble<'a, S: SerialTx> {
    serial: &'a SerialEngine<'a, S>,
    tx_done_evt: Mutex<Cell<u32>>,
}

impl<'a, S: SerialTx> Ble<'a, S> {
    pub const fn new(serial: &'a SerialEngine<'a, S>) -> Self {
        Self {
            serial,
            tx_done_evt: Mutex::new(Cell::new(0)),
        }
    }

    /// Record the event to post after each finished transmit.
    pub fn open(&self, tx_done_evt: u32) {
        critical_section::with(|cs| self.tx_done_evt.borrow(cs).set(tx_done_evt));
    }

    /// Stream `text` to the host. Waits if a transmit is still running.
    pub fn write(&self, text: &str) {
        let evt = critical_section::with(|cs| self.tx_done_evt.borrow(cs).get());
        self.serial.write(text, evt);
    }

    pub fn tx_busy(&self) -> bool {
        self.serial.busy()
    }

    /// Polled AT-command dialogue that checks the module is alive and
    /// renames it. Only valid while unpaired, and never called once the
    /// interrupt-driven engine is in use.
    pub fn verify_link(&self, name: &str) -> bool {
        if !self.command_expect("AT", "OK") {
            return false;
        }
        let mut cmd: String<24> = String::new();
        if cmd.push_str("AT+NAME").is_err() || cmd.push_str(name).is_err() {
            return false;
        }
        self.command_expect(&cmd, "OK+Set:")
    }

    fn command_expect(&self, cmd: &str, reply_prefix: &str) -> bool {
        for byte in cmd.bytes() {
            nb::block!(self.serial.poll_write_byte(byte)).ok();
        }
        for expected in reply_prefix.bytes() {
            let Ok(got) = nb::block!(self.serial.poll_read_byte()) else {
                return false;
            };
            if got != expected {
                return false;
            }
        }
        true
    }
}
