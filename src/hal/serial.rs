//! Non-blocking string transmit over the asynchronous serial link.
//!
//! The caller's string is copied into an owned buffer while interrupts are
//! off, then fed to the transmitter one byte per buffer-level interrupt. The
//! transmit-complete interrupt closes the transfer once the final byte has
//! left the shift register, so the engine never reports completion while the
//! line is still toggling.

use core::cell::RefCell;
use core::convert::Infallible;
use critical_section::Mutex;
use heapless::Vec;

use crate::scheduler::Scheduler;
use crate::sleep::{EnergyMode, SleepArbiter};

/// Interrupt sources consumed by the engine.
pub const INT_TXBL: u8 = 1 << 0;
pub const INT_TXC: u8 = 1 << 1;

/// Longest string a single transfer can carry.
pub const TX_BUFFER_CAP: usize = 64;

/// The link clock survives down to this mode's predecessor.
const LINK_CLOCK_BLOCK: EnergyMode = EnergyMode::Em3;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Parity {
    None,
    Even,
    Odd,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StopBits {
    One,
    Two,
}

/// Frame settings handed down to the hardware port.
pub struct SerialConfig {
    pub baud_hz: u32,
    pub parity: Parity,
    pub stop_bits: StopBits,
}

/// Register-level operations of one asynchronous serial block.
///
/// `tx_ready`, `rx_ready` and `read_data` exist for the polled link test;
/// the transmit state machine itself runs purely on interrupts.
pub trait SerialTx {
    fn configure(&self, config: &SerialConfig);
    fn enabled(&self) -> u8;
    fn pending(&self) -> u8;
    fn enable(&self, mask: u8);
    fn disable(&self, mask: u8);
    fn clear(&self, mask: u8);
    fn write_data(&self, byte: u8);
    fn tx_ready(&self) -> bool;
    fn rx_ready(&self) -> bool;
    fn read_data(&self) -> u8;
}

impl<T: SerialTx + ?Sized> SerialTx for &T {
    fn configure(&self, config: &SerialConfig) {
        (**self).configure(config)
    }
    fn enabled(&self) -> u8 {
        (**self).enabled()
    }
    fn pending(&self) -> u8 {
        (**self).pending()
    }
    fn enable(&self, mask: u8) {
        (**self).enable(mask)
    }
    fn disable(&self, mask: u8) {
        (**self).disable(mask)
    }
    fn clear(&self, mask: u8) {
        (**self).clear(mask)
    }
    fn write_data(&self, byte: u8) {
        (**self).write_data(byte)
    }
    fn tx_ready(&self) -> bool {
        (**self).tx_ready()
    }
    fn rx_ready(&self) -> bool {
        (**self).rx_ready()
    }
    fn read_data(&self) -> u8 {
        (**self).read_data()
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum State {
    Sending,
    Finalizing,
}

struct Transfer {
    data: Vec<u8, TX_BUFFER_CAP>,
    cursor: usize,
    done_evt: u32,
    state: State,
}

/// Interrupt-driven transmitter for short human-readable strings.
pub struct SerialEngine<'a, S: SerialTx> {
    port: S,
    xfer: Mutex<RefCell<Option<Transfer>>>,
    sched: &'a Scheduler,
    sleep: &'a SleepArbiter,
}

impl<'a, S: SerialTx> SerialEngine<'a, S> {
    pub const fn new(port: S, sched: &'a Scheduler, sleep: &'a SleepArbiter) -> Self {
        Self {
            port,
            xfer: Mutex::new(RefCell::new(None)),
            sched,
            sleep,
        }
    }

    /// Configure the hardware and reset the engine to idle.
    pub fn open(&self, config: &SerialConfig) {
        critical_section::with(|cs| {
            self.xfer.borrow_ref_mut(cs).take();
        });
        self.port.configure(config);
        self.port.clear(INT_TXBL | INT_TXC);
    }

    /// Queue `text` for transmission, posting `done_evt` once the line goes
    /// quiet. Waits while an earlier transfer is still in flight; a string
    /// longer than [`TX_BUFFER_CAP`] is a caller bug and halts.
    pub fn write(&self, text: &str, done_evt: u32) {
        assert!(
            text.len() <= TX_BUFFER_CAP,
            "transmit string exceeds the owned buffer"
        );
        loop {
            let claimed = critical_section::with(|cs| {
                let mut slot = self.xfer.borrow_ref_mut(cs);
                if slot.is_some() {
                    return false;
                }
                let Ok(data) = Vec::from_slice(text.as_bytes()) else {
                    panic!("transmit string exceeds the owned buffer");
                };
                *slot = Some(Transfer {
                    data,
                    cursor: 0,
                    done_evt,
                    state: State::Sending,
                });
                self.sleep.block(LINK_CLOCK_BLOCK);
                self.port.enable(INT_TXBL);
                true
            });
            if claimed {
                break;
            }
        }
    }

    pub fn busy(&self) -> bool {
        critical_section::with(|cs| self.xfer.borrow_ref(cs).is_some())
    }

    /// Service the peripheral interrupt.
    pub fn isr(&self) {
        critical_section::with(|cs| {
            let flags = self.port.pending() & self.port.enabled();
            self.port.clear(flags);
            let mut slot = self.xfer.borrow_ref_mut(cs);
            if flags & INT_TXBL != 0 {
                self.on_txbl(&mut slot);
            }
            if flags & INT_TXC != 0 {
                self.on_txc(&mut slot);
            }
        });
    }

    fn on_txbl(&self, slot: &mut Option<Transfer>) {
        let Some(xfer) = slot.as_mut() else {
            unreachable!("transmit buffer ready with no transfer in flight");
        };
        match xfer.state {
            State::Sending => {
                if xfer.cursor < xfer.data.len() {
                    self.port.write_data(xfer.data[xfer.cursor]);
                    xfer.cursor += 1;
                } else {
                    self.port.disable(INT_TXBL);
                    self.port.enable(INT_TXC);
                    xfer.state = State::Finalizing;
                }
            }
            State::Finalizing => {
                unreachable!("transmit buffer interrupt after the final byte")
            }
        }
    }

    fn on_txc(&self, slot: &mut Option<Transfer>) {
        match slot.take() {
            Some(xfer) if xfer.state == State::Finalizing => {
                self.sleep.unblock(LINK_CLOCK_BLOCK);
                self.port.disable(INT_TXC);
                self.sched.post(xfer.done_evt);
            }
            _ => unreachable!("transmit complete outside a finishing transfer"),
        }
    }

    /// Polled single-byte transmit, used only by link self-tests.
    pub fn poll_write_byte(&self, byte: u8) -> nb::Result<(), Infallible> {
        if self.port.tx_ready() {
            self.port.write_data(byte);
            Ok(())
        } else {
            Err(nb::Error::WouldBlock)
        }
    }

    /// Polled single-byte receive, used only by link self-tests.
    pub fn poll_read_byte(&self) -> nb::Result<u8, Infallible> {
        if self.port.rx_ready() {
            Ok(self.port.read_data())
        } else {
            Err(nb::Error::WouldBlock)
        }
    }
}
