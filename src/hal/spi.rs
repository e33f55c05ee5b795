//! Four-wire (SPI) master transaction engine.
//!
//! Chip select stays asserted for exactly one transaction: an address byte
//! whose MSB carries the direction, then N data bytes. The link is full
//! duplex, so every transmitted byte produces a received byte; reads clock
//! the peer with fill bytes and discard the byte that arrives alongside the
//! address, while writes discard everything the peer echoes and finish on
//! the transmit-complete interrupt instead, once the last byte has really
//! left the shift register.

use core::cell::{Cell, RefCell};
use critical_section::{CriticalSection, Mutex};
use embedded_hal::digital::v2::OutputPin;

use crate::hal::{Dir, RegisterBus, MAX_TRANSFER_BYTES};
use crate::scheduler::Scheduler;
use crate::sleep::{EnergyMode, SleepArbiter};

/// Interrupt sources consumed by the engine.
pub const INT_TXBL: u8 = 1 << 0;
pub const INT_RXDATA: u8 = 1 << 1;
pub const INT_TXC: u8 = 1 << 2;

/// Address-byte direction flag.
const READ_BIT: u8 = 1 << 7;

/// Clocked out to the peer while reading.
const FILL_BYTE: u8 = 0xFF;

const BUS_CLOCK_BLOCK: EnergyMode = EnergyMode::Em2;

/// Clock polarity and phase.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ClockMode {
    Mode0,
    Mode1,
    Mode2,
    Mode3,
}

/// Link framing and pin routing handed down to the hardware port.
pub struct SpiConfig {
    pub baud_hz: u32,
    pub data_bits: u8,
    pub clock_mode: ClockMode,
    pub msb_first: bool,
    pub tx_route: u32,
    pub rx_route: u32,
    pub clk_route: u32,
}

/// Register-level operations of one synchronous serial block.
pub trait SpiBus {
    fn configure(&self, config: &SpiConfig);
    fn enabled(&self) -> u8;
    fn pending(&self) -> u8;
    fn enable(&self, mask: u8);
    fn disable(&self, mask: u8);
    fn clear(&self, mask: u8);
    fn write_data(&self, byte: u8);
    fn read_data(&self) -> u8;
}

impl<T: SpiBus + ?Sized> SpiBus for &T {
    fn configure(&self, config: &SpiConfig) {
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
    fn read_data(&self) -> u8 {
        (**self).read_data()
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum State {
    SendRegAddr,
    Read,
    Write,
}

struct Transfer {
    state: State,
    dir: Dir,
    reg: u8,
    read_count: u8,
    write_count: u8,
    result: u32,
    payload: u32,
    done_evt: u32,
    discard_first_rx: bool,
}

/// Parameters for [`SpiEngine::start`].
pub struct SpiRequest {
    pub dir: Dir,
    pub reg: u8,
    pub len: u8,
    pub payload: u32,
    pub done_evt: u32,
}

impl SpiRequest {
    pub fn read(reg: u8, len: u8, done_evt: u32) -> Self {
        Self {
            dir: Dir::Read,
            reg,
            len,
            payload: 0,
            done_evt,
        }
    }

    pub fn write(reg: u8, len: u8, payload: u32, done_evt: u32) -> Self {
        Self {
            dir: Dir::Write,
            reg,
            len,
            payload,
            done_evt,
        }
    }
}

struct Inner<P: OutputPin> {
    cs_pin: P,
    xfer: Option<Transfer>,
}

/// Interrupt-driven four-wire master with a dedicated chip-select line.
pub struct SpiEngine<'a, B: SpiBus, P: OutputPin> {
    bus: B,
    inner: Mutex<RefCell<Inner<P>>>,
    result: Mutex<Cell<u32>>,
    sched: &'a Scheduler,
    sleep: &'a SleepArbiter,
}

impl<'a, B: SpiBus, P: OutputPin> SpiEngine<'a, B, P> {
    pub const fn new(bus: B, cs_pin: P, sched: &'a Scheduler, sleep: &'a SleepArbiter) -> Self {
        Self {
            bus,
            inner: Mutex::new(RefCell::new(Inner { cs_pin, xfer: None })),
            result: Mutex::new(Cell::new(0)),
            sched,
            sleep,
        }
    }

    /// Configure the hardware and park the chip-select line.
    pub fn open(&self, config: &SpiConfig) {
        critical_section::with(|cs| {
            let inner = &mut *self.inner.borrow_ref_mut(cs);
            inner.xfer = None;
            inner.cs_pin.set_high().ok();
        });
        self.bus.configure(config);
        self.bus.clear(INT_TXBL | INT_RXDATA | INT_TXC);
    }

    /// Claim the engine and begin a transaction.
    ///
    /// Waits while an earlier transaction is still in flight.
    pub fn start(&self, req: SpiRequest) {
        assert!(
            req.len >= 1 && req.len <= MAX_TRANSFER_BYTES,
            "transfer length outside the supported range"
        );
        loop {
            let claimed = critical_section::with(|cs| {
                let inner = &mut *self.inner.borrow_ref_mut(cs);
                if inner.xfer.is_some() {
                    return false;
                }
                inner.xfer = Some(Transfer {
                    state: State::SendRegAddr,
                    dir: req.dir,
                    reg: req.reg,
                    read_count: req.len,
                    write_count: req.len,
                    result: 0,
                    payload: req.payload,
                    done_evt: req.done_evt,
                    discard_first_rx: true,
                });
                self.sleep.block(BUS_CLOCK_BLOCK);
                inner.cs_pin.set_low().ok();
                self.bus.enable(INT_TXBL | INT_RXDATA);
                true
            });
            if claimed {
                break;
            }
        }
    }

    pub fn is_busy(&self) -> bool {
        critical_section::with(|cs| self.inner.borrow_ref(cs).xfer.is_some())
    }

    /// Result word of the last completed read, MSB-first.
    pub fn read_result(&self) -> u32 {
        critical_section::with(|cs| self.result.borrow(cs).get())
    }

    /// Service the peripheral interrupt.
    pub fn isr(&self) {
        critical_section::with(|cs| {
            let flags = self.bus.pending() & self.bus.enabled();
            self.bus.clear(flags);
            let inner = &mut *self.inner.borrow_ref_mut(cs);
            if flags & INT_RXDATA != 0 {
                self.on_rx(cs, inner);
            }
            if flags & INT_TXBL != 0 {
                self.on_txbl(inner);
            }
            if flags & INT_TXC != 0 {
                self.on_txc(inner);
            }
        });
    }

    fn on_txbl(&self, inner: &mut Inner<P>) {
        let Some(xfer) = inner.xfer.as_mut() else {
            unreachable!("transmit buffer ready with no transaction in flight");
        };
        match xfer.state {
            State::SendRegAddr => match xfer.dir {
                Dir::Read => {
                    self.bus.write_data(xfer.reg | READ_BIT);
                    xfer.state = State::Read;
                }
                Dir::Write => {
                    self.bus.write_data(xfer.reg);
                    xfer.state = State::Write;
                }
            },
            State::Read => {
                self.bus.write_data(FILL_BYTE);
                xfer.write_count -= 1;
                if xfer.write_count == 0 {
                    self.bus.disable(INT_TXBL);
                }
            }
            State::Write => {
                xfer.write_count -= 1;
                self.bus
                    .write_data((xfer.payload >> (8 * xfer.write_count as u32)) as u8);
                if xfer.write_count == 0 {
                    self.bus.disable(INT_TXBL);
                    self.bus.enable(INT_TXC);
                }
            }
        }
    }

    fn on_rx(&self, cs: CriticalSection<'_>, inner: &mut Inner<P>) {
        // Drain the receive register unconditionally so the hardware can
        // accept the next byte.
        let byte = self.bus.read_data();
        let Some(xfer) = inner.xfer.as_mut() else {
            unreachable!("received data with no transaction in flight");
        };
        match xfer.state {
            State::SendRegAddr => {
                unreachable!("received data before the address byte was sent")
            }
            State::Read => {
                if xfer.discard_first_rx {
                    // Co-transmitted with the address byte; not peer data.
                    xfer.discard_first_rx = false;
                    return;
                }
                assert!(xfer.read_count > 0, "received more bytes than requested");
                xfer.read_count -= 1;
                xfer.result |= (byte as u32) << (8 * xfer.read_count as u32);
                if xfer.read_count == 0 {
                    self.bus.disable(INT_RXDATA);
                    self.bus.clear(INT_TXC);
                    self.result.borrow(cs).set(xfer.result);
                    let done_evt = xfer.done_evt;
                    self.sleep.unblock(BUS_CLOCK_BLOCK);
                    inner.cs_pin.set_high().ok();
                    inner.xfer = None;
                    self.sched.post(done_evt);
                }
            }
            State::Write => {
                // The peer echoes whatever it sees; nothing to keep.
            }
        }
    }

    fn on_txc(&self, inner: &mut Inner<P>) {
        match inner.xfer.take() {
            Some(xfer) if xfer.state == State::Write && xfer.write_count == 0 => {
                self.bus.disable(INT_TXC | INT_RXDATA);
                self.sleep.unblock(BUS_CLOCK_BLOCK);
                inner.cs_pin.set_high().ok();
                self.sched.post(xfer.done_evt);
            }
            _ => unreachable!("transmit complete outside a finished write"),
        }
    }
}

impl<'a, B: SpiBus, P: OutputPin> RegisterBus for SpiEngine<'a, B, P> {
    fn start_read(&self, reg: u8, len: u8, done_evt: u32) {
        self.start(SpiRequest::read(reg, len, done_evt));
    }

    fn start_write(&self, reg: u8, len: u8, payload: u32, done_evt: u32) {
        self.start(SpiRequest::write(reg, len, payload, done_evt));
    }

    fn busy(&self) -> bool {
        self.is_busy()
    }

    fn result(&self) -> u32 {
        self.read_result()
    }
}
