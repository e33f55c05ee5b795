//! Two-wire (I2C) master transaction engine.
//!
//! One transaction at a time: START, device address, register address, then
//! either an immediate write payload or a repeated START plus an addressed
//! read. The whole transfer runs from the peripheral's interrupt, stepping a
//! state machine held behind a critical-section mutex; the main loop only
//! ever starts transactions and picks up the completion event.

use core::cell::{Cell, RefCell};
use critical_section::{CriticalSection, Mutex};

use crate::hal::{Dir, RegisterBus, MAX_TRANSFER_BYTES};
use crate::scheduler::Scheduler;
use crate::sleep::{EnergyMode, SleepArbiter};

/// Interrupt sources consumed by the engine.
pub const INT_ACK: u8 = 1 << 0;
pub const INT_RXDATA: u8 = 1 << 1;
pub const INT_MSTOP: u8 = 1 << 2;
pub const INT_ALL: u8 = INT_ACK | INT_RXDATA | INT_MSTOP;

/// The bus clock has to keep running while a transfer is in flight.
const BUS_CLOCK_BLOCK: EnergyMode = EnergyMode::Em2;

/// SCL high/low duty ratio.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ClockRatio {
    Standard,
    Asymmetric,
    Fast,
}

/// Bus timing and pin routing handed down to the hardware port.
pub struct I2cConfig {
    pub freq_hz: u32,
    pub ratio: ClockRatio,
    pub scl_route: u32,
    pub sda_route: u32,
}

/// Register-level operations of one two-wire master block.
///
/// The board crate implements this over the vendor peripheral; the test
/// harness implements it over an emulated peer. Interrupt masks use the
/// `INT_*` bits above.
pub trait I2cBus {
    fn configure(&self, config: &I2cConfig);
    fn enabled(&self) -> u8;
    fn pending(&self) -> u8;
    fn enable(&self, mask: u8);
    fn disable(&self, mask: u8);
    fn clear(&self, mask: u8);
    fn write_data(&self, byte: u8);
    fn read_data(&self) -> u8;
    fn cmd_start(&self);
    fn cmd_stop(&self);
    fn cmd_ack(&self);
    fn cmd_nack(&self);
    fn cmd_abort(&self);
    fn cmd_clear_tx(&self);
    fn is_idle(&self) -> bool;
}

impl<T: I2cBus + ?Sized> I2cBus for &T {
    fn configure(&self, config: &I2cConfig) {
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
    fn cmd_start(&self) {
        (**self).cmd_start()
    }
    fn cmd_stop(&self) {
        (**self).cmd_stop()
    }
    fn cmd_ack(&self) {
        (**self).cmd_ack()
    }
    fn cmd_nack(&self) {
        (**self).cmd_nack()
    }
    fn cmd_abort(&self) {
        (**self).cmd_abort()
    }
    fn cmd_clear_tx(&self) {
        (**self).cmd_clear_tx()
    }
    fn is_idle(&self) -> bool {
        (**self).is_idle()
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum State {
    Init,
    SentRegAddr,
    SentDevAddrR,
    Reading,
    Writing,
    Stopping,
}

/// One in-flight transaction.
struct Transfer {
    state: State,
    dir: Dir,
    peer: u8,
    reg: u8,
    count: u8,
    result: u32,
    payload: u32,
    done_evt: u32,
}

impl Transfer {
    /// Next write byte, slicing the payload word MSB-first by the remaining
    /// count.
    fn payload_byte(&self) -> u8 {
        (self.payload >> (8 * self.count as u32)) as u8
    }
}

/// Parameters for [`I2cEngine::start`].
pub struct I2cRequest {
    pub dir: Dir,
    pub peer: u8,
    pub reg: u8,
    pub len: u8,
    pub payload: u32,
    pub done_evt: u32,
}

impl I2cRequest {
    pub fn read(peer: u8, reg: u8, len: u8, done_evt: u32) -> Self {
        Self {
            dir: Dir::Read,
            peer,
            reg,
            len,
            payload: 0,
            done_evt,
        }
    }

    pub fn write(peer: u8, reg: u8, len: u8, payload: u32, done_evt: u32) -> Self {
        Self {
            dir: Dir::Write,
            peer,
            reg,
            len,
            payload,
            done_evt,
        }
    }
}

/// Interrupt-driven two-wire master.
pub struct I2cEngine<'a, B: I2cBus> {
    bus: B,
    xfer: Mutex<RefCell<Option<Transfer>>>,
    result: Mutex<Cell<u32>>,
    sched: &'a Scheduler,
    sleep: &'a SleepArbiter,
}

impl<'a, B: I2cBus> I2cEngine<'a, B> {
    pub const fn new(bus: B, sched: &'a Scheduler, sleep: &'a SleepArbiter) -> Self {
        Self {
            bus,
            xfer: Mutex::new(RefCell::new(None)),
            result: Mutex::new(Cell::new(0)),
            sched,
            sleep,
        }
    }

    /// Configure the hardware, recover the bus and arm the engine's
    /// interrupt sources.
    pub fn open(&self, config: &I2cConfig) {
        critical_section::with(|cs| {
            self.xfer.borrow_ref_mut(cs).take();
        });
        self.bus.configure(config);
        self.bus_reset();
        self.bus.clear(INT_ALL);
        self.bus.enable(INT_ALL);
    }

    /// Force the bus back to idle.
    ///
    /// A peer that was mid-transfer when this controller last reset can hold
    /// the data line low forever. Issuing a bare START/STOP pair clocks the
    /// peer past its stuck bit and releases the line. Interrupt sources are
    /// parked while the pulse runs and restored afterwards.
    pub fn bus_reset(&self) {
        self.bus.cmd_abort();
        let saved = self.bus.enabled();
        self.bus.disable(INT_ALL);
        self.bus.clear(self.bus.pending());
        self.bus.cmd_clear_tx();
        self.bus.cmd_start();
        self.bus.cmd_stop();
        while self.bus.pending() & INT_MSTOP == 0 {}
        self.bus.clear(self.bus.pending());
        self.bus.cmd_abort();
        self.bus.enable(saved);
    }

    /// Claim the engine and begin a transaction.
    ///
    /// Waits while an earlier transaction is still in flight; interrupts keep
    /// firing during the wait, so the earlier transfer retires on its own.
    pub fn start(&self, req: I2cRequest) {
        assert!(
            req.len >= 1 && req.len <= MAX_TRANSFER_BYTES,
            "transfer length outside the supported range"
        );
        loop {
            let claimed = critical_section::with(|cs| {
                let mut slot = self.xfer.borrow_ref_mut(cs);
                if slot.is_some() {
                    return false;
                }
                assert!(self.bus.is_idle(), "two-wire hardware busy with no owner");
                *slot = Some(Transfer {
                    state: State::Init,
                    dir: req.dir,
                    peer: req.peer,
                    reg: req.reg,
                    count: req.len,
                    result: 0,
                    payload: req.payload,
                    done_evt: req.done_evt,
                });
                self.sleep.block(BUS_CLOCK_BLOCK);
                self.bus.cmd_start();
                self.bus.write_data(req.peer << 1);
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

    /// Result word of the last completed read, MSB-first.
    pub fn result(&self) -> u32 {
        critical_section::with(|cs| self.result.borrow(cs).get())
    }

    /// Service the peripheral interrupt.
    pub fn isr(&self) {
        critical_section::with(|cs| {
            let flags = self.bus.pending() & self.bus.enabled();
            self.bus.clear(flags);
            let mut slot = self.xfer.borrow_ref_mut(cs);
            if flags & INT_ACK != 0 {
                self.on_ack(&mut slot);
            }
            if flags & INT_RXDATA != 0 {
                self.on_rx(&mut slot);
            }
            if flags & INT_MSTOP != 0 {
                self.on_stop(cs, &mut slot);
            }
        });
    }

    fn on_ack(&self, slot: &mut Option<Transfer>) {
        let Some(xfer) = slot.as_mut() else {
            unreachable!("address acknowledged with no transaction in flight");
        };
        match xfer.state {
            State::Init => {
                self.bus.write_data(xfer.reg);
                xfer.state = State::SentRegAddr;
            }
            State::SentRegAddr => match xfer.dir {
                Dir::Read => {
                    self.bus.cmd_start();
                    self.bus.write_data(xfer.peer << 1 | 1);
                    xfer.state = State::SentDevAddrR;
                }
                Dir::Write => {
                    xfer.count -= 1;
                    self.bus.write_data(xfer.payload_byte());
                    xfer.state = State::Writing;
                }
            },
            State::SentDevAddrR => {
                xfer.state = State::Reading;
            }
            State::Writing => {
                if xfer.count > 0 {
                    xfer.count -= 1;
                    self.bus.write_data(xfer.payload_byte());
                } else {
                    self.bus.cmd_stop();
                    xfer.state = State::Stopping;
                }
            }
            State::Reading | State::Stopping => {
                unreachable!("unexpected acknowledge in state {:?}", xfer.state)
            }
        }
    }

    fn on_rx(&self, slot: &mut Option<Transfer>) {
        let Some(xfer) = slot.as_mut() else {
            unreachable!("received data with no transaction in flight");
        };
        let byte = self.bus.read_data();
        match xfer.state {
            State::Reading => {
                assert!(xfer.count > 0, "received more bytes than requested");
                xfer.count -= 1;
                xfer.result |= (byte as u32) << (8 * xfer.count as u32);
                if xfer.count == 0 {
                    self.bus.cmd_nack();
                    self.bus.cmd_stop();
                    xfer.state = State::Stopping;
                } else {
                    self.bus.cmd_ack();
                }
            }
            _ => unreachable!("received data in state {:?}", xfer.state),
        }
    }

    fn on_stop(&self, cs: CriticalSection<'_>, slot: &mut Option<Transfer>) {
        match slot.take() {
            Some(xfer) if xfer.state == State::Stopping => {
                if xfer.dir == Dir::Read {
                    self.result.borrow(cs).set(xfer.result);
                }
                self.sleep.unblock(BUS_CLOCK_BLOCK);
                self.sched.post(xfer.done_evt);
            }
            _ => unreachable!("stop flagged outside a stopping transaction"),
        }
    }
}

/// One addressed peer on a shared two-wire engine.
///
/// Binds a 7-bit device address to the engine so drivers can speak
/// [`RegisterBus`] without knowing which physical bus carries them.
pub struct I2cDevice<'a, B: I2cBus> {
    engine: &'a I2cEngine<'a, B>,
    address: u8,
}

impl<'a, B: I2cBus> I2cDevice<'a, B> {
    pub fn new(engine: &'a I2cEngine<'a, B>, address: u8) -> Self {
        Self { engine, address }
    }
}

impl<'a, B: I2cBus> RegisterBus for I2cDevice<'a, B> {
    fn start_read(&self, reg: u8, len: u8, done_evt: u32) {
        self.engine
            .start(I2cRequest::read(self.address, reg, len, done_evt));
    }

    fn start_write(&self, reg: u8, len: u8, payload: u32, done_evt: u32) {
        self.engine
            .start(I2cRequest::write(self.address, reg, len, payload, done_evt));
    }

    fn busy(&self) -> bool {
        self.engine.busy()
    }

    fn result(&self) -> u32 {
        self.engine.result()
    }
}
