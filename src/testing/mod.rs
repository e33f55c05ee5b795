//! Test doubles for the hardware port traits.
//!
//! Each mock models one peripheral block at interrupt level: engine code
//! writes data registers and issues commands, the mock advances an emulated
//! peer and raises the interrupt flags the real hardware would, and the test
//! pumps the engine's `isr` until the transaction retires. The doubles keep
//! their state behind the same critical-section mutexes as the engines, so
//! the ordering tests can drive them from a second thread.

use core::cell::RefCell;
use critical_section::Mutex;
use heapless::{Deque, Vec};

use crate::hal::{i2c, serial, spi, tick};
use crate::sleep::{EnergyMode, PowerControl};

/// Bus activity as seen by a two-wire peer.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WireEvent {
    Start,
    RepStart,
    Byte(u8),
    Ack,
    Nack,
    Stop,
}

/// Register model answering a two-wire master.
pub trait I2cPeer {
    /// Byte `index` of a read from `reg`.
    fn read_reg(&mut self, reg: u8, index: usize) -> u8;
    /// A completed write of `data` to `reg`.
    fn write_reg(&mut self, reg: u8, data: &[u8]);
}

/// Plain register file; multi-byte accesses hit consecutive registers.
pub struct RegFilePeer {
    pub regs: [u8; 256],
}

impl RegFilePeer {
    pub fn new() -> Self {
        Self { regs: [0; 256] }
    }

    pub fn with(values: &[(u8, u8)]) -> Self {
        let mut peer = Self::new();
        for &(reg, value) in values {
            peer.regs[reg as usize] = value;
        }
        peer
    }
}

impl Default for RegFilePeer {
    fn default() -> Self {
        Self::new()
    }
}

impl I2cPeer for RegFilePeer {
    fn read_reg(&mut self, reg: u8, index: usize) -> u8 {
        self.regs[reg as usize + index]
    }

    fn write_reg(&mut self, reg: u8, data: &[u8]) {
        for (index, &byte) in data.iter().enumerate() {
            self.regs[reg as usize + index] = byte;
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum I2cPhase {
    Idle,
    DevAddr,
    RegAddr,
    Data,
}

struct I2cState<P> {
    peer: P,
    enabled: u8,
    pending: u8,
    rxdata: u8,
    wire: Vec<WireEvent, 64>,
    phase: I2cPhase,
    reg: u8,
    read_idx: usize,
    wbuf: Vec<u8, 8>,
    started: bool,
    configured: bool,
}

/// Two-wire master block talking to an emulated peer.
pub struct MockI2c<P: I2cPeer> {
    state: Mutex<RefCell<I2cState<P>>>,
}

impl<P: I2cPeer> MockI2c<P> {
    pub fn new(peer: P) -> Self {
        Self {
            state: Mutex::new(RefCell::new(I2cState {
                peer,
                enabled: 0,
                pending: 0,
                rxdata: 0,
                wire: Vec::new(),
                phase: I2cPhase::Idle,
                reg: 0,
                read_idx: 0,
                wbuf: Vec::new(),
                started: false,
                configured: false,
            })),
        }
    }

    fn with<R>(&self, f: impl FnOnce(&mut I2cState<P>) -> R) -> R {
        critical_section::with(|cs| f(&mut self.state.borrow_ref_mut(cs)))
    }

    /// Drain the recorded wire log.
    pub fn take_wire(&self) -> Vec<WireEvent, 64> {
        self.with(|s| core::mem::take(&mut s.wire))
    }

    /// Inspect or script the emulated peer.
    pub fn peer<R>(&self, f: impl FnOnce(&mut P) -> R) -> R {
        self.with(|s| f(&mut s.peer))
    }

    pub fn was_configured(&self) -> bool {
        self.with(|s| s.configured)
    }
}

impl<P: I2cPeer> i2c::I2cBus for MockI2c<P> {
    fn configure(&self, _config: &i2c::I2cConfig) {
        self.with(|s| s.configured = true);
    }

    fn enabled(&self) -> u8 {
        self.with(|s| s.enabled)
    }

    fn pending(&self) -> u8 {
        self.with(|s| s.pending)
    }

    fn enable(&self, mask: u8) {
        self.with(|s| s.enabled |= mask);
    }

    fn disable(&self, mask: u8) {
        self.with(|s| s.enabled &= !mask);
    }

    fn clear(&self, mask: u8) {
        self.with(|s| s.pending &= !mask);
    }

    fn write_data(&self, byte: u8) {
        self.with(|s| {
            s.wire.push(WireEvent::Byte(byte)).ok();
            match s.phase {
                I2cPhase::DevAddr => {
                    if byte & 1 == 1 {
                        // Addressed read: the first data byte follows the
                        // address acknowledge immediately.
                        s.phase = I2cPhase::Data;
                        s.rxdata = s.peer.read_reg(s.reg, 0);
                        s.read_idx = 1;
                        s.pending |= i2c::INT_ACK | i2c::INT_RXDATA;
                    } else {
                        s.phase = I2cPhase::RegAddr;
                        s.pending |= i2c::INT_ACK;
                    }
                }
                I2cPhase::RegAddr => {
                    s.reg = byte;
                    s.wbuf.clear();
                    s.phase = I2cPhase::Data;
                    s.pending |= i2c::INT_ACK;
                }
                I2cPhase::Data => {
                    s.wbuf.push(byte).ok();
                    s.pending |= i2c::INT_ACK;
                }
                I2cPhase::Idle => panic!("byte transmitted while the bus was idle"),
            }
        });
    }

    fn read_data(&self) -> u8 {
        self.with(|s| s.rxdata)
    }

    fn cmd_start(&self) {
        self.with(|s| {
            if s.started {
                s.wire.push(WireEvent::RepStart).ok();
            } else {
                s.wire.push(WireEvent::Start).ok();
                s.started = true;
            }
            s.phase = I2cPhase::DevAddr;
        });
    }

    fn cmd_stop(&self) {
        self.with(|s| {
            s.wire.push(WireEvent::Stop).ok();
            if !s.wbuf.is_empty() {
                let reg = s.reg;
                let data = core::mem::take(&mut s.wbuf);
                s.peer.write_reg(reg, &data);
            }
            s.phase = I2cPhase::Idle;
            s.started = false;
            s.pending |= i2c::INT_MSTOP;
        });
    }

    fn cmd_ack(&self) {
        self.with(|s| {
            s.wire.push(WireEvent::Ack).ok();
            s.rxdata = s.peer.read_reg(s.reg, s.read_idx);
            s.read_idx += 1;
            s.pending |= i2c::INT_RXDATA;
        });
    }

    fn cmd_nack(&self) {
        self.with(|s| {
            s.wire.push(WireEvent::Nack).ok();
        });
    }

    fn cmd_abort(&self) {
        self.with(|s| {
            s.phase = I2cPhase::Idle;
            s.started = false;
        });
    }

    fn cmd_clear_tx(&self) {}

    fn is_idle(&self) -> bool {
        self.with(|s| s.phase == I2cPhase::Idle && !s.started)
    }
}

/// Byte-exchange model answering a four-wire master. `index` counts bytes
/// from the start of the transaction; index 0 carries the address.
pub trait SpiPeer {
    fn exchange(&mut self, mosi: u8, index: usize) -> u8;
}

/// Register file behind a four-wire link with the direction flag in the
/// address MSB.
pub struct SpiRegPeer {
    pub regs: [u8; 128],
    addr: u8,
}

impl SpiRegPeer {
    pub fn new() -> Self {
        Self {
            regs: [0; 128],
            addr: 0,
        }
    }

    pub fn with(values: &[(u8, u8)]) -> Self {
        let mut peer = Self::new();
        for &(reg, value) in values {
            peer.regs[reg as usize] = value;
        }
        peer
    }
}

impl Default for SpiRegPeer {
    fn default() -> Self {
        Self::new()
    }
}

impl SpiPeer for SpiRegPeer {
    fn exchange(&mut self, mosi: u8, index: usize) -> u8 {
        if index == 0 {
            self.addr = mosi;
            // Shifted out while the address is still arriving.
            return 0x00;
        }
        let reg = (self.addr & 0x7F) as usize + index - 1;
        if self.addr & 0x80 != 0 {
            self.regs[reg]
        } else {
            self.regs[reg] = mosi;
            mosi
        }
    }
}

struct SpiState<P> {
    peer: P,
    enabled: u8,
    pending: u8,
    rxdata: u8,
    index: usize,
    mosi: Vec<u8, 64>,
    configured: bool,
}

/// Four-wire master block talking to an emulated peer.
///
/// The transmit buffer is modelled as always free, so the buffer-level flag
/// reads as pending whenever it is enabled.
pub struct MockSpi<P: SpiPeer> {
    state: Mutex<RefCell<SpiState<P>>>,
}

impl<P: SpiPeer> MockSpi<P> {
    pub fn new(peer: P) -> Self {
        Self {
            state: Mutex::new(RefCell::new(SpiState {
                peer,
                enabled: 0,
                pending: 0,
                rxdata: 0,
                index: 0,
                mosi: Vec::new(),
                configured: false,
            })),
        }
    }

    fn with<R>(&self, f: impl FnOnce(&mut SpiState<P>) -> R) -> R {
        critical_section::with(|cs| f(&mut self.state.borrow_ref_mut(cs)))
    }

    /// Drain the bytes the master has shifted out.
    pub fn take_mosi(&self) -> Vec<u8, 64> {
        self.with(|s| core::mem::take(&mut s.mosi))
    }

    pub fn peer<R>(&self, f: impl FnOnce(&mut P) -> R) -> R {
        self.with(|s| f(&mut s.peer))
    }

    pub fn was_configured(&self) -> bool {
        self.with(|s| s.configured)
    }
}

impl<P: SpiPeer> spi::SpiBus for MockSpi<P> {
    fn configure(&self, _config: &spi::SpiConfig) {
        self.with(|s| s.configured = true);
    }

    fn enabled(&self) -> u8 {
        self.with(|s| s.enabled)
    }

    fn pending(&self) -> u8 {
        self.with(|s| s.pending | spi::INT_TXBL)
    }

    fn enable(&self, mask: u8) {
        self.with(|s| {
            s.enabled |= mask;
            if mask & spi::INT_TXBL != 0 {
                // A fresh transaction; restart the byte counter.
                s.index = 0;
            }
        });
    }

    fn disable(&self, mask: u8) {
        self.with(|s| s.enabled &= !mask);
    }

    fn clear(&self, mask: u8) {
        self.with(|s| s.pending &= !mask);
    }

    fn write_data(&self, byte: u8) {
        self.with(|s| {
            s.mosi.push(byte).ok();
            let index = s.index;
            s.rxdata = s.peer.exchange(byte, index);
            s.index += 1;
            // Writing restarts the shifter, so a stale transmit-complete
            // flag never survives a new byte.
            s.pending = (s.pending & !spi::INT_TXC) | spi::INT_RXDATA | spi::INT_TXC;
        });
    }

    fn read_data(&self) -> u8 {
        self.with(|s| s.rxdata)
    }
}

struct SerialState {
    enabled: u8,
    pending: u8,
    tx: Vec<u8, 256>,
    rx: Deque<u8, 64>,
    configured: bool,
}

/// Asynchronous serial block with a byte log and a scriptable receive
/// queue.
pub struct MockSerial {
    state: Mutex<RefCell<SerialState>>,
}

impl MockSerial {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RefCell::new(SerialState {
                enabled: 0,
                pending: 0,
                tx: Vec::new(),
                rx: Deque::new(),
                configured: false,
            })),
        }
    }

    fn with<R>(&self, f: impl FnOnce(&mut SerialState) -> R) -> R {
        critical_section::with(|cs| f(&mut self.state.borrow_ref_mut(cs)))
    }

    /// Drain everything transmitted so far.
    pub fn take_tx(&self) -> Vec<u8, 256> {
        self.with(|s| core::mem::take(&mut s.tx))
    }

    /// Queue bytes for the polled receive path.
    pub fn push_rx(&self, data: &[u8]) {
        self.with(|s| {
            for &byte in data {
                s.rx.push_back(byte).ok();
            }
        });
    }

    pub fn was_configured(&self) -> bool {
        self.with(|s| s.configured)
    }
}

impl Default for MockSerial {
    fn default() -> Self {
        Self::new()
    }
}

impl serial::SerialTx for MockSerial {
    fn configure(&self, _config: &serial::SerialConfig) {
        self.with(|s| s.configured = true);
    }

    fn enabled(&self) -> u8 {
        self.with(|s| s.enabled)
    }

    fn pending(&self) -> u8 {
        self.with(|s| s.pending | serial::INT_TXBL)
    }

    fn enable(&self, mask: u8) {
        self.with(|s| s.enabled |= mask);
    }

    fn disable(&self, mask: u8) {
        self.with(|s| s.enabled &= !mask);
    }

    fn clear(&self, mask: u8) {
        self.with(|s| s.pending &= !mask);
    }

    fn write_data(&self, byte: u8) {
        self.with(|s| {
            s.tx.push(byte).ok();
            s.pending = (s.pending & !serial::INT_TXC) | serial::INT_TXC;
        });
    }

    fn tx_ready(&self) -> bool {
        true
    }

    fn rx_ready(&self) -> bool {
        self.with(|s| !s.rx.is_empty())
    }

    fn read_data(&self) -> u8 {
        self.with(|s| s.rx.pop_front().unwrap_or(0))
    }
}

struct TickState {
    enabled: u8,
    pending: u8,
    top: u32,
    compare: u32,
    running: bool,
}

/// Tick timer block; tests raise the compare and underflow flags by hand.
pub struct MockTick {
    state: Mutex<RefCell<TickState>>,
}

impl MockTick {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RefCell::new(TickState {
                enabled: 0,
                pending: 0,
                top: 0,
                compare: 0,
                running: false,
            })),
        }
    }

    fn with<R>(&self, f: impl FnOnce(&mut TickState) -> R) -> R {
        critical_section::with(|cs| f(&mut self.state.borrow_ref_mut(cs)))
    }

    /// Raise interrupt flags as the counter would.
    pub fn raise(&self, mask: u8) {
        self.with(|s| s.pending |= mask);
    }

    pub fn top(&self) -> u32 {
        self.with(|s| s.top)
    }

    pub fn compare(&self) -> u32 {
        self.with(|s| s.compare)
    }

    pub fn is_running(&self) -> bool {
        self.with(|s| s.running)
    }
}

impl Default for MockTick {
    fn default() -> Self {
        Self::new()
    }
}

impl tick::TickTimer for MockTick {
    fn configure(&self, top: u32, compare: u32) {
        self.with(|s| {
            s.top = top;
            s.compare = compare;
        });
    }

    fn run(&self) {
        self.with(|s| s.running = true);
    }

    fn halt(&self) {
        self.with(|s| s.running = false);
    }

    fn enabled(&self) -> u8 {
        self.with(|s| s.enabled)
    }

    fn pending(&self) -> u8 {
        self.with(|s| s.pending)
    }

    fn enable(&self, mask: u8) {
        self.with(|s| s.enabled |= mask);
    }

    fn disable(&self, mask: u8) {
        self.with(|s| s.enabled &= !mask);
    }

    fn clear(&self, mask: u8) {
        self.with(|s| s.pending &= !mask);
    }
}

/// Power seam that records every sleep entry instead of halting anything.
pub struct RecordingPower {
    pub entered: Vec<EnergyMode, 16>,
}

impl RecordingPower {
    pub fn new() -> Self {
        Self { entered: Vec::new() }
    }
}

impl Default for RecordingPower {
    fn default() -> Self {
        Self::new()
    }
}

impl PowerControl for RecordingPower {
    fn enter(&mut self, mode: EnergyMode) {
        self.entered.push(mode).ok();
    }
}
