//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::convert::Infallible;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use embedded_hal::digital::v2::OutputPin;
use sensornode::hal::i2c::{ClockRatio, I2cConfig};
use sensornode::hal::serial::{Parity, SerialConfig, StopBits};
use sensornode::hal::spi::{ClockMode, SpiConfig};
use sensornode::hal::tick::TickConfig;
use sensornode::testing::{I2cPeer, SpiPeer};

pub fn i2c_cfg() -> I2cConfig {
    I2cConfig {
        freq_hz: 400_000,
        ratio: ClockRatio::Asymmetric,
        scl_route: 15,
        sda_route: 15,
    }
}

pub fn spi_cfg() -> SpiConfig {
    SpiConfig {
        baud_hz: 1_000_000,
        data_bits: 8,
        clock_mode: ClockMode::Mode3,
        msb_first: true,
        tx_route: 18,
        rx_route: 18,
        clk_route: 18,
    }
}

pub fn serial_cfg() -> SerialConfig {
    SerialConfig {
        baud_hz: 9600,
        parity: Parity::None,
        stop_bits: StopBits::One,
    }
}

pub fn tick_cfg(mid_evt: u32, end_evt: u32) -> TickConfig {
    TickConfig {
        period_s: 2.0,
        active_s: 0.002,
        clock_hz: 1_000,
        mid_evt,
        end_evt,
        mid_irq: true,
        end_irq: true,
    }
}

/// Drive one engine's interrupt entry until its transaction retires.
pub fn pump(busy: impl Fn() -> bool, isr: impl Fn()) {
    let mut rounds = 0;
    while busy() {
        isr();
        rounds += 1;
        assert!(rounds < 10_000, "engine never retired its transaction");
    }
}

/// Run `body` with a background thread standing in for the interrupt
/// controller: it keeps invoking `isr_all` so blocking starts and driver
/// configuration dialogues make progress exactly as they would on hardware.
pub fn with_pump<R>(isr_all: impl Fn() + Sync, body: impl FnOnce() -> R) -> R {
    struct StopOnExit<'a>(&'a AtomicBool);
    impl Drop for StopOnExit<'_> {
        fn drop(&mut self) {
            // Runs on unwind too, so a failing body cannot strand the pump.
            self.0.store(true, Ordering::Relaxed);
        }
    }

    let stop = AtomicBool::new(false);
    std::thread::scope(|scope| {
        scope.spawn(|| {
            while !stop.load(Ordering::Relaxed) {
                isr_all();
                std::thread::yield_now();
            }
        });
        let _guard = StopOnExit(&stop);
        body()
    })
}

/// Chip-select double that logs every level transition (true = high).
#[derive(Clone)]
pub struct StatePin {
    levels: Arc<Mutex<Vec<bool>>>,
}

impl StatePin {
    pub fn new() -> Self {
        Self {
            levels: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn levels(&self) -> Vec<bool> {
        self.levels.lock().unwrap().clone()
    }
}

impl OutputPin for StatePin {
    type Error = Infallible;

    fn set_low(&mut self) -> Result<(), Infallible> {
        self.levels.lock().unwrap().push(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Infallible> {
        self.levels.lock().unwrap().push(true);
        Ok(())
    }
}

/// Command-counter model of the light sensor.
pub struct LightSensorPeer {
    pub response: u8,
    pub input0: u8,
    pub adcmux: u8,
    pub chan_list: u8,
    pub hostout: u16,
}

impl LightSensorPeer {
    pub fn new(response: u8) -> Self {
        Self {
            response,
            input0: 0,
            adcmux: 0,
            chan_list: 0,
            hostout: 0,
        }
    }
}

impl I2cPeer for LightSensorPeer {
    fn read_reg(&mut self, reg: u8, index: usize) -> u8 {
        match reg {
            0x11 => self.response,
            0x13 => {
                if index == 0 {
                    (self.hostout >> 8) as u8
                } else {
                    self.hostout as u8
                }
            }
            _ => 0,
        }
    }

    fn write_reg(&mut self, reg: u8, data: &[u8]) {
        match reg {
            0x0A => self.input0 = data[0],
            0x0B => {
                let command = data[0];
                if command & 0x80 != 0 {
                    // Parameter set: value comes from INPUT0, the low bits
                    // name the parameter, and the counter advances.
                    match command & 0x3F {
                        0x02 => self.adcmux = self.input0,
                        0x01 => self.chan_list = self.input0,
                        _ => {}
                    }
                    self.response = (self.response + 1) & 0x0F;
                }
            }
            _ => {}
        }
    }
}

/// Banked register model of the motion sensor.
pub struct MotionSensorPeer {
    pub bank0: [u8; 128],
    pub bank2: [u8; 128],
    pub bank: u8,
    addr: u8,
}

impl MotionSensorPeer {
    pub fn new() -> Self {
        let mut bank0 = [0u8; 128];
        bank0[0x00] = 0xE0; // identity
        Self {
            bank0,
            bank2: [0; 128],
            bank: 0,
            addr: 0,
        }
    }

    pub fn set_accel_z(&mut self, sample: u16) {
        self.bank0[0x31] = (sample >> 8) as u8;
        self.bank0[0x32] = sample as u8;
    }
}

impl SpiPeer for MotionSensorPeer {
    fn exchange(&mut self, mosi: u8, index: usize) -> u8 {
        if index == 0 {
            self.addr = mosi;
            return 0x00;
        }
        let reg = (self.addr & 0x7F) as usize + index - 1;
        let reading = self.addr & 0x80 != 0;
        if reg == 0x7F {
            if reading {
                return self.bank;
            }
            self.bank = mosi;
            return mosi;
        }
        let bank = match self.bank {
            0x00 => &mut self.bank0,
            0x20 => &mut self.bank2,
            other => panic!("unexpected register bank {other:#04x}"),
        };
        if reading {
            bank[reg]
        } else {
            bank[reg] = mosi;
            mosi
        }
    }
}
