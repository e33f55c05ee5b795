//! Si1133 ambient-light sensor driver.
//!
//! The sensor is command driven: parameters are loaded by writing the value
//! to INPUT0 and the parameter id to COMMAND, and every accepted command
//! bumps a 4-bit counter in RESPONSE0. Configuration leans on that counter
//! to confirm each step landed.

use crate::hal::RegisterBus;

/// 7-bit two-wire address.
pub const DEVICE_ADDRESS: u8 = 0x55;

const RESPONSE0_REG: u8 = 0x11;
const INPUT0_REG: u8 = 0x0A;
const COMMAND_REG: u8 = 0x0B;
const HOSTOUT0_REG: u8 = 0x13;

const ADCMUX_WHITE: u32 = 0b01011;
const PARAM_SET: u32 = 0b1000_0000;
const ADC_CONFIG0: u32 = 0x02;
const CHAN_LIST: u32 = 0x01;
const CHAN0_ENABLE: u32 = 0b1;
const FORCE_CMD: u32 = 0x11;
const CMD_COUNTER_MASK: u32 = 0xF;

/// White-light measurement driver over any register bus.
pub struct Si1133<D: RegisterBus> {
    dev: D,
}

impl<D: RegisterBus> Si1133<D> {
    pub fn new(dev: D) -> Self {
        Self { dev }
    }

    /// Configure channel 0 for white light. Halts if the sensor stops
    /// counting commands, since every later reading would be garbage.
    pub fn open(&self) {
        let counter = self.read_blocking(RESPONSE0_REG, 1) & CMD_COUNTER_MASK;

        self.write_blocking(INPUT0_REG, ADCMUX_WHITE);
        self.write_blocking(COMMAND_REG, PARAM_SET | ADC_CONFIG0);
        let after_mux = self.read_blocking(RESPONSE0_REG, 1) & CMD_COUNTER_MASK;
        assert!(
            after_mux == (counter + 1) % 16,
            "light sensor did not accept the ADC mux parameter"
        );

        self.write_blocking(INPUT0_REG, CHAN0_ENABLE);
        self.write_blocking(COMMAND_REG, PARAM_SET | CHAN_LIST);
        let after_chan = self.read_blocking(RESPONSE0_REG, 1) & CMD_COUNTER_MASK;
        assert!(
            after_chan == (counter + 2) % 16,
            "light sensor did not accept the channel list"
        );
    }

    /// Kick off one forced measurement; the result is fetched later with
    /// [`Si1133::request`].
    pub fn force(&self) {
        self.dev.start_write(COMMAND_REG, 1, FORCE_CMD, 0);
    }

    /// Read the 16-bit measurement, posting `done_evt` when it is in.
    pub fn request(&self, done_evt: u32) {
        self.dev.start_read(HOSTOUT0_REG, 2, done_evt);
    }

    /// Measurement from the last completed request.
    pub fn result(&self) -> u32 {
        self.dev.result()
    }

    fn read_blocking(&self, reg: u8, len: u8) -> u32 {
        self.dev.start_read(reg, len, 0);
        while self.dev.busy() {}
        self.dev.result()
    }

    fn write_blocking(&self, reg: u8, value: u32) {
        self.dev.start_write(reg, 1, value, 0);
        while self.dev.busy() {}
    }
}
