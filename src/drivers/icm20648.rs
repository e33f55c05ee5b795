//! ICM-20648 motion sensor driver.
//!
//! Only the accelerometer Z axis is used; the part runs accelerometer-only
//! in duty-cycled low-power mode. Registers live in four banks selected
//! through REG_BANK_SEL, which reads back the same in every bank, so bank
//! switches are verified just like ordinary configuration writes.

use crate::hal::RegisterBus;

const WHO_AM_I_REG: u8 = 0x00; // bank 0
const LP_CONFIG_REG: u8 = 0x05; // bank 0
const PWR_MGMT_1_REG: u8 = 0x06; // bank 0
const PWR_MGMT_2_REG: u8 = 0x07; // bank 0
const ACCEL_WOM_THR_REG: u8 = 0x13; // bank 2
const ACCEL_ZOUT_H_REG: u8 = 0x31; // bank 0
const REG_BANK_SEL_REG: u8 = 0x7F;

const WHO_AM_I_VALUE: u32 = 0xE0;
const PWR_MGMT_1_LOW_POWER: u32 = 0b0010_1000;
const PWR_MGMT_2_ACCEL_ONLY: u32 = 0b00_0111;
const LP_CONFIG_ACCEL_CYCLE: u32 = 0b0010_0000;
const ACCEL_WOM_THRESHOLD: u32 = 60; // 240 mg
const BANK_0: u32 = 0b00_0000;
const BANK_2: u32 = 0b10_0000;

/// Accelerometer driver over any register bus.
pub struct Icm20648<D: RegisterBus> {
    dev: D,
}

impl<D: RegisterBus> Icm20648<D> {
    pub fn new(dev: D) -> Self {
        Self { dev }
    }

    /// Identify the part and bring the accelerometer up in low-power,
    /// duty-cycled mode with the wake-on-motion threshold loaded.
    pub fn open(&self) {
        let who = self.read_blocking(WHO_AM_I_REG);
        assert!(who == WHO_AM_I_VALUE, "motion sensor identity mismatch");

        self.write_verified(PWR_MGMT_1_REG, PWR_MGMT_1_LOW_POWER);
        self.write_verified(PWR_MGMT_2_REG, PWR_MGMT_2_ACCEL_ONLY);
        self.write_verified(LP_CONFIG_REG, LP_CONFIG_ACCEL_CYCLE);

        self.write_verified(REG_BANK_SEL_REG, BANK_2);
        self.write_verified(ACCEL_WOM_THR_REG, ACCEL_WOM_THRESHOLD);
        self.write_verified(REG_BANK_SEL_REG, BANK_0);
    }

    /// Read the two-byte vertical acceleration sample, posting `done_evt`
    /// when it is in.
    pub fn read_accel_z(&self, done_evt: u32) {
        self.dev.start_read(ACCEL_ZOUT_H_REG, 2, done_evt);
    }

    /// Sample from the last completed read, high byte first.
    pub fn result(&self) -> u16 {
        self.dev.result() as u16
    }

    fn read_blocking(&self, reg: u8) -> u32 {
        self.dev.start_read(reg, 1, 0);
        while self.dev.busy() {}
        self.dev.result()
    }

    fn write_verified(&self, reg: u8, value: u32) {
        self.dev.start_write(reg, 1, value, 0);
        while self.dev.busy() {}
        let back = self.read_blocking(reg);
        assert!(back == value, "motion sensor register readback mismatch");
    }
}
