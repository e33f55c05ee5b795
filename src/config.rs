//! Build-time configuration for the sensing node.

use crate::sleep::EnergyMode;

/// Clock feeding the low-energy tick timer, in Hz.
pub const TICK_CLOCK_HZ: u32 = 1_000;

/// Sampling period in seconds.
pub const TICK_PERIOD_S: f32 = 2.0;

/// Active slice of each period in seconds.
pub const TICK_ACTIVE_S: f32 = 0.002;

/// Deepest energy mode this build is allowed to enter while idle.
pub const DEEPEST_SLEEP_MODE: EnergyMode = EnergyMode::Em2;

/// Raw light readings at or above this count as daylight.
pub const LIGHT_THRESHOLD: u32 = 20;

/// Signed vertical-axis samples below this mean the board is upside down.
pub const UPSIDE_DOWN_LIMIT: i16 = 0;

/// Scheduler event bits.
pub const TICK_MID_EVT: u32 = 1 << 1;
pub const TICK_END_EVT: u32 = 1 << 2;
pub const LIGHT_READ_DONE_EVT: u32 = 1 << 3;
pub const BOOT_EVT: u32 = 1 << 4;
pub const SERIAL_TX_DONE_EVT: u32 = 1 << 7;
pub const MOTION_READ_DONE_EVT: u32 = 1 << 8;
