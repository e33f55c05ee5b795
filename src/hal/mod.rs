pub mod i2c;
pub mod serial;
pub mod spi;
pub mod tick;

// Re-export commonly used types
pub use i2c::{I2cBus, I2cConfig, I2cDevice, I2cEngine};
pub use serial::{SerialConfig, SerialEngine, SerialTx};
pub use spi::{SpiBus, SpiConfig, SpiEngine};
pub use tick::{TickConfig, TickEngine, TickTimer};

/// Transfer direction of a bus transaction.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Dir {
    Read,
    Write,
}

/// Register transactions can carry at most this many bytes; the result and
/// write payload both live in one 32-bit word, sliced MSB-first.
pub const MAX_TRANSFER_BYTES: u8 = 4;

/// Capability shared by the bus transaction engines.
///
/// Device drivers talk to a register-mapped peer through this contract and
/// never name a concrete engine. Starting a transfer while one is in flight
/// waits for the earlier transfer to retire, so consecutive starts complete
/// in initiation order.
pub trait RegisterBus {
    /// Begin a read of `len` bytes from `reg`, posting `done_evt` when the
    /// last byte has arrived.
    fn start_read(&self, reg: u8, len: u8, done_evt: u32);

    /// Begin a write of the `len` low-order bytes of `payload` to `reg`,
    /// MSB first, posting `done_evt` once the bus has gone quiet.
    fn start_write(&self, reg: u8, len: u8, payload: u32, done_evt: u32);

    /// Whether a transfer is still in flight.
    fn busy(&self) -> bool;

    /// Result word of the most recent completed read.
    fn result(&self) -> u32;
}

impl<T: RegisterBus + ?Sized> RegisterBus for &T {
    fn start_read(&self, reg: u8, len: u8, done_evt: u32) {
        (**self).start_read(reg, len, done_evt)
    }

    fn start_write(&self, reg: u8, len: u8, payload: u32, done_evt: u32) {
        (**self).start_write(reg, len, payload, done_evt)
    }

    fn busy(&self) -> bool {
        (**self).busy()
    }

    fn result(&self) -> u32 {
        (**self).result()
    }
}
