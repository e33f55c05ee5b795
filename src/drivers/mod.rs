pub mod ble;
pub mod icm20648;
pub mod si1133;

pub use ble::Ble;
pub use icm20648::Icm20648;
pub use si1133::Si1133;
