//! Core runtime for a battery-powered BLE sensing node.
//!
//! A cooperative main loop drains a bitset of pending events while every
//! peripheral transaction runs from interrupts: a two-wire master for the
//! ambient-light sensor, a four-wire master for the motion sensor, and an
//! asynchronous transmitter for the radio link. Each engine blocks the
//! shallowest energy mode it cannot survive while a transfer is in flight,
//! and the sleep arbiter picks the deepest mode the remaining blocks allow
//! whenever the loop runs dry.
//!
//! The crate is chip-agnostic. A board crate implements the port traits
//! ([`hal::I2cBus`], [`hal::SpiBus`], [`hal::SerialTx`], [`hal::TickTimer`]
//! and [`sleep::PowerControl`]) over the vendor register blocks, forwards
//! the peripheral interrupts to the engines' `isr` entry points, and runs
//!
//! ```ignore
//! loop {
//!     app.step(&ARBITER, &mut emu);
//! }
//! ```
//!
//! from its idle loop after opening the engines and drivers.

#![cfg_attr(not(test), no_std)]

pub mod application;
pub mod config;
pub mod drivers;
pub mod hal;
pub mod scheduler;
pub mod sleep;
pub mod testing;
