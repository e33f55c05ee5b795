//! Application layer: event handlers and the cooperative dispatch loop.

use heapless::String;

use crate::config;
use crate::drivers::{Ble, Icm20648, Si1133};
use crate::hal::serial::SerialTx;
use crate::hal::tick::{TickEngine, TickTimer};
use crate::hal::RegisterBus;
use crate::scheduler::Scheduler;
use crate::sleep::{PowerControl, SleepArbiter};

/// Top-level state machine of the sensing node.
///
/// Owns the drivers and the orientation tracking; the board's idle loop
/// calls [`App::step`] forever once everything is open.
pub struct App<'a, L, M, S, T>
where
    L: RegisterBus,
    M: RegisterBus,
    S: SerialTx,
    T: TickTimer,
{
    sched: &'a Scheduler,
    light: Si1133<L>,
    motion: Icm20648<M>,
    ble: Ble<'a, S>,
    tick: &'a TickEngine<'a, T>,
    facing_up: bool,
    first_sample: bool,
    samples: u32,
    cursor: u32,
}

impl<'a, L, M, S, T> App<'a, L, M, S, T>
where
    L: RegisterBus,
    M: RegisterBus,
    S: SerialTx,
    T: TickTimer,
{
    pub fn new(
        sched: &'a Scheduler,
        light: Si1133<L>,
        motion: Icm20648<M>,
        ble: Ble<'a, S>,
        tick: &'a TickEngine<'a, T>,
    ) -> Self {
        Self {
            sched,
            light,
            motion,
            ble,
            tick,
            facing_up: true,
            first_sample: true,
            samples: 0,
            cursor: 0,
        }
    }

    /// Reset the application state and queue the boot event; the first
    /// dispatch greets the host and starts the tick.
    pub fn open(&mut self) {
        self.facing_up = true;
        self.first_sample = true;
        self.samples = 0;
        self.cursor = 0;
        self.sched.post(config::BOOT_EVT);
    }

    /// Drain one snapshot of the event set, returning whether any handler
    /// ran.
    ///
    /// The scan starts one past the bit handled most recently, so a handler
    /// that keeps re-posting its own event cannot starve the others.
    pub fn dispatch(&mut self) -> bool {
        let pending = self.sched.pending();
        if pending == 0 {
            return false;
        }
        let start = self.cursor;
        let mut serviced = false;
        for offset in 0..32 {
            let bit = (start + offset) % 32;
            let mask = 1u32 << bit;
            if pending & mask != 0 {
                self.sched.clear(mask);
                self.cursor = (bit + 1) % 32;
                self.handle(mask);
                serviced = true;
            }
        }
        serviced
    }

    /// One pass of the idle loop: dispatch pending events, or sleep as deep
    /// as the arbiter allows when there was nothing to do.
    pub fn step(&mut self, arbiter: &SleepArbiter, power: &mut impl PowerControl) {
        if !self.dispatch() {
            arbiter.enter_sleep(power);
        }
    }

    fn handle(&mut self, event: u32) {
        match event {
            config::BOOT_EVT => self.on_boot(),
            config::TICK_MID_EVT => self.on_tick_mid(),
            config::TICK_END_EVT => self.on_tick_end(),
            config::LIGHT_READ_DONE_EVT => self.on_light_done(),
            config::MOTION_READ_DONE_EVT => self.on_motion_done(),
            config::SERIAL_TX_DONE_EVT => self.on_tx_done(),
            _ => unreachable!("event bit without a registered handler"),
        }
    }

    fn on_boot(&mut self) {
        self.ble.write("\nHello World\n");
        self.tick.start();
    }

    fn on_tick_mid(&mut self) {
        self.light.force();
    }

    fn on_tick_end(&mut self) {
        self.light.request(config::LIGHT_READ_DONE_EVT);
        self.motion.read_accel_z(config::MOTION_READ_DONE_EVT);

        self.samples = self.samples.wrapping_add(1);
        let mut line: String<32> = String::new();
        ufmt::uwrite!(line, "sample = {}\n", self.samples).ok();
        self.ble.write(&line);
    }

    fn on_light_done(&mut self) {
        let value = self.light.result();
        let mut line: String<48> = String::new();
        if value < config::LIGHT_THRESHOLD {
            ufmt::uwrite!(line, "It's dark = {}\n", value).ok();
        } else {
            ufmt::uwrite!(line, "It's light outside = {}\n", value).ok();
        }
        self.ble.write(&line);
    }

    fn on_motion_done(&mut self) {
        let sample = self.motion.result() as i16;
        let facing_up = sample >= config::UPSIDE_DOWN_LIMIT;
        let changed = self.first_sample || facing_up != self.facing_up;
        self.first_sample = false;
        self.facing_up = facing_up;
        if changed {
            self.ble
                .write(if facing_up { "Facing up\n" } else { "Upside down\n" });
        }
    }

    fn on_tx_done(&mut self) {
        // Nothing to drive; the bit exists so a drain can observe that the
        // radio link went quiet.
    }
}
