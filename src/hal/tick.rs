//! Periodic tick from a low-energy timer in PWM mode.
//!
//! The counter reloads every period; a compare match part-way through marks
//! the active slice and the underflow marks the end of the period. Both
//! interrupts simply post their configured event, so a slow main loop may
//! find the mid-period and end-period bits set on the same drain.

use core::cell::Cell;
use critical_section::Mutex;

use crate::scheduler::Scheduler;

/// Interrupt sources consumed by the tick engine.
pub const INT_COMP: u8 = 1 << 0;
pub const INT_UF: u8 = 1 << 1;

/// Register-level operations of the tick timer.
pub trait TickTimer {
    /// Load the period reload value and the active-slice compare value, in
    /// timer clock ticks.
    fn configure(&self, top: u32, compare: u32);
    fn run(&self);
    fn halt(&self);
    fn enabled(&self) -> u8;
    fn pending(&self) -> u8;
    fn enable(&self, mask: u8);
    fn disable(&self, mask: u8);
    fn clear(&self, mask: u8);
}

impl<T: TickTimer + ?Sized> TickTimer for &T {
    fn configure(&self, top: u32, compare: u32) {
        (**self).configure(top, compare)
    }
    fn run(&self) {
        (**self).run()
    }
    fn halt(&self) {
        (**self).halt()
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
}

/// Tick cadence and event wiring.
pub struct TickConfig {
    pub period_s: f32,
    pub active_s: f32,
    pub clock_hz: u32,
    pub mid_evt: u32,
    pub end_evt: u32,
    pub mid_irq: bool,
    pub end_irq: bool,
}

/// Event source driven by the timer's compare and underflow interrupts.
pub struct TickEngine<'a, T: TickTimer> {
    timer: T,
    events: Mutex<Cell<(u32, u32)>>,
    sched: &'a Scheduler,
}

impl<'a, T: TickTimer> TickEngine<'a, T> {
    pub const fn new(timer: T, sched: &'a Scheduler) -> Self {
        Self {
            timer,
            events: Mutex::new(Cell::new((0, 0))),
            sched,
        }
    }

    /// Program the cadence and arm the requested interrupt sources. The
    /// counter stays halted until [`TickEngine::start`].
    pub fn open(&self, config: &TickConfig) {
        let top = (config.period_s * config.clock_hz as f32) as u32;
        let compare = (config.active_s * config.clock_hz as f32) as u32;
        self.timer.configure(top, compare);
        self.timer.clear(INT_COMP | INT_UF);
        if config.mid_irq {
            self.timer.enable(INT_COMP);
        }
        if config.end_irq {
            self.timer.enable(INT_UF);
        }
        critical_section::with(|cs| {
            self.events.borrow(cs).set((config.mid_evt, config.end_evt));
        });
    }

    pub fn start(&self) {
        self.timer.run();
    }

    pub fn stop(&self) {
        self.timer.halt();
    }

    /// Service the timer interrupt.
    pub fn isr(&self) {
        critical_section::with(|cs| {
            let flags = self.timer.pending() & self.timer.enabled();
            self.timer.clear(flags);
            let (mid_evt, end_evt) = self.events.borrow(cs).get();
            if flags & INT_COMP != 0 {
                self.sched.post(mid_evt);
            }
            if flags & INT_UF != 0 {
                self.sched.post(end_evt);
            }
        });
    }
}
