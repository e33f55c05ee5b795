//! Pending-event bitset shared between interrupt handlers and the main loop.
//!
//! Each kind of deferred work owns one bit in a 32-bit set. Interrupt
//! handlers post bits, the main loop drains them. Because posting is an OR,
//! repeated posts of the same event coalesce instead of queueing.

use core::cell::Cell;
use critical_section::Mutex;

/// Event bitset with interrupt-safe add/remove.
pub struct Scheduler {
    events: Mutex<Cell<u32>>,
}

impl Scheduler {
    pub const fn new() -> Self {
        Self {
            events: Mutex::new(Cell::new(0)),
        }
    }

    /// Clear the whole set. Must run before any post or drain.
    pub fn open(&self) {
        critical_section::with(|cs| self.events.borrow(cs).set(0));
    }

    /// OR `event` into the set. Safe from interrupt and main contexts.
    pub fn post(&self, event: u32) {
        critical_section::with(|cs| {
            let events = self.events.borrow(cs);
            events.set(events.get() | event);
        });
    }

    /// Remove `event` from the set.
    pub fn clear(&self, event: u32) {
        critical_section::with(|cs| {
            let events = self.events.borrow(cs);
            events.set(events.get() & !event);
        });
    }

    /// Snapshot of the currently pending events.
    pub fn pending(&self) -> u32 {
        critical_section::with(|cs| self.events.borrow(cs).get())
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn posts_accumulate() {
        let sched = Scheduler::new();
        sched.open();
        sched.post(0x01);
        sched.post(0x04);
        assert_eq!(sched.pending(), 0x05);
    }

    #[test]
    fn duplicate_posts_coalesce() {
        let sched = Scheduler::new();
        sched.open();
        sched.post(0x08);
        sched.post(0x08);
        assert_eq!(sched.pending(), 0x08);
    }

    #[test]
    fn clear_removes_only_named_bits() {
        let sched = Scheduler::new();
        sched.open();
        sched.post(0x0F);
        sched.clear(0x05);
        assert_eq!(sched.pending(), 0x0A);
    }

    #[test]
    fn post_then_clear_restores_previous_set() {
        let sched = Scheduler::new();
        sched.open();
        sched.post(0x30);
        let before = sched.pending();
        sched.post(0x40);
        sched.clear(0x40);
        assert_eq!(sched.pending(), before);
    }

    #[test]
    fn open_resets_a_dirty_set() {
        let sched = Scheduler::new();
        sched.post(0xFFFF);
        sched.open();
        assert_eq!(sched.pending(), 0);
    }
}
