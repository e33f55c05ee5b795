//! Energy-mode arbitration.
//!
//! Every subsystem that cannot survive a given energy mode blocks that mode
//! while it has work in flight. The idle loop then asks the arbiter for the
//! deepest mode the outstanding blocks still allow. Blocks are counted, so
//! two transactions on different peripherals may block the same mode and
//! release it independently.

use core::cell::RefCell;
use critical_section::Mutex;

/// Energy modes, shallowest (running) to deepest (shutdown).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EnergyMode {
    Em0 = 0,
    Em1 = 1,
    Em2 = 2,
    Em3 = 3,
    Em4 = 4,
}

pub const ENERGY_MODES: usize = 5;

/// A block counter past this value means unbalanced block/unblock calls.
const BLOCK_SANITY_CAP: u8 = 5;

impl EnergyMode {
    fn from_index(index: usize) -> Self {
        match index {
            0 => EnergyMode::Em0,
            1 => EnergyMode::Em1,
            2 => EnergyMode::Em2,
            3 => EnergyMode::Em3,
            4 => EnergyMode::Em4,
            _ => unreachable!(),
        }
    }

    /// Next mode toward running. `Em0` has nothing shallower and maps to
    /// itself, which the power seam treats as "stay awake".
    fn shallower(self) -> Self {
        match self {
            EnergyMode::Em0 | EnergyMode::Em1 => EnergyMode::Em0,
            EnergyMode::Em2 => EnergyMode::Em1,
            EnergyMode::Em3 => EnergyMode::Em2,
            EnergyMode::Em4 => EnergyMode::Em3,
        }
    }
}

/// Hardware seam for actually entering a sleep state.
///
/// The board crate maps each mode onto the energy-management unit; entering
/// `Em0` is a no-op. Test doubles record the requested mode instead.
pub trait PowerControl {
    fn enter(&mut self, mode: EnergyMode);
}

/// Per-mode block counters plus the deepest mode this build may ever enter.
pub struct SleepArbiter {
    blocks: Mutex<RefCell<[u8; ENERGY_MODES]>>,
    deepest: EnergyMode,
}

impl SleepArbiter {
    pub const fn new(deepest: EnergyMode) -> Self {
        Self {
            blocks: Mutex::new(RefCell::new([0; ENERGY_MODES])),
            deepest,
        }
    }

    /// Zero all counters. Must run before the first block/unblock.
    pub fn open(&self) {
        critical_section::with(|cs| {
            *self.blocks.borrow_ref_mut(cs) = [0; ENERGY_MODES];
        });
    }

    /// Forbid `mode` (and implicitly anything deeper) until unblocked.
    pub fn block(&self, mode: EnergyMode) {
        let count = critical_section::with(|cs| {
            let mut blocks = self.blocks.borrow_ref_mut(cs);
            blocks[mode as usize] += 1;
            blocks[mode as usize]
        });
        assert!(
            count < BLOCK_SANITY_CAP,
            "energy mode blocked more times than any caller could need"
        );
    }

    /// Release one block on `mode`.
    pub fn unblock(&self, mode: EnergyMode) {
        let balanced = critical_section::with(|cs| {
            let mut blocks = self.blocks.borrow_ref_mut(cs);
            if blocks[mode as usize] == 0 {
                false
            } else {
                blocks[mode as usize] -= 1;
                true
            }
        });
        assert!(balanced, "energy mode unblocked without a matching block");
    }

    /// Shallowest mode currently blocked, if any.
    pub fn first_blocked(&self) -> Option<EnergyMode> {
        critical_section::with(|cs| {
            let blocks = self.blocks.borrow_ref(cs);
            blocks
                .iter()
                .position(|&count| count > 0)
                .map(EnergyMode::from_index)
        })
    }

    /// Enter the deepest sleep the current block set allows.
    ///
    /// With mode `m` as the shallowest blocked mode, the device sleeps one
    /// step shallower than `m`; with nothing blocked it sleeps at the
    /// configured deepest mode. The selection runs inside a critical section
    /// so a block posted from an interrupt cannot slip between the decision
    /// and the entry.
    pub fn enter_sleep(&self, power: &mut impl PowerControl) {
        critical_section::with(|cs| {
            let blocks = self.blocks.borrow_ref(cs);
            let target = match blocks.iter().position(|&count| count > 0) {
                Some(index) => EnergyMode::from_index(index).shallower(),
                None => self.deepest,
            };
            power.enter(target.min(self.deepest));
        });
    }
}
