//! Wire-level tests of the two-wire transaction engine.

mod common;

use common::{i2c_cfg, pump};
use sensornode::hal::i2c::{I2cEngine, I2cRequest};
use sensornode::scheduler::Scheduler;
use sensornode::sleep::{EnergyMode, SleepArbiter};
use sensornode::testing::{MockI2c, RegFilePeer, WireEvent};

const DONE: u32 = 1 << 9;
const PEER: u8 = 0x55;

struct Fixture {
    sched: Scheduler,
    arbiter: SleepArbiter,
    bus: MockI2c<RegFilePeer>,
}

impl Fixture {
    fn new(regs: &[(u8, u8)]) -> Self {
        let sched = Scheduler::new();
        sched.open();
        let arbiter = SleepArbiter::new(EnergyMode::Em3);
        arbiter.open();
        Self {
            sched,
            arbiter,
            bus: MockI2c::new(RegFilePeer::with(regs)),
        }
    }

    fn engine(&self) -> I2cEngine<'_, &MockI2c<RegFilePeer>> {
        let engine = I2cEngine::new(&self.bus, &self.sched, &self.arbiter);
        engine.open(&i2c_cfg());
        self.bus.take_wire();
        engine
    }
}

#[test]
fn open_recovers_the_bus_before_use() {
    let fx = Fixture::new(&[]);
    let engine = I2cEngine::new(&fx.bus, &fx.sched, &fx.arbiter);
    engine.open(&i2c_cfg());
    assert!(fx.bus.was_configured());
    // The recovery pulse is a bare start/stop pair.
    assert_eq!(&fx.bus.take_wire()[..], &[WireEvent::Start, WireEvent::Stop]);
    assert!(!engine.busy());
}

#[test]
fn two_byte_read_assembles_msb_first() {
    let fx = Fixture::new(&[(0x13, 0x01), (0x14, 0x2C)]);
    let engine = fx.engine();

    engine.start(I2cRequest::read(PEER, 0x13, 2, DONE));
    assert!(engine.busy());
    pump(|| engine.busy(), || engine.isr());

    assert_eq!(engine.result(), 0x012C);
    assert_eq!(fx.sched.pending(), DONE);
    assert_eq!(fx.arbiter.first_blocked(), None);
}

#[test]
fn read_wire_sequence_matches_the_protocol() {
    let fx = Fixture::new(&[(0x13, 0x01), (0x14, 0x2C)]);
    let engine = fx.engine();

    engine.start(I2cRequest::read(PEER, 0x13, 2, DONE));
    pump(|| engine.busy(), || engine.isr());

    assert_eq!(
        &fx.bus.take_wire()[..],
        &[
            WireEvent::Start,
            WireEvent::Byte(PEER << 1),
            WireEvent::Byte(0x13),
            WireEvent::RepStart,
            WireEvent::Byte(PEER << 1 | 1),
            WireEvent::Ack,
            WireEvent::Nack,
            WireEvent::Stop,
        ]
    );
}

#[test]
fn single_byte_read_ends_with_nack_and_stop() {
    let fx = Fixture::new(&[(0x11, 0x0F)]);
    let engine = fx.engine();

    engine.start(I2cRequest::read(PEER, 0x11, 1, DONE));
    pump(|| engine.busy(), || engine.isr());

    assert_eq!(engine.result(), 0x0F);
    let wire = fx.bus.take_wire();
    assert_eq!(&wire[wire.len() - 2..], &[WireEvent::Nack, WireEvent::Stop]);
    // No master acknowledge was ever sent for a single byte.
    assert!(!wire.contains(&WireEvent::Ack));
}

#[test]
fn write_wire_sequence_carries_the_payload_msb_first() {
    let fx = Fixture::new(&[]);
    let engine = fx.engine();

    engine.start(I2cRequest::write(PEER, 0x0A, 2, 0x1234, DONE));
    pump(|| engine.busy(), || engine.isr());

    assert_eq!(
        &fx.bus.take_wire()[..],
        &[
            WireEvent::Start,
            WireEvent::Byte(PEER << 1),
            WireEvent::Byte(0x0A),
            WireEvent::Byte(0x12),
            WireEvent::Byte(0x34),
            WireEvent::Stop,
        ]
    );
    assert_eq!(fx.sched.pending(), DONE);
    assert_eq!(fx.bus.peer(|p| (p.regs[0x0A], p.regs[0x0B])), (0x12, 0x34));
}

#[test]
fn write_then_read_round_trips() {
    let fx = Fixture::new(&[]);
    let engine = fx.engine();

    engine.start(I2cRequest::write(PEER, 0x20, 3, 0x00ABCDEF, 0));
    pump(|| engine.busy(), || engine.isr());

    engine.start(I2cRequest::read(PEER, 0x20, 3, DONE));
    pump(|| engine.busy(), || engine.isr());

    assert_eq!(engine.result(), 0x00ABCDEF);
}

#[test]
fn bus_clock_mode_is_blocked_only_while_busy() {
    let fx = Fixture::new(&[(0x00, 0xAA)]);
    let engine = fx.engine();

    engine.start(I2cRequest::read(PEER, 0x00, 1, DONE));
    assert_eq!(fx.arbiter.first_blocked(), Some(EnergyMode::Em2));
    pump(|| engine.busy(), || engine.isr());
    assert_eq!(fx.arbiter.first_blocked(), None);
}

#[test]
fn completion_event_arrives_after_busy_clears() {
    let fx = Fixture::new(&[(0x00, 0xAA)]);
    let engine = fx.engine();

    engine.start(I2cRequest::read(PEER, 0x00, 1, DONE));
    while engine.busy() {
        // While the transaction lives, its completion must not be visible.
        assert_eq!(fx.sched.pending() & DONE, 0);
        engine.isr();
    }
    assert_eq!(fx.sched.pending(), DONE);
}

#[test]
#[should_panic]
fn zero_length_transfer_is_fatal() {
    let fx = Fixture::new(&[]);
    let engine = fx.engine();
    engine.start(I2cRequest::read(PEER, 0x00, 0, DONE));
}

#[test]
#[should_panic]
fn transfer_longer_than_the_result_word_is_fatal() {
    let fx = Fixture::new(&[]);
    let engine = fx.engine();
    engine.start(I2cRequest::read(PEER, 0x00, 5, DONE));
}
