//! Motion-sensor bring-up and orientation reporting.

mod common;

use common::{
    i2c_cfg, serial_cfg, spi_cfg, tick_cfg, with_pump, MotionSensorPeer, StatePin,
};
use sensornode::application::App;
use sensornode::config;
use sensornode::drivers::si1133::{self, Si1133};
use sensornode::drivers::{Ble, Icm20648};
use sensornode::hal::i2c::{I2cDevice, I2cEngine};
use sensornode::hal::serial::SerialEngine;
use sensornode::hal::spi::SpiEngine;
use sensornode::hal::tick::TickEngine;
use sensornode::scheduler::Scheduler;
use sensornode::sleep::{EnergyMode, SleepArbiter};
use sensornode::testing::{MockI2c, MockSerial, MockSpi, MockTick, RegFilePeer};

#[test]
fn open_configures_the_sensor_and_verifies_every_write() {
    let sched = Scheduler::new();
    sched.open();
    let arbiter = SleepArbiter::new(EnergyMode::Em2);
    arbiter.open();
    let bus = MockSpi::new(MotionSensorPeer::new());
    let engine = SpiEngine::new(&bus, StatePin::new(), &sched, &arbiter);
    engine.open(&spi_cfg());

    let motion = Icm20648::new(&engine);
    with_pump(|| engine.isr(), || motion.open());

    assert_eq!(bus.peer(|p| p.bank0[0x06]), 0b0010_1000);
    assert_eq!(bus.peer(|p| p.bank0[0x07]), 0b00_0111);
    assert_eq!(bus.peer(|p| p.bank0[0x05]), 0b0010_0000);
    assert_eq!(bus.peer(|p| p.bank2[0x13]), 60);
    // Back on bank 0 so the data registers are reachable again.
    assert_eq!(bus.peer(|p| p.bank), 0);
    assert_eq!(arbiter.first_blocked(), None);
}

#[test]
#[should_panic]
fn open_halts_on_an_unknown_identity() {
    let sched = Scheduler::new();
    sched.open();
    let arbiter = SleepArbiter::new(EnergyMode::Em2);
    arbiter.open();
    let mut peer = MotionSensorPeer::new();
    peer.bank0[0x00] = 0x12;
    let bus = MockSpi::new(peer);
    let engine = SpiEngine::new(&bus, StatePin::new(), &sched, &arbiter);
    engine.open(&spi_cfg());

    let motion = Icm20648::new(&engine);
    with_pump(|| engine.isr(), || motion.open());
}

#[test]
fn orientation_is_reported_once_per_transition() {
    let sched = Scheduler::new();
    sched.open();
    let arbiter = SleepArbiter::new(config::DEEPEST_SLEEP_MODE);
    arbiter.open();

    let i2c_bus = MockI2c::new(RegFilePeer::new());
    let i2c = I2cEngine::new(&i2c_bus, &sched, &arbiter);
    i2c.open(&i2c_cfg());
    let spi_bus = MockSpi::new(MotionSensorPeer::new());
    let spi = SpiEngine::new(&spi_bus, StatePin::new(), &sched, &arbiter);
    spi.open(&spi_cfg());
    let serial_port = MockSerial::new();
    let serial = SerialEngine::new(&serial_port, &sched, &arbiter);
    serial.open(&serial_cfg());
    let tick_timer = MockTick::new();
    let tick = TickEngine::new(&tick_timer, &sched);
    tick.open(&tick_cfg(config::TICK_MID_EVT, config::TICK_END_EVT));

    let light = Si1133::new(I2cDevice::new(&i2c, si1133::DEVICE_ADDRESS));
    let probe = Icm20648::new(&spi);
    let ble = Ble::new(&serial);
    ble.open(config::SERIAL_TX_DONE_EVT);
    let mut app = App::new(&sched, light, Icm20648::new(&spi), ble, &tick);

    with_pump(
        || {
            i2c.isr();
            spi.isr();
            serial.isr();
        },
        || {
            for sample in [0x0000u16, 0x8000, 0x8000] {
                spi_bus.peer(|p| p.set_accel_z(sample));
                probe.read_accel_z(config::MOTION_READ_DONE_EVT);
                while spi.is_busy() {}
                assert!(app.dispatch());
                while serial.busy() {}
            }
        },
    );

    // The first sample names the starting orientation; afterwards only
    // transitions speak, so the repeated upside-down sample stays silent.
    assert_eq!(&serial_port.take_tx()[..], b"Facing up\nUpside down\n");
}
