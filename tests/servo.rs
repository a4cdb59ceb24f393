#![allow(missing_docs)]
//! Host-level tests for servo position conversion.

mod common;

use core::f64::consts::{FRAC_PI_2, PI};

use common::{Event, FakeBus, FakeBusError, FakeDelay};
use m5unit_envoy::Error;
use m5unit_envoy::pca9685::{DEFAULT_ADDRESS, PwmTicks, reg};
use m5unit_envoy::servo::{PositionInput, ServoConfig, Servos};

fn servos() -> (FakeBus, Servos<FakeBus, FakeDelay>) {
    servos_with(ServoConfig::default())
}

fn servos_with(config: ServoConfig) -> (FakeBus, Servos<FakeBus, FakeDelay>) {
    let bus = FakeBus::new(config.address);
    let servos = Servos::new(bus.clone(), bus.delay(), config).expect("valid calibration");
    bus.clear_events();
    (bus, servos)
}

fn last_write(bus: &FakeBus) -> (u8, Vec<u8>) {
    bus.state().writes().pop().expect("at least one write")
}

fn channel_write(channel: u8, ticks: PwmTicks) -> (u8, Vec<u8>) {
    let [on_lo, on_hi] = ticks.on.to_le_bytes();
    let [off_lo, off_hi] = ticks.off.to_le_bytes();
    (
        reg::channel_base(channel),
        vec![on_lo, on_hi, off_lo, off_hi],
    )
}

#[test]
fn default_calibration_matches_hobby_servo() {
    let (bus, servos) = servos();
    assert_eq!(servos.frequency_hz(), 50);
    assert!((servos.period_us() - 20_000.0).abs() < 1e-9);
    // round(4095 * 400 / 20000) and round(4095 * 2350 / 20000)
    assert_eq!(servos.min_duty(), 82);
    assert_eq!(servos.max_duty(), 481);
    assert_eq!(servos.max_degrees(), 180);
    assert_eq!(bus.register(reg::PRE_SCALE), 122);
}

#[test]
fn construction_resets_then_sets_frequency() {
    let bus = FakeBus::new(DEFAULT_ADDRESS);
    let _servos = Servos::new(bus.clone(), bus.delay(), ServoConfig::default())
        .expect("valid calibration");
    let events = bus.events();
    assert_eq!(
        events.first(),
        Some(&Event::Write {
            register: reg::MODE1,
            data: vec![0x00],
        })
    );
    assert!(events.contains(&Event::Write {
        register: reg::PRE_SCALE,
        data: vec![122],
    }));
    assert_eq!(
        events.last(),
        Some(&Event::Write {
            register: reg::MODE1,
            data: vec![0xA1],
        })
    );
}

#[test]
fn ninety_degrees_writes_truncated_midpoint() {
    let (bus, mut servos) = servos();
    // 82 + (481 - 82) * 90 / 180 = 281.5
    assert_eq!(servos.set_degrees(0, 90.0), Ok(281));
    assert_eq!(
        bus.events(),
        vec![Event::Write {
            register: 0x06,
            data: vec![0x00, 0x00, 0x19, 0x01],
        }]
    );
}

#[test]
fn degrees_clamp_to_travel() {
    let (_bus, mut servos) = servos();
    let at_max = servos.set_degrees(1, 180.0).expect("write succeeds");
    let beyond_max = servos.set_degrees(1, 360.0).expect("write succeeds");
    assert_eq!(at_max, 481);
    assert_eq!(beyond_max, at_max);
    assert_eq!(servos.set_degrees(1, -45.0), Ok(82));
    assert_eq!(servos.set_degrees(1, 0.0), Ok(82));
    assert_eq!(servos.set_degrees(1, f64::NAN), Ok(82));
}

#[test]
fn radians_map_like_degrees() {
    let (_bus, mut servos) = servos();
    assert_eq!(servos.set_radians(2, FRAC_PI_2), Ok(281));
    assert_eq!(servos.set_radians(2, 2.0 * PI), Ok(481));
    assert_eq!(
        servos.set_position(2, PositionInput::Radians(0.0)),
        Ok(82)
    );
}

#[test]
fn microseconds_round_then_clamp() {
    let (bus, mut servos) = servos();
    // round(4095 * 1500 / 20000) = round(307.125)
    assert_eq!(servos.set_pulse_us(3, 1_500), Ok(307));
    assert_eq!(last_write(&bus), channel_write(3, PwmTicks::new(0, 307)));
    // round(4095 * 1000 / 20000) = round(204.75)
    assert_eq!(servos.set_pulse_us(3, 1_000), Ok(205));
    // round(4095 * 2350 / 20000) = round(481.16), exactly max_duty
    assert_eq!(servos.set_pulse_us(3, 2_350), Ok(481));
    assert_eq!(servos.set_pulse_us(3, 10_000), Ok(481));
    assert_eq!(servos.set_pulse_us(3, 0), Ok(82));
}

#[test]
fn percent_maps_across_travel() {
    let (_bus, mut servos) = servos();
    assert_eq!(servos.set_percent(4, 0.0), Ok(82));
    assert_eq!(servos.set_percent(4, 50.0), Ok(281));
    assert_eq!(servos.set_percent(4, 100.0), Ok(481));
    assert_eq!(servos.set_percent(4, 150.0), Ok(481));
    assert_eq!(servos.center(4), Ok(281));
}

#[test]
fn read_current_returns_duty_without_writing() {
    let (bus, mut servos) = servos();
    servos.set_degrees(6, 45.0).expect("write succeeds");
    bus.clear_events();

    // 82 + 399 * 45 / 180 = 181.75
    assert_eq!(servos.position(6), Ok(181));
    assert_eq!(
        servos.set_position(6, PositionInput::ReadCurrent),
        Ok(181)
    );
    assert!(bus.state().writes().is_empty());
}

#[test]
fn release_writes_idle_pair() {
    let (bus, mut servos) = servos();
    servos.set_degrees(5, 120.0).expect("write succeeds");
    servos.release(5).expect("write succeeds");
    assert_eq!(last_write(&bus), channel_write(5, PwmTicks::new(0, 0)));
    assert_eq!(servos.position(5), Ok(0));

    servos.release(9).expect("write succeeds");
    assert_eq!(last_write(&bus), channel_write(9, PwmTicks::new(0, 0)));
}

#[test]
fn out_of_range_channel_is_rejected() {
    let (bus, mut servos) = servos();
    assert_eq!(
        servos.set_degrees(16, 90.0),
        Err(Error::ChannelOutOfRange(16))
    );
    assert_eq!(servos.release(16), Err(Error::ChannelOutOfRange(16)));
    assert!(bus.events().is_empty());
}

#[test]
fn custom_calibration() {
    let config = ServoConfig::new()
        .with_address(0x41)
        .with_frequency_hz(100)
        .with_pulse_us(500, 2_500)
        .with_max_degrees(270);
    let (bus, mut servos) = servos_with(config);
    // period 10000 us: round(4095 * 500 / 10000) and round(4095 * 2500 / 10000)
    assert_eq!(servos.min_duty(), 205);
    assert_eq!(servos.max_duty(), 1024);
    // 205 + 819 * 135 / 270 = 614.5
    assert_eq!(servos.set_degrees(0, 135.0), Ok(614));
    assert_eq!(bus.register(reg::PRE_SCALE), 61);

    let mut pca9685 = servos.into_inner();
    assert_eq!(pca9685.address(), 0x41);
    assert_eq!(pca9685.duty(0, false), Ok(614));
}

#[test]
fn invalid_calibration_is_rejected_before_bus_traffic() {
    let bus = FakeBus::new(DEFAULT_ADDRESS);
    let check = |config: ServoConfig| {
        Servos::new(bus.clone(), bus.delay(), config)
            .map(|_| ())
    };

    assert_eq!(
        check(ServoConfig::new().with_pulse_us(2_000, 1_000)),
        Err(Error::InvalidPulseRange {
            min_us: 2_000,
            max_us: 1_000,
        })
    );
    assert_eq!(
        check(ServoConfig::new().with_max_degrees(0)),
        Err(Error::InvalidAngleRange)
    );
    assert_eq!(
        check(ServoConfig::new().with_frequency_hz(10)),
        Err(Error::FrequencyOutOfRange(10))
    );
    // 1 kHz leaves a 1000 us period, too short for a 2350 us pulse.
    assert_eq!(
        check(ServoConfig::new().with_frequency_hz(1_000)),
        Err(Error::InvalidPulseRange {
            min_us: 400,
            max_us: 2_350,
        })
    );
    assert!(bus.events().is_empty());
}

#[test]
fn bus_failure_during_construction_propagates() {
    let bus = FakeBus::new(DEFAULT_ADDRESS);
    bus.state().fail = true;
    let result = Servos::new(bus.clone(), bus.delay(), ServoConfig::default()).map(|_| ());
    assert_eq!(result, Err(Error::Bus(FakeBusError::Nack)));
}
