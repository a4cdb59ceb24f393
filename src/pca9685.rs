//! A device abstraction for the PCA9685 16-channel, 12-bit PWM controller.
//!
//! [`Pca9685`] is a thin proxy over the chip's registers: it keeps no state
//! beyond the bus handle and address, so every read reflects the hardware.
//! See [`Pca9685`] for usage examples and [`shared`] for sharing one chip
//! between several owners.

pub mod shared;

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;

use crate::{Error, Result};

pub use shared::SharedPca9685;

/// Default 7-bit I2C address of the PCA9685 (all address pins low).
pub const DEFAULT_ADDRESS: u8 = 0x40;

/// Number of PWM channels on the chip.
pub const CHANNEL_COUNT: u8 = 16;

/// Largest duty value (always on).
pub const DUTY_MAX: u16 = 4095;

/// Internal oscillator frequency.
const OSCILLATOR_HZ: u32 = 25_000_000;

/// Ticks per PWM period.
const TICKS_PER_PERIOD: u32 = 4096;

/// Full-on / full-off flag (bit 12 of the ON and OFF registers).
const FULL_FLAG: u16 = 0x1000;

const PRESCALE_MIN: u8 = 3;
const PRESCALE_MAX: u8 = 255;

/// Oscillator settle time after leaving sleep.
const SETTLE_US: u32 = 5;

/// Register addresses and MODE1 bits.
pub mod reg {
    /// MODE1 register.
    pub const MODE1: u8 = 0x00;
    /// First channel register (`LED0_ON_L`); each channel uses 4 bytes.
    pub const LED0_ON_L: u8 = 0x06;
    /// PRE_SCALE register.
    pub const PRE_SCALE: u8 = 0xFE;

    /// MODE1 value written by [`reset`](super::Pca9685::reset).
    pub const MODE1_RESET: u8 = 0x00;
    /// MODE1 SLEEP bit.
    pub const MODE1_SLEEP: u8 = 0x10;
    /// Mask applied to MODE1 before setting SLEEP; clears RESTART.
    pub const MODE1_SLEEP_MASK: u8 = 0x7F;
    /// MODE1 RESTART | AI (auto-increment) | ALLCALL.
    pub const MODE1_RESTART_AI: u8 = 0xA1;

    /// Base register of `channel`'s 4-byte ON/OFF block (`channel < 16`).
    #[must_use]
    pub const fn channel_base(channel: u8) -> u8 {
        LED0_ON_L + 4 * channel
    }
}

/// Raw ON/OFF tick pair of one channel.
///
/// The output goes high at tick `on` and low at tick `off` within a
/// 4096-tick period. Bit 12 of either field is the chip's full-on/full-off
/// flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PwmTicks {
    /// Tick at which the output turns on.
    pub on: u16,
    /// Tick at which the output turns off.
    pub off: u16,
}

impl PwmTicks {
    /// Output permanently low.
    pub const ALWAYS_OFF: Self = Self::new(0, 4096);
    /// Output permanently high.
    pub const ALWAYS_ON: Self = Self::new(4096, 0);
    /// No pulse at all (both edges at tick 0); used to release a servo.
    pub const IDLE: Self = Self::new(0, 0);

    /// Create a tick pair.
    #[must_use]
    pub const fn new(on: u16, off: u16) -> Self {
        Self { on, off }
    }

    fn to_le_bytes(self) -> [u8; 4] {
        let [on_lo, on_hi] = self.on.to_le_bytes();
        let [off_lo, off_hi] = self.off.to_le_bytes();
        [on_lo, on_hi, off_lo, off_hi]
    }

    const fn from_le_bytes(bytes: [u8; 4]) -> Self {
        let [on_lo, on_hi, off_lo, off_hi] = bytes;
        Self {
            on: u16::from_le_bytes([on_lo, on_hi]),
            off: u16::from_le_bytes([off_lo, off_hi]),
        }
    }
}

/// Map a duty value to the ON/OFF pair written to the chip.
///
/// `0` and `4095` use the chip's full-off and full-on encodings; any other
/// value turns on at tick 0 and off at tick `value`. With `invert`, the value
/// is flipped to `4095 - value` first.
///
/// # Errors
///
/// Returns [`Error::DutyOutOfRange`] when `value > 4095`.
pub fn encode_duty<E>(value: u16, invert: bool) -> Result<PwmTicks, E> {
    if value > DUTY_MAX {
        return Err(Error::DutyOutOfRange(value));
    }
    let value = if invert { DUTY_MAX - value } else { value };
    Ok(match value {
        0 => PwmTicks::ALWAYS_OFF,
        DUTY_MAX => PwmTicks::ALWAYS_ON,
        _ => PwmTicks::new(0, value),
    })
}

/// Map an ON/OFF pair read from the chip back to a duty value.
///
/// Inverse of [`encode_duty`]. Only the exact full-off and full-on pairs are
/// special; any other pair reads as its OFF count (low 12 bits).
#[must_use]
pub const fn decode_duty(ticks: PwmTicks, invert: bool) -> u16 {
    let value = match (ticks.on, ticks.off) {
        (0, FULL_FLAG) => 0,
        (FULL_FLAG, 0) => DUTY_MAX,
        (_, off) => off & DUTY_MAX,
    };
    if invert { DUTY_MAX - value } else { value }
}

/// Prescale register value for `frequency_hz`, rounded to nearest.
///
/// Returns `None` when the result does not fit the chip's `3..=255` range.
#[must_use]
pub fn prescale_for(frequency_hz: u32) -> Option<u8> {
    let divisor = u64::from(TICKS_PER_PERIOD) * u64::from(frequency_hz);
    if divisor == 0 {
        return None;
    }
    let prescale = (u64::from(OSCILLATOR_HZ) + divisor / 2) / divisor;
    u8::try_from(prescale)
        .ok()
        .filter(|prescale| (PRESCALE_MIN..=PRESCALE_MAX).contains(prescale))
}

/// Output frequency implied by a prescale register value, truncated to whole Hz.
///
/// `25 MHz / 4096 / (prescale - 0.5)`, computed in integers.
#[must_use]
pub const fn frequency_for(prescale: u8) -> u32 {
    let half_steps = 2 * prescale as u32;
    if half_steps == 0 {
        return 0;
    }
    2 * OSCILLATOR_HZ / (TICKS_PER_PERIOD * (half_steps - 1))
}

/// A device abstraction for the PCA9685 PWM controller.
///
/// Owns the I2C bus handle and a delay provider (used for the oscillator
/// settle time when changing frequency). All methods go straight to the
/// chip's registers.
///
/// # Example
///
/// ```rust,no_run
/// use embedded_hal::delay::DelayNs;
/// use embedded_hal::i2c::I2c;
/// use m5unit_envoy::pca9685::Pca9685;
///
/// fn example<I: I2c, D: DelayNs>(i2c: I, delay: D) -> m5unit_envoy::Result<(), I::Error> {
///     let mut pca9685 = Pca9685::new(i2c, delay)?;
///     pca9685.set_frequency(1_000)?;
///     pca9685.set_duty(3, 2048, false)?; // channel 3 at 50%
///     assert_eq!(pca9685.duty(3, false)?, 2048);
///     Ok(())
/// }
/// ```
pub struct Pca9685<I2C, D> {
    i2c: I2C,
    delay: D,
    address: u8,
}

impl<I2C, D> Pca9685<I2C, D>
where
    I2C: I2c,
    D: DelayNs,
{
    /// Create a controller at [`DEFAULT_ADDRESS`] and reset it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Bus`] if the reset write fails.
    pub fn new(i2c: I2C, delay: D) -> Result<Self, I2C::Error> {
        Self::new_with_address(i2c, delay, DEFAULT_ADDRESS)
    }

    /// Create a controller at `address` and reset it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Bus`] if the reset write fails.
    pub fn new_with_address(i2c: I2C, delay: D, address: u8) -> Result<Self, I2C::Error> {
        let mut pca9685 = Self {
            i2c,
            delay,
            address,
        };
        pca9685.reset()?;
        Ok(pca9685)
    }

    /// 7-bit I2C address of this chip.
    #[must_use]
    pub const fn address(&self) -> u8 {
        self.address
    }

    /// Write the reset value to MODE1.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Bus`] if the write fails.
    pub fn reset(&mut self) -> Result<(), I2C::Error> {
        info!("pca9685 {=u8:#x}: reset", self.address);
        self.write_register(reg::MODE1, reg::MODE1_RESET)
    }

    /// Read the prescale register and return the frequency it produces.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Bus`] if the read fails.
    pub fn frequency(&mut self) -> Result<u32, I2C::Error> {
        let prescale = self.read_register(reg::PRE_SCALE)?;
        Ok(frequency_for(prescale))
    }

    /// Set the PWM output frequency of all channels.
    ///
    /// The chip only accepts a new prescale while asleep, so this reads MODE1,
    /// sleeps, writes the prescale, restores MODE1, waits for the oscillator
    /// and restarts with auto-increment enabled. The sequence depends on the
    /// MODE1 value captured at the start: nothing else may touch the chip
    /// until it returns. `&mut self` guarantees that for a single owner; use
    /// [`SharedPca9685`] when several owners share one chip.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FrequencyOutOfRange`] (before any bus traffic) when the
    /// prescale falls outside `3..=255`, or [`Error::Bus`] if a transfer fails.
    pub fn set_frequency(&mut self, frequency_hz: u32) -> Result<(), I2C::Error> {
        let prescale =
            prescale_for(frequency_hz).ok_or(Error::FrequencyOutOfRange(frequency_hz))?;
        debug!(
            "pca9685 {=u8:#x}: frequency {} Hz -> prescale {}",
            self.address,
            frequency_hz,
            prescale
        );

        let old_mode = self.read_register(reg::MODE1)?;
        self.write_register(
            reg::MODE1,
            (old_mode & reg::MODE1_SLEEP_MASK) | reg::MODE1_SLEEP,
        )?;
        self.write_register(reg::PRE_SCALE, prescale)?;
        self.write_register(reg::MODE1, old_mode)?;
        self.delay.delay_us(SETTLE_US);
        self.write_register(reg::MODE1, old_mode | reg::MODE1_RESTART_AI)
    }

    /// Read the raw ON/OFF ticks of `channel`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ChannelOutOfRange`] for `channel > 15`, or
    /// [`Error::Bus`] if the read fails.
    pub fn read_pwm(&mut self, channel: u8) -> Result<PwmTicks, I2C::Error> {
        let base = Self::channel_register(channel)?;
        let mut bytes = [0_u8; 4];
        self.i2c.write_read(self.address, &[base], &mut bytes)?;
        Ok(PwmTicks::from_le_bytes(bytes))
    }

    /// Write raw ON/OFF ticks to `channel`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ChannelOutOfRange`] for `channel > 15`, or
    /// [`Error::Bus`] if the write fails.
    pub fn write_pwm(&mut self, channel: u8, on: u16, off: u16) -> Result<(), I2C::Error> {
        let base = Self::channel_register(channel)?;
        let ticks = PwmTicks::new(on, off);
        trace!("pca9685 ch{}: on={} off={}", channel, on, off);
        let [on_lo, on_hi, off_lo, off_hi] = ticks.to_le_bytes();
        self.i2c
            .write(self.address, &[base, on_lo, on_hi, off_lo, off_hi])?;
        Ok(())
    }

    /// Read the duty value (`0..=4095`) of `channel`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ChannelOutOfRange`] for `channel > 15`, or
    /// [`Error::Bus`] if the read fails.
    pub fn duty(&mut self, channel: u8, invert: bool) -> Result<u16, I2C::Error> {
        let ticks = self.read_pwm(channel)?;
        Ok(decode_duty(ticks, invert))
    }

    /// Set the duty value (`0..=4095`) of `channel`.
    ///
    /// See [`encode_duty`] for how the value maps to register contents.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DutyOutOfRange`] or [`Error::ChannelOutOfRange`]
    /// without touching the bus, or [`Error::Bus`] if the write fails.
    pub fn set_duty(&mut self, channel: u8, value: u16, invert: bool) -> Result<(), I2C::Error> {
        Self::channel_register(channel)?;
        let ticks = encode_duty::<I2C::Error>(value, invert)?;
        self.write_pwm(channel, ticks.on, ticks.off)
    }

    /// Give back the bus and delay provider.
    pub fn release_bus(self) -> (I2C, D) {
        (self.i2c, self.delay)
    }

    fn channel_register(channel: u8) -> Result<u8, I2C::Error> {
        if channel < CHANNEL_COUNT {
            Ok(reg::channel_base(channel))
        } else {
            Err(Error::ChannelOutOfRange(channel))
        }
    }

    fn write_register(&mut self, register: u8, value: u8) -> Result<(), I2C::Error> {
        self.i2c.write(self.address, &[register, value])?;
        Ok(())
    }

    fn read_register(&mut self, register: u8) -> Result<u8, I2C::Error> {
        let mut buf = [0_u8; 1];
        self.i2c.write_read(self.address, &[register], &mut buf)?;
        let [value] = buf;
        Ok(value)
    }
}
