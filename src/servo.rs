//! A device abstraction for hobby positional servos driven by a PCA9685.
//!
//! [`Servos`] owns a [`Pca9685`] and turns positions given in degrees,
//! radians, pulse width or percent of travel into calibrated duty values on
//! any of its 16 channels. Calibration comes from a [`ServoConfig`] and is
//! fixed at construction.
//!
//! See [`Servos`] for usage examples.

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;

use crate::pca9685::{DEFAULT_ADDRESS, DUTY_MAX, Pca9685, PwmTicks, prescale_for};
use crate::{Error, Result};

/// Default servo PWM frequency (Hz), a 20 ms frame.
pub const SERVO_FREQUENCY_HZ_DEFAULT: u32 = 50;

/// Default minimum pulse width for hobby servos (microseconds).
pub const SERVO_MIN_US_DEFAULT: u16 = 400;

/// Default maximum pulse width for hobby servos (microseconds).
pub const SERVO_MAX_US_DEFAULT: u16 = 2_350;

/// Default angular travel between the minimum and maximum pulse (degrees).
pub const SERVO_MAX_DEGREES_DEFAULT: u16 = 180;

const MICROS_PER_SECOND: f64 = 1_000_000.0;

/// Calibration for [`Servos`].
///
/// Every field has a default; override only what your servos need.
///
/// ```rust
/// use m5unit_envoy::servo::ServoConfig;
///
/// const CONFIG: ServoConfig = ServoConfig::new().with_pulse_us(500, 2_500).with_max_degrees(270);
/// assert_eq!(CONFIG.frequency_hz, 50);
/// assert_eq!(CONFIG.max_degrees, 270);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ServoConfig {
    /// 7-bit I2C address of the PCA9685.
    pub address: u8,
    /// PWM frequency (Hz).
    pub frequency_hz: u32,
    /// Pulse width at the start of travel (microseconds).
    pub min_us: u16,
    /// Pulse width at the end of travel (microseconds).
    pub max_us: u16,
    /// Angular travel between `min_us` and `max_us` (degrees).
    pub max_degrees: u16,
}

impl ServoConfig {
    /// Configuration with all defaults.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            address: DEFAULT_ADDRESS,
            frequency_hz: SERVO_FREQUENCY_HZ_DEFAULT,
            min_us: SERVO_MIN_US_DEFAULT,
            max_us: SERVO_MAX_US_DEFAULT,
            max_degrees: SERVO_MAX_DEGREES_DEFAULT,
        }
    }

    /// Use a different I2C address.
    #[must_use]
    pub const fn with_address(self, address: u8) -> Self {
        Self { address, ..self }
    }

    /// Use a different PWM frequency.
    #[must_use]
    pub const fn with_frequency_hz(self, frequency_hz: u32) -> Self {
        Self {
            frequency_hz,
            ..self
        }
    }

    /// Use different pulse widths for the ends of travel.
    #[must_use]
    pub const fn with_pulse_us(self, min_us: u16, max_us: u16) -> Self {
        Self {
            min_us,
            max_us,
            ..self
        }
    }

    /// Use a different angular travel.
    #[must_use]
    pub const fn with_max_degrees(self, max_degrees: u16) -> Self {
        Self {
            max_degrees,
            ..self
        }
    }
}

impl Default for ServoConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// A position request for [`Servos::set_position`].
///
/// Angles and percentages are mapped linearly onto the calibrated duty range;
/// a pulse width is converted directly. Results outside the calibrated range
/// are clamped to it.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PositionInput {
    /// Angle from the start of travel, `0.0..=max_degrees`.
    Degrees(f64),
    /// Angle from the start of travel in radians.
    Radians(f64),
    /// Pulse width in microseconds.
    Microseconds(u32),
    /// Percent of travel, `0.0..=100.0`.
    Percent(f64),
    /// Do not move; report the channel's current duty.
    ReadCurrent,
}

/// A device abstraction for up to 16 hobby servos on one PCA9685.
///
/// # Examples
/// ```rust,no_run
/// use embedded_hal::delay::DelayNs;
/// use embedded_hal::i2c::I2c;
/// use m5unit_envoy::servo::{PositionInput, ServoConfig, Servos};
///
/// fn example<I: I2c, D: DelayNs>(i2c: I, delay: D) -> m5unit_envoy::Result<(), I::Error> {
///     // 50 Hz, 400..=2350 us over 180 degrees at address 0x40.
///     let mut servos = Servos::new(i2c, delay, ServoConfig::default())?;
///
///     servos.set_degrees(0, 90.0)?; // channel 0 to the middle
///     servos.set_position(1, PositionInput::Microseconds(1_500))?;
///     servos.set_percent(2, 25.0)?;
///     let duty = servos.position(0)?; // read back channel 0
///     assert_eq!(duty, 281);
///     servos.release(0)?; // let channel 0 relax
///     Ok(())
/// }
/// ```
pub struct Servos<I2C, D> {
    pca9685: Pca9685<I2C, D>,
    frequency_hz: u32,
    period_us: f64,
    min_duty: u16,
    max_duty: u16,
    max_degrees: u16,
}

impl<I2C, D> Servos<I2C, D>
where
    I2C: I2c,
    D: DelayNs,
{
    /// Create the servo driver, reset the PCA9685 and set its frequency.
    ///
    /// `min_duty` and `max_duty` are the pulse widths of `config` expressed in
    /// 12-bit ticks of one PWM period, rounded to nearest.
    ///
    /// # Errors
    ///
    /// Calibration problems are reported before any bus traffic:
    /// [`Error::InvalidAngleRange`] for `max_degrees == 0`,
    /// [`Error::InvalidPulseRange`] when `min_us > max_us` or `max_us` does
    /// not fit in one period, [`Error::FrequencyOutOfRange`] when the chip
    /// cannot produce `frequency_hz`. Bus failures return [`Error::Bus`].
    pub fn new(i2c: I2C, delay: D, config: ServoConfig) -> Result<Self, I2C::Error> {
        let ServoConfig {
            address,
            frequency_hz,
            min_us,
            max_us,
            max_degrees,
        } = config;

        if max_degrees == 0 {
            return Err(Error::InvalidAngleRange);
        }
        if min_us > max_us {
            return Err(Error::InvalidPulseRange { min_us, max_us });
        }
        if prescale_for(frequency_hz).is_none() {
            return Err(Error::FrequencyOutOfRange(frequency_hz));
        }

        let period_us = MICROS_PER_SECOND / f64::from(frequency_hz);
        let min_duty = round_duty(us_to_duty(f64::from(min_us), period_us));
        let max_duty = round_duty(us_to_duty(f64::from(max_us), period_us));
        if max_duty > DUTY_MAX {
            return Err(Error::InvalidPulseRange { min_us, max_us });
        }

        let mut pca9685 = Pca9685::new_with_address(i2c, delay, address)?;
        pca9685.set_frequency(frequency_hz)?;

        info!(
            "servos {=u8:#x}: {} Hz, duty {}..={} over {} deg",
            address,
            frequency_hz,
            min_duty,
            max_duty,
            max_degrees
        );

        Ok(Self {
            pca9685,
            frequency_hz,
            period_us,
            min_duty,
            max_duty,
            max_degrees,
        })
    }

    /// Move `channel` to `position` and return the duty written.
    ///
    /// With [`PositionInput::ReadCurrent`] nothing is written and the
    /// channel's current duty is returned as read from the chip.
    ///
    /// Out-of-range (or NaN) requests are clamped to `min_duty..=max_duty`;
    /// the clamped value is truncated to whole ticks.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ChannelOutOfRange`] for `channel > 15`, or
    /// [`Error::Bus`] if the transfer fails.
    pub fn set_position(&mut self, channel: u8, position: PositionInput) -> Result<u16, I2C::Error> {
        let min = f64::from(self.min_duty);
        let span = f64::from(self.max_duty - self.min_duty);
        let raw = match position {
            PositionInput::Degrees(degrees) => {
                min + span * degrees / f64::from(self.max_degrees)
            }
            PositionInput::Radians(radians) => {
                min + span * radians / f64::from(self.max_degrees).to_radians()
            }
            // Rounded to nearest; the truncation below keeps it.
            PositionInput::Microseconds(us) => us_to_duty(f64::from(us), self.period_us) + 0.5,
            PositionInput::Percent(percent) => min + span * percent / 100.0,
            PositionInput::ReadCurrent => return self.pca9685.duty(channel, false),
        };

        let (duty, clamped) = clamp_duty(raw, self.min_duty, self.max_duty);
        if clamped {
            warn!("servo ch{}: {} clamped to duty {}", channel, position, duty);
        }
        self.pca9685.set_duty(channel, duty, false)?;
        Ok(duty)
    }

    /// Move `channel` to an angle in degrees.
    ///
    /// # Errors
    ///
    /// See [`set_position`](Self::set_position).
    pub fn set_degrees(&mut self, channel: u8, degrees: f64) -> Result<u16, I2C::Error> {
        self.set_position(channel, PositionInput::Degrees(degrees))
    }

    /// Move `channel` to an angle in radians.
    ///
    /// # Errors
    ///
    /// See [`set_position`](Self::set_position).
    pub fn set_radians(&mut self, channel: u8, radians: f64) -> Result<u16, I2C::Error> {
        self.set_position(channel, PositionInput::Radians(radians))
    }

    /// Drive `channel` with a pulse width in microseconds.
    ///
    /// # Errors
    ///
    /// See [`set_position`](Self::set_position).
    pub fn set_pulse_us(&mut self, channel: u8, us: u32) -> Result<u16, I2C::Error> {
        self.set_position(channel, PositionInput::Microseconds(us))
    }

    /// Move `channel` to a percentage of its travel.
    ///
    /// # Errors
    ///
    /// See [`set_position`](Self::set_position).
    pub fn set_percent(&mut self, channel: u8, percent: f64) -> Result<u16, I2C::Error> {
        self.set_position(channel, PositionInput::Percent(percent))
    }

    /// Center (~midpoint of travel).
    ///
    /// # Errors
    ///
    /// See [`set_position`](Self::set_position).
    pub fn center(&mut self, channel: u8) -> Result<u16, I2C::Error> {
        self.set_percent(channel, 50.0)
    }

    /// Current duty of `channel`, as read from the chip.
    ///
    /// # Errors
    ///
    /// See [`set_position`](Self::set_position).
    pub fn position(&mut self, channel: u8) -> Result<u16, I2C::Error> {
        self.set_position(channel, PositionInput::ReadCurrent)
    }

    /// Stop sending pulses on `channel`.
    ///
    /// Writes ON = OFF = 0, so the output stays low and the servo stops
    /// holding its position. The next position request re-engages it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ChannelOutOfRange`] for `channel > 15`, or
    /// [`Error::Bus`] if the write fails.
    pub fn release(&mut self, channel: u8) -> Result<(), I2C::Error> {
        info!("servo ch{}: release", channel);
        self.pca9685
            .write_pwm(channel, PwmTicks::IDLE.on, PwmTicks::IDLE.off)
    }

    /// Duty at the start of travel.
    #[must_use]
    pub const fn min_duty(&self) -> u16 {
        self.min_duty
    }

    /// Duty at the end of travel.
    #[must_use]
    pub const fn max_duty(&self) -> u16 {
        self.max_duty
    }

    /// Configured PWM frequency (Hz).
    #[must_use]
    pub const fn frequency_hz(&self) -> u32 {
        self.frequency_hz
    }

    /// PWM period (microseconds).
    #[must_use]
    pub const fn period_us(&self) -> f64 {
        self.period_us
    }

    /// Angular travel (degrees).
    #[must_use]
    pub const fn max_degrees(&self) -> u16 {
        self.max_degrees
    }

    /// Direct access to the underlying controller.
    pub const fn pca9685_mut(&mut self) -> &mut Pca9685<I2C, D> {
        &mut self.pca9685
    }

    /// Give back the underlying controller.
    pub fn into_inner(self) -> Pca9685<I2C, D> {
        self.pca9685
    }
}

/// Truncate `raw` to whole ticks within `min_duty..=max_duty`.
///
/// The flag is set when the bounds changed the result, so a value that merely
/// truncates onto a bound (e.g. `481.6` with `max_duty == 481`) is not reported.
fn clamp_duty(raw: f64, min_duty: u16, max_duty: u16) -> (u16, bool) {
    let min = f64::from(min_duty);
    let max = f64::from(max_duty);
    // `max` picks the bound for NaN.
    let clamped = raw.max(min).min(max);
    #[expect(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        reason = "clamped into min_duty..=max_duty, a subrange of u16"
    )]
    let duty = clamped as u16;
    let in_range = raw >= min && raw < max + 1.0;
    (duty, !in_range)
}

fn us_to_duty(us: f64, period_us: f64) -> f64 {
    f64::from(DUTY_MAX) * us / period_us
}

fn round_duty(duty: f64) -> u16 {
    #[expect(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        reason = "saturating conversion; callers range-check the result"
    )]
    let rounded = (duty + 0.5) as u16;
    rounded
}

#[cfg(test)]
mod tests {
    use super::clamp_duty;

    #[test]
    fn clamp_reports_only_real_clamping() {
        assert_eq!(clamp_duty(281.5, 82, 481), (281, false));
        assert_eq!(clamp_duty(82.0, 82, 481), (82, false));
        // 2350 us at 50 Hz, plus the rounding half tick.
        assert_eq!(clamp_duty(481.6625, 82, 481), (481, false));
        assert_eq!(clamp_duty(482.0, 82, 481), (481, true));
        assert_eq!(clamp_duty(81.9, 82, 481), (82, true));
        assert_eq!(clamp_duty(f64::NAN, 82, 481), (82, true));
    }
}
