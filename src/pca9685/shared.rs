//! Share one [`Pca9685`] between several owners.
//!
//! See [`SharedPca9685`] for details.

use core::cell::RefCell;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::RawMutex;
use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;

use super::Pca9685;
use crate::Result;

/// A [`Pca9685`] behind a blocking mutex.
///
/// [`Pca9685::set_frequency`] is a read-modify-write sequence over MODE1: a
/// register access from another owner between its first read and its last
/// write would be overwritten by the stale MODE1 value. Every method here
/// holds the lock for its whole register sequence, so owners that share a
/// `&SharedPca9685` never interleave.
///
/// Use `CriticalSectionRawMutex` when owners run in different interrupt
/// priorities or cores, `NoopRawMutex` when they all run on one executor.
///
/// # Example
///
/// ```rust,no_run
/// use embassy_sync::blocking_mutex::raw::NoopRawMutex;
/// use embedded_hal::delay::DelayNs;
/// use embedded_hal::i2c::I2c;
/// use m5unit_envoy::pca9685::{Pca9685, SharedPca9685};
///
/// fn example<I: I2c, D: DelayNs>(i2c: I, delay: D) -> m5unit_envoy::Result<(), I::Error> {
///     let shared: SharedPca9685<NoopRawMutex, _, _> = SharedPca9685::new(Pca9685::new(i2c, delay)?);
///     shared.set_frequency(50)?;
///     shared.set_duty(0, 300, false)?;
///     let ticks = shared.with(|pca9685| pca9685.read_pwm(0))?;
///     assert_eq!(ticks.off, 300);
///     Ok(())
/// }
/// ```
pub struct SharedPca9685<M: RawMutex, I2C, D> {
    pca9685: Mutex<M, RefCell<Pca9685<I2C, D>>>,
}

impl<M, I2C, D> SharedPca9685<M, I2C, D>
where
    M: RawMutex,
    I2C: I2c,
    D: DelayNs,
{
    /// Wrap a controller.
    #[must_use]
    pub const fn new(pca9685: Pca9685<I2C, D>) -> Self {
        Self {
            pca9685: Mutex::new(RefCell::new(pca9685)),
        }
    }

    /// Run `f` with exclusive access to the controller.
    ///
    /// # Panics
    ///
    /// Panics if called re-entrantly from inside `f`.
    pub fn with<R>(&self, f: impl FnOnce(&mut Pca9685<I2C, D>) -> R) -> R {
        self.pca9685.lock(|pca9685| {
            let mut pca9685_ref = pca9685.borrow_mut();
            f(&mut *pca9685_ref)
        })
    }

    /// Locked [`Pca9685::set_frequency`].
    ///
    /// # Errors
    ///
    /// See [`Pca9685::set_frequency`].
    pub fn set_frequency(&self, frequency_hz: u32) -> Result<(), I2C::Error> {
        self.with(|pca9685| pca9685.set_frequency(frequency_hz))
    }

    /// Locked [`Pca9685::frequency`].
    ///
    /// # Errors
    ///
    /// See [`Pca9685::frequency`].
    pub fn frequency(&self) -> Result<u32, I2C::Error> {
        self.with(Pca9685::frequency)
    }

    /// Locked [`Pca9685::set_duty`].
    ///
    /// # Errors
    ///
    /// See [`Pca9685::set_duty`].
    pub fn set_duty(&self, channel: u8, value: u16, invert: bool) -> Result<(), I2C::Error> {
        self.with(|pca9685| pca9685.set_duty(channel, value, invert))
    }

    /// Locked [`Pca9685::duty`].
    ///
    /// # Errors
    ///
    /// See [`Pca9685::duty`].
    pub fn duty(&self, channel: u8, invert: bool) -> Result<u16, I2C::Error> {
        self.with(|pca9685| pca9685.duty(channel, invert))
    }

    /// Unwrap the controller.
    pub fn into_inner(self) -> Pca9685<I2C, D> {
        self.pca9685.into_inner().into_inner()
    }
}
