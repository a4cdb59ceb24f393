//! Device abstractions for M5Stack I2C units, on top of `embedded-hal` 1.0.
//!
//! - [`servo`]: up to 16 hobby servos on a PCA9685 (M5Stack Servo/8Servo
//!   units and hats), positioned in degrees, radians, microseconds or percent.
//! - [`pca9685`]: the PCA9685 PWM controller itself, plus a mutex-guarded
//!   [`SharedPca9685`](pca9685::SharedPca9685) for several owners.
//! - [`scroll`]: the Scroll unit (rotary encoder, button, RGB LED).
//!
//! Every driver takes any blocking [`embedded_hal::i2c::I2c`] bus, so the
//! same code runs on any HAL and, in tests, against a simulated register file.
//!
//! # Glossary
//!
//! - **Duty:** the high part of a PWM period as a 12-bit tick count, `0..=4095`.
//! - **Prescale:** divisor from the PCA9685's 25 MHz oscillator to its PWM
//!   frequency.
//! - **On/off ticks:** the ticks within a 4096-tick period at which a channel
//!   goes high and low.
//!
//! # Features
//!
//! - `defmt`: emit log messages through `defmt` (needs a global logger such
//!   as `defmt-rtt` in the application).
#![no_std]

// Must stay first so the log macros are visible in every module below.
#[macro_use]
mod fmt;

mod error;
pub mod pca9685;
pub mod scroll;
pub mod servo;

// Re-export error types and result (used throughout)
pub use crate::error::{Error, Result};
