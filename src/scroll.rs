//! A device abstraction for the M5Stack Scroll unit (rotary encoder, push
//! button and one RGB LED behind an I2C microcontroller).
//!
//! See [`ScrollUnit`] for usage examples.

use embedded_hal::i2c::{I2c, Operation};

use crate::Result;

/// Predefined RGB colour constants from the `smart_leds` crate.
#[doc(inline)]
pub use smart_leds::colors;

/// RGB colour type used by the unit's LED.
pub use smart_leds::RGB8;

/// Default 7-bit I2C address of the Scroll unit.
pub const DEFAULT_ADDRESS: u8 = 0x40;

// Register addresses
mod reg {
    pub const COUNTER_VALUE: u8 = 0x10;
    pub const BUTTON_STATUS: u8 = 0x20;
    pub const RGB_LED: u8 = 0x30;
    pub const RESET: u8 = 0x40;
    pub const INCREMENTS: u8 = 0x50;
    pub const BOOTLOADER_VERSION: u8 = 0xFC;
    pub const FIRMWARE_VERSION: u8 = 0xFE;
}

const RESET_COUNTER: u8 = 0x01;

/// A device abstraction for the M5Stack Scroll unit.
///
/// The unit counts encoder detents in a signed 16-bit hardware counter.
/// [`rotary_value`](Self::rotary_value) reports that count relative to the
/// count seen at construction (or the last reset), shifted by a
/// caller-chosen start value.
///
/// # Example
///
/// ```rust,no_run
/// use embedded_hal::i2c::I2c;
/// use m5unit_envoy::scroll::{DEFAULT_ADDRESS, RGB8, ScrollUnit, colors};
///
/// fn example<I: I2c>(i2c: I) -> m5unit_envoy::Result<(), I::Error> {
///     let mut scroll = ScrollUnit::new(i2c, DEFAULT_ADDRESS)?;
///     scroll.set_rotary_value(100); // count from 100
///     scroll.fill_color(colors::GREEN)?;
///     if scroll.rotary_changed()? {
///         let value = scroll.rotary_value()?;
///         if value > 110 {
///             scroll.set_color(RGB8::new(255, 0, 0))?;
///         }
///     }
///     if scroll.button_pressed()? {
///         scroll.reset_rotary_value()?;
///     }
///     Ok(())
/// }
/// ```
pub struct ScrollUnit<I2C> {
    i2c: I2C,
    address: u8,
    last_value: i16,
    zero_value: i16,
    start_value: i32,
}

impl<I2C> ScrollUnit<I2C>
where
    I2C: I2c,
{
    /// Connect to the unit at `address`, reset its counter and take the
    /// current count as zero.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Bus`] if the unit does not answer.
    pub fn new(i2c: I2C, address: u8) -> Result<Self, I2C::Error> {
        let mut scroll = Self {
            i2c,
            address,
            last_value: 0,
            zero_value: 0,
            start_value: 0,
        };
        scroll.reset_rotary_value()?;
        let value = scroll.read_counter()?;
        scroll.last_value = value;
        scroll.zero_value = value;
        info!("scroll {=u8:#x}: zero at {}", address, value);
        Ok(scroll)
    }

    /// Whether the counter moved since it was last sampled by
    /// [`rotary_value`](Self::rotary_value).
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Bus`] if the read fails.
    pub fn rotary_changed(&mut self) -> Result<bool, I2C::Error> {
        Ok(self.read_counter()? != self.last_value)
    }

    /// Sample the counter and return it relative to zero, plus the start value.
    ///
    /// Saturates at the `i32` limits.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Bus`] if the read fails.
    pub fn rotary_value(&mut self) -> Result<i32, I2C::Error> {
        self.last_value = self.read_counter()?;
        // Two i16s always differ by less than i32::MAX.
        let moved = i32::from(self.last_value) - i32::from(self.zero_value);
        Ok(self.start_value.saturating_add(moved))
    }

    /// Offset future [`rotary_value`](Self::rotary_value) results by `value`.
    pub const fn set_rotary_value(&mut self, value: i32) {
        self.start_value = value;
    }

    /// Reset the hardware counter and clear the zero, last and start values.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Bus`] if the write fails.
    pub fn reset_rotary_value(&mut self) -> Result<(), I2C::Error> {
        debug!("scroll {=u8:#x}: reset counter", self.address);
        self.write_registers(reg::RESET, &[RESET_COUNTER])?;
        self.zero_value = 0;
        self.last_value = 0;
        self.start_value = 0;
        Ok(())
    }

    /// Detents turned since the unit last reported increments.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Bus`] if the read fails.
    pub fn rotary_increments(&mut self) -> Result<i16, I2C::Error> {
        self.read_i16(reg::INCREMENTS)
    }

    /// Whether the knob is pressed.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Bus`] if the read fails.
    pub fn button_pressed(&mut self) -> Result<bool, I2C::Error> {
        let [status, _] = self.read_registers::<2>(reg::BUTTON_STATUS)?;
        Ok(status == 0)
    }

    /// Set the LED colour.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Bus`] if the write fails.
    pub fn set_color(&mut self, color: RGB8) -> Result<(), I2C::Error> {
        // The unit has one LED; its colour bytes follow the index byte.
        self.write_registers(reg::RGB_LED + 1, &[color.r, color.g, color.b])
    }

    /// Set every LED to `color` (the unit has one).
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Bus`] if the write fails.
    pub fn fill_color(&mut self, color: RGB8) -> Result<(), I2C::Error> {
        self.set_color(color)
    }

    /// Bootloader version byte.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Bus`] if the read fails.
    pub fn bootloader_version(&mut self) -> Result<u8, I2C::Error> {
        let [version] = self.read_registers::<1>(reg::BOOTLOADER_VERSION)?;
        Ok(version)
    }

    /// Firmware version byte.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Bus`] if the read fails.
    pub fn firmware_version(&mut self) -> Result<u8, I2C::Error> {
        let [version] = self.read_registers::<1>(reg::FIRMWARE_VERSION)?;
        Ok(version)
    }

    /// Give back the bus.
    pub fn release_bus(self) -> I2C {
        self.i2c
    }

    fn read_counter(&mut self) -> Result<i16, I2C::Error> {
        self.read_i16(reg::COUNTER_VALUE)
    }

    fn read_i16(&mut self, register: u8) -> Result<i16, I2C::Error> {
        let [lo, hi, _, _] = self.read_registers::<4>(register)?;
        Ok(i16::from_le_bytes([lo, hi]))
    }

    fn read_registers<const N: usize>(&mut self, register: u8) -> Result<[u8; N], I2C::Error> {
        let mut buf = [0_u8; N];
        self.i2c.write_read(self.address, &[register], &mut buf)?;
        Ok(buf)
    }

    fn write_registers(&mut self, register: u8, data: &[u8]) -> Result<(), I2C::Error> {
        // Adjacent write operations go out as one I2C write.
        self.i2c.transaction(
            self.address,
            &mut [Operation::Write(&[register]), Operation::Write(data)],
        )?;
        Ok(())
    }
}
