use core::fmt::Debug;

use derive_more::{Display, From};

/// Errors returned by the device abstractions in this crate.
///
/// `E` is the error type of the underlying I2C bus. Range errors are reported
/// before any register is written; bus errors are passed through unchanged.
#[derive(Debug, Display, From, Clone, Copy, PartialEq, Eq)]
pub enum Error<E> {
    /// A PWM channel index outside `0..=15`.
    #[display("channel {_0} is out of range (0..=15)")]
    ChannelOutOfRange(u8),

    /// A duty value outside `0..=4095`.
    #[display("duty {_0} is out of range (0..=4095)")]
    DutyOutOfRange(u16),

    /// A frequency whose prescale does not fit the chip's prescale register.
    #[display("frequency {_0} Hz is not reachable by the prescaler")]
    FrequencyOutOfRange(u32),

    /// Pulse widths that are inverted or do not fit in one PWM period.
    #[display("pulse range {min_us}..={max_us} us does not fit the PWM period")]
    InvalidPulseRange {
        /// Pulse width for the start of travel.
        min_us: u16,
        /// Pulse width for the end of travel.
        max_us: u16,
    },

    /// A servo angular range of zero degrees.
    #[display("servo angular range must be greater than zero")]
    InvalidAngleRange,

    /// The I2C transaction failed.
    #[display("bus transport failed: {_0:?}")]
    #[from]
    Bus(E),
}

impl<E: Debug> core::error::Error for Error<E> {}

/// Result type for this crate, generic over the bus error.
pub type Result<T, E> = core::result::Result<T, Error<E>>;
