//! Output pin abstraction.

use crate::error::Result;

/// A single GPIO output pin.
///
/// # Safety Invariants
///
/// - Only one owner per pin instance; no concurrent access to the same
///   physical pin from multiple contexts. [`crate::ReadyLine`] enforces
///   this for the handshake line by taking ownership of its pins.
/// - Level writes are fast and non-blocking; all pulse timing lives above
///   this trait, in the line owner.
pub trait OutputPin: Send {
    /// Drive the pin high (logic level 1).
    ///
    /// # Errors
    ///
    /// Returns [`crate::GpioError::Write`] if the level cannot be driven.
    fn set_high(&mut self) -> Result<()>;

    /// Drive the pin low (logic level 0).
    ///
    /// # Errors
    ///
    /// Returns [`crate::GpioError::Write`] if the level cannot be driven.
    fn set_low(&mut self) -> Result<()>;

    /// Drive the pin to an explicit level.
    ///
    /// # Errors
    ///
    /// Returns [`crate::GpioError::Write`] if the level cannot be driven.
    fn set_level(&mut self, high: bool) -> Result<()> {
        if high { self.set_high() } else { self.set_low() }
    }

    /// Last level driven (`true` = high).
    fn is_high(&self) -> bool;
}
