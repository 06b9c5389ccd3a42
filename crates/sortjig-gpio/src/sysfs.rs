//! `/sys/class/gpio` backed pin for the jig SBC.

use crate::error::{GpioError, Result};
use crate::traits::OutputPin;
use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;
use std::time::Duration;
use tracing::warn;

const EXPORT_RETRIES: u32 = 5;

/// Sysfs GPIO output pin.
///
/// Exports the pin if needed, sets direction, and keeps the `value` file
/// open for the lifetime of the pin. Export occasionally races with udev
/// applying permissions, so initialization retries a few times before
/// giving up.
#[derive(Debug)]
pub struct SysfsPin {
    pin: u32,
    value: File,
    level: bool,
}

impl SysfsPin {
    /// Export and configure a pin as output, driven to `initial` level.
    ///
    /// # Errors
    ///
    /// Returns [`GpioError::Export`] or [`GpioError::Configure`] when the
    /// sysfs interface rejects the pin after all retries.
    pub fn open(pin: u32, initial: bool) -> Result<Self> {
        let mut last_err = None;
        for attempt in 0..EXPORT_RETRIES {
            match Self::try_open(pin, initial) {
                Ok(p) => return Ok(p),
                Err(e) => {
                    warn!(pin, attempt, error = %e, "GPIO export attempt failed");
                    last_err = Some(e);
                    std::thread::sleep(Duration::from_millis(100));
                }
            }
        }
        Err(last_err.unwrap_or(GpioError::Export {
            pin,
            message: "exhausted retries".to_string(),
        }))
    }

    fn try_open(pin: u32, initial: bool) -> Result<Self> {
        let gpio_dir = format!("/sys/class/gpio/gpio{}", pin);
        if !Path::new(&gpio_dir).is_dir() {
            std::fs::write("/sys/class/gpio/export", format!("{}\n", pin)).map_err(|e| {
                GpioError::Export {
                    pin,
                    message: e.to_string(),
                }
            })?;
            // udev needs a moment to re-own the new files
            std::thread::sleep(Duration::from_millis(100));
        }

        let direction = if initial { "high" } else { "low" };
        std::fs::write(format!("{}/direction", gpio_dir), format!("{}\n", direction)).map_err(
            |e| GpioError::Configure {
                pin,
                message: e.to_string(),
            },
        )?;

        let value = OpenOptions::new()
            .read(true)
            .write(true)
            .open(format!("{}/value", gpio_dir))
            .map_err(|e| GpioError::Configure {
                pin,
                message: e.to_string(),
            })?;

        Ok(Self {
            pin,
            value,
            level: initial,
        })
    }

    fn write_level(&mut self, high: bool) -> Result<()> {
        let buf: &[u8] = if high { b"1\n" } else { b"0\n" };
        self.value.write_all(buf).map_err(|e| GpioError::Write {
            pin: self.pin,
            message: e.to_string(),
        })?;
        self.value
            .seek(SeekFrom::Start(0))
            .map_err(|e| GpioError::Write {
                pin: self.pin,
                message: e.to_string(),
            })?;
        self.level = high;
        Ok(())
    }

    /// GPIO number this pin drives.
    pub fn pin(&self) -> u32 {
        self.pin
    }
}

impl OutputPin for SysfsPin {
    fn set_high(&mut self) -> Result<()> {
        self.write_level(true)
    }

    fn set_low(&mut self) -> Result<()> {
        self.write_level(false)
    }

    fn is_high(&self) -> bool {
        self.level
    }
}

impl Drop for SysfsPin {
    fn drop(&mut self) {
        // Best effort: leave the pin unexported for the next process.
        if let Err(e) = std::fs::write("/sys/class/gpio/unexport", format!("{}\n", self.pin)) {
            warn!(pin = self.pin, error = %e, "GPIO unexport failed");
        }
    }
}
