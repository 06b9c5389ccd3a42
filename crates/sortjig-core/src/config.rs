//! Jig configuration.
//!
//! One JSON file describes everything the operator can change without a
//! rebuild: station identity, input channels, serial port, ledger target,
//! reference list locations, and retention policy. The file is loaded once
//! at startup; editing it requires a restart, same as the reference lists.

use crate::constants::{
    DEFAULT_MATRIX_SENTINEL, DUPLICATE_WINDOW, READER_BAUD, RETENTION_CAP, UART_BAUD,
};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Station and pipeline configuration consumed by the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JigConfig {
    /// Production line identifier stamped on ledger rows.
    pub line: String,

    /// Cubicle (station) identifier stamped on ledger rows.
    pub cubicle: String,

    /// First character marking a scan as a matrix (mould) identifier.
    pub matrix_sentinel: char,

    /// Whether the hardware trigger input is wired and enabled.
    pub trigger_enabled: bool,

    /// Whether the onboard UART barcode reader is installed.
    pub onboard_reader: bool,

    /// Serial device of the onboard barcode reader.
    pub reader_port: String,

    /// Baud rate of the onboard reader.
    pub reader_baud: u32,

    /// Serial device for the firmware UART.
    pub uart_port: String,

    /// UART baud rate.
    pub baud_rate: u32,

    /// Accept ASCII digit-pair commands from pre-v20 firmware.
    pub legacy_byte_pairs: bool,

    /// SQLite database file for the scan ledger.
    pub database_path: String,

    /// Accept reference list (one serial per line).
    pub accept_list: PathBuf,

    /// Reject reference list (one serial per line).
    pub reject_list: PathBuf,

    /// Ledger row cap before oldest rows are deleted.
    pub retention_cap: i64,

    /// Recent-row window consulted for duplicate detection.
    pub duplicate_window: u32,

    /// GPIO number of the primary ready/busy line.
    pub ready_pin: u32,

    /// Secondary status pins mirrored to the primary level, for older
    /// firmware revisions. Usually empty.
    pub status_pins: Vec<u32>,
}

impl Default for JigConfig {
    fn default() -> Self {
        Self {
            line: "NA".to_string(),
            cubicle: "NA".to_string(),
            matrix_sentinel: DEFAULT_MATRIX_SENTINEL,
            trigger_enabled: false,
            onboard_reader: true,
            reader_port: "/dev/ttyUSB0".to_string(),
            reader_baud: READER_BAUD,
            uart_port: "/dev/ttyS0".to_string(),
            baud_rate: UART_BAUD,
            legacy_byte_pairs: false,
            database_path: "scanner.db".to_string(),
            accept_list: PathBuf::from("Acc.csv"),
            reject_list: PathBuf::from("Rej.csv"),
            retention_cap: RETENTION_CAP,
            duplicate_window: DUPLICATE_WINDOW,
            ready_pin: 18,
            status_pins: Vec::new(),
        }
    }
}

impl JigConfig {
    /// Load and validate a configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the file is missing, is not
    /// valid JSON, or fails [`JigConfig::validate`]. All of these are
    /// startup-fatal: the process must not reach listening with a broken
    /// configuration.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::Configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config: JigConfig = serde_json::from_str(&raw).map_err(|e| {
            Error::Configuration(format!("invalid config {}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check invariants that the type system cannot.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] for values that would misbehave at
    /// runtime (zero window, non-positive cap, non-ASCII sentinel).
    pub fn validate(&self) -> Result<()> {
        if !self.matrix_sentinel.is_ascii_alphanumeric() {
            return Err(Error::Configuration(format!(
                "matrix sentinel must be ASCII alphanumeric, got {:?}",
                self.matrix_sentinel
            )));
        }
        if self.duplicate_window == 0 {
            return Err(Error::Configuration(
                "duplicate window must be at least 1".to_string(),
            ));
        }
        if self.retention_cap <= 0 {
            return Err(Error::Configuration(
                "retention cap must be positive".to_string(),
            ));
        }
        if self.baud_rate == 0 {
            return Err(Error::Configuration("baud rate must be nonzero".to_string()));
        }
        if self.onboard_reader && self.reader_baud == 0 {
            return Err(Error::Configuration(
                "reader baud rate must be nonzero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        JigConfig::default().validate().unwrap();
    }

    #[test]
    fn load_partial_file_fills_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"line": "B", "cubicle": "7", "trigger_enabled": true}}"#
        )
        .unwrap();

        let config = JigConfig::load(file.path()).unwrap();
        assert_eq!(config.line, "B");
        assert_eq!(config.cubicle, "7");
        assert!(config.trigger_enabled);
        assert_eq!(config.matrix_sentinel, DEFAULT_MATRIX_SENTINEL);
        assert_eq!(config.retention_cap, RETENTION_CAP);
    }

    #[test]
    fn missing_file_is_configuration_error() {
        let err = JigConfig::load("/nonexistent/location.json").unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
        assert!(err.is_fatal());
    }

    #[test]
    fn zero_window_rejected() {
        let config = JigConfig {
            duplicate_window: 0,
            ..JigConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
