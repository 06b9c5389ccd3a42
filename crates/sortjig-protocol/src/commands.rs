//! Command and response byte model, plus the wire decoder.

use sortjig_core::ClassificationKind;
use sortjig_core::constants::{
    CMD_FINAL_SCAN, CMD_PAIRING, CMD_RETRY_SCAN, CMD_START_RECORDING, CMD_STOP,
    LEGACY_FINAL_SCAN, LEGACY_RETRY_SCAN, LEGACY_STOP, RES_ACCEPT, RES_DUPLICATE, RES_REJECT,
    RES_SCANNER_ERROR,
};
use std::fmt;
use tracing::{debug, warn};

/// Firmware → host command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Scan request with no retry budget left.
    FinalScan,
    /// Scan request with retry budget remaining.
    RetryScan,
    /// End of recording; host asserts ready and keeps listening.
    Stop,
    /// Start of recording; acknowledged by asserting ready.
    StartRecording,
    /// Pairing request; logged and ignored by this core.
    Pairing,
}

impl Command {
    /// Decode a single command byte.
    #[must_use]
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            CMD_FINAL_SCAN => Some(Command::FinalScan),
            CMD_RETRY_SCAN => Some(Command::RetryScan),
            CMD_STOP => Some(Command::Stop),
            CMD_START_RECORDING => Some(Command::StartRecording),
            CMD_PAIRING => Some(Command::Pairing),
            _ => None,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Command::FinalScan => "FINAL_SCAN",
            Command::RetryScan => "RETRY_SCAN",
            Command::Stop => "STOP",
            Command::StartRecording => "START_RECORDING",
            Command::Pairing => "PAIRING",
        };
        write!(f, "{}", s)
    }
}

/// Host → firmware response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Response {
    Accept,
    Reject,
    Duplicate,
    ScannerError,
}

impl Response {
    /// The wire byte for this response.
    #[must_use]
    pub fn byte(self) -> u8 {
        match self {
            Response::Accept => RES_ACCEPT,
            Response::Reject => RES_REJECT,
            Response::Duplicate => RES_DUPLICATE,
            Response::ScannerError => RES_SCANNER_ERROR,
        }
    }

    /// Map a classification outcome to its response byte.
    ///
    /// Matrix outcomes map to `None`: they are host-local bookkeeping and
    /// are never reported to the firmware.
    #[must_use]
    pub fn for_kind(kind: ClassificationKind) -> Option<Self> {
        match kind {
            ClassificationKind::CartridgeAccepted => Some(Response::Accept),
            ClassificationKind::CartridgeRejected
            | ClassificationKind::CartridgeUnknown
            | ClassificationKind::FormatError => Some(Response::Reject),
            ClassificationKind::DuplicateCartridge => Some(Response::Duplicate),
            ClassificationKind::MatrixAccepted | ClassificationKind::DuplicateMatrix => None,
        }
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Response::Accept => "ACCEPT",
            Response::Reject => "REJECT",
            Response::Duplicate => "DUPLICATE",
            Response::ScannerError => "SCANNER_ERROR",
        };
        write!(f, "{}", s)
    }
}

/// Incremental command decoder.
///
/// One decoder handles both wire encodings: current firmware sends one raw
/// command byte; pre-v20 firmware sends each command as two ASCII digits
/// (`"19"`, `"20"`, `"00"`). The mode is fixed at construction; there is
/// deliberately no second parser code path for the legacy encoding, only a
/// pairing step in front of the same command set.
#[derive(Debug)]
pub struct CommandDecoder {
    legacy_byte_pairs: bool,
    pending_digit: Option<u8>,
}

impl CommandDecoder {
    /// Create a decoder for the configured wire encoding.
    #[must_use]
    pub fn new(legacy_byte_pairs: bool) -> Self {
        Self {
            legacy_byte_pairs,
            pending_digit: None,
        }
    }

    /// Feed one received byte; returns a command when one completes.
    ///
    /// Unknown bytes (and, in legacy mode, unknown digit pairs or
    /// non-digit bytes) are logged and discarded.
    pub fn feed(&mut self, byte: u8) -> Option<Command> {
        if !self.legacy_byte_pairs {
            let command = Command::from_byte(byte);
            if command.is_none() {
                debug!(byte, "unknown command byte ignored");
            }
            return command;
        }

        if !byte.is_ascii_digit() {
            if self.pending_digit.take().is_some() {
                warn!(byte, "non-digit inside legacy pair; resynchronizing");
            } else {
                debug!(byte, "non-digit byte ignored in legacy mode");
            }
            return None;
        }

        match self.pending_digit.take() {
            None => {
                self.pending_digit = Some(byte);
                None
            }
            Some(first) => {
                let pair = [first, byte];
                let pair = std::str::from_utf8(&pair).ok()?;
                match pair {
                    LEGACY_FINAL_SCAN => Some(Command::FinalScan),
                    LEGACY_RETRY_SCAN => Some(Command::RetryScan),
                    LEGACY_STOP => Some(Command::Stop),
                    other => {
                        warn!(pair = other, "unknown legacy command pair ignored");
                        None
                    }
                }
            }
        }
    }
}
