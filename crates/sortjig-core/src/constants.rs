//! Protocol and timing constants for the jig firmware handshake.
//!
//! The jig firmware drives the mechanical plate and talks to this host over
//! two channels at once:
//!
//! 1. A UART byte protocol (115200 8N1, no flow control): the firmware sends
//!    single command bytes, the host answers with single ASCII status bytes.
//! 2. A GPIO ready/busy line: logical HIGH means the host is ready for
//!    commands, LOW means it is busy processing.
//!
//! A complete scan cycle:
//!
//! ```text
//! firmware ── RETRY_SCAN/FINAL_SCAN ──▶ host
//! host     ── line LOW (busy), waits for scan text
//! host     ── response byte (A/R/D/S) ─▶ firmware
//! host     ── accept/reject plate pulse, then line HIGH (ready)
//! firmware ── advances the cartridge plate
//! ```
//!
//! The byte values and delays here were lifted from the firmware's wait
//! loops; changing them desynchronizes the plate mechanism.

use std::time::Duration;

// ============================================================================
// Firmware → host command bytes
// ============================================================================

/// Scan request with no retry budget left.
///
/// The firmware has exhausted its mechanical re-scan attempts; whatever the
/// host answers now decides where the cartridge goes.
pub const CMD_FINAL_SCAN: u8 = 0x13; // 19

/// Scan request with retry budget remaining.
pub const CMD_RETRY_SCAN: u8 = 0x14; // 20

/// End of recording. The firmware is done feeding cartridges; the host
/// asserts ready and keeps listening.
pub const CMD_STOP: u8 = 0x00;

/// Start-of-recording request. Acknowledged by asserting ready; no scan
/// cycle is started.
pub const CMD_START_RECORDING: u8 = 0x17; // 23

/// Auxiliary pairing command. Logged and otherwise ignored by this core.
pub const CMD_PAIRING: u8 = 0x18; // 24

// ============================================================================
// Host → firmware response bytes
// ============================================================================

/// Cartridge accepted; plate advances down the accept path.
pub const RES_ACCEPT: u8 = b'A';

/// Cartridge rejected (reject list, unknown serial, or malformed scan).
pub const RES_REJECT: u8 = b'R';

/// Cartridge already seen within the recent-duplicate window.
pub const RES_DUPLICATE: u8 = b'D';

/// Scanner error: no usable scan arrived before the firmware deadline, or
/// the host could not persist the result.
pub const RES_SCANNER_ERROR: u8 = b'S';

// ============================================================================
// Legacy byte-pair command encoding
// ============================================================================

/// ASCII command pairs used by pre-v20 firmware revisions.
///
/// Older firmware sent each command as two ASCII digits instead of one raw
/// byte. The pairs map onto the same commands: `"19"` → final scan, `"20"`
/// → retry scan, `"00"` → stop. Enabled via `legacy_byte_pairs` in the
/// protocol configuration; there is deliberately no second parser code path.
pub const LEGACY_FINAL_SCAN: &str = "19";

/// Legacy ASCII pair for [`CMD_RETRY_SCAN`].
pub const LEGACY_RETRY_SCAN: &str = "20";

/// Legacy ASCII pair for [`CMD_STOP`].
pub const LEGACY_STOP: &str = "00";

// ============================================================================
// UART link parameters
// ============================================================================

/// UART baud rate (8N1, no flow control).
pub const UART_BAUD: u32 = 115_200;

/// Baud rate of the onboard barcode reader's serial port.
pub const READER_BAUD: u32 = 9_600;

/// How long a single blocking read waits before re-checking for shutdown.
///
/// This bounds how stale a shutdown signal can get while the engine is
/// parked on the serial port: all blocked waits must notice shutdown within
/// one polling interval.
pub const READ_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Deadline for a classification to arrive after a scan request.
///
/// If no producer supplies usable scan text within this window the engine
/// answers [`RES_SCANNER_ERROR`] and returns to listening.
pub const SCAN_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Reopen attempts after a serial I/O failure before giving up.
pub const LINK_REOPEN_ATTEMPTS: u32 = 3;

/// Initial backoff between reopen attempts; doubles per attempt.
pub const LINK_REOPEN_BACKOFF: Duration = Duration::from_millis(500);

// ============================================================================
// GPIO pulse timing
// ============================================================================

/// Settle time between flushing the response byte and starting the plate
/// pulse. The firmware needs this long to latch the UART byte before it
/// starts watching the line.
pub const RESPONSE_SETTLE: Duration = Duration::from_millis(150);

/// Lead-in delay after asserting busy, before the pulse proper.
pub const PULSE_SETUP_DELAY: Duration = Duration::from_millis(50);

/// High-width of the accept pulse.
pub const ACCEPT_PULSE_WIDTH: Duration = Duration::from_millis(100);

/// High-width of the reject pulse.
///
/// Deliberately longer than [`ACCEPT_PULSE_WIDTH`]: the mechanical path to
/// the reject bin is longer and the firmware distinguishes the two outcomes
/// by pulse duration.
pub const REJECT_PULSE_WIDTH: Duration = Duration::from_millis(250);

/// Tail delay after the pulse before the line returns to ready.
pub const PULSE_TAIL_DELAY: Duration = Duration::from_millis(50);

/// Delay used by the startup/shutdown handshake scripts between level
/// changes.
pub const HANDSHAKE_STEP_DELAY: Duration = Duration::from_millis(200);

// ============================================================================
// Scan text constraints
// ============================================================================

/// Scans shorter than this are noise from the optical reader, not codes.
pub const MIN_SCAN_LENGTH: usize = 4;

/// Longest scan line the onboard reader can produce. A buffer that fills
/// to this length without a terminator is delivered as a complete line,
/// matching the reader's own transmit limit.
pub const MAX_SCAN_LINE: usize = 50;

/// Minimum length of a cartridge serial code.
pub const MIN_CARTRIDGE_LENGTH: usize = 10;

/// Default sentinel character marking a matrix (mould) identifier.
pub const DEFAULT_MATRIX_SENTINEL: char = 'M';

// ============================================================================
// Ledger policy
// ============================================================================

/// Number of most-recent ledger rows consulted for duplicate detection.
pub const DUPLICATE_WINDOW: u32 = 50;

/// Row-count cap before the retention policy deletes oldest rows.
pub const RETENTION_CAP: i64 = 500_000;
