use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Which physical input channel produced a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanSource {
    /// The onboard UART-attached barcode reader.
    OnboardReader,
    /// USB keyboard-wedge scanner or manual text entry.
    ExternalInput,
}

impl fmt::Display for ScanSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanSource::OnboardReader => write!(f, "onboard reader"),
            ScanSource::ExternalInput => write!(f, "external input"),
        }
    }
}

/// Raw scan text as delivered by a producer.
///
/// Immutable once created. A `ScanEvent` is owned by the producer that made
/// it until it is handed to the coordinator's single inbox slot; after that
/// only the consumer touches it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanEvent {
    /// Scan text exactly as read, before trimming or case folding.
    pub raw_text: String,
    /// Input channel that produced the text.
    pub source: ScanSource,
    /// When the producer received the text.
    pub received_at: DateTime<Utc>,
}

impl ScanEvent {
    /// Create a scan event stamped with the current time.
    #[must_use]
    pub fn new(raw_text: impl Into<String>, source: ScanSource) -> Self {
        Self {
            raw_text: raw_text.into(),
            source,
            received_at: Utc::now(),
        }
    }
}

/// Outcome category of classifying one scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationKind {
    /// A new matrix (mould) identifier was accepted. Host-local bookkeeping
    /// only; never reported to the firmware.
    MatrixAccepted,
    /// Cartridge serial found in the accept reference list.
    CartridgeAccepted,
    /// Cartridge serial found in the reject reference list.
    CartridgeRejected,
    /// Cartridge serial in neither list. Answered like a rejection but kept
    /// distinct for audit.
    CartridgeUnknown,
    /// Matrix identifier equal to the current one; no state change.
    DuplicateMatrix,
    /// Cartridge serial already present in the recent-duplicate window.
    DuplicateCartridge,
    /// Scan text failed the length/pattern rules.
    FormatError,
}

impl ClassificationKind {
    /// Whether this outcome concerns a matrix identifier rather than a
    /// cartridge. Matrix outcomes produce no UART response byte.
    #[must_use]
    pub fn is_matrix(self) -> bool {
        matches!(
            self,
            ClassificationKind::MatrixAccepted | ClassificationKind::DuplicateMatrix
        )
    }

    /// Whether a ledger row is written for this outcome.
    #[must_use]
    pub fn writes_ledger(self) -> bool {
        matches!(
            self,
            ClassificationKind::CartridgeAccepted
                | ClassificationKind::CartridgeRejected
                | ClassificationKind::CartridgeUnknown
        )
    }
}

impl fmt::Display for ClassificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ClassificationKind::MatrixAccepted => "MatrixAccepted",
            ClassificationKind::CartridgeAccepted => "CartridgeAccepted",
            ClassificationKind::CartridgeRejected => "CartridgeRejected",
            ClassificationKind::CartridgeUnknown => "CartridgeUnknown",
            ClassificationKind::DuplicateMatrix => "DuplicateMatrix",
            ClassificationKind::DuplicateCartridge => "DuplicateCartridge",
            ClassificationKind::FormatError => "FormatError",
        };
        write!(f, "{}", s)
    }
}

/// Result of classifying one scan.
///
/// Produced by the validator, consumed by the protocol engine (response
/// byte selection) and republished to listeners.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub kind: ClassificationKind,
    /// Normalized (trimmed, uppercased) scan text.
    pub code: String,
    /// The matrix identifier in effect when the scan was classified, if any.
    pub mould_id: Option<String>,
    /// Cartridges classified since the matrix last changed.
    pub count_since_matrix: u64,
}

/// What the consumer hands back to the protocol engine for one scan.
///
/// Storage failures are not classifications: the engine answers
/// scanner-error for them, and nothing is persisted for the in-flight scan.
#[derive(Debug, Clone)]
pub enum ScanOutcome {
    Classified(ClassificationResult),
    /// The ledger write failed; message is for the operator log.
    StorageFailure(String),
}

/// Process-wide handshake state, single-writer.
///
/// Initialized to busy at process start. Only the orchestrator and the
/// protocol engine transition it; no other component writes the GPIO line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandshakeState {
    /// Logical level of the ready/busy line (HIGH = ready).
    pub ready: bool,
    /// A firmware scan request is outstanding.
    pub awaiting_scan: bool,
    /// Hardware trigger input is enabled in configuration.
    pub trigger_enabled: bool,
}

/// Events published to registered listeners (the excluded GUI front end
/// subscribes to these; the core has no dependency on subscriber identity).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "event")]
pub enum JigEvent {
    Classification(ClassificationResult),
    Handshake(HandshakeState),
    ProtocolError {
        message: String,
        /// Fatal errors stop the engine; non-fatal ones concern a single scan.
        fatal: bool,
    },
}

/// Inclusive range of acceptable mould identifiers for the running batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MouldRange {
    pub start: String,
    pub end: String,
}

impl MouldRange {
    /// Lexicographic containment check, matching how mould ids sort on the
    /// batch paperwork.
    #[must_use]
    pub fn contains(&self, mould_id: &str) -> bool {
        self.start.as_str() <= mould_id && mould_id <= self.end.as_str()
    }
}

/// Extra duplicate check injected by an external front end.
pub type DuplicatePredicate = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Batch parameters injected by the front end without the core depending on
/// its type.
#[derive(Clone, Default)]
pub struct BatchContext {
    /// Production line identifier stamped on ledger rows.
    pub line: Option<String>,
    /// Acceptable mould id ranges; empty means any mould is in batch.
    pub mould_ranges: Vec<MouldRange>,
    /// Additional duplicate predicate consulted before the ledger window.
    pub duplicate_predicate: Option<DuplicatePredicate>,
}

impl fmt::Debug for BatchContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchContext")
            .field("line", &self.line)
            .field("mould_ranges", &self.mould_ranges)
            .field(
                "duplicate_predicate",
                &self.duplicate_predicate.as_ref().map(|_| "<fn>"),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(ClassificationKind::MatrixAccepted, true, false)]
    #[case(ClassificationKind::DuplicateMatrix, true, false)]
    #[case(ClassificationKind::CartridgeAccepted, false, true)]
    #[case(ClassificationKind::CartridgeRejected, false, true)]
    #[case(ClassificationKind::CartridgeUnknown, false, true)]
    #[case(ClassificationKind::DuplicateCartridge, false, false)]
    #[case(ClassificationKind::FormatError, false, false)]
    fn kind_properties(
        #[case] kind: ClassificationKind,
        #[case] is_matrix: bool,
        #[case] writes_ledger: bool,
    ) {
        assert_eq!(kind.is_matrix(), is_matrix);
        assert_eq!(kind.writes_ledger(), writes_ledger);
    }

    #[test]
    fn mould_range_containment() {
        let range = MouldRange {
            start: "MX100".to_string(),
            end: "MX199".to_string(),
        };
        assert!(range.contains("MX100"));
        assert!(range.contains("MX150"));
        assert!(range.contains("MX199"));
        assert!(!range.contains("MX200"));
        assert!(!range.contains("MX099"));
    }

    #[test]
    fn jig_event_serializes_with_tag() {
        let event = JigEvent::ProtocolError {
            message: "port gone".to_string(),
            fatal: true,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"event\":\"protocol_error\""));
    }
}
