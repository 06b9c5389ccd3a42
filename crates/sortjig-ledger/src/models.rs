use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome flag stored on a ledger row.
///
/// Stored as INTEGER: 1 = accepted, 0 = rejected. Unknown serials are
/// persisted as rejected; their distinct classification kind lives only on
/// the event bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[repr(i32)]
pub enum ScanFlag {
    Rejected = 0,
    Accepted = 1,
}

impl ScanFlag {
    /// Returns `true` for accepted rows.
    #[must_use]
    pub fn is_accepted(self) -> bool {
        matches!(self, ScanFlag::Accepted)
    }
}

/// A persisted cartridge scan outcome.
///
/// Rows are created on every non-duplicate cartridge classification, never
/// mutated, and deleted only by the retention policy (oldest first).
/// `sequence_id` is strictly increasing and never reused, even after rows
/// are deleted; external consumers may treat it as a global scan counter.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct LedgerRecord {
    /// Auto-increment sequence, never reused.
    pub sequence_id: i64,

    /// When the scan was classified.
    pub scanned_at: DateTime<Utc>,

    /// Production line identifier.
    pub line: String,

    /// Cubicle (station) identifier.
    pub cubicle: String,

    /// Matrix (mould) identifier in effect for this scan.
    pub matrix_id: String,

    /// The cartridge serial code.
    pub cartridge_code: String,

    /// Accepted / rejected outcome.
    pub flag: ScanFlag,
}

/// A ledger row before insertion assigns its sequence id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLedgerRecord {
    pub scanned_at: DateTime<Utc>,
    pub line: String,
    pub cubicle: String,
    pub matrix_id: String,
    pub cartridge_code: String,
    pub flag: ScanFlag,
}

impl NewLedgerRecord {
    /// Build a record stamped with the current time.
    #[must_use]
    pub fn new(
        line: impl Into<String>,
        cubicle: impl Into<String>,
        matrix_id: impl Into<String>,
        cartridge_code: impl Into<String>,
        flag: ScanFlag,
    ) -> Self {
        Self {
            scanned_at: Utc::now(),
            line: line.into(),
            cubicle: cubicle.into(),
            matrix_id: matrix_id.into(),
            cartridge_code: cartridge_code.into(),
            flag,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_roundtrip_values() {
        assert_eq!(ScanFlag::Accepted as i32, 1);
        assert_eq!(ScanFlag::Rejected as i32, 0);
        assert!(ScanFlag::Accepted.is_accepted());
        assert!(!ScanFlag::Rejected.is_accepted());
    }
}
