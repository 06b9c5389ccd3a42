use crate::reference::ReferenceSets;
use sortjig_core::constants::{DEFAULT_MATRIX_SENTINEL, MIN_CARTRIDGE_LENGTH, MIN_SCAN_LENGTH};
use sortjig_core::{
    BatchContext, ClassificationKind, ClassificationResult, JigConfig, Result, ScanOutcome,
};
use sortjig_ledger::{LedgerStore, NewLedgerRecord, ScanFlag};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Matrix id stamped on ledger rows before any matrix has been scanned.
const NO_MATRIX: &str = "NA";

/// Classifies one scan at a time.
///
/// Owns the current-matrix cell and the count-since-matrix counter; both
/// are single-writer because the validator runs only on the coordinator's
/// consumer task. Classification order:
///
/// 1. normalize (trim + uppercase), length floor;
/// 2. sentinel character first: matrix-type detection always wins over
///    cartridge-type detection, even for codes that could match both;
/// 3. cartridge length floor, batch duplicate predicate, ledger window;
/// 4. accept list, then reject list, then unknown;
/// 5. ledger row written for accepted/rejected/unknown before returning.
pub struct Validator {
    sets: ReferenceSets,
    store: Arc<LedgerStore>,
    sentinel: char,
    line: String,
    cubicle: String,
    batch: BatchContext,
    current_matrix: Option<String>,
    count_since_matrix: u64,
}

impl Validator {
    /// Build a validator, restoring the persisted current matrix and the
    /// count since the last marker move.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the persisted jig state cannot be read.
    pub async fn new(
        config: &JigConfig,
        sets: ReferenceSets,
        store: Arc<LedgerStore>,
    ) -> Result<Self> {
        let current_matrix = store.current_matrix().await?;
        let count_since_matrix = store.count_since_reset().await? as u64;
        if let Some(matrix) = &current_matrix {
            info!(matrix = %matrix, count = count_since_matrix, "restored matrix state");
        }
        Ok(Self {
            sets,
            store,
            sentinel: config.matrix_sentinel.to_ascii_uppercase(),
            line: config.line.clone(),
            cubicle: config.cubicle.clone(),
            batch: BatchContext::default(),
            current_matrix,
            count_since_matrix,
        })
    }

    /// Replace the batch parameters (line override, mould ranges, extra
    /// duplicate predicate).
    pub fn set_batch_context(&mut self, batch: BatchContext) {
        debug!(?batch, "batch context updated");
        self.batch = batch;
    }

    /// The matrix identifier currently in effect, if any.
    #[must_use]
    pub fn current_matrix(&self) -> Option<&str> {
        self.current_matrix.as_deref()
    }

    /// Cartridges classified since the matrix last changed.
    #[must_use]
    pub fn count_since_matrix(&self) -> u64 {
        self.count_since_matrix
    }

    /// Classify one scan.
    ///
    /// Storage failures come back as [`ScanOutcome::StorageFailure`] rather
    /// than an error: the scan is answered scanner-error and nothing is
    /// persisted for it, but the engine keeps running.
    pub async fn classify(&mut self, raw: &str) -> ScanOutcome {
        let code = raw.trim().to_uppercase();

        if code.chars().count() < MIN_SCAN_LENGTH {
            warn!(raw = %raw, "scan too short");
            return self.classified(ClassificationKind::FormatError, code);
        }

        // Sentinel check runs first: a matrix code is never mistaken for a
        // cartridge even if it would pass the cartridge length rule.
        if code.starts_with(self.sentinel) {
            return self.classify_matrix(code).await;
        }

        self.classify_cartridge(code).await
    }

    async fn classify_matrix(&mut self, code: String) -> ScanOutcome {
        let matrix_id = self.matrix_id_from(&code);

        if self.current_matrix.as_deref() == Some(matrix_id.as_str()) {
            debug!(matrix = %matrix_id, "repeated matrix scan ignored");
            return self.classified(ClassificationKind::DuplicateMatrix, code);
        }

        // Persist the new matrix and move the reset marker before exposing
        // the change, so a crash between the two cannot desync them.
        if let Err(e) = self.store.set_current_matrix(&matrix_id).await {
            return self.storage_failure(e.into());
        }
        if let Err(e) = self.store.reset_counter().await {
            return self.storage_failure(e.into());
        }

        info!(matrix = %matrix_id, previous = ?self.current_matrix, "matrix changed");
        self.current_matrix = Some(matrix_id);
        self.count_since_matrix = 0;
        self.classified(ClassificationKind::MatrixAccepted, code)
    }

    async fn classify_cartridge(&mut self, code: String) -> ScanOutcome {
        if code.chars().count() < MIN_CARTRIDGE_LENGTH {
            warn!(code = %code, "cartridge serial too short");
            return self.classified(ClassificationKind::FormatError, code);
        }

        if let Some(predicate) = &self.batch.duplicate_predicate
            && predicate(&code)
        {
            debug!(code = %code, "batch predicate flagged duplicate");
            return self.classified(ClassificationKind::DuplicateCartridge, code);
        }

        let kind = self.membership_kind(&code);
        let flag = match kind {
            ClassificationKind::CartridgeAccepted => ScanFlag::Accepted,
            _ => ScanFlag::Rejected,
        };

        let record = NewLedgerRecord::new(
            self.batch.line.as_deref().unwrap_or(&self.line),
            &self.cubicle,
            self.current_matrix.as_deref().unwrap_or(NO_MATRIX),
            &code,
            flag,
        );

        match self.store.record_cartridge(&record).await {
            Ok(Some(sequence_id)) => {
                self.count_since_matrix += 1;
                debug!(code = %code, %kind, sequence_id, "cartridge classified");
                self.classified(kind, code)
            }
            Ok(None) => {
                debug!(code = %code, "cartridge in recent-duplicate window");
                self.classified(ClassificationKind::DuplicateCartridge, code)
            }
            Err(e) => self.storage_failure(e.into()),
        }
    }

    /// Accept list wins, then reject list, then unknown. A serial on the
    /// accept list is still rejected when the running batch restricts
    /// moulds and the current matrix falls outside every range.
    fn membership_kind(&self, code: &str) -> ClassificationKind {
        if self.sets.contains_accept(code) {
            if self.matrix_in_batch() {
                ClassificationKind::CartridgeAccepted
            } else {
                warn!(
                    matrix = ?self.current_matrix,
                    "accepted serial rejected: matrix outside batch ranges"
                );
                ClassificationKind::CartridgeRejected
            }
        } else if self.sets.contains_reject(code) {
            ClassificationKind::CartridgeRejected
        } else {
            ClassificationKind::CartridgeUnknown
        }
    }

    fn matrix_in_batch(&self) -> bool {
        if self.batch.mould_ranges.is_empty() {
            return true;
        }
        let Some(matrix) = self.current_matrix.as_deref() else {
            return false;
        };
        self.batch.mould_ranges.iter().any(|r| r.contains(matrix))
    }

    /// When the sentinel is the standard leading letter it is part of the
    /// identifier and kept; any other sentinel is a pure marker and is
    /// stripped.
    fn matrix_id_from(&self, code: &str) -> String {
        if self.sentinel == DEFAULT_MATRIX_SENTINEL {
            code.to_string()
        } else {
            code.chars().skip(1).collect()
        }
    }

    fn classified(&self, kind: ClassificationKind, code: String) -> ScanOutcome {
        ScanOutcome::Classified(ClassificationResult {
            kind,
            code,
            mould_id: self.current_matrix.clone(),
            count_since_matrix: self.count_since_matrix,
        })
    }

    fn storage_failure(&self, error: sortjig_core::Error) -> ScanOutcome {
        warn!(%error, "ledger write failed; answering scanner-error");
        ScanOutcome::StorageFailure(error.to_string())
    }
}
