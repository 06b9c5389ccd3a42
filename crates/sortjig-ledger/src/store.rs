use crate::connection::Database;
use crate::error::{StorageError, StorageResult};
use crate::models::{LedgerRecord, NewLedgerRecord};
use sortjig_core::constants::{DUPLICATE_WINDOW, RETENTION_CAP};
use sqlx::{Row, Sqlite, Transaction};
use tracing::{debug, info, warn};

/// `jig_state` key holding the sequence id at the last counter reset.
const KEY_RESET_MARKER: &str = "last_reset_seq";

/// `jig_state` key holding the active matrix identifier.
const KEY_CURRENT_MATRIX: &str = "current_matrix";

/// Append-only scan ledger with bounded retention.
///
/// All mutating operations run inside a single transaction, so a crash
/// never leaves a half-written state. The duplicate-window check offered
/// by [`LedgerStore::record_cartridge`] runs in the same transaction as
/// the pending insert, which is what makes the check race-free: the single
/// consumer is the only writer, and even a second writer could not sneak a
/// row in between check and insert.
pub struct LedgerStore {
    db: Database,
    retention_cap: i64,
    duplicate_window: u32,
}

impl LedgerStore {
    /// Wrap a database with the default retention cap and duplicate window.
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self::with_policy(db, RETENTION_CAP, DUPLICATE_WINDOW)
    }

    /// Wrap a database with an explicit retention cap and duplicate window.
    #[must_use]
    pub fn with_policy(db: Database, retention_cap: i64, duplicate_window: u32) -> Self {
        Self {
            db,
            retention_cap,
            duplicate_window,
        }
    }

    /// Insert a record and enforce retention, in one transaction.
    ///
    /// Returns the assigned sequence id.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] on I/O or constraint failure. The caller
    /// must treat this as fatal for the in-flight scan (answer
    /// scanner-error), never retry silently: a retry risks double-counting.
    pub async fn insert(&self, record: &NewLedgerRecord) -> StorageResult<i64> {
        let mut tx = self.db.pool().begin().await?;
        let id = Self::insert_in_tx(&mut tx, record).await?;
        self.enforce_retention_in_tx(&mut tx).await?;
        tx.commit().await?;
        debug!(sequence_id = id, code = %record.cartridge_code, "ledger row written");
        Ok(id)
    }

    /// Duplicate-checked insert: one transaction covering the window
    /// query, the insert, and retention.
    ///
    /// Returns `None` without writing anything if `record.cartridge_code`
    /// appears in the most recent window rows.
    ///
    /// # Errors
    ///
    /// Same contract as [`LedgerStore::insert`].
    pub async fn record_cartridge(&self, record: &NewLedgerRecord) -> StorageResult<Option<i64>> {
        let mut tx = self.db.pool().begin().await?;

        if Self::is_duplicate_in_tx(&mut tx, &record.cartridge_code, self.duplicate_window).await? {
            tx.rollback().await?;
            return Ok(None);
        }

        let id = Self::insert_in_tx(&mut tx, record).await?;
        self.enforce_retention_in_tx(&mut tx).await?;
        tx.commit().await?;
        debug!(sequence_id = id, code = %record.cartridge_code, "ledger row written");
        Ok(Some(id))
    }

    /// Whether `code` appears among the most recent window rows
    /// (most-recent-first, exact string match).
    pub async fn is_recent_duplicate(&self, code: &str) -> StorageResult<bool> {
        let mut tx = self.db.pool().begin().await?;
        let dup = Self::is_duplicate_in_tx(&mut tx, code, self.duplicate_window).await?;
        tx.rollback().await?;
        Ok(dup)
    }

    /// Highest sequence id ever assigned; 0 for an empty ledger.
    pub async fn max_sequence(&self) -> StorageResult<i64> {
        let row = sqlx::query("SELECT COALESCE(MAX(sequence_id), 0) AS max_seq FROM cartridge_ledger")
            .fetch_one(self.db.pool())
            .await?;
        Ok(row.get::<i64, _>("max_seq"))
    }

    /// Rows written after the given marker: `max_sequence - marker`,
    /// floored at zero.
    pub async fn count_since(&self, marker: i64) -> StorageResult<i64> {
        let max = self.max_sequence().await?;
        Ok((max - marker).max(0))
    }

    /// Rows written since the last operator reset (or matrix change).
    pub async fn count_since_reset(&self) -> StorageResult<i64> {
        let marker = self.reset_marker().await?;
        self.count_since(marker).await
    }

    /// Move the reset marker to the current maximum sequence id.
    ///
    /// Called on operator reset and on every accepted matrix change, which
    /// is how the original station behaved: a new mould restarts the
    /// visible counter.
    pub async fn reset_counter(&self) -> StorageResult<i64> {
        let max = self.max_sequence().await?;
        self.set_state(KEY_RESET_MARKER, &max.to_string()).await?;
        info!(marker = max, "reset marker moved");
        Ok(max)
    }

    /// The persisted reset marker; 0 if never set.
    pub async fn reset_marker(&self) -> StorageResult<i64> {
        match self.get_state(KEY_RESET_MARKER).await? {
            None => Ok(0),
            Some(value) => value.parse().map_err(|_| StorageError::CorruptState {
                key: KEY_RESET_MARKER.to_string(),
                value,
            }),
        }
    }

    /// The persisted current matrix identifier, if one was ever accepted.
    pub async fn current_matrix(&self) -> StorageResult<Option<String>> {
        self.get_state(KEY_CURRENT_MATRIX).await
    }

    /// Persist the active matrix identifier.
    pub async fn set_current_matrix(&self, matrix_id: &str) -> StorageResult<()> {
        self.set_state(KEY_CURRENT_MATRIX, matrix_id).await
    }

    /// Delete oldest rows until the sequence span fits the cap again.
    ///
    /// Normally runs inside the insert transaction; exposed separately for
    /// maintenance tooling.
    pub async fn enforce_retention(&self) -> StorageResult<u64> {
        let mut tx = self.db.pool().begin().await?;
        let deleted = self.enforce_retention_in_tx(&mut tx).await?;
        tx.commit().await?;
        Ok(deleted)
    }

    /// Most recent rows, newest first.
    pub async fn recent(&self, limit: i64) -> StorageResult<Vec<LedgerRecord>> {
        let rows = sqlx::query_as::<_, LedgerRecord>(
            r#"
            SELECT sequence_id, scanned_at, line, cubicle,
                   matrix_id, cartridge_code, flag
            FROM cartridge_ledger
            ORDER BY sequence_id DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(self.db.pool())
        .await?;
        Ok(rows)
    }

    async fn insert_in_tx(
        tx: &mut Transaction<'_, Sqlite>,
        record: &NewLedgerRecord,
    ) -> StorageResult<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO cartridge_ledger (
                scanned_at, line, cubicle, matrix_id, cartridge_code, flag
            )
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.scanned_at)
        .bind(&record.line)
        .bind(&record.cubicle)
        .bind(&record.matrix_id)
        .bind(&record.cartridge_code)
        .bind(record.flag)
        .execute(&mut **tx)
        .await?;

        Ok(result.last_insert_rowid())
    }

    async fn is_duplicate_in_tx(
        tx: &mut Transaction<'_, Sqlite>,
        code: &str,
        window: u32,
    ) -> StorageResult<bool> {
        let row = sqlx::query(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM (
                    SELECT cartridge_code FROM cartridge_ledger
                    ORDER BY sequence_id DESC
                    LIMIT ?
                )
                WHERE cartridge_code = ?
            ) AS dup
            "#,
        )
        .bind(i64::from(window))
        .bind(code)
        .fetch_one(&mut **tx)
        .await?;
        Ok(row.get::<i64, _>("dup") != 0)
    }

    async fn enforce_retention_in_tx(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
    ) -> StorageResult<u64> {
        let row = sqlx::query(
            "SELECT COALESCE(MAX(sequence_id), 0) AS max_seq, \
                    COALESCE(MIN(sequence_id), 0) AS min_seq \
             FROM cartridge_ledger",
        )
        .fetch_one(&mut **tx)
        .await?;
        let max: i64 = row.get("max_seq");
        let min: i64 = row.get("min_seq");

        if max - min <= self.retention_cap {
            return Ok(0);
        }

        let cutoff = max - self.retention_cap;
        let deleted = sqlx::query("DELETE FROM cartridge_ledger WHERE sequence_id <= ?")
            .bind(cutoff)
            .execute(&mut **tx)
            .await?
            .rows_affected();
        warn!(deleted, cutoff, "retention policy deleted oldest ledger rows");
        Ok(deleted)
    }

    async fn get_state(&self, key: &str) -> StorageResult<Option<String>> {
        let row = sqlx::query("SELECT value FROM jig_state WHERE key = ?")
            .bind(key)
            .fetch_optional(self.db.pool())
            .await?;
        Ok(row.map(|r| r.get::<String, _>("value")))
    }

    async fn set_state(&self, key: &str, value: &str) -> StorageResult<()> {
        sqlx::query(
            "INSERT INTO jig_state (key, value) VALUES (?, ?) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(key)
        .bind(value)
        .execute(self.db.pool())
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ScanFlag;

    async fn store() -> LedgerStore {
        LedgerStore::new(Database::in_memory().await.unwrap())
    }

    fn record(code: &str, flag: ScanFlag) -> NewLedgerRecord {
        NewLedgerRecord::new("A", "3", "MX2401", code, flag)
    }

    #[tokio::test]
    async fn sequence_ids_are_strictly_increasing() {
        let store = store().await;
        let first = store.insert(&record("PAS12211702610", ScanFlag::Accepted)).await.unwrap();
        let second = store.insert(&record("PAS12211702611", ScanFlag::Rejected)).await.unwrap();
        assert!(second > first);
        assert_eq!(store.max_sequence().await.unwrap(), second);
    }

    #[tokio::test]
    async fn empty_ledger_reports_zero() {
        let store = store().await;
        assert_eq!(store.max_sequence().await.unwrap(), 0);
        assert_eq!(store.count_since(0).await.unwrap(), 0);
        assert!(!store.is_recent_duplicate("ANYTHING").await.unwrap());
    }

    #[tokio::test]
    async fn duplicate_window_sees_recent_rows_only() {
        let db = Database::in_memory().await.unwrap();
        let store = LedgerStore::with_policy(db, RETENTION_CAP, 3);

        store.insert(&record("CODE000000001", ScanFlag::Accepted)).await.unwrap();
        store.insert(&record("CODE000000002", ScanFlag::Accepted)).await.unwrap();
        store.insert(&record("CODE000000003", ScanFlag::Accepted)).await.unwrap();
        store.insert(&record("CODE000000004", ScanFlag::Accepted)).await.unwrap();

        // Window of 3: code 1 has scrolled out, codes 2-4 are visible.
        assert!(!store.is_recent_duplicate("CODE000000001").await.unwrap());
        assert!(store.is_recent_duplicate("CODE000000002").await.unwrap());
        assert!(store.is_recent_duplicate("CODE000000004").await.unwrap());
    }

    #[tokio::test]
    async fn record_cartridge_skips_window_duplicates() {
        let store = store().await;
        let first = store
            .record_cartridge(&record("PAS12211702610", ScanFlag::Accepted))
            .await
            .unwrap();
        assert!(first.is_some());

        let second = store
            .record_cartridge(&record("PAS12211702610", ScanFlag::Accepted))
            .await
            .unwrap();
        assert!(second.is_none());

        // Exactly one row total.
        assert_eq!(store.max_sequence().await.unwrap(), first.unwrap());
    }

    #[tokio::test]
    async fn retention_keeps_span_within_cap_and_never_reuses_ids() {
        let db = Database::in_memory().await.unwrap();
        let cap = 10;
        let store = LedgerStore::with_policy(db, cap, DUPLICATE_WINDOW);

        let mut last = 0;
        for i in 0..25 {
            last = store
                .insert(&record(&format!("CODE{:010}", i), ScanFlag::Accepted))
                .await
                .unwrap();
        }
        assert_eq!(last, 25);

        let rows = store.recent(100).await.unwrap();
        let max = rows.iter().map(|r| r.sequence_id).max().unwrap();
        let min = rows.iter().map(|r| r.sequence_id).min().unwrap();
        assert!(max - min <= cap, "span {} exceeds cap {}", max - min, cap);

        // Ids keep climbing past deletions.
        let next = store
            .insert(&record("CODE_AFTER_000", ScanFlag::Accepted))
            .await
            .unwrap();
        assert_eq!(next, 26);
    }

    #[tokio::test]
    async fn reset_marker_tracks_counter() {
        let store = store().await;
        store.insert(&record("CODE000000001", ScanFlag::Accepted)).await.unwrap();
        store.insert(&record("CODE000000002", ScanFlag::Accepted)).await.unwrap();
        assert_eq!(store.count_since_reset().await.unwrap(), 2);

        store.reset_counter().await.unwrap();
        assert_eq!(store.count_since_reset().await.unwrap(), 0);

        store.insert(&record("CODE000000003", ScanFlag::Accepted)).await.unwrap();
        assert_eq!(store.count_since_reset().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn current_matrix_round_trips() {
        let store = store().await;
        assert_eq!(store.current_matrix().await.unwrap(), None);
        store.set_current_matrix("MX2401").await.unwrap();
        assert_eq!(store.current_matrix().await.unwrap().as_deref(), Some("MX2401"));
        store.set_current_matrix("MX2402").await.unwrap();
        assert_eq!(store.current_matrix().await.unwrap().as_deref(), Some("MX2402"));
    }

    #[tokio::test]
    async fn recent_returns_newest_first() {
        let store = store().await;
        store.insert(&record("CODE000000001", ScanFlag::Accepted)).await.unwrap();
        store.insert(&record("CODE000000002", ScanFlag::Rejected)).await.unwrap();

        let rows = store.recent(10).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].cartridge_code, "CODE000000002");
        assert_eq!(rows[0].flag, ScanFlag::Rejected);
        assert_eq!(rows[1].cartridge_code, "CODE000000001");
    }
}
