//! On-disk persistence tests: state that must survive a process restart.

use sortjig_ledger::{Database, DatabaseConfig, LedgerStore, NewLedgerRecord, ScanFlag};

fn db_path(dir: &tempfile::TempDir) -> String {
    dir.path().join("ledger.db").to_string_lossy().into_owned()
}

async fn open(path: &str) -> LedgerStore {
    let db = Database::new(DatabaseConfig::new(path)).await.unwrap();
    LedgerStore::new(db)
}

#[tokio::test]
async fn reset_marker_and_matrix_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = db_path(&dir);

    {
        let store = open(&path).await;
        store
            .insert(&NewLedgerRecord::new(
                "A",
                "3",
                "MX2401",
                "PAS12211702610",
                ScanFlag::Accepted,
            ))
            .await
            .unwrap();
        store.reset_counter().await.unwrap();
        store.set_current_matrix("MX2401").await.unwrap();
    }

    let store = open(&path).await;
    assert_eq!(store.reset_marker().await.unwrap(), 1);
    assert_eq!(store.count_since_reset().await.unwrap(), 0);
    assert_eq!(
        store.current_matrix().await.unwrap().as_deref(),
        Some("MX2401")
    );
}

#[tokio::test]
async fn sequence_continues_after_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = db_path(&dir);

    {
        let store = open(&path).await;
        for i in 0..3 {
            store
                .insert(&NewLedgerRecord::new(
                    "A",
                    "3",
                    "MX2401",
                    format!("CODE{:010}", i),
                    ScanFlag::Accepted,
                ))
                .await
                .unwrap();
        }
    }

    let store = open(&path).await;
    let next = store
        .insert(&NewLedgerRecord::new(
            "A",
            "3",
            "MX2401",
            "CODE_AFTER_000",
            ScanFlag::Accepted,
        ))
        .await
        .unwrap();
    assert_eq!(next, 4);
}

#[tokio::test]
async fn duplicate_window_spans_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = db_path(&dir);

    {
        let store = open(&path).await;
        store
            .record_cartridge(&NewLedgerRecord::new(
                "A",
                "3",
                "MX2401",
                "PAS12211702610",
                ScanFlag::Accepted,
            ))
            .await
            .unwrap();
    }

    let store = open(&path).await;
    let second = store
        .record_cartridge(&NewLedgerRecord::new(
            "A",
            "3",
            "MX2401",
            "PAS12211702610",
            ScanFlag::Accepted,
        ))
        .await
        .unwrap();
    assert!(second.is_none(), "window duplicate must be skipped after restart");
}
