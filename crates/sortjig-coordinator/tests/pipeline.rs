//! End-to-end pipeline tests: mock firmware link, mock GPIO pin, real
//! validator and in-memory ledger, wired the way the binary wires them.

use sortjig_coordinator::{Orchestrator, ScanCoordinator, spawn_pipeline};
use sortjig_core::constants::{
    CMD_FINAL_SCAN, CMD_RETRY_SCAN, RES_ACCEPT, RES_REJECT, RES_SCANNER_ERROR,
};
use sortjig_core::{JigConfig, JigEvent, ScanEvent, ScanSource};
use sortjig_gpio::{MockPin, MockPinHandle, ReadyLine};
use sortjig_ledger::{Database, LedgerStore, ScanFlag};
use sortjig_protocol::{MockLink, MockLinkHandle, ProtocolConfig, ProtocolEngine};
use sortjig_validator::{ReferenceSets, Validator};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::time::sleep;

struct Jig {
    link: MockLinkHandle,
    pin: MockPinHandle,
    coordinator: ScanCoordinator,
    orchestrator: Orchestrator<MockPin>,
    store: Arc<LedgerStore>,
    events: broadcast::Receiver<JigEvent>,
}

fn list_file(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "{}", contents).unwrap();
    file
}

async fn jig() -> Jig {
    let store = Arc::new(LedgerStore::new(Database::in_memory().await.unwrap()));

    let accept = list_file("PAS12211702610\nPAS12211702611\n");
    let reject = list_file("REJ0000000001\n");
    let sets = ReferenceSets::load(accept.path(), reject.path()).unwrap();

    let config = JigConfig::default();
    let validator = Validator::new(&config, sets, Arc::clone(&store))
        .await
        .unwrap();

    let (events_tx, events) = broadcast::channel(32);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handles = spawn_pipeline(validator, events_tx.clone(), shutdown_rx.clone());

    let (pin, pin_handle) = MockPin::new();
    let line = Arc::new(ReadyLine::new(pin, vec![]).unwrap());
    let (link, link_handle) = MockLink::new();
    let link = link.with_level_probe(pin_handle.level_probe());

    let engine = ProtocolEngine::new(
        link,
        handles.gateway,
        Arc::clone(&line),
        ProtocolConfig::default(),
        shutdown_rx,
        events_tx.clone(),
    );
    let mut orchestrator = Orchestrator::new(
        line,
        shutdown_tx,
        handles.batch,
        events_tx,
        false,
        handles.consumer,
    );
    orchestrator.startup(engine.run()).await.unwrap();

    Jig {
        link: link_handle,
        pin: pin_handle,
        coordinator: handles.coordinator,
        orchestrator,
        store,
        events,
    }
}

fn scan(text: &str) -> ScanEvent {
    ScanEvent::new(text, ScanSource::ExternalInput)
}

/// Offer until the engine has armed the pipeline and the text is taken.
async fn offer_when_armed(coordinator: &ScanCoordinator, text: &str) {
    while !coordinator.offer(scan(text)) {
        sleep(Duration::from_millis(10)).await;
    }
}

async fn wait_for_written(link: &MockLinkHandle, count: usize) {
    while link.written().len() < count {
        sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn accepted_serial_full_cycle() {
    let mut jig = jig().await;
    jig.pin.clear();

    jig.link.push_byte(CMD_RETRY_SCAN);
    offer_when_armed(&jig.coordinator, "PAS12211702610").await;
    wait_for_written(&jig.link, 1).await;

    // Response byte hit the wire while the line was busy.
    assert_eq!(jig.link.written_with_levels(), vec![(RES_ACCEPT, Some(false))]);

    // The ledger row is visible once the response is out.
    let rows = jig.store.recent(10).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].cartridge_code, "PAS12211702610");
    assert_eq!(rows[0].flag, ScanFlag::Accepted);

    // Pulse completed and the line ended ready.
    sleep(Duration::from_secs(2)).await;
    assert!(jig.pin.is_high());

    jig.orchestrator.shutdown().await.unwrap();
    assert!(!jig.pin.is_high());
}

#[tokio::test]
async fn unknown_serial_is_rejected_but_audited() {
    let mut jig = jig().await;

    jig.link.push_byte(CMD_FINAL_SCAN);
    offer_when_armed(&jig.coordinator, "UNKNOWNCODE1234").await;
    wait_for_written(&jig.link, 1).await;

    assert_eq!(jig.link.written(), vec![RES_REJECT]);
    let rows = jig.store.recent(10).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].flag, ScanFlag::Rejected);

    // The audit trail still distinguishes unknown from reject-listed.
    let mut saw_unknown = false;
    while let Ok(event) = jig.events.try_recv() {
        if let JigEvent::Classification(result) = event {
            saw_unknown |=
                result.kind == sortjig_core::ClassificationKind::CartridgeUnknown;
        }
    }
    assert!(saw_unknown);

    jig.orchestrator.shutdown().await.unwrap();
}

#[tokio::test]
async fn malformed_scan_rejected_without_ledger_row() {
    let mut jig = jig().await;

    jig.link.push_byte(CMD_RETRY_SCAN);
    offer_when_armed(&jig.coordinator, "BAD").await;
    wait_for_written(&jig.link, 1).await;

    assert_eq!(jig.link.written(), vec![RES_REJECT]);
    assert!(jig.store.recent(10).await.unwrap().is_empty());

    jig.orchestrator.shutdown().await.unwrap();
}

#[tokio::test]
async fn matrix_then_cartridge_in_one_cycle() {
    let mut jig = jig().await;

    jig.link.push_byte(CMD_RETRY_SCAN);
    offer_when_armed(&jig.coordinator, "MX2401").await;
    // The matrix scan produced no wire byte; the request is still armed.
    offer_when_armed(&jig.coordinator, "PAS12211702611").await;
    wait_for_written(&jig.link, 1).await;

    assert_eq!(jig.link.written(), vec![RES_ACCEPT]);
    let rows = jig.store.recent(10).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].matrix_id, "MX2401");
    // The matrix change also moved the reset marker.
    assert_eq!(jig.store.count_since_reset().await.unwrap(), 1);

    jig.orchestrator.shutdown().await.unwrap();
}

#[tokio::test]
async fn silent_operator_answers_scanner_error() {
    let mut jig = jig().await;
    jig.pin.clear();

    jig.link.push_byte(CMD_RETRY_SCAN);
    // Nobody scans anything; the 30 second deadline elapses.
    wait_for_written(&jig.link, 1).await;

    assert_eq!(jig.link.written(), vec![RES_SCANNER_ERROR]);
    assert!(jig.store.recent(10).await.unwrap().is_empty());
    // No plate pulse: busy(request), busy(respond), ready.
    sleep(Duration::from_secs(1)).await;
    assert_eq!(jig.pin.transitions(), vec![false, false, true]);

    jig.orchestrator.shutdown().await.unwrap();
}

#[tokio::test]
async fn duplicate_in_window_answers_d() {
    let mut jig = jig().await;

    jig.link.push_byte(CMD_RETRY_SCAN);
    offer_when_armed(&jig.coordinator, "PAS12211702610").await;
    wait_for_written(&jig.link, 1).await;

    // Same serial in a later cycle, offered by the *other* channel so the
    // exact-repeat suppression does not apply.
    sleep(Duration::from_secs(2)).await;
    jig.link.push_byte(CMD_RETRY_SCAN);
    offer_when_armed(&jig.coordinator, "PAS12211702611").await;
    wait_for_written(&jig.link, 2).await;

    sleep(Duration::from_secs(2)).await;
    jig.link.push_byte(CMD_RETRY_SCAN);
    offer_when_armed(&jig.coordinator, "PAS12211702610").await;
    wait_for_written(&jig.link, 3).await;

    assert_eq!(jig.link.written(), vec![RES_ACCEPT, RES_ACCEPT, b'D']);
    // Only two rows: the duplicate was never written.
    assert_eq!(jig.store.recent(10).await.unwrap().len(), 2);

    jig.orchestrator.shutdown().await.unwrap();
}

#[tokio::test]
async fn boot_script_ends_busy_and_publishes_handshake() {
    let mut jig = jig().await;

    // After startup the line is parked busy.
    assert!(!jig.pin.is_high());
    // busy (line creation), busy, ready, busy (boot script).
    assert_eq!(jig.pin.transitions(), vec![false, false, true, false]);

    let mut saw_ready = false;
    let mut saw_busy = false;
    while let Ok(event) = jig.events.try_recv() {
        if let JigEvent::Handshake(state) = event {
            saw_ready |= state.ready;
            saw_busy |= !state.ready;
        }
    }
    assert!(saw_ready && saw_busy);

    jig.orchestrator.shutdown().await.unwrap();
}
