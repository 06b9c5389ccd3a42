//! Station binary: wires the ledger, validator, pipeline, GPIO line, and
//! UART engine together and runs until interrupted.
//!
//! Usage: `sortjig [config.json]` (defaults to `location.json` in the
//! working directory). Scan text can additionally be fed on stdin, one
//! code per line, standing in for a keyboard-wedge reader.

use anyhow::{Context, Result};
use sortjig_coordinator::{Orchestrator, spawn_pipeline};
use sortjig_core::{JigConfig, JigEvent, ScanEvent, ScanSource};
use sortjig_gpio::{ReadyLine, SysfsPin};
use sortjig_ledger::{Database, DatabaseConfig, LedgerStore};
use sortjig_protocol::{LineReader, ProtocolConfig, ProtocolEngine, UartLink};
use sortjig_validator::{ReferenceSets, Validator};
use std::sync::Arc;
use tokio::io::AsyncBufReadExt;
use tokio::sync::{broadcast, watch};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "location.json".to_string());
    let config = JigConfig::load(&config_path)
        .with_context(|| format!("loading configuration from {}", config_path))?;
    info!(line = %config.line, cubicle = %config.cubicle, "station configured");

    let db = Database::new(DatabaseConfig::new(&config.database_path))
        .await
        .context("opening scan ledger")?;
    let store = Arc::new(LedgerStore::with_policy(
        db.clone(),
        config.retention_cap,
        config.duplicate_window,
    ));
    let sets = ReferenceSets::load(&config.accept_list, &config.reject_list)
        .context("loading reference lists")?;
    let validator = Validator::new(&config, sets, Arc::clone(&store))
        .await
        .context("restoring validator state")?;

    let (events_tx, _) = broadcast::channel(64);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handles = spawn_pipeline(validator, events_tx.clone(), shutdown_rx.clone());

    let primary = SysfsPin::open(config.ready_pin, false).context("opening ready/busy pin")?;
    let mirrors = config
        .status_pins
        .iter()
        .map(|&pin| SysfsPin::open(pin, false))
        .collect::<sortjig_gpio::Result<Vec<_>>>()
        .context("opening status pins")?;
    let line = Arc::new(ReadyLine::new(primary, mirrors).context("driving line busy")?);

    let link =
        UartLink::open(&config.uart_port, config.baud_rate).context("opening firmware UART")?;
    let engine = ProtocolEngine::new(
        link,
        handles.gateway,
        Arc::clone(&line),
        ProtocolConfig::from_jig(&config),
        shutdown_rx.clone(),
        events_tx.clone(),
    );

    let mut orchestrator = Orchestrator::new(
        line,
        shutdown_tx,
        handles.batch,
        events_tx,
        config.trigger_enabled,
        handles.consumer,
    );

    spawn_event_logger(handles.coordinator.subscribe());
    spawn_stdin_producer(handles.coordinator.clone());
    if config.onboard_reader {
        let reader_link = UartLink::open(&config.reader_port, config.reader_baud)
            .context("opening onboard reader port")?;
        spawn_onboard_reader(reader_link, handles.coordinator.clone(), shutdown_rx);
    }

    orchestrator.startup(engine.run()).await?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("interrupt received"),
        result = orchestrator.join_engine() => {
            if let Some(Err(e)) = result {
                error!(error = %e, "protocol engine stopped");
            }
        }
    }

    orchestrator.shutdown().await?;
    db.close().await;
    Ok(())
}

/// Log pipeline events; this is the operator's view of the station.
fn spawn_event_logger(mut events: broadcast::Receiver<JigEvent>) {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(JigEvent::Classification(result)) => info!(
                    kind = %result.kind,
                    code = %result.code,
                    mould = result.mould_id.as_deref().unwrap_or("-"),
                    count = result.count_since_matrix,
                    "scan classified"
                ),
                Ok(JigEvent::Handshake(state)) => {
                    debug!(ready = state.ready, "handshake state")
                }
                Ok(JigEvent::ProtocolError { message, fatal }) => {
                    if fatal {
                        error!(%message, "protocol failure");
                    } else {
                        warn!(%message, "protocol warning");
                    }
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(missed, "event logger lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}

/// Feed lines from the onboard barcode reader into the pipeline.
fn spawn_onboard_reader(
    link: UartLink,
    coordinator: sortjig_coordinator::ScanCoordinator,
    shutdown: watch::Receiver<bool>,
) {
    tokio::spawn(async move {
        let reader = LineReader::new(link, shutdown);
        let result = reader
            .run(move |text| {
                if !coordinator.offer(ScanEvent::new(text, ScanSource::OnboardReader)) {
                    warn!("reader scan dropped (no request outstanding or busy)");
                }
            })
            .await;
        if let Err(e) = result {
            error!(error = %e, "onboard reader stopped");
        }
    });
}

/// Feed stdin lines into the pipeline as an external input channel.
fn spawn_stdin_producer(coordinator: sortjig_coordinator::ScanCoordinator) {
    tokio::spawn(async move {
        let stdin = tokio::io::BufReader::new(tokio::io::stdin());
        let mut lines = stdin.lines();
        while let Ok(Some(text)) = lines.next_line().await {
            if text.trim().is_empty() {
                continue;
            }
            if !coordinator.offer(ScanEvent::new(text, ScanSource::ExternalInput)) {
                warn!("scan input dropped (no request outstanding or busy)");
            }
        }
    });
}
