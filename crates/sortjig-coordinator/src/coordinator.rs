//! Multi-producer, single-consumer scan pipeline.

use sortjig_core::{BatchContext, JigEvent, ScanEvent, ScanOutcome};
use sortjig_protocol::ScanGateway;
use sortjig_validator::Validator;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc::error::{TryRecvError, TrySendError};
use tokio::sync::{Mutex, broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Producer-facing handle to the scan pipeline.
///
/// Cheap to clone; every physical input channel (onboard reader, keyboard
/// wedge, front end) holds one and calls [`ScanCoordinator::offer`].
#[derive(Clone)]
pub struct ScanCoordinator {
    inbox: mpsc::Sender<ScanEvent>,
    armed: Arc<AtomicBool>,
    events: broadcast::Sender<JigEvent>,
}

impl ScanCoordinator {
    /// Offer scan text to the pipeline.
    ///
    /// Returns `true` if the text was accepted for classification. `false`
    /// means it was dropped: either no firmware scan request is
    /// outstanding, or the busy guard is held by an in-flight validation.
    /// Dropped text is never queued; classifying a stale scan late is
    /// unsafe for the plate mechanism.
    pub fn offer(&self, event: ScanEvent) -> bool {
        if !self.armed.load(Ordering::SeqCst) {
            debug!(source = %event.source, "no scan request outstanding, text dropped");
            return false;
        }
        match self.inbox.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(event)) => {
                warn!(
                    source = %event.source,
                    "busy guard held, concurrent scan dropped"
                );
                false
            }
            Err(TrySendError::Closed(_)) => {
                warn!("scan pipeline closed, text dropped");
                false
            }
        }
    }

    /// Subscribe to pipeline events (classifications, handshake changes,
    /// protocol errors).
    pub fn subscribe(&self) -> broadcast::Receiver<JigEvent> {
        self.events.subscribe()
    }
}

/// The protocol engine's side of the pipeline.
///
/// Arms and disarms text acceptance around each scan cycle and hands
/// classification outcomes to the engine. Stale outcomes left over from a
/// cancelled cycle are discarded when the next cycle is armed.
pub struct CoordinatorGateway {
    armed: Arc<AtomicBool>,
    outcomes: Mutex<mpsc::Receiver<ScanOutcome>>,
}

impl ScanGateway for CoordinatorGateway {
    async fn begin_scan(&self, final_attempt: bool) {
        let mut outcomes = self.outcomes.lock().await;
        loop {
            match outcomes.try_recv() {
                Ok(_) => debug!("stale outcome from previous cycle discarded"),
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
            }
        }
        self.armed.store(true, Ordering::SeqCst);
        debug!(final_attempt, "scan request armed");
    }

    async fn next_outcome(&self) -> Option<ScanOutcome> {
        self.outcomes.lock().await.recv().await
    }

    async fn end_scan(&self) {
        self.armed.store(false, Ordering::SeqCst);
        debug!("scan request disarmed");
    }
}

/// Everything [`spawn_pipeline`] hands back.
pub struct CoordinatorHandles {
    pub coordinator: ScanCoordinator,
    pub gateway: CoordinatorGateway,
    /// Channel for replacing the validator's batch context at runtime.
    pub batch: mpsc::Sender<BatchContext>,
    pub consumer: JoinHandle<()>,
}

/// Spawn the consumer task and build the pipeline endpoints.
///
/// The consumer owns the validator outright; it is the only context that
/// touches the ledger. The inbox has capacity 1: that single slot plus the
/// in-flight validation is the busy guard from the concurrency contract.
pub fn spawn_pipeline(
    mut validator: Validator,
    events: broadcast::Sender<JigEvent>,
    mut shutdown: watch::Receiver<bool>,
) -> CoordinatorHandles {
    let (inbox_tx, mut inbox_rx) = mpsc::channel::<ScanEvent>(1);
    let (outcome_tx, outcome_rx) = mpsc::channel::<ScanOutcome>(4);
    let (batch_tx, mut batch_rx) = mpsc::channel::<BatchContext>(4);
    let armed = Arc::new(AtomicBool::new(false));

    let consumer_events = events.clone();
    let consumer = tokio::spawn(async move {
        // Exact repeat of the previously classified cartridge text is an
        // operator mis-scan: logged and dropped, never re-validated. The
        // matrix never participates in this comparison.
        let mut last_cartridge: Option<String> = None;

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    info!("scan consumer stopping");
                    break;
                }
                context = batch_rx.recv() => {
                    match context {
                        Some(context) => validator.set_batch_context(context),
                        None => break,
                    }
                }
                event = inbox_rx.recv() => {
                    let Some(event) = event else { break };
                    let normalized = event.raw_text.trim().to_uppercase();
                    if last_cartridge.as_deref() == Some(normalized.as_str()) {
                        warn!(code = %normalized, "repeated scan of previous cartridge ignored");
                        continue;
                    }

                    let outcome = validator.classify(&event.raw_text).await;
                    match &outcome {
                        ScanOutcome::Classified(result) => {
                            if !result.kind.is_matrix() {
                                last_cartridge = Some(result.code.clone());
                            }
                            let _ = consumer_events
                                .send(JigEvent::Classification(result.clone()));
                        }
                        ScanOutcome::StorageFailure(message) => {
                            let _ = consumer_events.send(JigEvent::ProtocolError {
                                message: message.clone(),
                                fatal: false,
                            });
                        }
                    }
                    if outcome_tx.send(outcome).await.is_err() {
                        info!("outcome channel closed, scan consumer stopping");
                        break;
                    }
                }
            }
        }
    });

    CoordinatorHandles {
        coordinator: ScanCoordinator {
            inbox: inbox_tx,
            armed: Arc::clone(&armed),
            events,
        },
        gateway: CoordinatorGateway {
            armed,
            outcomes: Mutex::new(outcome_rx),
        },
        batch: batch_tx,
        consumer,
    }
}
