//! Process lifecycle: boot handshake, engine supervision, shutdown.

use sortjig_core::constants::HANDSHAKE_STEP_DELAY;
use sortjig_core::{BatchContext, DuplicatePredicate, HandshakeState, JigEvent, MouldRange, Result};
use sortjig_gpio::{OutputPin, ReadyLine};
use sortjig_protocol::ProtocolResult;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{error, info, warn};

/// Owns the handshake lifecycle.
///
/// `startup` runs the boot script the firmware watches for (busy → delay →
/// ready, meaning "host has booted", → delay → busy, the operating
/// default) and then starts the protocol engine. `shutdown` stops the
/// engine, waits for it (any in-flight pulse completes, the pulse lock
/// guarantees that), and parks the line busy so the firmware stops feeding
/// cartridges.
pub struct Orchestrator<P: OutputPin> {
    line: Arc<ReadyLine<P>>,
    shutdown: watch::Sender<bool>,
    batch: mpsc::Sender<BatchContext>,
    events: broadcast::Sender<JigEvent>,
    trigger_enabled: bool,
    engine_task: Option<JoinHandle<ProtocolResult<()>>>,
    consumer_task: Option<JoinHandle<()>>,
}

impl<P: OutputPin> Orchestrator<P> {
    pub fn new(
        line: Arc<ReadyLine<P>>,
        shutdown: watch::Sender<bool>,
        batch: mpsc::Sender<BatchContext>,
        events: broadcast::Sender<JigEvent>,
        trigger_enabled: bool,
        consumer_task: JoinHandle<()>,
    ) -> Self {
        Self {
            line,
            shutdown,
            batch,
            events,
            trigger_enabled,
            engine_task: None,
            consumer_task: Some(consumer_task),
        }
    }

    /// Run the boot handshake and start the protocol engine.
    ///
    /// `engine_run` is the engine's `run()` future; the orchestrator
    /// supervises the spawned task until [`Orchestrator::shutdown`].
    ///
    /// # Errors
    ///
    /// Returns a GPIO error if the boot script cannot drive the line; the
    /// engine is not started in that case.
    pub async fn startup<F>(&mut self, engine_run: F) -> Result<()>
    where
        F: Future<Output = ProtocolResult<()>> + Send + 'static,
    {
        info!("boot handshake starting");
        self.line.set_busy().await.map_err(sortjig_core::Error::from)?;
        sleep(HANDSHAKE_STEP_DELAY).await;
        // The ready blip tells the firmware the host process is up.
        self.line.set_ready().await.map_err(sortjig_core::Error::from)?;
        self.publish_handshake(true);
        sleep(HANDSHAKE_STEP_DELAY).await;
        self.line.set_busy().await.map_err(sortjig_core::Error::from)?;
        self.publish_handshake(false);

        self.engine_task = Some(tokio::spawn(engine_run));
        info!("boot handshake complete, engine started");
        Ok(())
    }

    /// Stop the engine and park the line busy.
    ///
    /// # Errors
    ///
    /// Returns a GPIO error if the final busy level cannot be driven. The
    /// engine and consumer tasks are stopped regardless.
    pub async fn shutdown(&mut self) -> Result<()> {
        info!("shutdown requested");
        let _ = self.shutdown.send(true);

        if let Some(task) = self.engine_task.take() {
            match task.await {
                Ok(Ok(())) => info!("engine stopped"),
                Ok(Err(e)) => warn!(error = %e, "engine stopped with error"),
                Err(e) => error!(error = %e, "engine task panicked"),
            }
        }
        if let Some(task) = self.consumer_task.take()
            && let Err(e) = task.await
        {
            error!(error = %e, "scan consumer task panicked");
        }

        self.line.set_busy().await.map_err(sortjig_core::Error::from)?;
        self.publish_handshake(false);
        sleep(HANDSHAKE_STEP_DELAY).await;
        info!("shutdown complete");
        Ok(())
    }

    /// Replace the validator's batch parameters.
    ///
    /// # Errors
    ///
    /// Returns [`sortjig_core::Error::ChannelClosed`] if the consumer task
    /// has already stopped.
    pub async fn set_batch_context(
        &self,
        line: Option<String>,
        mould_ranges: Vec<MouldRange>,
        duplicate_predicate: Option<DuplicatePredicate>,
    ) -> Result<()> {
        self.batch
            .send(BatchContext {
                line,
                mould_ranges,
                duplicate_predicate,
            })
            .await
            .map_err(|_| sortjig_core::Error::ChannelClosed("batch context"))
    }

    /// Wait for the engine task to finish on its own (fatal link failure).
    ///
    /// Cancel-safe: if the wait is dropped the engine stays supervised and
    /// [`Orchestrator::shutdown`] will still join it. Returns the engine's
    /// result; `None` if no engine is running.
    pub async fn join_engine(&mut self) -> Option<ProtocolResult<()>> {
        let task = self.engine_task.as_mut()?;
        let joined = task.await;
        self.engine_task = None;
        match joined {
            Ok(result) => Some(result),
            Err(e) => {
                error!(error = %e, "engine task panicked");
                Some(Ok(()))
            }
        }
    }

    fn publish_handshake(&self, ready: bool) {
        let _ = self.events.send(JigEvent::Handshake(HandshakeState {
            ready,
            awaiting_scan: false,
            trigger_enabled: self.trigger_enabled,
        }));
    }
}
