//! The UART protocol state machine.

use crate::commands::{Command, CommandDecoder, Response};
use crate::error::{ProtocolError, ProtocolResult};
use crate::gateway::ScanGateway;
use crate::link::SerialLink;
use sortjig_core::constants::{
    LINK_REOPEN_ATTEMPTS, LINK_REOPEN_BACKOFF, READ_POLL_INTERVAL, RESPONSE_SETTLE,
    SCAN_REQUEST_TIMEOUT,
};
use sortjig_core::{HandshakeState, JigConfig, JigEvent, ScanOutcome};
use sortjig_gpio::{OutputPin, ReadyLine};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::time::{Instant, sleep, timeout_at};
use tracing::{debug, error, info, warn};

/// Tunable engine parameters.
///
/// Defaults match the firmware's wait loops; tests shrink the timeouts.
#[derive(Debug, Clone)]
pub struct ProtocolConfig {
    /// Accept ASCII digit-pair commands from pre-v20 firmware.
    pub legacy_byte_pairs: bool,
    /// Deadline for a classification after a scan request.
    pub scan_timeout: Duration,
    /// Serial read poll interval; bounds shutdown latency.
    pub read_poll: Duration,
    /// Reopen attempts after a serial failure before giving up.
    pub reopen_attempts: u32,
    /// Initial reopen backoff; doubles per attempt.
    pub reopen_backoff: Duration,
    /// Whether the hardware trigger input is enabled; carried on published
    /// handshake states.
    pub trigger_enabled: bool,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            legacy_byte_pairs: false,
            scan_timeout: SCAN_REQUEST_TIMEOUT,
            read_poll: READ_POLL_INTERVAL,
            reopen_attempts: LINK_REOPEN_ATTEMPTS,
            reopen_backoff: LINK_REOPEN_BACKOFF,
            trigger_enabled: false,
        }
    }
}

impl ProtocolConfig {
    /// Derive engine parameters from the station configuration.
    #[must_use]
    pub fn from_jig(config: &JigConfig) -> Self {
        Self {
            legacy_byte_pairs: config.legacy_byte_pairs,
            trigger_enabled: config.trigger_enabled,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EngineState {
    Listening,
    RequestingScan,
    AwaitingClassification,
    RespondingComplete,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EngineState::Listening => "Listening",
            EngineState::RequestingScan => "RequestingScan",
            EngineState::AwaitingClassification => "AwaitingClassification",
            EngineState::RespondingComplete => "RespondingComplete",
        };
        write!(f, "{}", s)
    }
}

/// The UART protocol engine.
///
/// One task owns the engine and with it all serial I/O. A scan cycle:
///
/// 1. scan command received → assert busy, arm the gateway, start the
///    classification deadline;
/// 2. matrix outcomes are republished and consumed without a wire byte,
///    still under the original deadline;
/// 3. cartridge outcome (or deadline, or storage failure) → respond:
///    busy → byte → flush → settle → plate pulse → ready. The
///    scanner-error response skips the pulse since no cartridge was
///    classified and no plate movement is wanted.
///
/// Responses go out in request order because there is never more than one
/// outstanding request. Serial failures trigger a bounded reopen with
/// doubling backoff; exhausting it publishes a fatal event and stops the
/// engine.
pub struct ProtocolEngine<L, G, P>
where
    L: SerialLink,
    G: ScanGateway,
    P: OutputPin,
{
    link: L,
    gateway: G,
    line: Arc<ReadyLine<P>>,
    config: ProtocolConfig,
    decoder: CommandDecoder,
    shutdown: watch::Receiver<bool>,
    events: broadcast::Sender<JigEvent>,
    state: EngineState,
}

impl<L, G, P> ProtocolEngine<L, G, P>
where
    L: SerialLink,
    G: ScanGateway,
    P: OutputPin,
{
    pub fn new(
        link: L,
        gateway: G,
        line: Arc<ReadyLine<P>>,
        config: ProtocolConfig,
        shutdown: watch::Receiver<bool>,
        events: broadcast::Sender<JigEvent>,
    ) -> Self {
        let decoder = CommandDecoder::new(config.legacy_byte_pairs);
        Self {
            link,
            gateway,
            line,
            config,
            decoder,
            shutdown,
            events,
            state: EngineState::Listening,
        }
    }

    /// Run until shutdown or a fatal link failure.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::LinkExhausted`] when the port cannot be
    /// reopened, or [`ProtocolError::PipelineClosed`] if the coordinator
    /// side disappears. Both are fatal; the orchestrator decides what to
    /// do with the process.
    pub async fn run(mut self) -> ProtocolResult<()> {
        info!("protocol engine listening");
        loop {
            if *self.shutdown.borrow() {
                info!("protocol engine stopping");
                break;
            }
            match self.link.read_byte(self.config.read_poll).await {
                Ok(None) => continue,
                Ok(Some(byte)) => {
                    if let Some(command) = self.decoder.feed(byte) {
                        self.handle_command(command).await?;
                    }
                }
                Err(e) => self.recover_link(e).await?,
            }
        }
        Ok(())
    }

    async fn handle_command(&mut self, command: Command) -> ProtocolResult<()> {
        debug!(%command, "command received");
        match command {
            Command::Stop => {
                // End of recording: ready, back to listening. The scan
                // pipeline is never involved.
                self.enter(EngineState::Listening);
                self.line.set_ready().await?;
            }
            Command::StartRecording => {
                self.line.set_ready().await?;
                debug!("recording start acknowledged");
            }
            Command::Pairing => {
                debug!("pairing command ignored");
            }
            Command::FinalScan | Command::RetryScan => {
                self.scan_cycle(command == Command::FinalScan).await?;
            }
        }
        Ok(())
    }

    async fn scan_cycle(&mut self, final_attempt: bool) -> ProtocolResult<()> {
        self.enter(EngineState::RequestingScan);
        self.line.set_busy().await?;
        self.gateway.begin_scan(final_attempt).await;
        // Listeners (the front end among them) learn a scan request is
        // outstanding from this, not from the GPIO line.
        self.publish_handshake(false, true);
        self.enter(EngineState::AwaitingClassification);

        let deadline = Instant::now() + self.config.scan_timeout;
        let outcome = loop {
            tokio::select! {
                _ = self.shutdown.changed() => {
                    self.gateway.end_scan().await;
                    self.publish_handshake(false, false);
                    info!("shutdown during scan cycle");
                    return Ok(());
                }
                next = timeout_at(deadline, self.gateway.next_outcome()) => match next {
                    Err(_) => break None,
                    Ok(None) => {
                        self.gateway.end_scan().await;
                        return Err(ProtocolError::PipelineClosed);
                    }
                    Ok(Some(ScanOutcome::Classified(result))) if result.kind.is_matrix() => {
                        // Host-local bookkeeping; the firmware is still
                        // waiting for a cartridge answer.
                        debug!(kind = %result.kind, "matrix outcome, cycle continues");
                        let _ = self.events.send(JigEvent::Classification(result));
                    }
                    Ok(Some(outcome)) => break Some(outcome),
                }
            }
        };
        self.gateway.end_scan().await;
        self.enter(EngineState::RespondingComplete);

        let line_ready = match outcome {
            None => {
                warn!(final_attempt, "no classification within deadline");
                self.respond(Response::ScannerError).await?
            }
            Some(ScanOutcome::StorageFailure(message)) => {
                let _ = self.events.send(JigEvent::ProtocolError {
                    message,
                    fatal: false,
                });
                self.respond(Response::ScannerError).await?
            }
            Some(ScanOutcome::Classified(result)) => {
                let response = Response::for_kind(result.kind);
                let _ = self.events.send(JigEvent::Classification(result));
                match response {
                    Some(response) => self.respond(response).await?,
                    None => false,
                }
            }
        };
        self.publish_handshake(line_ready, false);
        self.enter(EngineState::Listening);
        Ok(())
    }

    /// Returns `true` when the full response sequence ran and the line is
    /// back at ready; `false` when shutdown abandoned the response before
    /// the byte reached the firmware, in which case the plate must not
    /// move and the line stays busy.
    async fn respond(&mut self, response: Response) -> ProtocolResult<bool> {
        // Busy before the byte; pulse before ready. This exact order is
        // what the firmware's plate logic latches on.
        self.line.set_busy().await?;
        if !self.write_response(response.byte()).await? {
            warn!(%response, "shutdown before response byte was written");
            return Ok(false);
        }
        sleep(RESPONSE_SETTLE).await;
        match response {
            Response::Accept => self.line.pulse_accept().await?,
            Response::Reject | Response::Duplicate => self.line.pulse_reject().await?,
            // No cartridge was classified, so no plate movement.
            Response::ScannerError => {}
        }
        self.line.set_ready().await?;
        debug!(%response, "response complete");
        Ok(true)
    }

    /// `Ok(true)` once the byte is flushed; `Ok(false)` if shutdown arrived
    /// while the link was being recovered and the byte was never written.
    async fn write_response(&mut self, byte: u8) -> ProtocolResult<bool> {
        loop {
            match self.write_once(byte).await {
                Ok(()) => return Ok(true),
                Err(e) => self.recover_link(e).await?,
            }
            if *self.shutdown.borrow() {
                return Ok(false);
            }
        }
    }

    async fn write_once(&mut self, byte: u8) -> ProtocolResult<()> {
        self.link.write_byte(byte).await?;
        self.link.flush().await
    }

    /// Bounded reopen with doubling backoff. `Ok` means the link is usable
    /// again (or shutdown was requested); `Err` is fatal.
    async fn recover_link(&mut self, cause: ProtocolError) -> ProtocolResult<()> {
        warn!(error = %cause, "serial I/O failed, reopening port");
        let mut backoff = self.config.reopen_backoff;
        for attempt in 1..=self.config.reopen_attempts {
            tokio::select! {
                _ = self.shutdown.changed() => return Ok(()),
                _ = sleep(backoff) => {}
            }
            match self.link.reopen().await {
                Ok(()) => {
                    info!(attempt, "serial port reopened");
                    return Ok(());
                }
                Err(e) => {
                    warn!(attempt, error = %e, "reopen attempt failed");
                    backoff *= 2;
                }
            }
        }
        let fatal = ProtocolError::LinkExhausted {
            attempts: self.config.reopen_attempts,
            message: cause.to_string(),
        };
        error!(error = %fatal, "serial link lost, engine stopping");
        let _ = self.events.send(JigEvent::ProtocolError {
            message: fatal.to_string(),
            fatal: true,
        });
        Err(fatal)
    }

    fn publish_handshake(&self, ready: bool, awaiting_scan: bool) {
        let _ = self.events.send(JigEvent::Handshake(HandshakeState {
            ready,
            awaiting_scan,
            trigger_enabled: self.config.trigger_enabled,
        }));
    }

    fn enter(&mut self, state: EngineState) {
        if self.state != state {
            debug!(from = %self.state, to = %state, "engine state");
            self.state = state;
        }
    }
}
