//! Mock serial link for testing without jig hardware.

use crate::error::{ProtocolError, ProtocolResult};
use crate::link::SerialLink;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Default)]
struct LinkState {
    incoming: VecDeque<u8>,
    /// Written bytes paired with the probed line level at write time
    /// (`Some(false)` = line was busy), when a probe is attached.
    written: Vec<(u8, Option<bool>)>,
    read_failures: u32,
    write_failures: u32,
    reopen_failures: u32,
    reopen_count: u32,
}

/// In-memory serial link scripted from a [`MockLinkHandle`].
///
/// Reads pop from a byte queue the handle pushes into; writes are recorded
/// for inspection. A level probe (from
/// [`sortjig_gpio::MockPinHandle::level_probe`]) can be attached so each
/// written byte carries a snapshot of the ready/busy line at the moment it
/// hit the wire; that is how tests prove the busy-before-write ordering.
#[derive(Debug)]
pub struct MockLink {
    state: Arc<Mutex<LinkState>>,
    level_probe: Option<Arc<AtomicBool>>,
}

impl MockLink {
    /// Create a mock link plus its scripting/inspection handle.
    pub fn new() -> (Self, MockLinkHandle) {
        let state = Arc::new(Mutex::new(LinkState::default()));
        let handle = MockLinkHandle {
            state: Arc::clone(&state),
        };
        (
            Self {
                state,
                level_probe: None,
            },
            handle,
        )
    }

    /// Attach a live-level probe sampled on every write.
    #[must_use]
    pub fn with_level_probe(mut self, probe: Arc<AtomicBool>) -> Self {
        self.level_probe = Some(probe);
        self
    }
}

impl SerialLink for MockLink {
    async fn read_byte(&mut self, timeout: Duration) -> ProtocolResult<Option<u8>> {
        {
            let mut state = self.state.lock().unwrap();
            if state.read_failures > 0 {
                state.read_failures -= 1;
                return Err(ProtocolError::Link("injected read failure".to_string()));
            }
            if let Some(byte) = state.incoming.pop_front() {
                return Ok(Some(byte));
            }
        }
        // Nothing queued: behave like a timed-out blocking read.
        tokio::time::sleep(timeout).await;
        Ok(self.state.lock().unwrap().incoming.pop_front())
    }

    async fn write_byte(&mut self, byte: u8) -> ProtocolResult<()> {
        let mut state = self.state.lock().unwrap();
        if state.write_failures > 0 {
            state.write_failures -= 1;
            return Err(ProtocolError::Link("injected write failure".to_string()));
        }
        let level = self
            .level_probe
            .as_ref()
            .map(|probe| probe.load(Ordering::SeqCst));
        state.written.push((byte, level));
        Ok(())
    }

    async fn flush(&mut self) -> ProtocolResult<()> {
        Ok(())
    }

    async fn reopen(&mut self) -> ProtocolResult<()> {
        let mut state = self.state.lock().unwrap();
        state.reopen_count += 1;
        if state.reopen_failures > 0 {
            state.reopen_failures -= 1;
            return Err(ProtocolError::Link("injected reopen failure".to_string()));
        }
        Ok(())
    }
}

/// Scripting and inspection handle for a [`MockLink`].
#[derive(Debug, Clone)]
pub struct MockLinkHandle {
    state: Arc<Mutex<LinkState>>,
}

impl MockLinkHandle {
    /// Queue one incoming byte from the fake firmware.
    pub fn push_byte(&self, byte: u8) {
        self.state.lock().unwrap().incoming.push_back(byte);
    }

    /// Queue several incoming bytes.
    pub fn push_bytes(&self, bytes: &[u8]) {
        self.state.lock().unwrap().incoming.extend(bytes);
    }

    /// Bytes the engine has written so far.
    pub fn written(&self) -> Vec<u8> {
        self.state
            .lock()
            .unwrap()
            .written
            .iter()
            .map(|(b, _)| *b)
            .collect()
    }

    /// Written bytes with the probed line level at write time.
    pub fn written_with_levels(&self) -> Vec<(u8, Option<bool>)> {
        self.state.lock().unwrap().written.clone()
    }

    /// Fail the next `n` reads with a link error.
    pub fn fail_reads(&self, n: u32) {
        self.state.lock().unwrap().read_failures = n;
    }

    /// Fail the next `n` writes with a link error.
    pub fn fail_writes(&self, n: u32) {
        self.state.lock().unwrap().write_failures = n;
    }

    /// Fail the next `n` reopen attempts.
    pub fn fail_reopens(&self, n: u32) {
        self.state.lock().unwrap().reopen_failures = n;
    }

    /// How many times the engine tried to reopen the port.
    pub fn reopen_count(&self) -> u32 {
        self.state.lock().unwrap().reopen_count
    }
}
