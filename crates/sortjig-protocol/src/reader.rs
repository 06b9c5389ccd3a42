//! Line-oriented reader for the onboard barcode scanner.

use crate::error::{ProtocolError, ProtocolResult};
use crate::link::SerialLink;
use sortjig_core::constants::{
    LINK_REOPEN_ATTEMPTS, LINK_REOPEN_BACKOFF, MAX_SCAN_LINE, READ_POLL_INTERVAL,
};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Reads newline-terminated scan text from the onboard reader's serial
/// port.
///
/// The reader hardware transmits each decoded code as ASCII followed by
/// CR/LF, at most [`MAX_SCAN_LINE`] bytes per code; a buffer that fills to
/// that length is delivered as a complete line. The task owning a
/// `LineReader` is a scan producer like any other: it hands each line to
/// the `deliver` callback and never touches the firmware link.
pub struct LineReader<L: SerialLink> {
    link: L,
    poll: Duration,
    shutdown: watch::Receiver<bool>,
    buffer: Vec<u8>,
}

impl<L: SerialLink> LineReader<L> {
    pub fn new(link: L, shutdown: watch::Receiver<bool>) -> Self {
        Self {
            link,
            poll: READ_POLL_INTERVAL,
            shutdown,
            buffer: Vec::new(),
        }
    }

    /// Run until shutdown, handing each complete line to `deliver`.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::LinkExhausted`] when the reader port fails
    /// and cannot be reopened within the bounded retry budget.
    pub async fn run(mut self, mut deliver: impl FnMut(String)) -> ProtocolResult<()> {
        info!("scan reader listening");
        loop {
            if *self.shutdown.borrow() {
                info!("scan reader stopping");
                return Ok(());
            }
            match self.link.read_byte(self.poll).await {
                Ok(None) => continue,
                Ok(Some(byte)) => {
                    if let Some(line) = self.feed(byte) {
                        deliver(line);
                    }
                }
                Err(e) => self.recover_link(e).await?,
            }
        }
    }

    fn feed(&mut self, byte: u8) -> Option<String> {
        if byte == b'\r' || byte == b'\n' {
            return self.take_line();
        }
        self.buffer.push(byte);
        if self.buffer.len() >= MAX_SCAN_LINE {
            return self.take_line();
        }
        None
    }

    fn take_line(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }
        let text = String::from_utf8_lossy(&self.buffer).into_owned();
        self.buffer.clear();
        debug!(len = text.len(), "scan line received");
        Some(text)
    }

    /// Bounded reopen with doubling backoff, mirroring the firmware link's
    /// recovery policy. `Ok` means the port is usable again (or shutdown
    /// was requested); `Err` is fatal for this producer.
    async fn recover_link(&mut self, cause: ProtocolError) -> ProtocolResult<()> {
        warn!(error = %cause, "reader I/O failed, reopening port");
        self.buffer.clear();
        let mut backoff = LINK_REOPEN_BACKOFF;
        for attempt in 1..=LINK_REOPEN_ATTEMPTS {
            tokio::select! {
                _ = self.shutdown.changed() => return Ok(()),
                _ = sleep(backoff) => {}
            }
            match self.link.reopen().await {
                Ok(()) => {
                    info!(attempt, "reader port reopened");
                    return Ok(());
                }
                Err(e) => {
                    warn!(attempt, error = %e, "reader reopen attempt failed");
                    backoff *= 2;
                }
            }
        }
        let fatal = ProtocolError::LinkExhausted {
            attempts: LINK_REOPEN_ATTEMPTS,
            message: cause.to_string(),
        };
        error!(error = %fatal, "reader port lost, producer stopping");
        Err(fatal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockLink;
    use std::sync::{Arc, Mutex};

    struct Harness {
        link_handle: crate::mock::MockLinkHandle,
        lines: Arc<Mutex<Vec<String>>>,
        shutdown: watch::Sender<bool>,
        task: tokio::task::JoinHandle<ProtocolResult<()>>,
    }

    fn harness() -> Harness {
        let (link, link_handle) = MockLink::new();
        let (shutdown, shutdown_rx) = watch::channel(false);
        let lines = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&lines);
        let reader = LineReader::new(link, shutdown_rx);
        let task = tokio::spawn(reader.run(move |line| sink.lock().unwrap().push(line)));
        Harness {
            link_handle,
            lines,
            shutdown,
            task,
        }
    }

    async fn wait_for_lines(lines: &Arc<Mutex<Vec<String>>>, count: usize) {
        while lines.lock().unwrap().len() < count {
            sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn terminated_lines_are_delivered() {
        let h = harness();
        h.link_handle.push_bytes(b"PAS12211702610\r\nMX2401\n");

        wait_for_lines(&h.lines, 2).await;
        assert_eq!(
            *h.lines.lock().unwrap(),
            vec!["PAS12211702610".to_string(), "MX2401".to_string()]
        );

        h.shutdown.send(true).unwrap();
        h.task.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn blank_lines_are_skipped() {
        let h = harness();
        h.link_handle.push_bytes(b"\r\n\nPAS12211702610\n");

        wait_for_lines(&h.lines, 1).await;
        assert_eq!(*h.lines.lock().unwrap(), vec!["PAS12211702610".to_string()]);

        h.shutdown.send(true).unwrap();
        h.task.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn unterminated_overflow_is_delivered_whole() {
        let h = harness();
        let long = vec![b'X'; MAX_SCAN_LINE];
        h.link_handle.push_bytes(&long);

        wait_for_lines(&h.lines, 1).await;
        assert_eq!(h.lines.lock().unwrap()[0].len(), MAX_SCAN_LINE);

        h.shutdown.send(true).unwrap();
        h.task.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_reopens_stop_the_producer() {
        let h = harness();
        h.link_handle.fail_reopens(LINK_REOPEN_ATTEMPTS);
        h.link_handle.fail_reads(1);

        let result = h.task.await.unwrap();
        assert!(matches!(
            result,
            Err(ProtocolError::LinkExhausted { attempts, .. })
                if attempts == LINK_REOPEN_ATTEMPTS
        ));
        assert_eq!(h.link_handle.reopen_count(), LINK_REOPEN_ATTEMPTS);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failure_discards_partial_line() {
        let h = harness();
        h.link_handle.push_bytes(b"PAS122");
        // Let the partial line be consumed, inject the failure, and only
        // queue the clean scan once the port has been reopened.
        sleep(Duration::from_millis(50)).await;
        h.link_handle.fail_reads(1);
        while h.link_handle.reopen_count() == 0 {
            sleep(Duration::from_millis(10)).await;
        }
        h.link_handle.push_bytes(b"MX2401\n");

        wait_for_lines(&h.lines, 1).await;
        assert_eq!(*h.lines.lock().unwrap(), vec!["MX2401".to_string()]);
        assert_eq!(h.link_handle.reopen_count(), 1);

        h.shutdown.send(true).unwrap();
        h.task.await.unwrap().unwrap();
    }
}
