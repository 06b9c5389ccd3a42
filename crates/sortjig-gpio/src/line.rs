//! Single-owner driver for the ready/busy handshake line.

use crate::error::Result;
use crate::traits::OutputPin;
use sortjig_core::constants::{
    ACCEPT_PULSE_WIDTH, PULSE_SETUP_DELAY, PULSE_TAIL_DELAY, REJECT_PULSE_WIDTH,
};
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::debug;

struct LineInner<P: OutputPin> {
    primary: P,
    /// Older firmware revisions watch extra pins; they always mirror the
    /// primary level.
    mirrors: Vec<P>,
    ready: bool,
}

impl<P: OutputPin> LineInner<P> {
    fn drive(&mut self, high: bool) -> Result<()> {
        self.primary.set_level(high)?;
        for pin in &mut self.mirrors {
            pin.set_level(high)?;
        }
        self.ready = high;
        Ok(())
    }
}

/// The one owner of the ready/busy GPIO line.
///
/// Every level change and every plate pulse goes through this struct, and
/// the whole scripted pulse runs under one lock acquisition: no concurrent
/// caller can interleave a second pulse or level change until the first
/// completes. An interrupted pulse leaves the physical line in whichever
/// state it happened to be, which is exactly the "mechanism plate stuck"
/// failure this design exists to prevent.
///
/// Logical levels: HIGH = ready, LOW = busy. The accept and reject pulses
/// share a shape (busy → setup delay → high pulse → tail delay → ready)
/// but differ in high-width; the firmware's rejection path is physically
/// longer and latches on the longer pulse.
pub struct ReadyLine<P: OutputPin> {
    inner: Mutex<LineInner<P>>,
}

impl<P: OutputPin> ReadyLine<P> {
    /// Take ownership of the primary pin (and any mirror pins) and drive
    /// them busy, the state the firmware expects at process start.
    ///
    /// # Errors
    ///
    /// Returns a GPIO error if the initial busy level cannot be driven.
    pub fn new(primary: P, mirrors: Vec<P>) -> Result<Self> {
        let mut inner = LineInner {
            primary,
            mirrors,
            ready: true,
        };
        inner.drive(false)?;
        Ok(Self {
            inner: Mutex::new(inner),
        })
    }

    /// Assert ready (line HIGH): the firmware may send commands.
    pub async fn set_ready(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        debug!("line -> ready");
        inner.drive(true)
    }

    /// Assert busy (line LOW): the host is processing.
    pub async fn set_busy(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        debug!("line -> busy");
        inner.drive(false)
    }

    /// Whether the line currently reads ready.
    pub async fn is_ready(&self) -> bool {
        self.inner.lock().await.ready
    }

    /// Run the plate-advance pulse for an accepted cartridge.
    ///
    /// Blocks for the scripted delays; the line ends ready.
    pub async fn pulse_accept(&self) -> Result<()> {
        debug!("accept pulse");
        self.pulse(ACCEPT_PULSE_WIDTH).await
    }

    /// Run the plate-advance pulse for a rejected cartridge.
    ///
    /// Longer high-width than [`ReadyLine::pulse_accept`]; the line ends
    /// ready.
    pub async fn pulse_reject(&self) -> Result<()> {
        debug!("reject pulse");
        self.pulse(REJECT_PULSE_WIDTH).await
    }

    async fn pulse(&self, width: std::time::Duration) -> Result<()> {
        // One guard across the whole script. Holding the lock through the
        // sleeps is the point: it is what makes the pulse atomic.
        let mut inner = self.inner.lock().await;
        inner.drive(false)?;
        sleep(PULSE_SETUP_DELAY).await;
        inner.drive(true)?;
        sleep(width).await;
        inner.drive(false)?;
        sleep(PULSE_TAIL_DELAY).await;
        inner.drive(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockPin;
    use sortjig_core::constants::{
        ACCEPT_PULSE_WIDTH, PULSE_SETUP_DELAY, PULSE_TAIL_DELAY, REJECT_PULSE_WIDTH,
    };
    use std::sync::Arc;
    use tokio::time::Instant;

    #[tokio::test]
    async fn new_line_starts_busy() {
        let (pin, handle) = MockPin::new();
        let line = ReadyLine::new(pin, vec![]).unwrap();
        assert!(!handle.is_high());
        assert!(!line.is_ready().await);
    }

    #[tokio::test(start_paused = true)]
    async fn accept_pulse_sequence_ends_ready() {
        let (pin, handle) = MockPin::new();
        let line = ReadyLine::new(pin, vec![]).unwrap();
        handle.clear();

        line.pulse_accept().await.unwrap();

        // busy -> high pulse -> low tail -> ready
        assert_eq!(handle.transitions(), vec![false, true, false, true]);
        assert!(line.is_ready().await);
    }

    #[tokio::test(start_paused = true)]
    async fn reject_pulse_is_longer_than_accept() {
        let (pin, _handle) = MockPin::new();
        let line = ReadyLine::new(pin, vec![]).unwrap();

        let start = Instant::now();
        line.pulse_accept().await.unwrap();
        let accept_elapsed = start.elapsed();

        let start = Instant::now();
        line.pulse_reject().await.unwrap();
        let reject_elapsed = start.elapsed();

        assert_eq!(
            accept_elapsed,
            PULSE_SETUP_DELAY + ACCEPT_PULSE_WIDTH + PULSE_TAIL_DELAY
        );
        assert_eq!(
            reject_elapsed,
            PULSE_SETUP_DELAY + REJECT_PULSE_WIDTH + PULSE_TAIL_DELAY
        );
        assert!(reject_elapsed > accept_elapsed);
    }

    #[tokio::test(start_paused = true)]
    async fn mirrors_track_primary_level() {
        let (primary, primary_handle) = MockPin::new();
        let (mirror, mirror_handle) = MockPin::new();
        let line = ReadyLine::new(primary, vec![mirror]).unwrap();

        line.set_ready().await.unwrap();
        assert!(primary_handle.is_high());
        assert!(mirror_handle.is_high());

        line.pulse_reject().await.unwrap();
        assert_eq!(primary_handle.transitions(), mirror_handle.transitions());
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_pulses_never_interleave() {
        let (pin, handle) = MockPin::new();
        let line = Arc::new(ReadyLine::new(pin, vec![]).unwrap());
        handle.clear();

        let a = {
            let line = Arc::clone(&line);
            tokio::spawn(async move { line.pulse_accept().await })
        };
        let b = {
            let line = Arc::clone(&line);
            tokio::spawn(async move { line.pulse_reject().await })
        };
        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();

        // Two complete scripts back to back, never mixed.
        assert_eq!(
            handle.transitions(),
            vec![false, true, false, true, false, true, false, true]
        );
    }
}
