//! Mock pin for testing without jig hardware.

use crate::error::Result;
use crate::traits::OutputPin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// In-memory pin that records every level transition.
///
/// Created together with a [`MockPinHandle`] that tests keep to inspect
/// the transition history and to probe the live level from other mocked
/// components (e.g. asserting that a UART byte was written while the line
/// was busy).
///
/// # Examples
///
/// ```
/// use sortjig_gpio::{MockPin, OutputPin};
///
/// let (mut pin, handle) = MockPin::new();
/// pin.set_high().unwrap();
/// pin.set_low().unwrap();
///
/// assert!(!handle.is_high());
/// assert_eq!(handle.transitions(), vec![true, false]);
/// ```
#[derive(Debug)]
pub struct MockPin {
    level: Arc<AtomicBool>,
    transitions: Arc<Mutex<Vec<bool>>>,
}

impl MockPin {
    /// Create a mock pin starting low, plus its inspection handle.
    pub fn new() -> (Self, MockPinHandle) {
        let level = Arc::new(AtomicBool::new(false));
        let transitions = Arc::new(Mutex::new(Vec::new()));
        let handle = MockPinHandle {
            level: Arc::clone(&level),
            transitions: Arc::clone(&transitions),
        };
        (Self { level, transitions }, handle)
    }
}

impl Default for MockPin {
    fn default() -> Self {
        Self::new().0
    }
}

impl OutputPin for MockPin {
    fn set_high(&mut self) -> Result<()> {
        self.level.store(true, Ordering::SeqCst);
        self.transitions.lock().unwrap().push(true);
        Ok(())
    }

    fn set_low(&mut self) -> Result<()> {
        self.level.store(false, Ordering::SeqCst);
        self.transitions.lock().unwrap().push(false);
        Ok(())
    }

    fn is_high(&self) -> bool {
        self.level.load(Ordering::SeqCst)
    }
}

/// Inspection handle for a [`MockPin`].
#[derive(Debug, Clone)]
pub struct MockPinHandle {
    level: Arc<AtomicBool>,
    transitions: Arc<Mutex<Vec<bool>>>,
}

impl MockPinHandle {
    /// Live level of the pin (`true` = high).
    pub fn is_high(&self) -> bool {
        self.level.load(Ordering::SeqCst)
    }

    /// Shared live-level cell, for probing from other mocked components.
    pub fn level_probe(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.level)
    }

    /// Every level written so far, in write order.
    pub fn transitions(&self) -> Vec<bool> {
        self.transitions.lock().unwrap().clone()
    }

    /// Forget recorded transitions (the live level is kept).
    pub fn clear(&self) {
        self.transitions.lock().unwrap().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_transitions_in_order() {
        let (mut pin, handle) = MockPin::new();
        pin.set_high().unwrap();
        pin.set_high().unwrap();
        pin.set_low().unwrap();
        assert_eq!(handle.transitions(), vec![true, true, false]);
    }

    #[test]
    fn probe_tracks_live_level() {
        let (mut pin, handle) = MockPin::new();
        let probe = handle.level_probe();
        assert!(!probe.load(Ordering::SeqCst));
        pin.set_high().unwrap();
        assert!(probe.load(Ordering::SeqCst));
    }
}
