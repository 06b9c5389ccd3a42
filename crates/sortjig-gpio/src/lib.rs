//! Ready/busy line control for the jig firmware handshake.
//!
//! The firmware watches one GPIO line to know whether the host may be sent
//! commands (HIGH = ready) and to latch plate-advance pulses after each
//! scan response. Getting the pulse sequencing wrong is the classic way to
//! leave the mechanism plate stuck, so all writes to the line funnel
//! through a single [`ReadyLine`] owner that serializes every level change
//! and pulse behind one lock.
//!
//! The pin itself is abstracted behind [`OutputPin`] with two
//! implementations:
//!
//! - [`SysfsPin`]: the real `/sys/class/gpio` interface on the jig SBC.
//! - [`MockPin`]: in-memory pin that records every transition, for tests.

pub mod error;
mod line;
mod mock;
mod sysfs;
pub mod traits;

pub use error::{GpioError, Result};
pub use line::ReadyLine;
pub use mock::{MockPin, MockPinHandle};
pub use sysfs::SysfsPin;
pub use traits::OutputPin;
