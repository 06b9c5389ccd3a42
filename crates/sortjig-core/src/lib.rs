//! Shared domain types for the cartridge-sorting jig scan-handshake core.
//!
//! This crate holds everything the other workspace members agree on: the
//! UART command/response byte values spoken with the jig firmware, the
//! GPIO handshake timing constants, the scan/classification data model,
//! the event payloads published to front-end listeners, and the error
//! taxonomy shared across crates.
//!
//! No I/O happens here. The GPIO line lives in `sortjig-gpio`, the ledger
//! in `sortjig-ledger`, the wire protocol in `sortjig-protocol`, and the
//! pipeline wiring in `sortjig-coordinator`.

pub mod config;
pub mod constants;
pub mod error;
pub mod types;

pub use config::JigConfig;
pub use error::{Error, Result};
pub use types::*;

/// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
