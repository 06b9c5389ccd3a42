//! UART protocol engine for the jig firmware handshake.
//!
//! The firmware sends single command bytes; the host answers with single
//! ASCII status bytes and drives the ready/busy GPIO line in lockstep:
//!
//! ```text
//! Listening ──(scan command)──▶ RequestingScan ──▶ AwaitingClassification
//!      ▲                                                   │
//!      └──────────────── RespondingComplete ◀──────────────┘
//! ```
//!
//! The response sequence is strict: assert busy, write the byte, flush,
//! settle, run the plate pulse, assert ready. Reordering any of these is
//! how the mechanism plate ends up stuck mid-advance.
//!
//! The serial port sits behind the [`SerialLink`] trait ([`UartLink`] for
//! hardware, [`MockLink`] for tests); scan classification is reached
//! through the [`ScanGateway`] seam so this crate never depends on the
//! coordinator.

#![allow(async_fn_in_trait)]

pub mod commands;
pub mod engine;
pub mod error;
pub mod gateway;
pub mod link;
pub mod mock;
pub mod reader;

pub use commands::{Command, CommandDecoder, Response};
pub use engine::{ProtocolConfig, ProtocolEngine};
pub use error::{ProtocolError, ProtocolResult};
pub use gateway::ScanGateway;
pub use link::{SerialLink, UartLink};
pub use mock::{MockLink, MockLinkHandle};
pub use reader::LineReader;
