//! Scan pipeline coordination and process lifecycle.
//!
//! Two pieces:
//!
//! - [`ScanCoordinator`]: the multi-producer, single-consumer scan
//!   pipeline. Producers call [`ScanCoordinator::offer`] with raw scan
//!   text; a capacity-1 inbox is the busy guard (a second producer's text
//!   is dropped with a warning, never queued). The single consumer task
//!   runs the validator and feeds outcomes to the protocol engine through
//!   the [`sortjig_protocol::ScanGateway`] seam.
//! - [`Orchestrator`]: process startup/shutdown. Boot runs the
//!   busy → ready → busy GPIO script the firmware watches for, then starts
//!   the engine; shutdown stops the engine, lets any in-flight pulse
//!   finish, and parks the line busy.

pub mod coordinator;
pub mod orchestrator;

pub use coordinator::{CoordinatorGateway, CoordinatorHandles, ScanCoordinator, spawn_pipeline};
pub use orchestrator::Orchestrator;
