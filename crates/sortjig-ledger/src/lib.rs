//! Persistent scan ledger for the cartridge-sorting jig.
//!
//! SQLite-backed, append-only record of cartridge scan outcomes with:
//!
//! - a strictly increasing `sequence_id` that is never reused, even after
//!   the retention policy deletes rows (SQLite `AUTOINCREMENT`);
//! - a bounded retention policy (oldest rows deleted once the row count
//!   exceeds the cap), applied inside the same transaction as each insert
//!   so a crash never leaves a half-written state;
//! - a recent-duplicate window query over the newest N rows;
//! - a persisted operator reset marker and current-matrix value in a small
//!   key/value table, so counts and the active mould survive restarts.
//!
//! The connection is single-writer by design: only the scan coordinator's
//! consumer task mutates the ledger, and the duplicate check runs in the
//! same transaction as the pending insert to rule out check/insert races.

pub mod connection;
pub mod error;
pub mod models;
pub mod store;

pub use connection::{Database, DatabaseConfig};
pub use error::{StorageError, StorageResult};
pub use models::{LedgerRecord, NewLedgerRecord, ScanFlag};
pub use store::LedgerStore;
