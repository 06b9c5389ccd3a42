//! Scan classification for the cartridge-sorting jig.
//!
//! Two pieces:
//!
//! - [`ReferenceSets`]: the accept/reject membership lists, loaded once at
//!   startup from operator-supplied files. Missing files are a startup
//!   fatal; there is no runtime reload.
//! - [`Validator`]: classifies normalized scan text into matrix or
//!   cartridge outcomes, owns the current-matrix cell and the
//!   count-since-matrix counter, and writes ledger rows for cartridge
//!   outcomes.
//!
//! The validator runs on the coordinator's single consumer task; it is not
//! shared across tasks and needs no internal locking.

pub mod reference;
pub mod validator;

pub use reference::ReferenceSets;
pub use validator::Validator;
