// This module gathers the infrastructure shared by the register tracker: the MachineAdaptor
// trait through which the tracker sees the decoded machine function, the arena-backed raising
// session with its statistics, the per-block register definition table, the error taxonomy, and
// helpers for tests that need an arena-backed session.

//! Core tracking infrastructure.
//!
//! # Key Components
//!
//! ## Adaptor (`adaptor`)
//! - CFG and instruction queries over a decoded machine function
//! - Target register conventions with System V defaults
//!
//! ## Session Management (`session`)
//! - Arena allocation using `bumpalo` for query scratch space
//! - Tracking statistics
//!
//! ## Definition Store (`register_file`)
//! - Per-register, per-block definition records with pending markers

pub mod adaptor;
pub mod error;
pub mod register_file;
pub mod session;
pub mod test_utils;

pub use adaptor::MachineAdaptor;
pub use error::{TrackerError, TrackerResult};
pub use register_file::{DefState, Definition, RegisterFile};
pub use session::{RaiseSession, SessionStats};
