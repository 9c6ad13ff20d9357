//! mcraise - register value resolution for x86-64 lifting.
//!
//! Raising machine code to an SSA IR needs a value for every register read,
//! while the machine redefines the same registers across blocks and loops.
//! The [`tracker::ValueTracker`] answers those reads during a single pass
//! over a partially raised function: it walks predecessors for reaching
//! definitions, merges divergent definitions through frame slots, and
//! reconstructs EFLAGS bits from the raised arithmetic.
//!
//! # Primary Usage
//!
//! ```ignore
//! use mcraise::core::RaiseSession;
//! use mcraise::mir::{MachineFunction, MirAdaptor};
//! use mcraise::tracker::ValueTracker;
//! use bumpalo::Bump;
//!
//! let arena = Bump::new();
//! let session = RaiseSession::new(&arena);
//! let machine = &MachineFunction::parse(text)?[0];
//! let adaptor = MirAdaptor::new(machine);
//! let mut func = machine.raised_function();
//! let mut tracker = ValueTracker::new(&session, &adaptor, &func)?;
//! // ... raise instructions, calling record_definition / resolve ...
//! let summary = tracker.finish(&mut func)?;
//! ```
//!
//! # Architecture
//!
//! - [`core`] - Adaptor trait, session, definition store, errors
//! - [`tracker`] - Reaching definitions, merge promotion, flag synthesis
//! - [`ir`] - Raised IR, printer and interpreter
//! - [`x64`] - Register identities, argument registers, instruction families
//! - [`mir`] - Text machine-function fixtures

pub mod core;
pub mod ir;
pub mod mir;
pub mod tracker;
pub mod x64;

pub use crate::core::{
    DefState, Definition, MachineAdaptor, RaiseSession, SessionStats, TrackerError, TrackerResult,
};
pub use ir::{BlockId, Function, SlotId, Type, ValueId};
pub use tracker::ValueTracker;
pub use x64::{EflagBit, InstrFamily, RegKey};
