//! x86-64 architecture-specific components.
//!
//! - Register identities and canonicalization
//! - System V integer argument registers
//! - Instruction family classification for flag derivation

pub mod calling_convention;
pub mod family;
pub mod registers;

pub use calling_convention::{arg_position, SYSV_INT_ARG_REGS};
pub use family::InstrFamily;
pub use registers::{parse_register, register_width, super_register, EflagBit, RegKey};
