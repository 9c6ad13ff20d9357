// This module defines error types for the register tracker using the thiserror crate. Every
// variant is an internal-consistency violation of the raising pass: using the null register,
// a zero or mismatched width, a flag update with no derivation rule for the instruction family,
// an unsupported EFLAGS bit, a flag test value produced by the wrong kind of arithmetic, or a
// deferred slot store that was never completed. None of them are recoverable inside the current
// function; the caller abandons that function and moves on to the next one.

//! Error types for register definition tracking.

use crate::ir::{BlockId, SlotId};
use crate::x64::EflagBit;
use thiserror::Error;

/// Tracker failure. Aborts raising of the current function.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TrackerError {
    #[error("Operation on the null register")]
    InvalidRegister,

    #[error("Inconsistent width for {reg}: {reason}")]
    InconsistentWidth { reg: String, reason: String },

    #[error("No {flag} derivation for {family}: {reason}")]
    UnsupportedFlagSemantics {
        flag: EflagBit,
        family: String,
        reason: &'static str,
    },

    #[error("Unsupported EFLAGS bit {flag}")]
    UnsupportedFlagBit { flag: EflagBit },

    #[error("{flag} test value for {family} is not produced by {expected}")]
    FlagProducerMismatch {
        flag: EflagBit,
        family: String,
        expected: &'static str,
    },

    #[error("Deferred store of {reg} from block {block} into slot {slot} was never completed")]
    UndrainedObligation {
        reg: String,
        block: BlockId,
        slot: SlotId,
    },
}

impl TrackerError {
    pub(crate) fn width(reg: impl ToString, reason: impl Into<String>) -> Self {
        TrackerError::InconsistentWidth {
            reg: reg.to_string(),
            reason: reason.into(),
        }
    }
}

/// Result type alias for tracker operations.
pub type TrackerResult<T> = Result<T, TrackerError>;
