// This module classifies decoded x86-64 instructions into the closed set of families the flag
// synthesizer knows how to derive EFLAGS for. Classification happens once per instruction when a
// machine function is loaded, and the result is matched exhaustively afterwards instead of
// repeatedly inspecting mnemonics. Rotates carry their immediate count since the overflow flag
// is only defined for single-bit rotates; a count held in CL is unknown statically.

//! Instruction family classification.

use iced_x86::{Instruction, Mnemonic, OpKind};
use std::fmt;

/// Instruction family relevant to flag derivation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstrFamily {
    Add,
    Subtract,
    Compare,
    Negate,
    /// `count` is `None` when the rotate amount comes from CL.
    RotateLeft { count: Option<u32> },
    RotateRight { count: Option<u32> },
    /// SHL and SAL.
    ShiftLeft,
    ShiftLeftDouble,
    ShiftRightDouble,
    SignedMultiply,
    /// Anything without flag derivation rules.
    Other(Mnemonic),
}

impl InstrFamily {
    pub fn classify(instr: &Instruction) -> Self {
        match instr.mnemonic() {
            Mnemonic::Add => InstrFamily::Add,
            Mnemonic::Sub => InstrFamily::Subtract,
            Mnemonic::Cmp => InstrFamily::Compare,
            Mnemonic::Neg => InstrFamily::Negate,
            Mnemonic::Rol => InstrFamily::RotateLeft {
                count: immediate_count(instr),
            },
            Mnemonic::Ror => InstrFamily::RotateRight {
                count: immediate_count(instr),
            },
            Mnemonic::Shl | Mnemonic::Sal => InstrFamily::ShiftLeft,
            Mnemonic::Shld => InstrFamily::ShiftLeftDouble,
            Mnemonic::Shrd => InstrFamily::ShiftRightDouble,
            Mnemonic::Imul => InstrFamily::SignedMultiply,
            other => InstrFamily::Other(other),
        }
    }

    pub fn name(&self) -> String {
        match self {
            InstrFamily::Add => "add".into(),
            InstrFamily::Subtract => "sub".into(),
            InstrFamily::Compare => "cmp".into(),
            InstrFamily::Negate => "neg".into(),
            InstrFamily::RotateLeft { .. } => "rol".into(),
            InstrFamily::RotateRight { .. } => "ror".into(),
            InstrFamily::ShiftLeft => "shl".into(),
            InstrFamily::ShiftLeftDouble => "shld".into(),
            InstrFamily::ShiftRightDouble => "shrd".into(),
            InstrFamily::SignedMultiply => "imul".into(),
            InstrFamily::Other(m) => format!("{m:?}").to_ascii_lowercase(),
        }
    }
}

impl fmt::Display for InstrFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// Rotate amount when it is encoded in the instruction.
fn immediate_count(instr: &Instruction) -> Option<u32> {
    if instr.op_count() < 2 {
        return None;
    }
    match instr.op1_kind() {
        OpKind::Immediate8 => Some(instr.immediate8() as u32),
        _ => None,
    }
}
