// This module defines register identities used by the definition tracker. Physical registers
// come from iced-x86 and are canonicalized to their widest overlapping form (AL, AX and EAX all
// map to RAX) before any table lookup. EFLAGS bits are modelled as separate single-bit
// pseudo-registers so flags flow through the same reaching-definition machinery as GPRs. Only
// the zero, sign, carry and overflow bits are tracked; parity, adjust and direction are known
// by name but rejected. A small name table maps textual register names back to iced registers
// for the command line tooling.

//! Register identities for definition tracking.

use crate::core::error::{TrackerError, TrackerResult};
use iced_x86::Register;
use std::fmt;

/// A single EFLAGS bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EflagBit {
    CF,
    PF,
    AF,
    ZF,
    SF,
    DF,
    OF,
}

impl EflagBit {
    pub fn is_tracked(self) -> bool {
        matches!(self, EflagBit::CF | EflagBit::ZF | EflagBit::SF | EflagBit::OF)
    }

    pub fn name(self) -> &'static str {
        match self {
            EflagBit::CF => "cf",
            EflagBit::PF => "pf",
            EflagBit::AF => "af",
            EflagBit::ZF => "zf",
            EflagBit::SF => "sf",
            EflagBit::DF => "df",
            EflagBit::OF => "of",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        let flag = match name.to_ascii_lowercase().as_str() {
            "cf" => EflagBit::CF,
            "pf" => EflagBit::PF,
            "af" => EflagBit::AF,
            "zf" => EflagBit::ZF,
            "sf" => EflagBit::SF,
            "df" => EflagBit::DF,
            "of" => EflagBit::OF,
            _ => return None,
        };
        Some(flag)
    }
}

impl fmt::Display for EflagBit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Canonical key of the definition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegKey {
    /// A super-register such as RAX or R12.
    Phys(Register),
    /// A flag pseudo-register. Always one bit wide.
    Flag(EflagBit),
}

impl RegKey {
    /// Key for a supported flag bit.
    pub fn flag(bit: EflagBit) -> TrackerResult<Self> {
        if bit.is_tracked() {
            Ok(RegKey::Flag(bit))
        } else {
            Err(TrackerError::UnsupportedFlagBit { flag: bit })
        }
    }

    pub fn is_flag(self) -> bool {
        matches!(self, RegKey::Flag(_))
    }
}

impl fmt::Display for RegKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegKey::Phys(reg) => f.write_str(&register_name(*reg)),
            RegKey::Flag(bit) => write!(f, "{bit}"),
        }
    }
}

/// Widest register overlapping `reg` (AH -> RAX, R9D -> R9).
pub fn super_register(reg: Register) -> Register {
    reg.full_register()
}

/// Native width of `reg` in bits. Zero for `Register::None`.
pub fn register_width(reg: Register) -> u32 {
    reg.size() as u32 * 8
}

/// Lower-case register name.
pub fn register_name(reg: Register) -> String {
    GPR_NAMES
        .iter()
        .find(|(_, r)| *r == reg)
        .map(|(name, _)| (*name).to_string())
        .unwrap_or_else(|| format!("{reg:?}").to_ascii_lowercase())
}

/// Look up a general purpose register by name.
pub fn parse_register(name: &str) -> Option<Register> {
    let lower = name.to_ascii_lowercase();
    GPR_NAMES
        .iter()
        .find(|(n, _)| *n == lower)
        .map(|(_, reg)| *reg)
}

const GPR_NAMES: [(&str, Register); 68] = [
    ("rax", Register::RAX),
    ("rcx", Register::RCX),
    ("rdx", Register::RDX),
    ("rbx", Register::RBX),
    ("rsp", Register::RSP),
    ("rbp", Register::RBP),
    ("rsi", Register::RSI),
    ("rdi", Register::RDI),
    ("r8", Register::R8),
    ("r9", Register::R9),
    ("r10", Register::R10),
    ("r11", Register::R11),
    ("r12", Register::R12),
    ("r13", Register::R13),
    ("r14", Register::R14),
    ("r15", Register::R15),
    ("eax", Register::EAX),
    ("ecx", Register::ECX),
    ("edx", Register::EDX),
    ("ebx", Register::EBX),
    ("esp", Register::ESP),
    ("ebp", Register::EBP),
    ("esi", Register::ESI),
    ("edi", Register::EDI),
    ("r8d", Register::R8D),
    ("r9d", Register::R9D),
    ("r10d", Register::R10D),
    ("r11d", Register::R11D),
    ("r12d", Register::R12D),
    ("r13d", Register::R13D),
    ("r14d", Register::R14D),
    ("r15d", Register::R15D),
    ("ax", Register::AX),
    ("cx", Register::CX),
    ("dx", Register::DX),
    ("bx", Register::BX),
    ("sp", Register::SP),
    ("bp", Register::BP),
    ("si", Register::SI),
    ("di", Register::DI),
    ("r8w", Register::R8W),
    ("r9w", Register::R9W),
    ("r10w", Register::R10W),
    ("r11w", Register::R11W),
    ("r12w", Register::R12W),
    ("r13w", Register::R13W),
    ("r14w", Register::R14W),
    ("r15w", Register::R15W),
    ("al", Register::AL),
    ("cl", Register::CL),
    ("dl", Register::DL),
    ("bl", Register::BL),
    ("spl", Register::SPL),
    ("bpl", Register::BPL),
    ("sil", Register::SIL),
    ("dil", Register::DIL),
    ("r8b", Register::R8L),
    ("r9b", Register::R9L),
    ("r10b", Register::R10L),
    ("r11b", Register::R11L),
    ("r12b", Register::R12L),
    ("r13b", Register::R13L),
    ("r14b", Register::R14L),
    ("r15b", Register::R15L),
    ("ah", Register::AH),
    ("ch", Register::CH),
    ("dh", Register::DH),
    ("bh", Register::BH),
];
