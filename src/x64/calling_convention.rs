// This module describes the part of the System V AMD64 calling convention the tracker needs:
// which general purpose registers carry the first integer-class arguments. Integer and pointer
// arguments are assigned RDI, RSI, RDX, RCX, R8 and R9 in order; floating point arguments travel
// in XMM registers and do not consume a GPR slot. Positions are 1-based to match how argument
// registers are usually described, so position N holds the Nth integer-class argument.

//! System V x86-64 integer argument registers.

use crate::ir::Type;
use iced_x86::Register;

/// Integer argument registers in assignment order.
pub const SYSV_INT_ARG_REGS: [Register; 6] = [
    Register::RDI,
    Register::RSI,
    Register::RDX,
    Register::RCX,
    Register::R8,
    Register::R9,
];

/// 1-based position of `reg` (any width) in the integer argument list `regs`.
pub fn arg_position(regs: &[Register], reg: Register) -> Option<u32> {
    let full = reg.full_register();
    regs.iter()
        .position(|&r| r == full)
        .map(|idx| idx as u32 + 1)
}

/// Whether an argument of type `ty` is passed in a general purpose register.
pub fn is_integer_class(ty: Type) -> bool {
    matches!(ty, Type::Int(_) | Type::Ptr)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positions() {
        let regs = &SYSV_INT_ARG_REGS;
        assert_eq!(arg_position(regs, Register::RDI), Some(1));
        assert_eq!(arg_position(regs, Register::ESI), Some(2));
        assert_eq!(arg_position(regs, Register::R9L), Some(6));
        assert_eq!(arg_position(regs, Register::RAX), None);
        assert_eq!(arg_position(regs, Register::R10), None);
    }

    #[test]
    fn test_integer_class() {
        assert!(is_integer_class(Type::Int(32)));
        assert!(is_integer_class(Type::Int(1)));
        assert!(is_integer_class(Type::Ptr));
        assert!(!is_integer_class(Type::F64));
        assert!(!is_integer_class(Type::F32));
    }
}
