// This file reconstructs EFLAGS bits from raised arithmetic. The driver raises an instruction's
// main computation first and hands the resulting value to the synthesizer together with the
// instruction; the synthesizer looks through width-adjusting casts to find the arithmetic that
// produced the value and derives the requested bit from its operands according to the
// instruction family. Zero and sign only need the result. Carry and overflow come from checked
// arithmetic on the original operands, from the bits a shift or rotate moved out, or, for signed
// multiply, from one overflow bit shared by both flags. A shift whose count may be zero keeps the
// carry that reached it. Flags are stored as one-bit definitions and read back through the same
// resolver as registers.

use super::*;
use crate::ir::{BinaryOp, FunnelDir, IntPredicate, Op, OverflowOp};
use crate::x64::{EflagBit, InstrFamily};

impl<'a, A: MachineAdaptor> ValueTracker<'a, A> {
    /// Derive `flag` for `inst` from the value its computation produced.
    ///
    /// # Arguments
    /// * `func` - Function receiving the derivation
    /// * `flag` - Bit to derive
    /// * `inst` - Instruction updating the flag
    /// * `test` - Raised result of `inst`
    pub fn set_flag_from_test(
        &mut self,
        func: &mut Function,
        flag: EflagBit,
        inst: A::InstRef,
        test: ValueId,
    ) -> TrackerResult<()> {
        let key = RegKey::flag(flag)?;
        let block = self.adaptor.inst_block(inst);
        let family = self.adaptor.inst_family(inst);

        let value = match flag {
            EflagBit::ZF => self.zero_flag(func, key, block, test)?,
            EflagBit::SF => self.sign_flag(func, key, block, test)?,
            EflagBit::OF => self.overflow_flag(func, block, family, test)?,
            EflagBit::CF => self.carry_flag(func, block, family, test)?,
            EflagBit::PF | EflagBit::AF | EflagBit::DF => {
                return Err(TrackerError::UnsupportedFlagBit { flag })
            }
        };
        func.set_name(value, flag.name());
        log::trace!("{} from {} in {} = %{}", flag, family, self.adaptor.block_name(block), value.0);

        self.defs.set(key, block, 1, value)?;
        if family == InstrFamily::SignedMultiply && matches!(flag, EflagBit::OF | EflagBit::CF) {
            let other = if flag == EflagBit::OF { EflagBit::CF } else { EflagBit::OF };
            self.defs.set(RegKey::Flag(other), block, 1, value)?;
        }
        self.session.record_flag_derived(&family.name());
        Ok(())
    }

    /// Set `flag` to a constant in `block`.
    pub fn set_flag_value(
        &mut self,
        func: &mut Function,
        flag: EflagBit,
        block: BlockId,
        value: bool,
    ) -> TrackerResult<()> {
        let key = RegKey::flag(flag)?;
        let constant = func.const_bool(value);
        self.defs.set(key, block, 1, constant)?;
        self.session.record_flag_set();
        Ok(())
    }

    /// Value of `flag` at the current point of `block`.
    pub fn read_flag(
        &mut self,
        func: &mut Function,
        flag: EflagBit,
        block: BlockId,
    ) -> TrackerResult<Option<ValueId>> {
        let key = RegKey::flag(flag)?;
        self.resolve_key(func, key, Type::I1, block, false, true)
    }

    fn zero_flag(&self, func: &mut Function, key: RegKey, block: BlockId, test: ValueId) -> TrackerResult<ValueId> {
        int_width(func, key, test)?;
        let zero = func.const_int(func.ty(test), 0);
        Ok(func.icmp(block, IntPredicate::Eq, test, zero))
    }

    fn sign_flag(&self, func: &mut Function, key: RegKey, block: BlockId, test: ValueId) -> TrackerResult<ValueId> {
        let width = int_width(func, key, test)?;
        let mask = func.const_int(func.ty(test), 1 << (width - 1));
        let masked = func.binary(block, BinaryOp::And, test, mask);
        Ok(func.icmp(block, IntPredicate::Eq, masked, mask))
    }

    fn overflow_flag(
        &self,
        func: &mut Function,
        block: BlockId,
        family: InstrFamily,
        test: ValueId,
    ) -> TrackerResult<ValueId> {
        let flag = EflagBit::OF;
        let key = RegKey::Flag(flag);
        let producer = func.strip_casts(test);
        let checked = match family {
            InstrFamily::Add => Some((BinaryOp::Add, OverflowOp::SAdd)),
            InstrFamily::Subtract | InstrFamily::Compare => Some((BinaryOp::Sub, OverflowOp::SSub)),
            InstrFamily::SignedMultiply => Some((BinaryOp::Mul, OverflowOp::SMul)),
            _ => None,
        };
        if let Some((op, overflow)) = checked {
            let (lhs, rhs) = binary_operands(func, flag, family, producer, op)?;
            return Ok(func.overflow(block, overflow, lhs, rhs));
        }

        match family {
            InstrFamily::RotateLeft { count: Some(1) } => {
                let width = int_width(func, key, producer)?;
                let carry = bit_set(func, block, producer, 0);
                let msb = bit_set(func, block, producer, width - 1);
                Ok(func.binary(block, BinaryOp::Xor, carry, msb))
            }
            InstrFamily::RotateRight { count: Some(1) } => {
                let width = int_width(func, key, producer)?;
                if width < 2 {
                    return Err(TrackerError::width(key, "rotate of a single bit"));
                }
                let msb = bit_set(func, block, producer, width - 1);
                let next = bit_set(func, block, producer, width - 2);
                Ok(func.binary(block, BinaryOp::Xor, msb, next))
            }
            InstrFamily::RotateLeft { .. } | InstrFamily::RotateRight { .. } => {
                Err(TrackerError::UnsupportedFlagSemantics {
                    flag,
                    family: family.name(),
                    reason: "overflow is undefined unless the rotate count is one",
                })
            }
            _ => Err(TrackerError::UnsupportedFlagSemantics {
                flag,
                family: family.name(),
                reason: "no overflow rule",
            }),
        }
    }

    fn carry_flag(
        &mut self,
        func: &mut Function,
        block: BlockId,
        family: InstrFamily,
        test: ValueId,
    ) -> TrackerResult<ValueId> {
        let flag = EflagBit::CF;
        let key = RegKey::Flag(flag);
        let producer = func.strip_casts(test);
        let producer_op = func.op(producer).clone();
        match family {
            InstrFamily::Negate => {
                let (zero, operand) = binary_operands(func, flag, family, producer, BinaryOp::Sub)?;
                if func.as_const(zero) != Some(0) {
                    return Err(mismatch(flag, family, "a subtract from zero"));
                }
                Ok(func.icmp(block, IntPredicate::Ne, operand, zero))
            }
            InstrFamily::Add => {
                let (lhs, rhs) = binary_operands(func, flag, family, producer, BinaryOp::Add)?;
                Ok(func.overflow(block, OverflowOp::UAdd, lhs, rhs))
            }
            InstrFamily::Subtract | InstrFamily::Compare => {
                let (lhs, rhs) = binary_operands(func, flag, family, producer, BinaryOp::Sub)?;
                Ok(func.overflow(block, OverflowOp::USub, lhs, rhs))
            }
            InstrFamily::SignedMultiply => {
                let (lhs, rhs) = binary_operands(func, flag, family, producer, BinaryOp::Mul)?;
                Ok(func.overflow(block, OverflowOp::SMul, lhs, rhs))
            }
            InstrFamily::RotateLeft { .. } => {
                int_width(func, key, producer)?;
                Ok(bit_set(func, block, producer, 0))
            }
            InstrFamily::RotateRight { .. } => {
                let width = int_width(func, key, producer)?;
                Ok(bit_set(func, block, producer, width - 1))
            }
            InstrFamily::ShiftLeft => match producer_op {
                Op::Binary {
                    op: BinaryOp::Shl,
                    lhs,
                    rhs,
                } => self.shifted_out_carry(func, block, family, lhs, rhs, true),
                _ => Err(mismatch(flag, family, "a left shift")),
            },
            InstrFamily::ShiftLeftDouble => match producer_op {
                Op::FunnelShift {
                    dir: FunnelDir::Left,
                    hi,
                    amount,
                    ..
                } => self.shifted_out_carry(func, block, family, hi, amount, true),
                _ => Err(mismatch(flag, family, "a left funnel shift")),
            },
            InstrFamily::ShiftRightDouble => match producer_op {
                Op::FunnelShift {
                    dir: FunnelDir::Right,
                    lo,
                    amount,
                    ..
                } => self.shifted_out_carry(func, block, family, lo, amount, false),
                _ => Err(mismatch(flag, family, "a right funnel shift")),
            },
            InstrFamily::Other(_) => Err(TrackerError::UnsupportedFlagSemantics {
                flag,
                family: family.name(),
                reason: "no carry rule",
            }),
        }
    }

    /// Last bit shifted out of `dst`, or the incoming carry when `count` is zero.
    fn shifted_out_carry(
        &mut self,
        func: &mut Function,
        block: BlockId,
        family: InstrFamily,
        dst: ValueId,
        count: ValueId,
        left: bool,
    ) -> TrackerResult<ValueId> {
        let key = RegKey::Flag(EflagBit::CF);
        let width = int_width(func, key, dst)?;
        let ty = func.ty(dst);
        if func.ty(count) != ty {
            return Err(TrackerError::width(
                key,
                format!("shift count of type {} for a {} operand", func.ty(count), ty),
            ));
        }

        let constant = func.as_const(count);
        if constant != Some(0) {
            let one = func.const_int(ty, 1);
            let index = if left {
                let bits = func.const_int(ty, width as u64);
                func.binary(block, BinaryOp::Sub, bits, count)
            } else {
                func.binary(block, BinaryOp::Sub, count, one)
            };
            let bit = func.binary(block, BinaryOp::Shl, one, index);
            let masked = func.binary(block, BinaryOp::And, dst, bit);
            let zero = func.const_int(ty, 0);
            let carry = func.icmp(block, IntPredicate::Ne, masked, zero);
            if constant.is_some() {
                return Ok(carry);
            }

            let previous = self.previous_carry(func, block, family)?;
            let nonzero = func.icmp(block, IntPredicate::Ne, count, zero);
            return Ok(func.select(block, nonzero, carry, previous));
        }

        self.previous_carry(func, block, family)
    }

    fn previous_carry(&mut self, func: &mut Function, block: BlockId, family: InstrFamily) -> TrackerResult<ValueId> {
        let key = RegKey::Flag(EflagBit::CF);
        self.resolve_key(func, key, Type::I1, block, false, true)?
            .ok_or_else(|| TrackerError::UnsupportedFlagSemantics {
                flag: EflagBit::CF,
                family: family.name(),
                reason: "no carry reaches a shift whose count may be zero",
            })
    }
}

/// Width of an integer test value, limited to 64 bits.
fn int_width(func: &Function, key: RegKey, value: ValueId) -> TrackerResult<u32> {
    match func.ty(value) {
        Type::Int(bits) if (1..=64).contains(&bits) => Ok(bits),
        ty => Err(TrackerError::width(key, format!("flag test on a {ty} value"))),
    }
}

/// `(value & (1 << index)) != 0`.
fn bit_set(func: &mut Function, block: BlockId, value: ValueId, index: u32) -> ValueId {
    let ty = func.ty(value);
    let mask = func.const_int(ty, 1 << index);
    let zero = func.const_int(ty, 0);
    let masked = func.binary(block, BinaryOp::And, value, mask);
    func.icmp(block, IntPredicate::Ne, masked, zero)
}

/// Operands of the binary `op` that produced `producer`.
fn binary_operands(
    func: &Function,
    flag: EflagBit,
    family: InstrFamily,
    producer: ValueId,
    op: BinaryOp,
) -> TrackerResult<(ValueId, ValueId)> {
    let expected = match op {
        BinaryOp::Add => "an add",
        BinaryOp::Sub => "a subtract",
        BinaryOp::Mul => "a multiply",
        _ => "a binary operation",
    };
    match *func.op(producer) {
        Op::Binary { op: found, lhs, rhs } if found == op => {
            if func.ty(lhs) != func.ty(rhs) {
                return Err(TrackerError::width(
                    RegKey::Flag(flag),
                    format!("operands of type {} and {}", func.ty(lhs), func.ty(rhs)),
                ));
            }
            Ok((lhs, rhs))
        }
        _ => Err(mismatch(flag, family, expected)),
    }
}

fn mismatch(flag: EflagBit, family: InstrFamily, expected: &'static str) -> TrackerError {
    TrackerError::FlagProducerMismatch {
        flag,
        family: family.name(),
        expected,
    }
}
