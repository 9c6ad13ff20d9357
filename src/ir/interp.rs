//! Reference interpreter for raised functions.
//!
//! Integer values up to 64 bits are held as zero-extended `u64`. Frame slots
//! form a flat memory keyed by slot. Used by tests to check that merges and
//! derived flags compute the values the machine code would.

use super::*;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EvalError {
    #[error("Value %{0} used before it was computed")]
    UseBeforeDef(u32),

    #[error("Missing argument {0}")]
    MissingArgument(u32),

    #[error("Load from uninitialized {0}")]
    UninitializedSlot(SlotId),

    #[error("Cannot evaluate {ty} values")]
    UnsupportedType { ty: Type },

    #[error("Block {0} has no terminator")]
    MissingTerminator(BlockId),

    #[error("Terminator or store %{0} has no value")]
    NotAValue(u32),

    #[error("Execution exceeded {0} steps")]
    OutOfFuel(usize),
}

pub type EvalResult<T> = Result<T, EvalError>;

/// Interpreter over one function.
pub struct Interpreter<'f> {
    func: &'f Function,
    args: Vec<u64>,
    env: HashMap<ValueId, u64>,
    memory: HashMap<SlotId, u64>,
    fuel: usize,
}

impl<'f> Interpreter<'f> {
    pub const DEFAULT_FUEL: usize = 100_000;

    pub fn new(func: &'f Function) -> Self {
        Self {
            func,
            args: Vec::new(),
            env: HashMap::new(),
            memory: HashMap::new(),
            fuel: Self::DEFAULT_FUEL,
        }
    }

    pub fn with_args(mut self, args: &[u64]) -> Self {
        self.args = args.to_vec();
        self
    }

    pub fn with_fuel(mut self, fuel: usize) -> Self {
        self.fuel = fuel;
        self
    }

    /// Value last written to `slot`.
    pub fn slot_value(&self, slot: SlotId) -> Option<u64> {
        self.memory.get(&slot).copied()
    }

    /// Evaluate a value outside of execution, computing operands on demand.
    pub fn eval(&mut self, id: ValueId) -> EvalResult<u64> {
        if let Some(&v) = self.env.get(&id) {
            return Ok(v);
        }
        let v = self.compute(id, true)?;
        self.env.insert(id, v);
        Ok(v)
    }

    /// Execute from the entry block until a return.
    pub fn run(&mut self) -> EvalResult<Option<u64>> {
        let mut block = BlockId::ENTRY;
        let mut steps = 0usize;
        loop {
            let data = self.func.block(block);
            for &inst in &data.insts {
                steps += 1;
                if steps > self.fuel {
                    return Err(EvalError::OutOfFuel(self.fuel));
                }
                if let Op::Store { slot, value } = self.func.op(inst) {
                    let v = self.operand(*value, false)?;
                    self.memory.insert(*slot, v);
                    continue;
                }
                let v = self.compute(inst, false)?;
                self.env.insert(inst, v);
            }

            let term = data.terminator.ok_or(EvalError::MissingTerminator(block))?;
            match self.func.op(term) {
                Op::Br { target } => block = *target,
                Op::CondBr {
                    cond,
                    if_true,
                    if_false,
                } => {
                    block = if self.operand(*cond, false)? & 1 == 1 {
                        *if_true
                    } else {
                        *if_false
                    };
                }
                Op::Ret { value } => {
                    return match value {
                        Some(v) => self.operand(*v, false).map(Some),
                        None => Ok(None),
                    };
                }
                _ => return Err(EvalError::MissingTerminator(block)),
            }
        }
    }

    fn operand(&mut self, id: ValueId, recursive: bool) -> EvalResult<u64> {
        if let Some(&v) = self.env.get(&id) {
            return Ok(v);
        }
        let pure_leaf = matches!(
            self.func.op(id),
            Op::Const(_) | Op::Arg(_) | Op::SlotAddr(_)
        );
        if !recursive && !pure_leaf {
            return Err(EvalError::UseBeforeDef(id.0));
        }
        let v = self.compute(id, recursive)?;
        if pure_leaf || recursive {
            self.env.insert(id, v);
        }
        Ok(v)
    }

    fn compute(&mut self, id: ValueId, recursive: bool) -> EvalResult<u64> {
        let ty = self.func.ty(id);
        let v = match self.func.op(id).clone() {
            Op::Arg(idx) => {
                let raw = *self
                    .args
                    .get(idx as usize)
                    .ok_or(EvalError::MissingArgument(idx))?;
                raw & width_mask(ty.bits())
            }
            Op::Const(v) => v,
            Op::SlotAddr(slot) => slot.0 as u64,
            Op::Binary { op, lhs, rhs } => {
                let bits = self.int_width(ty)?;
                let a = self.operand(lhs, recursive)?;
                let b = self.operand(rhs, recursive)?;
                binary(op, a, b, bits)
            }
            Op::Icmp { pred, lhs, rhs } => {
                let bits = self.int_width(self.func.ty(lhs))?;
                let a = self.operand(lhs, recursive)?;
                let b = self.operand(rhs, recursive)?;
                icmp(pred, a, b, bits) as u64
            }
            Op::Select {
                cond,
                if_true,
                if_false,
            } => {
                if self.operand(cond, recursive)? & 1 == 1 {
                    self.operand(if_true, recursive)?
                } else {
                    self.operand(if_false, recursive)?
                }
            }
            Op::Cast { kind, value } => {
                let from = self.func.ty(value).bits();
                let v = self.operand(value, recursive)?;
                match kind {
                    CastKind::SExt => sign_extend(v, from) & width_mask(ty.bits()),
                    _ => v & width_mask(ty.bits()),
                }
            }
            Op::Overflow { op, lhs, rhs } => {
                let bits = self.int_width(self.func.ty(lhs))?;
                let a = self.operand(lhs, recursive)?;
                let b = self.operand(rhs, recursive)?;
                overflows(op, a, b, bits) as u64
            }
            Op::FunnelShift { dir, hi, lo, amount } => {
                let bits = self.int_width(ty)?;
                let hi = self.operand(hi, recursive)?;
                let lo = self.operand(lo, recursive)?;
                let amount = self.operand(amount, recursive)? % bits as u64;
                funnel(dir, hi, lo, amount as u32, bits)
            }
            Op::Load { slot } => *self
                .memory
                .get(&slot)
                .ok_or(EvalError::UninitializedSlot(slot))?,
            Op::Store { .. } | Op::Br { .. } | Op::CondBr { .. } | Op::Ret { .. } => {
                return Err(EvalError::NotAValue(id.0))
            }
        };
        Ok(v)
    }

    fn int_width(&self, ty: Type) -> EvalResult<u32> {
        match ty {
            Type::Int(bits) if (1..=64).contains(&bits) => Ok(bits),
            ty => Err(EvalError::UnsupportedType { ty }),
        }
    }
}

fn sign_extend(v: u64, bits: u32) -> u64 {
    if bits == 0 || bits >= 64 {
        return v;
    }
    let shift = 64 - bits;
    (((v << shift) as i64) >> shift) as u64
}

fn binary(op: BinaryOp, a: u64, b: u64, bits: u32) -> u64 {
    let mask = width_mask(bits);
    let r = match op {
        BinaryOp::Add => a.wrapping_add(b),
        BinaryOp::Sub => a.wrapping_sub(b),
        BinaryOp::Mul => a.wrapping_mul(b),
        BinaryOp::And => a & b,
        BinaryOp::Or => a | b,
        BinaryOp::Xor => a ^ b,
        BinaryOp::Shl if b < bits as u64 => a << b,
        BinaryOp::LShr if b < bits as u64 => a >> b,
        BinaryOp::AShr if b < bits as u64 => ((sign_extend(a, bits) as i64) >> b) as u64,
        BinaryOp::Shl | BinaryOp::LShr | BinaryOp::AShr => 0,
    };
    r & mask
}

fn icmp(pred: IntPredicate, a: u64, b: u64, bits: u32) -> bool {
    let (sa, sb) = (sign_extend(a, bits) as i64, sign_extend(b, bits) as i64);
    match pred {
        IntPredicate::Eq => a == b,
        IntPredicate::Ne => a != b,
        IntPredicate::Ugt => a > b,
        IntPredicate::Uge => a >= b,
        IntPredicate::Ult => a < b,
        IntPredicate::Ule => a <= b,
        IntPredicate::Sgt => sa > sb,
        IntPredicate::Sge => sa >= sb,
        IntPredicate::Slt => sa < sb,
        IntPredicate::Sle => sa <= sb,
    }
}

fn overflows(op: OverflowOp, a: u64, b: u64, bits: u32) -> bool {
    let (ua, ub) = (a as u128, b as u128);
    let (sa, sb) = (sign_extend(a, bits) as i64 as i128, sign_extend(b, bits) as i64 as i128);
    let smin = -(1i128 << (bits - 1));
    let smax = (1i128 << (bits - 1)) - 1;
    match op {
        OverflowOp::UAdd => ua + ub > width_mask(bits) as u128,
        OverflowOp::USub => ua < ub,
        OverflowOp::SAdd => !(smin..=smax).contains(&(sa + sb)),
        OverflowOp::SSub => !(smin..=smax).contains(&(sa - sb)),
        OverflowOp::SMul => !(smin..=smax).contains(&(sa * sb)),
    }
}

fn funnel(dir: FunnelDir, hi: u64, lo: u64, amount: u32, bits: u32) -> u64 {
    if amount == 0 {
        return match dir {
            FunnelDir::Left => hi,
            FunnelDir::Right => lo,
        };
    }
    let mask = width_mask(bits);
    match dir {
        FunnelDir::Left => ((hi << amount) | (lo >> (bits - amount))) & mask,
        FunnelDir::Right => ((lo >> amount) | (hi << (bits - amount))) & mask,
    }
}
