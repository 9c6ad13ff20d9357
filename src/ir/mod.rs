// This module implements the raised IR that register tracking emits into. A Function owns a flat
// value arena, basic blocks holding ordered instruction lists with an optional terminator, and a
// list of frame slots whose address values live in the entry region. Constants are interned per
// (type, bits) pair so that two requests for the same literal yield the same ValueId, which lets
// value identity stand in for structural equality when reaching definitions are deduplicated.
// Instructions are always appended after the last non-terminator instruction of a block, which
// is both "at the use site" for the block being translated and "at the end" for blocks that are
// already finished. The printer (print.rs) renders functions in an LLVM-like syntax and the
// interpreter (interp.rs) evaluates values and whole functions for testing.

//! Raised SSA IR.

pub mod interp;
pub mod print;

use hashbrown::HashMap;
use std::fmt;

/// Index of a value in its function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValueId(pub u32);

/// Index of a basic block. Block 0 is the entry block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u32);

/// Index of a frame slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotId(pub u32);

impl ValueId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl BlockId {
    pub const ENTRY: BlockId = BlockId(0);

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl SlotId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bb{}", self.0)
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "slot{}", self.0)
    }
}

/// Value type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Type {
    Void,
    Int(u32),
    Ptr,
    F32,
    F64,
}

impl Type {
    pub const I1: Type = Type::Int(1);
    pub const I8: Type = Type::Int(8);
    pub const I16: Type = Type::Int(16);
    pub const I32: Type = Type::Int(32);
    pub const I64: Type = Type::Int(64);

    pub fn int_bits(self) -> Option<u32> {
        match self {
            Type::Int(bits) => Some(bits),
            _ => None,
        }
    }

    /// Storage width in bits.
    pub fn bits(self) -> u32 {
        match self {
            Type::Void => 0,
            Type::Int(bits) => bits,
            Type::Ptr | Type::F64 => 64,
            Type::F32 => 32,
        }
    }

    /// Storage size in bytes, at least one for sized types.
    pub fn byte_size(self) -> u32 {
        match self {
            Type::Void => 0,
            ty => ty.bits().div_ceil(8).max(1),
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Void => f.write_str("void"),
            Type::Int(bits) => write!(f, "i{bits}"),
            Type::Ptr => f.write_str("ptr"),
            Type::F32 => f.write_str("f32"),
            Type::F64 => f.write_str("f64"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    And,
    Or,
    Xor,
    Shl,
    LShr,
    AShr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntPredicate {
    Eq,
    Ne,
    Ugt,
    Uge,
    Ult,
    Ule,
    Sgt,
    Sge,
    Slt,
    Sle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastKind {
    Trunc,
    ZExt,
    SExt,
    Bitcast,
    PtrToInt,
    IntToPtr,
}

/// Checked arithmetic producing only the overflow bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverflowOp {
    SAdd,
    UAdd,
    SSub,
    USub,
    SMul,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunnelDir {
    Left,
    Right,
}

/// Operation producing a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    Arg(u32),
    Const(u64),
    Binary {
        op: BinaryOp,
        lhs: ValueId,
        rhs: ValueId,
    },
    Icmp {
        pred: IntPredicate,
        lhs: ValueId,
        rhs: ValueId,
    },
    Select {
        cond: ValueId,
        if_true: ValueId,
        if_false: ValueId,
    },
    Cast {
        kind: CastKind,
        value: ValueId,
    },
    Overflow {
        op: OverflowOp,
        lhs: ValueId,
        rhs: ValueId,
    },
    /// `Left`: high half of `hi:lo << amount`. `Right`: low half of `hi:lo >> amount`.
    FunnelShift {
        dir: FunnelDir,
        hi: ValueId,
        lo: ValueId,
        amount: ValueId,
    },
    SlotAddr(SlotId),
    Load {
        slot: SlotId,
    },
    Store {
        slot: SlotId,
        value: ValueId,
    },
    Br {
        target: BlockId,
    },
    CondBr {
        cond: ValueId,
        if_true: BlockId,
        if_false: BlockId,
    },
    Ret {
        value: Option<ValueId>,
    },
}

impl Op {
    pub fn is_terminator(&self) -> bool {
        matches!(self, Op::Br { .. } | Op::CondBr { .. } | Op::Ret { .. })
    }
}

#[derive(Debug, Clone)]
pub struct ValueData {
    pub ty: Type,
    pub op: Op,
    pub name: Option<String>,
    /// Owning block. `None` for arguments, constants and slot addresses.
    pub block: Option<BlockId>,
}

#[derive(Debug, Clone)]
pub struct Block {
    pub name: String,
    pub insts: Vec<ValueId>,
    pub terminator: Option<ValueId>,
}

/// A frame slot allocated in the entry region.
#[derive(Debug, Clone)]
pub struct Slot {
    pub name: String,
    pub ty: Type,
    pub addr: ValueId,
    /// Offset from the frame base, always negative.
    pub offset: i64,
    pub align: u32,
}

/// A raised function.
#[derive(Debug, Clone)]
pub struct Function {
    pub name: String,
    args: Vec<ValueId>,
    values: Vec<ValueData>,
    blocks: Vec<Block>,
    slots: Vec<Slot>,
    consts: HashMap<(Type, u64), ValueId>,
    frame_size: i64,
}

impl Function {
    /// Create a function with the given argument types and named blocks.
    ///
    /// The first block is the entry block.
    pub fn new<S: Into<String>>(
        name: impl Into<String>,
        arg_types: &[Type],
        block_names: impl IntoIterator<Item = S>,
    ) -> Self {
        let mut func = Self {
            name: name.into(),
            args: Vec::with_capacity(arg_types.len()),
            values: Vec::new(),
            blocks: Vec::new(),
            slots: Vec::new(),
            consts: HashMap::new(),
            frame_size: 0,
        };
        for (idx, &ty) in arg_types.iter().enumerate() {
            let id = func.push_value(ty, Op::Arg(idx as u32), None, None);
            func.args.push(id);
        }
        for name in block_names {
            func.blocks.push(Block {
                name: name.into(),
                insts: Vec::new(),
                terminator: None,
            });
        }
        func
    }

    pub fn args(&self) -> &[ValueId] {
        &self.args
    }

    pub fn arg(&self, idx: usize) -> Option<ValueId> {
        self.args.get(idx).copied()
    }

    pub fn value(&self, id: ValueId) -> &ValueData {
        &self.values[id.index()]
    }

    pub fn ty(&self, id: ValueId) -> Type {
        self.values[id.index()].ty
    }

    pub fn op(&self, id: ValueId) -> &Op {
        &self.values[id.index()].op
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id.index()]
    }

    pub fn blocks(&self) -> impl Iterator<Item = (BlockId, &Block)> {
        self.blocks
            .iter()
            .enumerate()
            .map(|(idx, block)| (BlockId(idx as u32), block))
    }

    pub fn block_id(&self, name: &str) -> Option<BlockId> {
        self.blocks
            .iter()
            .position(|b| b.name == name)
            .map(|idx| BlockId(idx as u32))
    }

    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    pub fn slot(&self, id: SlotId) -> &Slot {
        &self.slots[id.index()]
    }

    pub fn frame_size(&self) -> i64 {
        self.frame_size
    }

    /// Give a value a printable name.
    pub fn set_name(&mut self, id: ValueId, name: impl Into<String>) {
        self.values[id.index()].name = Some(name.into());
    }

    /// Interned integer constant, truncated to the type's width.
    pub fn const_int(&mut self, ty: Type, value: u64) -> ValueId {
        let bits = ty.int_bits().unwrap_or(64);
        let masked = value & width_mask(bits);
        if let Some(&id) = self.consts.get(&(ty, masked)) {
            return id;
        }
        let id = self.push_value(ty, Op::Const(masked), None, None);
        self.consts.insert((ty, masked), id);
        id
    }

    pub fn const_bool(&mut self, value: bool) -> ValueId {
        self.const_int(Type::I1, value as u64)
    }

    /// Constant payload of `id`, if it is a constant.
    pub fn as_const(&self, id: ValueId) -> Option<u64> {
        match self.op(id) {
            Op::Const(v) => Some(*v),
            _ => None,
        }
    }

    /// Allocate a frame slot in the entry region.
    ///
    /// Slot names are made unique by appending a counter.
    pub fn alloc_slot(&mut self, ty: Type, name: &str) -> SlotId {
        let id = SlotId(self.slots.len() as u32);
        let size = ty.byte_size() as i64;
        let align = (ty.byte_size().next_power_of_two()).min(16);
        let top = self.frame_size + size;
        self.frame_size = (top + align as i64 - 1) / align as i64 * align as i64;

        let mut unique = name.to_string();
        let mut counter = 1;
        while self.slots.iter().any(|s| s.name == unique) {
            unique = format!("{name}.{counter}");
            counter += 1;
        }

        let addr = self.push_value(Type::Ptr, Op::SlotAddr(id), Some(unique.clone()), None);
        self.slots.push(Slot {
            name: unique,
            ty,
            addr,
            offset: -self.frame_size,
            align,
        });
        id
    }

    pub fn binary(&mut self, block: BlockId, op: BinaryOp, lhs: ValueId, rhs: ValueId) -> ValueId {
        let ty = self.ty(lhs);
        self.append(block, ty, Op::Binary { op, lhs, rhs })
    }

    pub fn icmp(&mut self, block: BlockId, pred: IntPredicate, lhs: ValueId, rhs: ValueId) -> ValueId {
        self.append(block, Type::I1, Op::Icmp { pred, lhs, rhs })
    }

    pub fn select(
        &mut self,
        block: BlockId,
        cond: ValueId,
        if_true: ValueId,
        if_false: ValueId,
    ) -> ValueId {
        let ty = self.ty(if_true);
        self.append(block, ty, Op::Select { cond, if_true, if_false })
    }

    pub fn cast(&mut self, block: BlockId, kind: CastKind, value: ValueId, to: Type) -> ValueId {
        self.append(block, to, Op::Cast { kind, value })
    }

    pub fn overflow(&mut self, block: BlockId, op: OverflowOp, lhs: ValueId, rhs: ValueId) -> ValueId {
        self.append(block, Type::I1, Op::Overflow { op, lhs, rhs })
    }

    pub fn funnel_shift(
        &mut self,
        block: BlockId,
        dir: FunnelDir,
        hi: ValueId,
        lo: ValueId,
        amount: ValueId,
    ) -> ValueId {
        let ty = self.ty(hi);
        self.append(block, ty, Op::FunnelShift { dir, hi, lo, amount })
    }

    pub fn load(&mut self, block: BlockId, slot: SlotId) -> ValueId {
        let ty = self.slots[slot.index()].ty;
        self.append(block, ty, Op::Load { slot })
    }

    pub fn store(&mut self, block: BlockId, slot: SlotId, value: ValueId) -> ValueId {
        self.append(block, Type::Void, Op::Store { slot, value })
    }

    pub fn br(&mut self, block: BlockId, target: BlockId) -> ValueId {
        self.terminate(block, Op::Br { target })
    }

    pub fn cond_br(
        &mut self,
        block: BlockId,
        cond: ValueId,
        if_true: BlockId,
        if_false: BlockId,
    ) -> ValueId {
        self.terminate(block, Op::CondBr { cond, if_true, if_false })
    }

    pub fn ret(&mut self, block: BlockId, value: Option<ValueId>) -> ValueId {
        self.terminate(block, Op::Ret { value })
    }

    /// Look through width-adjusting conversions.
    pub fn strip_casts(&self, mut id: ValueId) -> ValueId {
        while let Op::Cast {
            kind: CastKind::Trunc | CastKind::ZExt | CastKind::SExt | CastKind::Bitcast,
            value,
        } = self.op(id)
        {
            id = *value;
        }
        id
    }

    /// Stores into `slot`, in block order.
    pub fn stores_to(&self, slot: SlotId) -> Vec<(BlockId, ValueId)> {
        let mut stores = Vec::new();
        for (block_id, block) in self.blocks() {
            for &inst in &block.insts {
                if let Op::Store { slot: s, value } = self.op(inst) {
                    if *s == slot {
                        stores.push((block_id, *value));
                    }
                }
            }
        }
        stores
    }

    /// Loads from `slot`, in block order.
    pub fn loads_from(&self, slot: SlotId) -> Vec<(BlockId, ValueId)> {
        let mut loads = Vec::new();
        for (block_id, block) in self.blocks() {
            for &inst in &block.insts {
                if matches!(self.op(inst), Op::Load { slot: s } if *s == slot) {
                    loads.push((block_id, inst));
                }
            }
        }
        loads
    }

    fn append(&mut self, block: BlockId, ty: Type, op: Op) -> ValueId {
        let id = self.push_value(ty, op, None, Some(block));
        self.blocks[block.index()].insts.push(id);
        id
    }

    fn terminate(&mut self, block: BlockId, op: Op) -> ValueId {
        let id = self.push_value(Type::Void, op, None, Some(block));
        self.blocks[block.index()].terminator = Some(id);
        id
    }

    fn push_value(
        &mut self,
        ty: Type,
        op: Op,
        name: Option<String>,
        block: Option<BlockId>,
    ) -> ValueId {
        let id = ValueId(self.values.len() as u32);
        self.values.push(ValueData { ty, op, name, block });
        id
    }
}

/// All-ones mask for `bits` bits, saturating at 64.
pub fn width_mask(bits: u32) -> u64 {
    if bits >= 64 {
        u64::MAX
    } else {
        (1u64 << bits) - 1
    }
}
