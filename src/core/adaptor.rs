// This module defines the MachineAdaptor trait, the bridge between the register tracker and
// whatever holds the decoded machine function. The tracker only needs a handful of queries:
// the CFG shape (blocks, predecessors, entry), the instructions of each block with the
// registers they write and their family classification, and the register conventions of the
// target (super-register mapping, native widths and the integer argument registers). Target
// conventions have x86-64 System V defaults so adaptors normally implement only the CFG and
// instruction queries. The adaptor is read-only; all mutable state lives in the tracker.

//! MachineAdaptor responsibilities.
//!
//! The framework assumes:
//! - Each function has a single entry block.
//! - Blocks are numbered densely from zero so they can index bitmaps.
//! - Instruction families are classified once, when the function is loaded.

use crate::ir::BlockId;
use crate::x64::{self, InstrFamily};
use iced_x86::Register;

/// Bridge between a decoded machine function and the tracker.
pub trait MachineAdaptor {
    type InstRef: Copy + Eq + std::fmt::Debug;

    /// Number of blocks in the function.
    fn block_count(&self) -> usize;

    /// Entry block of the function.
    fn entry_block(&self) -> BlockId {
        BlockId::ENTRY
    }

    /// Iterator over blocks in layout order.
    fn blocks(&self) -> Box<dyn Iterator<Item = BlockId> + '_> {
        Box::new((0..self.block_count() as u32).map(BlockId))
    }

    /// Predecessors of `block`. May contain duplicates.
    fn block_preds(&self, block: BlockId) -> Box<dyn Iterator<Item = BlockId> + '_>;

    /// Name of the block for diagnostics.
    fn block_name(&self, block: BlockId) -> String {
        block.to_string()
    }

    /// Look up a block by name.
    fn block_by_name(&self, name: &str) -> Option<BlockId> {
        self.blocks().find(|&b| self.block_name(b) == name)
    }

    /// Instructions of `block` in program order.
    fn block_insts(&self, block: BlockId) -> Box<dyn Iterator<Item = Self::InstRef> + '_>;

    /// Block containing `inst`.
    fn inst_block(&self, inst: Self::InstRef) -> BlockId;

    /// Registers written by `inst`, at the width they are written.
    fn inst_defs(&self, inst: Self::InstRef) -> Box<dyn Iterator<Item = Register> + '_>;

    /// Flag derivation family of `inst`.
    fn inst_family(&self, inst: Self::InstRef) -> InstrFamily;

    /// Canonical identity of `reg`.
    fn super_register(&self, reg: Register) -> Register {
        x64::super_register(reg)
    }

    /// Native width of `reg` in bits.
    fn register_width(&self, reg: Register) -> u32 {
        x64::register_width(reg)
    }

    /// Registers carrying the integer arguments, in order.
    fn arg_registers(&self) -> &[Register] {
        &x64::SYSV_INT_ARG_REGS
    }

    /// 1-based position of `reg` among the integer argument registers.
    fn arg_position(&self, reg: Register) -> Option<u32> {
        x64::calling_convention::arg_position(self.arg_registers(), self.super_register(reg))
    }
}
