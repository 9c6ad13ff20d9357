//! MachineAdaptor over parsed machine functions.

use super::MachineFunction;
use crate::core::MachineAdaptor;
use crate::ir::BlockId;
use crate::x64::InstrFamily;
use iced_x86::{Instruction, InstructionInfoFactory, OpAccess, Register};
use std::ops::Range;

/// Instruction handle: index in layout order across the function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstRef(pub u32);

#[derive(Debug, Clone)]
struct InstInfo {
    block: BlockId,
    instr: Instruction,
    defs: Vec<Register>,
    family: InstrFamily,
}

/// Adaptor exposing a [`MachineFunction`] to the tracker.
///
/// Register writes and families are computed once on construction.
pub struct MirAdaptor<'f> {
    func: &'f MachineFunction,
    preds: Vec<Vec<BlockId>>,
    insts: Vec<InstInfo>,
    block_ranges: Vec<Range<u32>>,
}

impl<'f> MirAdaptor<'f> {
    pub fn new(func: &'f MachineFunction) -> Self {
        let mut factory = InstructionInfoFactory::new();
        let mut insts = Vec::with_capacity(func.inst_count());
        let mut block_ranges = Vec::with_capacity(func.blocks.len());

        for (idx, block) in func.blocks.iter().enumerate() {
            let start = insts.len() as u32;
            for instr in &block.insts {
                let mut defs = Vec::new();
                for used in factory.info(instr).used_registers() {
                    let reg = used.register();
                    let writes = matches!(
                        used.access(),
                        OpAccess::Write | OpAccess::CondWrite | OpAccess::ReadWrite | OpAccess::ReadCondWrite
                    );
                    if writes && reg.is_gpr() && !defs.contains(&reg) {
                        defs.push(reg);
                    }
                }
                insts.push(InstInfo {
                    block: BlockId(idx as u32),
                    instr: *instr,
                    defs,
                    family: InstrFamily::classify(instr),
                });
            }
            block_ranges.push(start..insts.len() as u32);
        }

        Self {
            func,
            preds: func.preds(),
            insts,
            block_ranges,
        }
    }

    pub fn function(&self) -> &'f MachineFunction {
        self.func
    }

    pub fn instruction(&self, inst: InstRef) -> &Instruction {
        &self.insts[inst.0 as usize].instr
    }

    /// The `idx`-th instruction of `block`.
    pub fn inst_at(&self, block: BlockId, idx: usize) -> Option<InstRef> {
        let range = self.block_ranges.get(block.index())?;
        let inst = range.start + idx as u32;
        range.contains(&inst).then_some(InstRef(inst))
    }

    pub fn block_succs(&self, block: BlockId) -> &[BlockId] {
        &self.func.blocks[block.index()].succs
    }
}

impl MachineAdaptor for MirAdaptor<'_> {
    type InstRef = InstRef;

    fn block_count(&self) -> usize {
        self.func.blocks.len()
    }

    fn block_preds(&self, block: BlockId) -> Box<dyn Iterator<Item = BlockId> + '_> {
        Box::new(self.preds[block.index()].iter().copied())
    }

    fn block_name(&self, block: BlockId) -> String {
        self.func.blocks[block.index()].name.clone()
    }

    fn block_by_name(&self, name: &str) -> Option<BlockId> {
        self.func.block_id(name)
    }

    fn block_insts(&self, block: BlockId) -> Box<dyn Iterator<Item = InstRef> + '_> {
        Box::new(self.block_ranges[block.index()].clone().map(InstRef))
    }

    fn inst_block(&self, inst: InstRef) -> BlockId {
        self.insts[inst.0 as usize].block
    }

    fn inst_defs(&self, inst: InstRef) -> Box<dyn Iterator<Item = Register> + '_> {
        Box::new(self.insts[inst.0 as usize].defs.iter().copied())
    }

    fn inst_family(&self, inst: InstRef) -> InstrFamily {
        self.insts[inst.0 as usize].family
    }
}
