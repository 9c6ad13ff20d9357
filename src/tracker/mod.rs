// This module implements the value tracker, the per-function context that assigns raised IR
// values to physical register reads. A tracker is created right after the machine function's CFG
// is known. Construction binds the integer arguments to their System V registers in the entry
// block and pre-scans every instruction so each block that writes a register gets a pending
// record for it. While the driver raises instructions it records definitions here and asks the
// resolver (resolver.rs) for reaching values; flag updates go through the synthesizer
// (flags.rs). All state is owned by the tracker and every operation takes the function being
// built explicitly, so independent functions can be raised by independent trackers.

//! Per-function register value tracking.

mod flags;
mod resolver;

pub use resolver::{ReachingDef, TrackerSummary};

use crate::core::error::{TrackerError, TrackerResult};
use crate::core::register_file::{DefState, Definition, RegisterFile};
use crate::core::session::RaiseSession;
use crate::core::MachineAdaptor;
use crate::ir::{BlockId, Function, SlotId, Type, ValueId};
use crate::x64::calling_convention::is_integer_class;
use crate::x64::RegKey;
use hashbrown::HashMap;
use iced_x86::Register;

/// Incoming argument bound to an argument register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArgBinding {
    pub value: ValueId,
    pub width: u32,
}

/// Store of a not-yet-known definition into a merge slot, completed after raising.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeferredStore {
    pub key: RegKey,
    pub block: BlockId,
    pub slot: SlotId,
}

/// A merge point promoted to a frame slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Merge {
    pub key: RegKey,
    pub block: BlockId,
    pub slot: SlotId,
    /// Value cached as the block's definition after the load.
    pub value: ValueId,
}

/// Register value tracker for one function.
pub struct ValueTracker<'a, A: MachineAdaptor> {
    session: &'a RaiseSession<'a>,
    adaptor: &'a A,
    defs: RegisterFile,
    arg_bindings: HashMap<Register, ArgBinding>,
    deferred: Vec<DeferredStore>,
    drained: usize,
    merges: Vec<Merge>,
}

impl<'a, A: MachineAdaptor> ValueTracker<'a, A> {
    /// Create a tracker for `func`, whose CFG is described by `adaptor`.
    ///
    /// # Arguments
    /// * `session` - Session providing scratch memory and statistics
    /// * `adaptor` - CFG and instruction queries
    /// * `func` - Raised function; only its argument list is read here
    pub fn new(session: &'a RaiseSession<'a>, adaptor: &'a A, func: &Function) -> TrackerResult<Self> {
        let entry = adaptor.entry_block();
        let mut defs = RegisterFile::new();
        let mut arg_bindings = HashMap::new();

        // Floating point arguments travel in vector registers and take no position.
        let int_args: Vec<(usize, ValueId)> = func
            .args()
            .iter()
            .copied()
            .enumerate()
            .filter(|&(_, arg)| is_integer_class(func.ty(arg)))
            .collect();
        for &reg in adaptor.arg_registers() {
            let Some(position) = adaptor.arg_position(reg) else {
                continue;
            };
            let Some(&(idx, value)) = (position as usize).checked_sub(1).and_then(|n| int_args.get(n)) else {
                continue;
            };
            let width = func.ty(value).bits();
            let full = adaptor.super_register(reg);
            defs.set(RegKey::Phys(full), entry, width, value)?;
            arg_bindings.insert(full, ArgBinding { value, width });
            log::trace!("{}: argument {} bound to {:?}", func.name, idx, full);
        }

        for block in adaptor.blocks() {
            for inst in adaptor.block_insts(block) {
                for reg in adaptor.inst_defs(inst) {
                    if reg == Register::None {
                        continue;
                    }
                    let width = adaptor.register_width(reg);
                    defs.seed(RegKey::Phys(adaptor.super_register(reg)), block, width)?;
                }
            }
        }

        log::debug!(
            "Tracking {}: {} blocks, {} argument bindings, {} seeded records",
            func.name,
            adaptor.block_count(),
            arg_bindings.len(),
            defs.len()
        );

        Ok(Self {
            session,
            adaptor,
            defs,
            arg_bindings,
            deferred: Vec::new(),
            drained: 0,
            merges: Vec::new(),
        })
    }

    pub fn adaptor(&self) -> &'a A {
        self.adaptor
    }

    /// Record that `reg` holds `value` at this point of `block`.
    ///
    /// The width is taken from `reg` itself, so writing AL records 8 bits
    /// under RAX.
    pub fn record_definition(&mut self, reg: Register, block: BlockId, value: ValueId) -> TrackerResult<()> {
        let key = self.key(reg)?;
        let width = self.adaptor.register_width(reg);
        self.defs.set(key, block, width, value)?;
        self.session.record_definition();
        log::trace!("def {} in {} = %{} ({} bits)", key, block, value.0, width);
        Ok(())
    }

    /// Definition of `reg` in `block` without looking at predecessors.
    pub fn local_definition(&self, reg: Register, block: BlockId) -> TrackerResult<Option<Definition>> {
        let key = self.key(reg)?;
        Ok(self.local_def(key, block))
    }

    /// Width of the last definition of `reg` in `block`, 0 if there is none.
    pub fn width_of(&self, reg: Register, block: BlockId) -> TrackerResult<u32> {
        let key = self.key(reg)?;
        Ok(self.local_def(key, block).map(|def| def.width).unwrap_or(0))
    }

    /// Argument bound to `reg`, if any.
    pub fn arg_binding(&self, reg: Register) -> Option<ArgBinding> {
        self.arg_bindings.get(&self.adaptor.super_register(reg)).copied()
    }

    /// Mark `block` as fully raised.
    ///
    /// Pending records that were never overwritten are dropped so later
    /// walks see through the block.
    pub fn finish_block(&mut self, block: BlockId) -> usize {
        let dropped = self.defs.drop_pending(block);
        if !dropped.is_empty() {
            log::debug!(
                "{}: dropping {} pending records without a definition",
                self.adaptor.block_name(block),
                dropped.len()
            );
            self.session.record_pending_dropped(dropped.len());
        }
        dropped.len()
    }

    /// Snapshot of the definition table, sorted by block.
    pub fn definitions(&self) -> Vec<(RegKey, Definition)> {
        self.defs.records()
    }

    /// Stores still waiting for their definitions.
    pub fn deferred(&self) -> &[DeferredStore] {
        &self.deferred
    }

    /// Merges promoted so far.
    pub fn merges(&self) -> &[Merge] {
        &self.merges
    }

    fn key(&self, reg: Register) -> TrackerResult<RegKey> {
        if reg == Register::None {
            return Err(TrackerError::InvalidRegister);
        }
        Ok(RegKey::Phys(self.adaptor.super_register(reg)))
    }

    /// Local record, falling back to the argument binding in the entry block.
    fn local_def(&self, key: RegKey, block: BlockId) -> Option<Definition> {
        let local = self.defs.get(key, block).copied();
        if block == self.adaptor.entry_block() && local.and_then(|d| d.value()).is_none() {
            if let RegKey::Phys(reg) = key {
                if let Some(binding) = self.arg_bindings.get(&reg) {
                    return Some(Definition {
                        block,
                        width: binding.width,
                        state: DefState::Value(binding.value),
                    });
                }
            }
        }
        local
    }

    /// Width of the canonical register behind `key`.
    fn canonical_width(&self, key: RegKey) -> u32 {
        match key {
            RegKey::Phys(reg) => self.adaptor.register_width(reg),
            RegKey::Flag(_) => 1,
        }
    }
}
