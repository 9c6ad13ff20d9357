// This module implements the register definition store. For every canonical register key it
// keeps, per basic block, the most recent definition seen while raising that block: the bit
// width of the sub-register last written and the value, or a pending marker when the block is
// known to write the register but has not been raised far enough yet. Pending markers are seeded
// up front from a scan of every instruction so that predecessor walks can stop at blocks that
// will redefine a register even before those blocks are translated. The store only checks
// widths; argument bindings, canonicalization and predecessor walks belong to the tracker.

//! Per-block register definition table.

use crate::core::error::{TrackerError, TrackerResult};
use crate::ir::{BlockId, ValueId};
use crate::x64::RegKey;
use hashbrown::HashMap;

/// State of a register definition in a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefState {
    /// No record.
    Unset,
    /// Redefined in this block, value not known yet.
    Pending,
    Value(ValueId),
}

/// A register definition record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Definition {
    pub block: BlockId,
    pub width: u32,
    pub state: DefState,
}

impl Definition {
    pub fn value(&self) -> Option<ValueId> {
        match self.state {
            DefState::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.state == DefState::Pending
    }
}

/// Definition table keyed by canonical register, then block.
#[derive(Debug, Default)]
pub struct RegisterFile {
    defs: HashMap<RegKey, HashMap<BlockId, Definition>>,
}

impl RegisterFile {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `key` as redefined in `block` with an unknown value.
    pub fn seed(&mut self, key: RegKey, block: BlockId, width: u32) -> TrackerResult<()> {
        self.insert(key, block, width, DefState::Pending)
    }

    /// Overwrite the record of `key` in `block`.
    pub fn set(&mut self, key: RegKey, block: BlockId, width: u32, value: ValueId) -> TrackerResult<()> {
        self.insert(key, block, width, DefState::Value(value))
    }

    pub fn get(&self, key: RegKey, block: BlockId) -> Option<&Definition> {
        self.defs.get(&key).and_then(|blocks| blocks.get(&block))
    }

    /// Remove pending records of `block`, returning the affected keys.
    pub fn drop_pending(&mut self, block: BlockId) -> Vec<RegKey> {
        let mut dropped = Vec::new();
        for (key, blocks) in self.defs.iter_mut() {
            if blocks.get(&block).is_some_and(Definition::is_pending) {
                blocks.remove(&block);
                dropped.push(*key);
            }
        }
        dropped
    }

    /// All records, sorted by block then key name for stable output.
    pub fn records(&self) -> Vec<(RegKey, Definition)> {
        let mut out: Vec<(RegKey, Definition)> = self
            .defs
            .iter()
            .flat_map(|(key, blocks)| blocks.values().map(move |def| (*key, *def)))
            .collect();
        out.sort_by_key(|(key, def)| (def.block, key.to_string()));
        out
    }

    pub fn len(&self) -> usize {
        self.defs.values().map(|blocks| blocks.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn insert(&mut self, key: RegKey, block: BlockId, width: u32, state: DefState) -> TrackerResult<()> {
        if width == 0 {
            return Err(TrackerError::width(key, "zero-width definition"));
        }
        if key.is_flag() && width != 1 {
            return Err(TrackerError::width(key, format!("flag definition of width {width}")));
        }
        self.defs
            .entry(key)
            .or_default()
            .insert(block, Definition { block, width, state });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::x64::EflagBit;
    use iced_x86::Register;

    const RAX: RegKey = RegKey::Phys(Register::RAX);

    #[test]
    fn test_seed_then_set() {
        let mut file = RegisterFile::new();
        file.seed(RAX, BlockId(1), 64).unwrap();
        assert!(file.get(RAX, BlockId(1)).unwrap().is_pending());
        assert!(file.get(RAX, BlockId(2)).is_none());

        file.set(RAX, BlockId(1), 8, ValueId(7)).unwrap();
        let def = file.get(RAX, BlockId(1)).unwrap();
        assert_eq!(def.value(), Some(ValueId(7)));
        assert_eq!(def.width, 8);
        assert!(file.get(RAX, BlockId(3)).is_none());
    }

    #[test]
    fn test_width_invariants() {
        let mut file = RegisterFile::new();
        assert!(matches!(
            file.seed(RAX, BlockId(0), 0),
            Err(TrackerError::InconsistentWidth { .. })
        ));
        let zf = RegKey::Flag(EflagBit::ZF);
        assert!(file.set(zf, BlockId(0), 1, ValueId(0)).is_ok());
        assert!(matches!(
            file.set(zf, BlockId(0), 8, ValueId(0)),
            Err(TrackerError::InconsistentWidth { .. })
        ));
        assert!(!file.is_empty());
    }

    #[test]
    fn test_drop_pending_keeps_values() {
        let mut file = RegisterFile::new();
        let rcx = RegKey::Phys(Register::RCX);
        file.seed(RAX, BlockId(2), 64).unwrap();
        file.seed(rcx, BlockId(2), 32).unwrap();
        file.set(rcx, BlockId(2), 32, ValueId(3)).unwrap();
        file.seed(RAX, BlockId(4), 64).unwrap();

        assert_eq!(file.drop_pending(BlockId(2)), vec![RAX]);
        assert!(file.get(RAX, BlockId(2)).is_none());
        assert_eq!(file.get(rcx, BlockId(2)).map(|def| def.state), Some(DefState::Value(ValueId(3))));
        assert!(file.get(RAX, BlockId(4)).unwrap().is_pending());
        assert_eq!(file.len(), 2);
    }

    #[test]
    fn test_records_are_sorted() {
        let mut file = RegisterFile::new();
        file.seed(RAX, BlockId(3), 64).unwrap();
        file.seed(RegKey::Phys(Register::RDI), BlockId(0), 64).unwrap();
        file.seed(RAX, BlockId(0), 64).unwrap();
        let order: Vec<_> = file.records().iter().map(|(k, d)| (d.block, k.to_string())).collect();
        assert_eq!(
            order,
            vec![
                (BlockId(0), "rax".to_string()),
                (BlockId(0), "rdi".to_string()),
                (BlockId(3), "rax".to_string()),
            ]
        );
    }
}
