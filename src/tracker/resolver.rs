// This file implements reaching-definition resolution. A read of a register in a block is
// answered from the block's own record when it holds a value. Otherwise the resolver walks
// predecessors breadth first, one walk per distinct predecessor with its own visited bitmap, and
// stops each path at the first block holding a record for the register. Hits are deduplicated by
// value identity. A single known value is returned directly; anything else is a merge point and is
// promoted to a frame slot: known values are stored at the end of their defining blocks, pending
// ones become deferred stores drained once the whole function is raised, and the block reads the
// slot. The load is cached as the block's definition so later reads in the block are local hits.

use super::*;
use crate::ir::CastKind;
use bumpalo::collections::Vec as BumpVec;

/// A definition reaching a block along some path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReachingDef {
    pub block: BlockId,
    /// `Pending` or `Value`.
    pub state: DefState,
}

impl ReachingDef {
    fn same_definition(&self, other: &ReachingDef) -> bool {
        match (self.state, other.state) {
            (DefState::Value(a), DefState::Value(b)) => a == b,
            (DefState::Pending, DefState::Pending) => self.block == other.block,
            _ => false,
        }
    }
}

/// Outcome of tracking a function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TrackerSummary {
    pub merges: usize,
    pub deferred_drained: usize,
}

impl<'a, A: MachineAdaptor> ValueTracker<'a, A> {
    /// Value of `reg` on entry to the current point of `block`.
    ///
    /// # Arguments
    /// * `func` - Function receiving merge slots, stores and loads
    /// * `reg` - Register being read, at the width it is read
    /// * `block` - Block containing the read
    /// * `all_preds` - Require a definition along every predecessor path
    /// * `native_width` - Convert a merged value to the width of `reg`
    ///
    /// Returns `None` when no definition reaches the block.
    pub fn resolve(
        &mut self,
        func: &mut Function,
        reg: Register,
        block: BlockId,
        all_preds: bool,
        native_width: bool,
    ) -> TrackerResult<Option<ValueId>> {
        let key = self.key(reg)?;
        let native = Type::Int(self.adaptor.register_width(reg));
        self.resolve_key(func, key, native, block, all_preds, native_width)
    }

    /// Distinct definitions of `reg` reaching `block` from its predecessors.
    pub fn reaching_defs(&self, reg: Register, block: BlockId, all_preds: bool) -> TrackerResult<Vec<ReachingDef>> {
        let key = self.key(reg)?;
        Ok(self.collect_reaching(key, block, all_preds))
    }

    /// Complete every deferred store with the final definition of its block.
    ///
    /// Must run after all blocks are raised. Returns the number of stores
    /// emitted.
    pub fn drain_deferred(&mut self, func: &mut Function) -> TrackerResult<usize> {
        let pending = std::mem::take(&mut self.deferred);
        for store in &pending {
            let value = self
                .local_def(store.key, store.block)
                .and_then(|def| def.value())
                .ok_or_else(|| TrackerError::UndrainedObligation {
                    reg: store.key.to_string(),
                    block: store.block,
                    slot: store.slot,
                })?;
            let slot_ty = func.slot(store.slot).ty;
            let stored = self.coerce(func, store.key, store.block, value, slot_ty)?;
            func.store(store.block, store.slot, stored);
            log::trace!(
                "deferred store of {} from {} into {}",
                store.key,
                self.adaptor.block_name(store.block),
                store.slot
            );
        }

        if !pending.is_empty() {
            log::debug!("{}: drained {} deferred stores", func.name, pending.len());
        }
        self.drained += pending.len();
        self.session.record_deferred_drained(pending.len());
        Ok(pending.len())
    }

    /// Drain outstanding stores and close the function.
    pub fn finish(mut self, func: &mut Function) -> TrackerResult<TrackerSummary> {
        self.drain_deferred(func)?;
        self.session.record_function_tracked();
        Ok(TrackerSummary {
            merges: self.merges.len(),
            deferred_drained: self.drained,
        })
    }

    pub(super) fn resolve_key(
        &mut self,
        func: &mut Function,
        key: RegKey,
        native: Type,
        block: BlockId,
        all_preds: bool,
        native_width: bool,
    ) -> TrackerResult<Option<ValueId>> {
        if let Some(value) = self.local_def(key, block).and_then(|def| def.value()) {
            self.session.record_local_hit();
            return Ok(Some(value));
        }

        self.session.record_predecessor_walk();
        let hits = self.collect_reaching(key, block, all_preds);
        match hits.as_slice() {
            [] => {
                log::trace!("{} has no reaching definition in {}", key, self.adaptor.block_name(block));
                Ok(None)
            }
            [ReachingDef {
                state: DefState::Value(value),
                ..
            }] => Ok(Some(*value)),
            _ => self.promote(func, key, native, block, &hits, native_width).map(Some),
        }
    }

    fn collect_reaching(&self, key: RegKey, block: BlockId, all_preds: bool) -> Vec<ReachingDef> {
        let arena = self.session.arena();
        let block_count = self.adaptor.block_count();

        let mut preds = BumpVec::new_in(arena);
        for pred in self.adaptor.block_preds(block) {
            if !preds.contains(&pred) {
                preds.push(pred);
            }
        }

        let mut hits = Vec::new();
        let mut visited = BumpVec::with_capacity_in(block_count, arena);
        let mut queue = BumpVec::new_in(arena);
        for &pred in preds.iter() {
            visited.clear();
            visited.resize(block_count, false);
            queue.clear();
            queue.push(pred);

            let mut head = 0;
            let mut found = false;
            while head < queue.len() {
                let cur: BlockId = queue[head];
                head += 1;
                if std::mem::replace(&mut visited[cur.index()], true) {
                    continue;
                }
                if let Some(def) = self.local_def(key, cur) {
                    hits.push(ReachingDef {
                        block: cur,
                        state: def.state,
                    });
                    found = true;
                    continue;
                }
                for next in self.adaptor.block_preds(cur) {
                    if !visited[next.index()] {
                        queue.push(next);
                    }
                }
            }

            if !found && all_preds {
                log::trace!(
                    "{} does not reach {} through {}",
                    key,
                    self.adaptor.block_name(block),
                    self.adaptor.block_name(pred)
                );
                return Vec::new();
            }
        }

        let mut unique: Vec<ReachingDef> = Vec::with_capacity(hits.len());
        for hit in hits {
            if !unique.iter().any(|u| u.same_definition(&hit)) {
                unique.push(hit);
            }
        }
        unique
    }

    fn promote(
        &mut self,
        func: &mut Function,
        key: RegKey,
        native: Type,
        block: BlockId,
        hits: &[ReachingDef],
        native_width: bool,
    ) -> TrackerResult<ValueId> {
        let slot_ty = self.slot_type(func, key, hits);
        let slot = func.alloc_slot(slot_ty, &format!("{key}-merge"));
        self.session.record_promotion();
        log::debug!(
            "Promoting {} at {} to {} ({}, {} reaching definitions)",
            key,
            self.adaptor.block_name(block),
            func.slot(slot).name,
            slot_ty,
            hits.len()
        );

        for hit in hits {
            match hit.state {
                DefState::Value(value) => {
                    let stored = self.coerce(func, key, hit.block, value, slot_ty)?;
                    func.store(hit.block, slot, stored);
                }
                DefState::Pending => {
                    self.deferred.push(DeferredStore {
                        key,
                        block: hit.block,
                        slot,
                    });
                    self.session.record_deferred();
                    log::trace!("deferring store of {} from {}", key, self.adaptor.block_name(hit.block));
                }
                DefState::Unset => {}
            }
        }

        let mut value = func.load(block, slot);
        if native_width && slot_ty != native {
            value = self.coerce(func, key, block, value, native)?;
        }
        func.set_name(value, key.to_string());

        self.defs.set(key, block, func.ty(value).bits(), value)?;
        self.merges.push(Merge { key, block, slot, value });
        Ok(value)
    }

    /// Widest reaching integer, or the canonical width when a hit is not a known integer.
    fn slot_type(&self, func: &Function, key: RegKey, hits: &[ReachingDef]) -> Type {
        let mut widest = 0;
        for hit in hits {
            match hit.state {
                DefState::Value(value) => match func.ty(value) {
                    Type::Int(bits) => widest = widest.max(bits),
                    _ => return Type::Int(self.canonical_width(key)),
                },
                _ => return Type::Int(self.canonical_width(key)),
            }
        }
        Type::Int(widest)
    }

    /// Convert `value` to `to`, emitting the conversion in `block`.
    pub(super) fn coerce(
        &self,
        func: &mut Function,
        key: RegKey,
        block: BlockId,
        value: ValueId,
        to: Type,
    ) -> TrackerResult<ValueId> {
        let from = func.ty(value);
        if from == to {
            return Ok(value);
        }
        let kind = match (from, to) {
            (Type::Int(a), Type::Int(b)) if a < b => CastKind::ZExt,
            (Type::Int(_), Type::Int(_)) => CastKind::Trunc,
            (Type::Ptr, Type::Int(_)) => CastKind::PtrToInt,
            (Type::Int(64), Type::Ptr) => CastKind::IntToPtr,
            (Type::F64, Type::Int(64))
            | (Type::F32, Type::Int(32))
            | (Type::Int(64), Type::F64)
            | (Type::Int(32), Type::F32) => CastKind::Bitcast,
            _ => return Err(TrackerError::width(key, format!("cannot convert {from} to {to}"))),
        };
        Ok(func.cast(block, kind, value, to))
    }
}
