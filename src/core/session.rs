// This module provides the arena-backed raising session. A RaiseSession borrows a bumpalo arena
// for its whole lifetime and is shared by every tracker created while raising a module, one
// function at a time. Trackers allocate their per-query scratch space (predecessor worklists and
// visited bitmaps) in the arena instead of the global heap, and report what they did through the
// session's statistics: definitions recorded, local hits versus predecessor walks, merges that
// had to be promoted to frame slots, deferred slot stores recorded and drained, flags derived
// (broken down by instruction family) and pending records dropped when blocks were finished.
// Statistics live in a RefCell so that trackers only need a shared reference to the session.

//! Arena-based raising session management.

use bumpalo::Bump;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;

/// Arena-based raising session.
///
/// All scratch data allocated during tracking lives as long as the arena.
pub struct RaiseSession<'arena> {
    /// Arena allocator for scratch data.
    arena: &'arena Bump,

    /// Session statistics.
    stats: RefCell<SessionStats>,
}

impl<'arena> RaiseSession<'arena> {
    /// Create a new session with the given arena.
    pub fn new(arena: &'arena Bump) -> Self {
        Self {
            arena,
            stats: RefCell::new(SessionStats::default()),
        }
    }

    /// Get access to the arena allocator.
    pub fn arena(&self) -> &'arena Bump {
        self.arena
    }

    /// Record that a function finished tracking.
    pub fn record_function_tracked(&self) {
        self.stats.borrow_mut().functions_tracked += 1;
    }

    pub fn record_definition(&self) {
        self.stats.borrow_mut().definitions_recorded += 1;
    }

    pub fn record_local_hit(&self) {
        self.stats.borrow_mut().local_hits += 1;
    }

    pub fn record_predecessor_walk(&self) {
        self.stats.borrow_mut().predecessor_walks += 1;
    }

    /// Record a merge promoted to a fresh frame slot.
    pub fn record_promotion(&self) {
        let mut stats = self.stats.borrow_mut();
        stats.promotions += 1;
        stats.slots_allocated += 1;
    }

    pub fn record_deferred(&self) {
        self.stats.borrow_mut().deferred_recorded += 1;
    }

    pub fn record_deferred_drained(&self, count: usize) {
        self.stats.borrow_mut().deferred_drained += count;
    }

    /// Record a flag derived from an instruction of `family`.
    pub fn record_flag_derived(&self, family: &str) {
        let mut stats = self.stats.borrow_mut();
        stats.flags_derived += 1;
        *stats.flag_families.entry(family.to_string()).or_insert(0) += 1;
    }

    pub fn record_flag_set(&self) {
        self.stats.borrow_mut().flags_set += 1;
    }

    pub fn record_pending_dropped(&self, count: usize) {
        self.stats.borrow_mut().pending_dropped += count;
    }

    /// Snapshot of the statistics.
    pub fn stats(&self) -> SessionStats {
        self.stats.borrow().clone()
    }
}

/// Statistics about a raising session.
#[derive(Debug, Default, Clone)]
pub struct SessionStats {
    pub functions_tracked: usize,
    pub definitions_recorded: usize,
    pub local_hits: usize,
    pub predecessor_walks: usize,
    pub promotions: usize,
    pub slots_allocated: usize,
    pub deferred_recorded: usize,
    pub deferred_drained: usize,
    pub flags_derived: usize,
    pub flags_set: usize,
    pub pending_dropped: usize,
    pub flag_families: BTreeMap<String, usize>,
}

impl fmt::Display for SessionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Raising Session Statistics:")?;
        writeln!(f, "  Functions tracked: {}", self.functions_tracked)?;
        writeln!(f, "  Definitions recorded: {}", self.definitions_recorded)?;
        writeln!(f, "  Local hits: {}", self.local_hits)?;
        writeln!(f, "  Predecessor walks: {}", self.predecessor_walks)?;
        writeln!(f, "  Merges promoted: {}", self.promotions)?;
        writeln!(f, "  Slots allocated: {}", self.slots_allocated)?;
        writeln!(
            f,
            "  Deferred stores: {} recorded, {} drained",
            self.deferred_recorded, self.deferred_drained
        )?;
        writeln!(f, "  Flags derived: {}", self.flags_derived)?;
        writeln!(f, "  Flags set: {}", self.flags_set)?;
        writeln!(f, "  Pending records dropped: {}", self.pending_dropped)?;

        if !self.flag_families.is_empty() {
            writeln!(f, "  Flag derivations by family:")?;
            for (family, count) in &self.flag_families {
                writeln!(f, "    {family}: {count}")?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_creation() {
        let arena = Bump::new();
        let session = RaiseSession::new(&arena);

        let stats = session.stats();
        assert_eq!(stats.functions_tracked, 0);
        assert_eq!(stats.promotions, 0);
    }

    #[test]
    fn test_session_statistics() {
        let arena = Bump::new();
        let session = RaiseSession::new(&arena);

        session.record_definition();
        session.record_definition();
        session.record_local_hit();
        session.record_predecessor_walk();
        session.record_promotion();
        session.record_deferred();
        session.record_deferred_drained(1);
        session.record_flag_derived("sub");
        session.record_flag_derived("sub");
        session.record_flag_derived("rol");
        session.record_flag_set();
        session.record_function_tracked();

        let stats = session.stats();
        assert_eq!(stats.definitions_recorded, 2);
        assert_eq!(stats.slots_allocated, 1);
        assert_eq!(stats.deferred_drained, 1);
        assert_eq!(stats.flag_families["sub"], 2);
        assert_eq!(stats.flag_families["rol"], 1);
        assert_eq!(stats.functions_tracked, 1);

        let text = stats.to_string();
        assert!(text.contains("Merges promoted: 1"));
        assert!(text.contains("    sub: 2"));
    }
}
