//! Entity identifiers
//!
//! Entities are opaque, monotonically increasing ids. The counter lives in
//! an allocator owned by the component store rather than in process-global
//! state, so independent engine instances (and tests) mint disjoint-by-
//! construction id spaces without coordination.

use std::fmt;

/// Opaque identifier naming one scene object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(u64);

impl EntityId {
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "entity#{}", self.0)
    }
}

/// Mints entity ids for one store. Ids are never reused.
#[derive(Default)]
pub struct EntityAllocator {
    next: u64,
}

impl EntityAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mint(&mut self) -> EntityId {
        let id = EntityId(self.next);
        self.next += 1;
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_monotonic_and_unique() {
        let mut allocator = EntityAllocator::new();
        let a = allocator.mint();
        let b = allocator.mint();
        assert!(b > a);
        assert_ne!(a, b);
    }
}
