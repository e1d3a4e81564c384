//! Generational pool with stale-handle detection
//!
//! Extends the plain free-list with a per-slot generation counter. Handles
//! carry the generation they were minted with; once the slot is released and
//! reused, old handles stop resolving instead of aliasing the new occupant.

use crate::core::error::EngineError;
use crate::core::pool::FreeList;

/// Index + generation reference into a [`GenerationalPool`].
///
/// Cheap to copy and safe to hold across releases: a handle whose slot has
/// been recycled simply stops resolving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle {
    index: u32,
    generation: u32,
}

impl Handle {
    /// Slot index within the pool.
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Generation the handle was minted with.
    pub fn generation(&self) -> u32 {
        self.generation
    }
}

/// Fixed-capacity storage pool whose handles detect use-after-release.
///
/// `get` on a handle whose slot has since been recycled returns `None`
/// rather than erroring; callers are expected to check.
pub struct GenerationalPool<T> {
    slots: Vec<Option<T>>,
    generations: Vec<u32>,
    allocator: FreeList,
}

impl<T> GenerationalPool<T> {
    pub fn new(kind: &'static str, capacity: usize) -> Self {
        Self {
            slots: (0..capacity).map(|_| None).collect(),
            generations: vec![0; capacity],
            allocator: FreeList::new(kind, capacity),
        }
    }

    /// Stores `value` in a free slot and returns a handle to it.
    pub fn insert(&mut self, value: T) -> Result<Handle, EngineError> {
        let index = self.allocator.allocate()?;
        self.slots[index] = Some(value);
        Ok(Handle {
            index: index as u32,
            generation: self.generations[index],
        })
    }

    /// Resolves `handle`, or `None` if the slot was released or recycled.
    pub fn get(&self, handle: Handle) -> Option<&T> {
        let index = handle.index as usize;
        if self.generations.get(index) != Some(&handle.generation) {
            return None;
        }
        self.slots[index].as_ref()
    }

    /// Mutable variant of [`get`](Self::get).
    pub fn get_mut(&mut self, handle: Handle) -> Option<&mut T> {
        let index = handle.index as usize;
        if self.generations.get(index) != Some(&handle.generation) {
            return None;
        }
        self.slots[index].as_mut()
    }

    /// Releases the slot behind `handle`, bumping its generation so stale
    /// handles stop resolving. Returns the stored value, or `None` if the
    /// handle was already stale.
    pub fn remove(&mut self, handle: Handle) -> Option<T> {
        let index = handle.index as usize;
        if self.generations.get(index) != Some(&handle.generation) {
            return None;
        }
        let value = self.slots[index].take()?;
        self.generations[index] = self.generations[index].wrapping_add(1);
        self.allocator.release(index);
        Some(value)
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.allocator.live_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterates over live entries with their slot indices.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &T)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|v| (i, v)))
    }

    /// Mutable variant of [`iter`](Self::iter).
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (usize, &mut T)> {
        self.slots
            .iter_mut()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_mut().map(|v| (i, v)))
    }
}
