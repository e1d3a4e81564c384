//! Fixed-capacity slot allocator
//!
//! Manages an index space of fixed size with O(1) allocate and release.
//! Freed indices are recycled most-recently-freed first, so a slot that was
//! just vacated (and is likely still warm in cache) is handed out again
//! before older ones.

use crate::core::error::EngineError;

/// A fixed-capacity free-list over the index range `0..capacity`.
///
/// The allocator itself holds no payload; component pools and buffer block
/// managers pair it with their own storage arrays and use the returned
/// indices as slots.
pub struct FreeList {
    capacity: usize,
    /// Indices never handed out yet; consumed front to back.
    next_fresh: usize,
    /// Released indices, reused LIFO.
    free: Vec<usize>,
    /// Per-index live flag, guards against double release.
    live: Vec<bool>,
    kind: &'static str,
}

impl FreeList {
    /// Creates an allocator over `0..capacity`.
    ///
    /// `kind` names the index space in `PoolExhausted` errors.
    pub fn new(kind: &'static str, capacity: usize) -> Self {
        Self {
            capacity,
            next_fresh: 0,
            free: Vec::new(),
            live: vec![false; capacity],
            kind,
        }
    }

    /// Hands out a free index, preferring the most recently released one.
    pub fn allocate(&mut self) -> Result<usize, EngineError> {
        let index = match self.free.pop() {
            Some(index) => index,
            None if self.next_fresh < self.capacity => {
                let index = self.next_fresh;
                self.next_fresh += 1;
                index
            }
            None => {
                return Err(EngineError::PoolExhausted {
                    kind: self.kind,
                    capacity: self.capacity,
                })
            }
        };
        self.live[index] = true;
        Ok(index)
    }

    /// Returns `index` to the free set.
    ///
    /// Releasing an index that is not currently live is a caller bug and
    /// panics in debug builds; in release it is ignored.
    pub fn release(&mut self, index: usize) {
        debug_assert!(self.live[index], "release of non-live slot {index}");
        if self.live[index] {
            self.live[index] = false;
            self.free.push(index);
        }
    }

    /// Whether `index` is currently allocated.
    pub fn is_live(&self, index: usize) -> bool {
        self.live.get(index).copied().unwrap_or(false)
    }

    /// Number of currently allocated slots.
    pub fn live_count(&self) -> usize {
        self.next_fresh - self.free.len()
    }

    /// Total capacity of the index space.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocates_distinct_indices_up_to_capacity() {
        let mut pool = FreeList::new("test", 4);
        let mut seen = Vec::new();
        for _ in 0..4 {
            let index = pool.allocate().unwrap();
            assert!(!seen.contains(&index));
            seen.push(index);
        }
        assert!(matches!(
            pool.allocate(),
            Err(EngineError::PoolExhausted { capacity: 4, .. })
        ));
        assert_eq!(pool.live_count(), 4);
    }

    #[test]
    fn recycles_most_recently_freed_first() {
        let mut pool = FreeList::new("test", 8);
        let a = pool.allocate().unwrap();
        let b = pool.allocate().unwrap();
        pool.release(a);
        pool.release(b);
        // LIFO: b back first, then a
        assert_eq!(pool.allocate().unwrap(), b);
        assert_eq!(pool.allocate().unwrap(), a);
    }

    #[test]
    fn live_count_tracks_allocates_minus_releases() {
        let mut pool = FreeList::new("test", 16);
        let mut held = Vec::new();
        for _ in 0..10 {
            held.push(pool.allocate().unwrap());
        }
        for index in held.drain(..5) {
            pool.release(index);
        }
        assert_eq!(pool.live_count(), 5);
        for _ in 0..3 {
            held.push(pool.allocate().unwrap());
        }
        assert_eq!(pool.live_count(), 8);
        // No two live slots ever share an index
        let mut live: Vec<usize> = (0..16).filter(|&i| pool.is_live(i)).collect();
        live.dedup();
        assert_eq!(live.len(), 8);
    }
}
