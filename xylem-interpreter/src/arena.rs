//! Tiered vector pools keeping steady-state allocation near zero.
//!
//! Working buffers for axis expansion, step processing and constructor
//! assembly are acquired here and released when the step completes.
//! Capacities are bucketed into five tiers; releasing returns a vector to
//! the free list of the tier its capacity fits.

use crate::value::XPathVal;
use crate::xml::{Attribute, NodeEntry};

pub const TIER_LIMITS: [usize; 5] = [16, 64, 256, 1024, 4096];

#[derive(Debug)]
pub struct TieredPool<T> {
    free_lists: [Vec<Vec<T>>; 5],
    outstanding: usize,
}

impl<T> Default for TieredPool<T> {
    fn default() -> Self {
        TieredPool {
            free_lists: Default::default(),
            outstanding: 0,
        }
    }
}

impl<T> TieredPool<T> {
    fn select_tier(size: usize) -> usize {
        let wanted = size.max(1);
        for (tier, &limit) in TIER_LIMITS.iter().enumerate() {
            if wanted <= limit {
                return tier;
            }
        }
        TIER_LIMITS.len() - 1
    }

    /// Returns a cleared vector with capacity of at least `hint`.
    pub fn acquire(&mut self, hint: usize) -> Vec<T> {
        let tier = Self::select_tier(hint);
        for candidate in tier..TIER_LIMITS.len() {
            if let Some(mut vector) = self.free_lists[candidate].pop() {
                vector.clear();
                if vector.capacity() < hint {
                    vector.reserve(hint - vector.capacity());
                }
                self.outstanding += 1;
                return vector;
            }
        }
        self.outstanding += 1;
        Vec::with_capacity(hint.max(TIER_LIMITS[0]))
    }

    /// Returns a vector to its tier's free list.
    pub fn release(&mut self, mut vector: Vec<T>) {
        vector.clear();
        let tier = Self::select_tier(vector.capacity());
        self.free_lists[tier].push(vector);
        self.outstanding = self.outstanding.saturating_sub(1);
    }

    /// Number of vectors currently loaned out.
    pub fn outstanding(&self) -> usize {
        self.outstanding
    }

    pub fn free_list_sizes(&self) -> [usize; 5] {
        [
            self.free_lists[0].len(),
            self.free_lists[1].len(),
            self.free_lists[2].len(),
            self.free_lists[3].len(),
            self.free_lists[4].len(),
        ]
    }

    /// Clears loan bookkeeping between evaluations; pooled storage is
    /// kept for reuse.
    pub fn reset(&mut self) {
        self.outstanding = 0;
    }
}

/// The evaluator's pools: node-entry vectors for axis and step buffers,
/// string vectors for grouping keys and joins, attribute vectors for
/// constructor assembly, value vectors for sequence building.
#[derive(Debug, Default)]
pub struct Arena {
    pub node_entries: TieredPool<NodeEntry>,
    pub strings: TieredPool<String>,
    pub attributes: TieredPool<Attribute>,
    pub values: TieredPool<XPathVal>,
}

impl Arena {
    pub fn new() -> Self {
        Arena::default()
    }

    pub fn reset(&mut self) {
        self.node_entries.reset();
        self.strings.reset();
        self.attributes.reset();
        self.values.reset();
    }

    /// Total vectors currently loaned across all pools.
    pub fn outstanding(&self) -> usize {
        self.node_entries.outstanding()
            + self.strings.outstanding()
            + self.attributes.outstanding()
            + self.values.outstanding()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_meets_capacity_hint() {
        let mut pool: TieredPool<u32> = TieredPool::default();
        let vector = pool.acquire(100);
        assert!(vector.capacity() >= 100);
        assert!(vector.is_empty());
        assert_eq!(pool.outstanding(), 1);
        pool.release(vector);
        assert_eq!(pool.outstanding(), 0);
    }

    #[test]
    fn release_returns_to_matching_tier() {
        let mut pool: TieredPool<u32> = TieredPool::default();
        let vector = pool.acquire(100);
        pool.release(vector);
        // capacity >= 100 lands in the 256 tier or above
        let sizes = pool.free_list_sizes();
        assert_eq!(sizes.iter().sum::<usize>(), 1);
        assert_eq!(sizes[0] + sizes[1], 0);
    }

    #[test]
    fn acquired_vector_is_reused() {
        let mut pool: TieredPool<u32> = TieredPool::default();
        let mut vector = pool.acquire(10);
        vector.push(7);
        let capacity = vector.capacity();
        pool.release(vector);
        let again = pool.acquire(10);
        assert!(again.is_empty());
        assert_eq!(again.capacity(), capacity);
    }

    #[test]
    fn free_lists_grow_monotonically() {
        let mut pool: TieredPool<u32> = TieredPool::default();
        let mut previous_total = 0usize;
        for _ in 0..3 {
            let a = pool.acquire(8);
            let b = pool.acquire(32);
            pool.release(a);
            pool.release(b);
            let total: usize = pool.free_list_sizes().iter().sum();
            assert!(total >= previous_total);
            previous_total = total;
        }
    }
}
