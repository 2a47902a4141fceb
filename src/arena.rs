//! Block-pool storage for ancestral segments.

use crate::{NodeId, SimError};

/// Dense id of a segment slot in the arena.
pub(crate) type SegmentIndex = usize;

/// A fragment of ancestral material.
///
/// `[left, right)` is the physical interval for which the lineage holding
/// this segment is ancestral to part of the sample; `node` is the output
/// table row the fragment currently descends from.  `prev`/`next` link the
/// segment into its lineage's chain, sorted by `left`.
#[derive(Clone, Debug)]
pub(crate) struct Segment {
    pub left: f64,
    pub right: f64,
    pub node: NodeId,
    pub population: usize,
    pub label: usize,
    pub prev: Option<SegmentIndex>,
    pub next: Option<SegmentIndex>,
}

impl Segment {
    pub fn new(left: f64, right: f64, node: NodeId, population: usize, label: usize) -> Self {
        Self {
            left,
            right,
            node,
            population,
            label,
            prev: None,
            next: None,
        }
    }
}

/// A typed block pool with LIFO free-list recycling.
///
/// Slots are allocated in blocks of `block_size`; ids are dense
/// (`block_index * block_size + offset`), so an id doubles as the key into
/// the per-segment Fenwick trees.  Freed slots are pushed onto a free list
/// and reused most-recently-freed first.  Exceeding `max_blocks` is a
/// fatal out-of-memory error.
#[derive(Clone, Debug)]
pub(crate) struct Arena<T> {
    items: Vec<T>,
    free: Vec<SegmentIndex>,
    block_size: usize,
    num_blocks: usize,
    max_blocks: Option<usize>,
    num_allocated: usize,
}

impl<T> Arena<T> {
    pub fn new(block_size: usize, max_blocks: Option<usize>) -> Self {
        assert!(block_size > 0);
        Self {
            items: Vec::new(),
            free: Vec::new(),
            block_size,
            num_blocks: 0,
            max_blocks,
            num_allocated: 0,
        }
    }

    /// Total slots ever made available (`num_blocks * block_size`).
    pub fn capacity(&self) -> usize {
        self.num_blocks * self.block_size
    }

    pub fn num_blocks(&self) -> usize {
        self.num_blocks
    }

    /// Live objects.
    pub fn num_allocated(&self) -> usize {
        self.num_allocated
    }

    pub fn alloc(&mut self, value: T) -> Result<SegmentIndex, SimError> {
        let id = match self.free.pop() {
            Some(id) => {
                self.items[id] = value;
                id
            }
            None => {
                if self.items.len() == self.capacity() {
                    if let Some(max) = self.max_blocks {
                        if self.num_blocks >= max {
                            return Err(SimError::OutOfMemory(format!(
                                "block pool cap of {} blocks reached",
                                max
                            )));
                        }
                    }
                    self.items.reserve_exact(self.block_size);
                    self.num_blocks += 1;
                }
                self.items.push(value);
                self.items.len() - 1
            }
        };
        self.num_allocated += 1;
        Ok(id)
    }

    pub fn free(&mut self, id: SegmentIndex) {
        debug_assert!(id < self.items.len());
        debug_assert!(!self.free.contains(&id));
        self.free.push(id);
        self.num_allocated -= 1;
    }

    pub fn get(&self, id: SegmentIndex) -> &T {
        &self.items[id]
    }

    pub fn get_mut(&mut self, id: SegmentIndex) -> &mut T {
        &mut self.items[id]
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.free.clear();
        self.num_blocks = 0;
        self.num_allocated = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(left: f64, right: f64) -> Segment {
        Segment::new(left, right, NodeId::from(0), 0, 0)
    }

    #[test]
    fn test_dense_ids() {
        let mut a: Arena<Segment> = Arena::new(4, None);
        for i in 0..6 {
            let id = a.alloc(seg(i as f64, i as f64 + 1.0)).unwrap();
            assert_eq!(id, i);
        }
        assert_eq!(a.num_allocated(), 6);
        assert!(a.capacity() >= 6);
    }

    #[test]
    fn test_lifo_recycling() {
        let mut a: Arena<Segment> = Arena::new(4, None);
        let x = a.alloc(seg(0.0, 1.0)).unwrap();
        let y = a.alloc(seg(1.0, 2.0)).unwrap();
        a.free(x);
        a.free(y);
        // Most recently freed comes back first.
        assert_eq!(a.alloc(seg(2.0, 3.0)).unwrap(), y);
        assert_eq!(a.alloc(seg(3.0, 4.0)).unwrap(), x);
        assert_eq!(a.num_allocated(), 2);
    }

    #[test]
    fn test_block_cap() {
        let mut a: Arena<Segment> = Arena::new(2, Some(1));
        a.alloc(seg(0.0, 1.0)).unwrap();
        a.alloc(seg(1.0, 2.0)).unwrap();
        let err = a.alloc(seg(2.0, 3.0)).unwrap_err();
        assert!(matches!(err, SimError::OutOfMemory(_)));
    }

    #[test]
    fn test_mutation_through_ids() {
        let mut a: Arena<Segment> = Arena::new(4, None);
        let id = a.alloc(seg(0.0, 10.0)).unwrap();
        a.get_mut(id).right = 5.0;
        assert_eq!(a.get(id).right, 5.0);
    }
}
