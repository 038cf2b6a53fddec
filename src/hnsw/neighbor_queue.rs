//! Distance-ordered neighbors and the two heaps a layer search works with.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::ItemId;

/// A neighbor entry with a distance and item ID.
#[derive(Debug, Clone, Copy)]
pub struct Neighbor {
    pub distance: f32,
    pub id: ItemId,
}

impl Neighbor {
    pub fn new(id: ItemId, distance: f32) -> Self {
        Self { distance, id }
    }
}

impl PartialEq for Neighbor {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Neighbor {}

// Ascending by distance, ties broken by ascending id.
impl PartialOrd for Neighbor {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Neighbor {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then_with(|| self.id.cmp(&other.id))
    }
}

/// Orders neighbors furthest first, turning `BinaryHeap` into a min-heap.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
struct Closest(Neighbor);

impl PartialOrd for Closest {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Closest {
    fn cmp(&self, other: &Self) -> Ordering {
        other.0.cmp(&self.0)
    }
}

/// Result set of a layer search: the furthest kept neighbor sits on top.
#[derive(Debug, Default)]
pub(crate) struct MaxHeap {
    heap: BinaryHeap<Neighbor>,
}

impl MaxHeap {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Push, then evict the furthest entry while more than `limit` remain.
    pub(crate) fn push_bounded(&mut self, n: Neighbor, limit: usize) {
        self.heap.push(n);
        if self.heap.len() > limit {
            self.heap.pop();
        }
    }

    pub(crate) fn peek(&self) -> Option<&Neighbor> {
        self.heap.peek()
    }

    pub(crate) fn len(&self) -> usize {
        self.heap.len()
    }

    /// Ascending by distance, then id.
    pub(crate) fn into_sorted_vec(self) -> Vec<Neighbor> {
        self.heap.into_sorted_vec()
    }
}

/// Candidate queue of a layer search: the closest neighbor pops first.
#[derive(Debug, Default)]
pub(crate) struct MinHeap {
    heap: BinaryHeap<Closest>,
}

impl MinHeap {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, n: Neighbor) {
        self.heap.push(Closest(n));
    }

    pub(crate) fn pop(&mut self) -> Option<Neighbor> {
        self.heap.pop().map(|c| c.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sorted_ids(heap: MaxHeap) -> Vec<ItemId> {
        heap.into_sorted_vec().iter().map(|n| n.id).collect()
    }

    #[test]
    fn test_min_heap_pops_closest_first() {
        let mut heap = MinHeap::new();
        heap.push(Neighbor::new(0, 3.0));
        heap.push(Neighbor::new(1, 1.0));
        heap.push(Neighbor::new(2, 2.0));

        let order: Vec<ItemId> = std::iter::from_fn(|| heap.pop()).map(|n| n.id).collect();
        assert_eq!(order, vec![1, 2, 0]);
    }

    #[test]
    fn test_bounded_push_keeps_closest() {
        let mut heap = MaxHeap::new();
        heap.push_bounded(Neighbor::new(0, 5.0), 2);
        heap.push_bounded(Neighbor::new(1, 1.0), 2);
        heap.push_bounded(Neighbor::new(2, 3.0), 2);

        assert_eq!(heap.len(), 2);
        assert_eq!(heap.peek().map(|n| n.id), Some(2));
        assert_eq!(sorted_ids(heap), vec![1, 2]);
    }

    #[test]
    fn test_ties_broken_by_id() {
        let mut heap = MaxHeap::new();
        for (id, d) in [(9, 1.0), (2, 1.0), (5, 0.5)] {
            heap.push_bounded(Neighbor::new(id, d), 3);
        }
        assert_eq!(sorted_ids(heap), vec![5, 2, 9]);
    }

    #[test]
    fn test_infinity_sorts_last() {
        let mut heap = MaxHeap::new();
        heap.push_bounded(Neighbor::new(0, f32::INFINITY), 2);
        heap.push_bounded(Neighbor::new(1, 1e30), 2);
        assert_eq!(sorted_ids(heap), vec![1, 0]);
    }
}
