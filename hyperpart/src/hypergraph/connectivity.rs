use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use crate::HyperedgeId;
use crate::PartitionId;

/// Per-hyperedge sets of the blocks its pins occupy.
///
/// Each edge owns a stripe of `ceil(k / 64)` bitmap words, giving `O(1)`
/// membership and iteration proportional to the number of words. Membership
/// transitions are driven exclusively by the pin-count maintenance in
/// [`PartitionedHypergraph`](super::PartitionedHypergraph): the unique
/// thread that observes a 0 -> 1 or 1 -> 0 pin-count transition flips the
/// bit.
#[derive(Debug)]
pub struct ConnectivitySets {
    words_per_edge: usize,
    bits: Vec<AtomicU64>,
}

impl ConnectivitySets {
    pub fn new(num_edges: usize, k: PartitionId) -> Self {
        let words_per_edge = (k as usize).div_ceil(64);
        let bits = (0..num_edges * words_per_edge)
            .map(|_| AtomicU64::new(0))
            .collect();
        Self {
            words_per_edge,
            bits,
        }
    }

    #[inline]
    fn stripe(&self, e: HyperedgeId) -> &[AtomicU64] {
        let start = e as usize * self.words_per_edge;
        &self.bits[start..start + self.words_per_edge]
    }

    #[inline]
    pub fn contains(&self, e: HyperedgeId, block: PartitionId) -> bool {
        let block = block as usize;
        self.stripe(e)[block / 64].load(Ordering::Relaxed) & (1 << (block % 64)) != 0
    }

    #[inline]
    pub fn add(&self, e: HyperedgeId, block: PartitionId) {
        let block = block as usize;
        self.stripe(e)[block / 64].fetch_or(1 << (block % 64), Ordering::Relaxed);
    }

    #[inline]
    pub fn remove(&self, e: HyperedgeId, block: PartitionId) {
        let block = block as usize;
        self.stripe(e)[block / 64].fetch_and(!(1 << (block % 64)), Ordering::Relaxed);
    }

    /// Number of distinct blocks the pins of `e` occupy.
    #[inline]
    pub fn connectivity(&self, e: HyperedgeId) -> u32 {
        self.stripe(e)
            .iter()
            .map(|word| word.load(Ordering::Relaxed).count_ones())
            .sum()
    }

    /// Iterate the blocks in the set of `e`, in ascending order.
    pub fn iter(&self, e: HyperedgeId) -> ConnectivitySetIter<'_> {
        let stripe = self.stripe(e);
        ConnectivitySetIter {
            stripe,
            word_index: 0,
            current: stripe[0].load(Ordering::Relaxed),
        }
    }

    /// Clear every set; used when a partition is (re)initialized.
    pub fn clear(&self) {
        for word in &self.bits {
            word.store(0, Ordering::Relaxed);
        }
    }
}

/// See [`ConnectivitySets::iter`].
#[derive(Debug, Clone)]
pub struct ConnectivitySetIter<'a> {
    stripe: &'a [AtomicU64],
    word_index: usize,
    current: u64,
}

impl Iterator for ConnectivitySetIter<'_> {
    type Item = PartitionId;

    fn next(&mut self) -> Option<PartitionId> {
        while self.current == 0 {
            self.word_index += 1;
            if self.word_index >= self.stripe.len() {
                return None;
            }
            self.current = self.stripe[self.word_index].load(Ordering::Relaxed);
        }
        let bit = self.current.trailing_zeros();
        self.current &= self.current - 1;
        Some((self.word_index * 64) as PartitionId + bit as PartitionId)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_remove_iterate() {
        let sets = ConnectivitySets::new(3, 130);
        sets.add(1, 0);
        sets.add(1, 65);
        sets.add(1, 129);
        sets.add(2, 7);

        assert!(sets.contains(1, 65));
        assert!(!sets.contains(0, 65));
        assert_eq!(sets.connectivity(1), 3);
        assert_eq!(sets.iter(1).collect::<Vec<_>>(), vec![0, 65, 129]);

        sets.remove(1, 65);
        assert_eq!(sets.iter(1).collect::<Vec<_>>(), vec![0, 129]);
        assert_eq!(sets.connectivity(2), 1);
    }
}
