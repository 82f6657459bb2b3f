use rayon::prelude::*;

use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering;
use std::sync::Mutex;
use std::sync::RwLock;

use crate::bitset::ScratchBitmap;
use crate::refinement::FlowAlgorithm;
use crate::HyperedgeId;
use crate::HypernodeId;
use crate::HypernodeWeight;
use crate::PartitionId;
use crate::PartitionedHypergraph;

/// An unordered block pair `(b0, b1)` with `b0 < b1`.
pub type BlockPair = (PartitionId, PartitionId);

/// The quotient graph: every pair of blocks that shares at least one cut
/// hyperedge, with the (lazily compacted) list of those hyperedges.
#[derive(Debug)]
pub struct QuotientGraph {
    k: usize,
    cut_edges: Vec<Mutex<Vec<HyperedgeId>>>,
}

impl QuotientGraph {
    /// Scan all edges and record every block pair present in the
    /// connectivity set of a cut edge.
    pub fn build(phg: &PartitionedHypergraph<'_>) -> Self {
        let k = phg.k() as usize;
        let triples: Vec<(PartitionId, PartitionId, HyperedgeId)> =
            (0..phg.hypergraph().num_edges() as HyperedgeId)
                .into_par_iter()
                .filter(|&he| phg.connectivity(he) > 1)
                .flat_map_iter(|he| {
                    let blocks: Vec<PartitionId> = phg.connectivity_set(he).collect();
                    let mut pairs = Vec::with_capacity(blocks.len() * (blocks.len() - 1) / 2);
                    for (i, &b0) in blocks.iter().enumerate() {
                        for &b1 in &blocks[i + 1..] {
                            pairs.push((b0, b1, he));
                        }
                    }
                    pairs
                })
                .collect();

        let cut_edges: Vec<Mutex<Vec<HyperedgeId>>> =
            (0..k * k).map(|_| Mutex::new(Vec::new())).collect();
        for (b0, b1, he) in triples {
            cut_edges[b0 as usize * k + b1 as usize]
                .lock()
                .unwrap()
                .push(he);
        }
        Self { k, cut_edges }
    }

    /// Pairs with at least one (possibly stale) recorded cut edge, in
    /// lexicographic order.
    pub fn pairs(&self) -> Vec<BlockPair> {
        let mut pairs = Vec::new();
        for b0 in 0..self.k {
            for b1 in b0 + 1..self.k {
                if !self.cut_edges[b0 * self.k + b1].lock().unwrap().is_empty() {
                    pairs.push((b0 as PartitionId, b1 as PartitionId));
                }
            }
        }
        pairs
    }

    /// Current cut hyperedges of the pair. Entries whose edge no longer
    /// has pins in both blocks, and duplicates, are compacted away under
    /// the pair's lock before the list is returned.
    pub fn pair_cut_edges(
        &self,
        phg: &PartitionedHypergraph<'_>,
        (b0, b1): BlockPair,
    ) -> Vec<HyperedgeId> {
        let mut list = self.cut_edges[b0 as usize * self.k + b1 as usize]
            .lock()
            .unwrap();
        let mut visited = ScratchBitmap::new(phg.hypergraph().num_edges());
        let mut i = 0;
        while i < list.len() {
            let he = list[i];
            if visited.contains(he) || phg.pin_count(he, b0) == 0 || phg.pin_count(he, b1) == 0 {
                list.swap_remove(i);
            } else {
                visited.set(he);
                i += 1;
            }
        }
        visited.reset_all(list.iter());
        list.clone()
    }

    /// Record a hyperedge observed to newly span the pair. The list may
    /// temporarily hold duplicates or stale entries; compaction happens in
    /// [`pair_cut_edges`][Self::pair_cut_edges].
    pub fn record_cut_edge(&self, (b0, b1): BlockPair, he: HyperedgeId) {
        debug_assert!(b0 < b1);
        self.cut_edges[b0 as usize * self.k + b1 as usize]
            .lock()
            .unwrap()
            .push(he);
    }
}

/// The k x k block-weight matrix with row-protected read/write locks.
///
/// `W[b][b]` starts as the weight of block `b`; acquiring weight for a
/// pair partner transfers it to the off-diagonal slot, so concurrent pair
/// refinements see each other's reservations. The accounting is
/// optimistic: a stale read can momentarily overshoot the balance
/// tolerance, which a later rebalancing pass repairs.
#[derive(Debug)]
pub struct BlockWeightMatrix {
    k: usize,
    rows: Vec<RwLock<Vec<HypernodeWeight>>>,
}

impl BlockWeightMatrix {
    pub fn new(phg: &PartitionedHypergraph<'_>) -> Self {
        let k = phg.k() as usize;
        let rows = (0..k)
            .map(|b| {
                let mut row = vec![0; k];
                row[b] = phg.part_weight(b as PartitionId);
                RwLock::new(row)
            })
            .collect();
        Self { k, rows }
    }

    /// Reserve `amount` of block `b`'s weight towards the pair partner
    /// `other`.
    pub fn acquire(&self, b: PartitionId, other: PartitionId, amount: HypernodeWeight) {
        let mut row = self.rows[b as usize].write().unwrap();
        row[b as usize] -= amount;
        row[other as usize] += amount;
    }

    /// Return `amount` to block `b`'s diagonal and clear the reservation
    /// towards `other`.
    pub fn release(&self, b: PartitionId, other: PartitionId, amount: HypernodeWeight) {
        let mut row = self.rows[b as usize].write().unwrap();
        row[other as usize] = 0;
        row[b as usize] += amount;
    }

    /// The weight of `b` a pair with partner `other` may treat as its own:
    /// the unreserved diagonal plus its own reservation.
    pub fn available(&self, b: PartitionId, other: PartitionId) -> HypernodeWeight {
        let row = self.rows[b as usize].read().unwrap();
        row[b as usize] + row[other as usize]
    }

    /// The weight of `b` that is out of reach for a pair with partner
    /// `other`: everything except its own reservation.
    pub fn not_acquired(&self, b: PartitionId, other: PartitionId) -> HypernodeWeight {
        let row = self.rows[b as usize].read().unwrap();
        (0..self.k)
            .filter(|&i| i != other as usize)
            .map(|i| row[i])
            .sum()
    }
}

/// Per-vertex ownership of flow tasks: 0 is free, anything else is the
/// holder's task id. Acquisition is a CAS; there is no blocking.
#[derive(Debug)]
pub struct NodeOwnership {
    locks: Vec<AtomicU32>,
}

impl NodeOwnership {
    pub fn new(num_nodes: usize) -> Self {
        Self {
            locks: (0..num_nodes).map(|_| AtomicU32::new(0)).collect(),
        }
    }

    pub fn try_acquire(&self, v: HypernodeId, task: u32) -> bool {
        debug_assert_ne!(task, 0);
        self.locks[v as usize]
            .compare_exchange(0, task, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    pub fn release(&self, v: HypernodeId, task: u32) {
        debug_assert_eq!(self.locks[v as usize].load(Ordering::Relaxed), task);
        self.locks[v as usize].store(0, Ordering::Release);
    }
}

/// Shared scheduling state for one flow round; guarded by one mutex in the
/// refiner. Implements both dispatch policies.
#[derive(Debug)]
pub struct RoundScheduler {
    policy: FlowAlgorithm,
    pending: Vec<BlockPair>,
    locked_blocks: Vec<bool>,
    tasks_on_block: Vec<usize>,
    max_tasks_per_block: usize,
    pub active_tasks: usize,
}

impl RoundScheduler {
    pub fn new(
        policy: FlowAlgorithm,
        pending: Vec<BlockPair>,
        k: usize,
        max_tasks_per_block: usize,
    ) -> Self {
        Self {
            policy,
            pending,
            locked_blocks: vec![false; k],
            tasks_on_block: vec![0; k],
            max_tasks_per_block,

            active_tasks: 0,
        }
    }

    pub fn is_drained(&self) -> bool {
        self.pending.is_empty() && self.active_tasks == 0
    }

    /// Hand out the next runnable pair, or `None` if nothing can be
    /// dispatched right now.
    pub fn dispatch(&mut self) -> Option<BlockPair> {
        let index = match self.policy {
            FlowAlgorithm::Match => self.pending.iter().position(|&(b0, b1)| {
                !self.locked_blocks[b0 as usize] && !self.locked_blocks[b1 as usize]
            }),
            _ => {
                // Most-independent: the pair minimizing the maximum task
                // count of its blocks, capped per block.
                self.pending
                    .iter()
                    .enumerate()
                    .filter(|(_, &(b0, b1))| {
                        self.tasks_on_block[b0 as usize] < self.max_tasks_per_block
                            && self.tasks_on_block[b1 as usize] < self.max_tasks_per_block
                    })
                    .min_by_key(|(_, &(b0, b1))| {
                        self.tasks_on_block[b0 as usize].max(self.tasks_on_block[b1 as usize])
                    })
                    .map(|(i, _)| i)
            }
        }?;
        let (b0, b1) = self.pending.swap_remove(index);
        self.locked_blocks[b0 as usize] = true;
        self.locked_blocks[b1 as usize] = true;
        self.tasks_on_block[b0 as usize] += 1;
        self.tasks_on_block[b1 as usize] += 1;
        self.active_tasks += 1;
        Some((b0, b1))
    }

    pub fn complete(&mut self, (b0, b1): BlockPair) {
        self.locked_blocks[b0 as usize] = false;
        self.locked_blocks[b1 as usize] = false;
        self.tasks_on_block[b0 as usize] -= 1;
        self.tasks_on_block[b1 as usize] -= 1;
        self.active_tasks -= 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hypergraph::HypergraphBuilder;

    #[test]
    fn quotient_graph_records_every_spanning_pair() {
        let hg = HypergraphBuilder::new(6)
            .add_edge(1, &[0, 2, 4])
            .add_edge(1, &[0, 1])
            .add_edge(1, &[2, 3])
            .build()
            .unwrap();
        let mut phg = crate::PartitionedHypergraph::new(&hg, 3, 2);
        for v in 0..6 {
            phg.set_only_part(v, (v / 2) as PartitionId);
        }
        phg.initialize_partition();

        let quotient = QuotientGraph::build(&phg);
        // Edge 0 spans all three blocks, edges 1 and 2 are internal.
        assert_eq!(quotient.pairs(), vec![(0, 1), (0, 2), (1, 2)]);
        assert_eq!(quotient.pair_cut_edges(&phg, (0, 1)), vec![0]);
    }

    #[test]
    fn stale_and_duplicate_cut_edges_are_compacted() {
        let hg = HypergraphBuilder::new(4)
            .add_edge(1, &[0, 1])
            .add_edge(1, &[2, 3])
            .build()
            .unwrap();
        let mut phg = crate::PartitionedHypergraph::new(&hg, 2, 4);
        for v in 0..4 {
            phg.set_only_part(v, (v % 2) as PartitionId);
        }
        phg.initialize_partition();

        let quotient = QuotientGraph::build(&phg);
        quotient.record_cut_edge((0, 1), 0);
        // Heal edge 1: it becomes stale in the pair list.
        phg.change_part(3, 1, 0, |_| {});
        let edges = quotient.pair_cut_edges(&phg, (0, 1));
        assert_eq!(edges, vec![0]);
    }

    #[test]
    fn weight_matrix_reservations_are_visible() {
        let hg = HypergraphBuilder::new(4).add_edge(1, &[0, 1, 2, 3]).build().unwrap();
        let mut phg = crate::PartitionedHypergraph::new(&hg, 3, 4);
        for v in 0..4 {
            phg.set_only_part(v, (v as PartitionId).min(2));
        }
        phg.initialize_partition();

        let weights = BlockWeightMatrix::new(&phg);
        assert_eq!(weights.available(2, 0), 2);

        weights.acquire(2, 0, 2);
        // The pair (0, 2) still sees the full weight, pair (1, 2) does
        // not.
        assert_eq!(weights.available(2, 0), 2);
        assert_eq!(weights.available(2, 1), 0);
        assert_eq!(weights.not_acquired(2, 1), 2);

        weights.release(2, 0, 2);
        assert_eq!(weights.available(2, 1), 2);
    }

    #[test]
    fn matching_policy_never_overlaps_blocks() {
        let mut scheduler = RoundScheduler::new(
            FlowAlgorithm::Match,
            vec![(0, 1), (0, 2), (1, 2), (2, 3)],
            4,
            1,
        );
        let first = scheduler.dispatch().unwrap();
        assert_eq!(first, (0, 1));
        // (0, 2) and (1, 2) overlap; (2, 3) is free.
        assert_eq!(scheduler.dispatch().unwrap(), (2, 3));
        assert_eq!(scheduler.dispatch(), None);

        // Unlocking (0, 1) is not enough: the remaining pairs touch the
        // still-running block 2.
        scheduler.complete(first);
        assert_eq!(scheduler.dispatch(), None);
        scheduler.complete((2, 3));
        assert_eq!(scheduler.dispatch().unwrap(), (1, 2));
    }

    #[test]
    fn most_independent_policy_balances_tasks() {
        let mut scheduler = RoundScheduler::new(
            FlowAlgorithm::Opt,
            vec![(0, 1), (0, 2), (1, 3)],
            4,
            2,
        );
        assert_eq!(scheduler.dispatch().unwrap(), (0, 1));
        // Both remaining pairs touch a loaded block and tie at max count
        // 1; pending order decides.
        assert_eq!(scheduler.dispatch().unwrap(), (1, 3));
        assert_eq!(scheduler.dispatch().unwrap(), (0, 2));
        assert_eq!(scheduler.dispatch(), None);
        assert_eq!(scheduler.active_tasks, 3);
    }
}
