use std::collections::BinaryHeap;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use super::shared::Move;
use super::shared::MoveId;
use super::shared::SharedFmData;
use super::strategy::GainStrategy;
use crate::bitset::ScratchBitmap;
use crate::FmContext;
use crate::HypernodeId;
use crate::PartitionId;
use crate::PartitionedHypergraph;

/// Hyperedges above this size are not expanded along; their pins rarely
/// profit from a localized move and walking them dominates the search.
const MAX_EXPANSION_EDGE_SIZE: u32 = 1000;

/// Shuffled boundary vertices, handed out to searches through an atomic
/// cursor.
#[derive(Debug)]
pub struct SeedPool {
    nodes: Vec<HypernodeId>,
    cursor: AtomicUsize,
}

impl SeedPool {
    pub fn new(nodes: Vec<HypernodeId>) -> Self {
        Self {
            nodes,
            cursor: AtomicUsize::new(0),
        }
    }

    fn next(&self) -> Option<HypernodeId> {
        let i = self.cursor.fetch_add(1, Ordering::Relaxed);
        self.nodes.get(i).copied()
    }
}

#[derive(Debug, Clone, Copy)]
struct LocalMove {
    node: HypernodeId,
    from: PartitionId,
    to: PartitionId,
    id: MoveId,
}

/// Per-search state: the local priority queue, the claimed vertices and
/// the applied move prefix with its running gains.
#[derive(Debug)]
pub struct SearchData {
    pub id: u32,
    pq: BinaryHeap<(i64, HypernodeId)>,
    claimed: Vec<HypernodeId>,
    moved: ScratchBitmap,
    local_moves: Vec<LocalMove>,
    total_gain: i64,
    pub best_gain: i64,
    best_prefix: usize,
    pub finalized: bool,
}

impl SearchData {
    pub fn new(id: u32, num_nodes: usize) -> Self {
        Self {
            id,
            pq: BinaryHeap::new(),
            claimed: Vec::new(),
            moved: ScratchBitmap::new(num_nodes),
            local_moves: Vec::new(),
            total_gain: 0,
            best_gain: 0,
            best_prefix: 0,
            finalized: false,
        }
    }

    /// Gain of the next candidate move, the scheduling priority of this
    /// search.
    pub fn next_gain(&self) -> Option<i64> {
        self.pq.peek().map(|&(gain, _)| gain)
    }

    pub fn kept_moves(&self) -> usize {
        self.best_prefix
    }
}

/// The localized k-way FM search engine; borrows the level's shared state
/// and runs individual searches to completion in resumable slices.
#[derive(Debug, Clone, Copy)]
pub struct FmCore<'a, 'hg> {
    pub phg: &'a PartitionedHypergraph<'hg>,
    pub shared: &'a SharedFmData,
    pub strategy: &'a GainStrategy,
    pub config: &'a FmContext,
}

impl FmCore<'_, '_> {
    /// Claim up to `num_seeds` boundary vertices for this search and queue
    /// them with their best gains. Returns whether any seed was claimed.
    pub fn setup(&self, data: &mut SearchData, pool: &SeedPool, num_seeds: usize) -> bool {
        let mut seeds = 0;
        while seeds < num_seeds {
            let Some(v) = pool.next() else { break };
            if !self.shared.try_claim(v, data.id) {
                continue;
            }
            data.claimed.push(v);
            seeds += 1;
            if let Some((_, gain)) = self.strategy.best_target(self.phg, v) {
                data.pq.push((gain, v));
            }
        }
        seeds > 0
    }

    /// Run up to one batch of moves. Returns the priority for resumption,
    /// or `None` once the search has finalized (stopping rule, exhausted
    /// queue or full move log).
    pub fn resume(&self, data: &mut SearchData) -> Option<i64> {
        debug_assert!(!data.finalized);
        let mut applied = 0;
        while applied < self.config.resume_batch {
            if data.local_moves.len() - data.best_prefix > self.config.max_non_improving_moves {
                self.finalize(data);
                return None;
            }
            let Some((gain, v)) = data.pq.pop() else {
                self.finalize(data);
                return None;
            };
            if data.moved.contains(v) {
                continue;
            }
            debug_assert!(self.shared.owns(v, data.id));
            let Some((to, current_gain)) = self.strategy.best_target(self.phg, v) else {
                continue;
            };
            if current_gain < gain {
                // Stale priority; requeue with the fresh gain.
                data.pq.push((current_gain, v));
                continue;
            }
            let from = self.phg.part_of(v);
            let moved = self.phg.change_part(v, from, to, |update| {
                self.strategy.record(self.phg, &update);
            });
            if !moved {
                continue;
            }
            self.strategy.after_move(self.phg, v);
            let Some(id) = self.shared.tracker.append(Move {
                node: v,
                from,
                to,
                gain: current_gain,
            }) else {
                // Log full: undo the unrecordable move and wind down.
                self.phg.change_part_unchecked(v, to, from, |update| {
                    self.strategy.record(self.phg, &update);
                });
                self.strategy.after_move(self.phg, v);
                self.finalize(data);
                return None;
            };
            data.local_moves.push(LocalMove { node: v, from, to, id });
            data.moved.set(v);
            data.total_gain += current_gain;
            // A tie extends the kept prefix: zero-gain plateaus are kept.
            if data.total_gain >= data.best_gain {
                data.best_gain = data.total_gain;
                data.best_prefix = data.local_moves.len();
            }
            applied += 1;
            self.expand_around(data, v);
        }

        match data.next_gain() {
            Some(gain) => Some(gain),
            None => {
                self.finalize(data);
                None
            }
        }
    }

    /// After moving `v`, pull its unclaimed neighborhood into the search
    /// and refresh the priorities of neighbors it already owns.
    fn expand_around(&self, data: &mut SearchData, v: HypernodeId) {
        let hg = self.phg.hypergraph();
        for &he in hg.incident_edges(v) {
            if hg.edge_size(he) > MAX_EXPANSION_EDGE_SIZE {
                continue;
            }
            for &p in hg.pins(he) {
                if p == v || data.moved.contains(p) {
                    continue;
                }
                let owned = if self.shared.try_claim(p, data.id) {
                    data.claimed.push(p);
                    true
                } else {
                    self.shared.owns(p, data.id)
                };
                if owned {
                    if let Some((_, gain)) = self.strategy.best_target(self.phg, p) {
                        data.pq.push((gain, p));
                    }
                }
            }
        }
    }

    /// Revert every move after the best prefix, newest first, and release
    /// the claimed vertices. Idempotent: a second call finds nothing to
    /// revert.
    pub fn finalize(&self, data: &mut SearchData) {
        for i in (data.best_prefix..data.local_moves.len()).rev() {
            let lm = data.local_moves[i];
            self.phg
                .change_part_unchecked(lm.node, lm.to, lm.from, |update| {
                    self.strategy.record(self.phg, &update);
                });
            self.strategy.after_move(self.phg, lm.node);
            self.shared.tracker.mark_reverted(lm.id);
        }
        data.local_moves.truncate(data.best_prefix);
        data.total_gain = data.best_gain;
        for &v in &data.claimed {
            self.shared.release(v);
        }
        data.claimed.clear();
        data.pq.clear();
        data.finalized = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hypergraph::HypergraphBuilder;
    use crate::metrics;
    use crate::refinement::FmGainPolicy;
    use crate::Context;
    use crate::Objective;

    fn engine_fixture() -> (crate::StaticHypergraph, Context) {
        // Two clusters with a misplaced vertex on each side.
        let hg = HypergraphBuilder::new(8)
            .add_edge(5, &[0, 1, 2, 3])
            .add_edge(5, &[4, 5, 6, 7])
            .add_edge(1, &[3, 4])
            .build()
            .unwrap();
        let context = Context::new(2, 0.0, Objective::Km1);
        (hg, context)
    }

    #[test]
    fn a_single_search_finds_the_clean_split() {
        let (hg, context) = engine_fixture();
        let mut phg = crate::PartitionedHypergraph::new(&hg, 2, 5);
        for (v, block) in [0, 0, 0, 1, 1, 1, 1, 0].into_iter().enumerate() {
            phg.set_only_part(v as HypernodeId, block);
        }
        phg.initialize_partition();
        let before = metrics::km1(&phg);

        let mut strategy = GainStrategy::new(Objective::Km1, FmGainPolicy::Cache);
        strategy.initialize(&phg);
        let mut shared = SharedFmData::new(8);
        shared.reset(1);
        let core = FmCore {
            phg: &phg,
            shared: &shared,
            strategy: &strategy,
            config: &context.fm,
        };

        let pool = SeedPool::new((0..8).collect());
        let mut data = SearchData::new(0, 8);
        assert!(core.setup(&mut data, &pool, usize::MAX));
        while core.resume(&mut data).is_some() {}

        assert!(data.finalized);
        assert_eq!(before - metrics::km1(&phg), data.best_gain);
        assert_eq!(metrics::km1(&phg), 1);
        phg.check_integrity().unwrap();
    }

    #[test]
    fn best_prefix_maximizes_cumulative_gain() {
        // Gains +3, +1, -2, +2, -5: cumulative 3, 4, 2, 4, -1. The tie at
        // 4 extends the kept prefix to the first four moves.
        let hg = HypergraphBuilder::new(5).add_edge(1, &[0, 1, 2, 3, 4]).build().unwrap();
        let mut phg = crate::PartitionedHypergraph::new(&hg, 2, 100);
        for v in 0..5 {
            phg.set_only_part(v, 0);
        }
        phg.initialize_partition();

        let context = Context::new(2, 0.5, Objective::Km1);
        let strategy = GainStrategy::new(Objective::Km1, FmGainPolicy::Recompute);
        let mut shared = SharedFmData::new(5);
        shared.reset(1);
        let core = FmCore {
            phg: &phg,
            shared: &shared,
            strategy: &strategy,
            config: &context.fm,
        };

        let mut data = SearchData::new(0, 5);
        for (v, gain) in [(0_u32, 3_i64), (1, 1), (2, -2), (3, 2), (4, -5)] {
            phg.change_part_unchecked(v, 0, 1, |_| {});
            let id = shared
                .tracker
                .append(Move { node: v, from: 0, to: 1, gain })
                .unwrap();
            data.local_moves.push(LocalMove { node: v, from: 0, to: 1, id });
            data.total_gain += gain;
            if data.total_gain >= data.best_gain {
                data.best_gain = data.total_gain;
                data.best_prefix = data.local_moves.len();
            }
        }
        assert_eq!(data.best_prefix, 4);
        assert_eq!(data.best_gain, 4);

        core.finalize(&mut data);
        for v in 0..4 {
            assert_eq!(phg.part_of(v), 1);
        }
        assert_eq!(phg.part_of(4), 0);
        assert!(shared.tracker.is_reverted(4));
        assert!(!shared.tracker.is_reverted(3));
        phg.check_integrity().unwrap();
    }

    #[test]
    fn rollback_keeps_the_best_prefix_and_is_idempotent() {
        let (hg, context) = engine_fixture();
        let mut phg = crate::PartitionedHypergraph::new(&hg, 2, 8);
        for v in 0..8 {
            phg.set_only_part(v, i32::from(v >= 4));
        }
        phg.initialize_partition();

        let strategy = GainStrategy::new(Objective::Km1, FmGainPolicy::Recompute);
        let mut shared = SharedFmData::new(8);
        shared.reset(1);
        let core = FmCore {
            phg: &phg,
            shared: &shared,
            strategy: &strategy,
            config: &context.fm,
        };

        // Apply a deliberately bad suffix by hand: the first move heals the
        // cut edge, the rest only hurt.
        let mut data = SearchData::new(0, 8);
        for (v, to, gain) in [(4_u32, 0, 1_i64), (1, 1, -5), (5, 0, -5)] {
            let from = phg.part_of(v);
            assert!(phg.change_part(v, from, to, |_| {}));
            let id = core
                .shared
                .tracker
                .append(Move { node: v, from, to, gain })
                .unwrap();
            data.local_moves.push(LocalMove { node: v, from, to, id });
            data.total_gain += gain;
            if data.total_gain >= data.best_gain {
                data.best_gain = data.total_gain;
                data.best_prefix = data.local_moves.len();
            }
        }
        let snapshot_gain = data.best_gain;
        assert_eq!(data.best_prefix, 1);

        core.finalize(&mut data);
        assert_eq!(phg.part_of(1), 0);
        assert_eq!(phg.part_of(5), 1);
        assert_eq!(phg.part_of(4), 0);
        assert!(shared.tracker.is_reverted(1));
        assert!(shared.tracker.is_reverted(2));
        assert!(!shared.tracker.is_reverted(0));

        // Applying rollback twice changes nothing further.
        core.finalize(&mut data);
        assert_eq!(data.best_gain, snapshot_gain);
        assert_eq!(phg.part_of(1), 0);
        phg.check_integrity().unwrap();
    }
}
