//! Quotient-graph flow refinement: block pairs with cut hyperedges are
//! dispatched to concurrent min-cut subproblems, with block weights
//! arbitrated through a row-locked reservation matrix and vertices owned
//! through per-vertex CAS locks.

mod network;
mod quotient;

pub use network::build_region_network;
pub use network::FlowNetwork;
pub use quotient::BlockPair;
pub use quotient::BlockWeightMatrix;
pub use quotient::NodeOwnership;
pub use quotient::QuotientGraph;
pub use quotient::RoundScheduler;

use rayon::prelude::*;

use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicI64;
use std::sync::atomic::Ordering;
use std::sync::Mutex;
use std::time::Instant;

use super::deadline_passed;
use super::rebalance::rebalance;
use super::rebalance::GainAccumulator;
use super::Metadata;
use super::Refiner;
use crate::Context;
use crate::FlowContext;
use crate::HypernodeId;
use crate::Objective;
use crate::PartitionId;
use crate::PartitionedHypergraph;

#[derive(Debug)]
pub struct FlowRefiner {
    objective: Objective,
    config: FlowContext,
    k: PartitionId,
    deterministic: bool,
}

impl FlowRefiner {
    pub fn new(context: &Context) -> Self {
        Self {
            objective: context.objective,
            config: context.flow,
            k: context.k,
            deterministic: context.deterministic,
        }
    }
}

impl Refiner for FlowRefiner {
    fn initialize(&mut self, _phg: &PartitionedHypergraph<'_>) {}

    fn refine(&mut self, phg: &PartitionedHypergraph<'_>, deadline: Option<Instant>) -> Metadata {
        let span = tracing::info_span!("flow refinement");
        let _enter = span.enter();

        let quotient = QuotientGraph::build(phg);
        let ownership = NodeOwnership::new(phg.hypergraph().num_nodes());
        let mut active_blocks = vec![true; self.k as usize];

        let mut metadata = Metadata::default();
        for _ in 0..self.config.max_rounds {
            if deadline_passed(deadline) {
                break;
            }
            let round_pairs: Vec<BlockPair> = quotient
                .pairs()
                .into_iter()
                .filter(|&(b0, b1)| {
                    active_blocks[b0 as usize] && active_blocks[b1 as usize]
                })
                .collect();
            if round_pairs.is_empty() {
                break;
            }
            // Blocks reactivate only through an improvement in this round.
            active_blocks.iter_mut().for_each(|a| *a = false);
            let reactivated: Vec<AtomicBool> =
                (0..self.k as usize).map(|_| AtomicBool::new(false)).collect();

            let weights = BlockWeightMatrix::new(phg);
            let scheduler = Mutex::new(RoundScheduler::new(
                self.config.algorithm,
                round_pairs,
                self.k as usize,
                self.config.max_tasks_per_block,
            ));
            let round_gain = AtomicI64::new(0);
            let round_moves = AtomicI64::new(0);

            let worker = || loop {
                if deadline_passed(deadline) {
                    break;
                }
                let dispatched = scheduler.lock().unwrap().dispatch();
                let Some(pair) = dispatched else {
                    if scheduler.lock().unwrap().is_drained() {
                        break;
                    }
                    std::thread::yield_now();
                    continue;
                };
                let (gain, moves) =
                    self.refine_pair(phg, &quotient, &weights, &ownership, pair);
                if gain > 0 {
                    round_gain.fetch_add(gain, Ordering::Relaxed);
                    round_moves.fetch_add(moves as i64, Ordering::Relaxed);
                    reactivated[pair.0 as usize].store(true, Ordering::Relaxed);
                    reactivated[pair.1 as usize].store(true, Ordering::Relaxed);
                }
                scheduler.lock().unwrap().complete(pair);
            };
            let workers = if self.deterministic {
                1
            } else {
                rayon::current_num_threads()
            };
            (0..workers).into_par_iter().for_each(|_| worker());

            // The optimistic weight acquisition may have overshot epsilon.
            rebalance(phg, self.objective);

            for (block, flag) in active_blocks.iter_mut().zip(&reactivated) {
                *block = flag.load(Ordering::Relaxed);
            }
            let gain = round_gain.load(Ordering::Relaxed);
            tracing::debug!(gain, "flow round finished");
            metadata.improvement += gain;
            metadata.move_count += round_moves.load(Ordering::Relaxed) as usize;
            metadata.round_count += 1;
            if gain <= 0 {
                break;
            }
        }
        metadata
    }
}

impl FlowRefiner {
    /// One block-pair task: extract the pair's cut hyperedges, build and
    /// solve the flow subproblem, and apply the induced moves tentatively,
    /// keeping them only when the objective improves within the arbitrated
    /// weight budget.
    fn refine_pair(
        &self,
        phg: &PartitionedHypergraph<'_>,
        quotient: &QuotientGraph,
        weights: &BlockWeightMatrix,
        ownership: &NodeOwnership,
        (b0, b1): BlockPair,
    ) -> (i64, usize) {
        let hg = phg.hypergraph();
        let cut_edges = quotient.pair_cut_edges(phg, (b0, b1));
        if cut_edges.is_empty() {
            return (0, 0);
        }
        let task = (b0 as u32 * self.k as u32 + b1 as u32) + 1;

        let mut region_network = build_region_network(
            phg,
            b0,
            b1,
            &cut_edges,
            self.config.max_region_size,
            |v| ownership.try_acquire(v, task),
        );
        if region_network.region.is_empty() {
            return (0, 0);
        }

        fn side_weight(
            hg: &crate::StaticHypergraph,
            region: &[HypernodeId],
            mut on_b0: impl FnMut(usize) -> bool,
        ) -> (i64, i64) {
            let mut w0 = 0;
            let mut w1 = 0;
            for (i, &v) in region.iter().enumerate() {
                if on_b0(i) {
                    w0 += hg.node_weight(v);
                } else {
                    w1 += hg.node_weight(v);
                }
            }
            (w0, w1)
        }
        let (acquired0, acquired1) = side_weight(hg, &region_network.region, |i| {
            phg.part_of(region_network.region[i]) == b0
        });
        weights.acquire(b0, b1, acquired0);
        weights.acquire(b1, b0, acquired1);
        // Weight of each block that is out of this task's hands; whatever
        // the min cut assigns to a side must fit on top of it.
        let budget0 = phg.max_part_weight() - weights.not_acquired(b0, b1);
        let budget1 = phg.max_part_weight() - weights.not_acquired(b1, b0);

        region_network.network.max_flow();
        let sides = region_network.sides();
        let (new0, new1) = side_weight(hg, &region_network.region, |i| sides[i]);

        let mut gain = 0;
        let mut moves = 0;
        if new0 <= budget0 && new1 <= budget1 {
            let accumulator = GainAccumulator::default();
            let mut applied: Vec<(HypernodeId, PartitionId, PartitionId)> = Vec::new();
            for (i, &v) in region_network.region.iter().enumerate() {
                let target = if sides[i] { b0 } else { b1 };
                let current = phg.part_of(v);
                if target != current {
                    phg.change_part_unchecked(v, current, target, |update| {
                        accumulator.record(&update);
                    });
                    applied.push((v, current, target));
                }
            }
            gain = accumulator.gain(self.objective);
            if gain > 0 {
                moves = applied.len();
                self.record_new_cuts(phg, quotient, &applied);
            } else {
                for &(v, from, to) in applied.iter().rev() {
                    phg.change_part_unchecked(v, to, from, |_| {});
                }
                gain = 0;
            }
        }

        let (release0, release1) = if moves > 0 {
            (new0, new1)
        } else {
            (acquired0, acquired1)
        };
        weights.release(b0, b1, release0);
        weights.release(b1, b0, release1);
        for &v in &region_network.region {
            ownership.release(v, task);
        }
        (gain, moves)
    }

    /// Edges that newly gained their first pin in a block span fresh block
    /// pairs; feed them back into the quotient graph.
    fn record_new_cuts(
        &self,
        phg: &PartitionedHypergraph<'_>,
        quotient: &QuotientGraph,
        applied: &[(HypernodeId, PartitionId, PartitionId)],
    ) {
        let hg = phg.hypergraph();
        for &(v, _, to) in applied {
            for &he in hg.incident_edges(v) {
                if phg.pin_count(he, to) != 1 || phg.connectivity(he) < 2 {
                    continue;
                }
                for part in phg.connectivity_set(he) {
                    if part < to {
                        quotient.record_cut_edge((part, to), he);
                    } else if part > to {
                        quotient.record_cut_edge((to, part), he);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hypergraph::HypergraphBuilder;
    use crate::metrics;
    use crate::refinement::FlowAlgorithm;

    fn refine_with(algorithm: FlowAlgorithm) {
        // A path of clusters where the initial cut goes through a heavy
        // edge; the flow refiner should shift it to the light one.
        let hg = HypergraphBuilder::new(6)
            .add_edge(4, &[0, 1])
            .add_edge(4, &[1, 2])
            .add_edge(1, &[2, 3])
            .add_edge(4, &[3, 4])
            .add_edge(4, &[4, 5])
            .build()
            .unwrap();
        let mut phg = crate::PartitionedHypergraph::new(&hg, 2, 4);
        for v in 0..6 {
            phg.set_only_part(v, i32::from(v >= 2));
        }
        phg.initialize_partition();
        let before = metrics::cut(&phg);
        assert_eq!(before, 4);

        let mut context = Context::new(2, 0.4, Objective::Cut);
        context.flow.algorithm = algorithm;
        let mut refiner = FlowRefiner::new(&context);
        refiner.initialize(&phg);
        let metadata = refiner.refine(&phg, None);

        assert_eq!(metrics::cut(&phg), 1);
        assert_eq!(metadata.improvement, 3);
        assert!(metrics::is_balanced(&phg));
        phg.check_integrity().unwrap();
    }

    #[test]
    fn flow_moves_the_cut_to_the_light_edge_opt() {
        refine_with(FlowAlgorithm::Opt);
    }

    #[test]
    fn flow_moves_the_cut_to_the_light_edge_match() {
        refine_with(FlowAlgorithm::Match);
    }

    #[test]
    fn no_cut_edges_means_no_work() {
        let hg = HypergraphBuilder::new(4)
            .add_edge(1, &[0, 1])
            .add_edge(1, &[2, 3])
            .build()
            .unwrap();
        let mut phg = crate::PartitionedHypergraph::new(&hg, 2, 2);
        for v in 0..4 {
            phg.set_only_part(v, (v / 2) as PartitionId);
        }
        phg.initialize_partition();

        let context = Context::new(2, 0.0, Objective::Cut);
        let mut refiner = FlowRefiner::new(&context);
        let metadata = refiner.refine(&phg, None);
        assert_eq!(metadata.improvement, 0);
        assert_eq!(metadata.move_count, 0);
    }
}
