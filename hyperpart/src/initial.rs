//! Initial partitioning of the coarsest level: multi-seed BFS growth with
//! greedy balance repair.

use rand::seq::index::sample;
use rand::Rng;
use rand_pcg::Pcg64;

use std::collections::VecDeque;

use crate::bitset::ScratchBitmap;
use crate::Error;
use crate::HypernodeId;
use crate::HypernodeWeight;
use crate::Objective;
use crate::PartitionId;
use crate::PartitionedHypergraph;
use crate::StaticHypergraph;
use crate::INVALID_PARTITION;

/// Computes a first k-way partition on the coarsest hypergraph. The
/// multilevel driver only depends on this capability; the growth strategy
/// is a policy.
pub trait InitialPartitioner {
    /// Assign every vertex of the overlay's hypergraph to a block and
    /// initialize the overlay. Must respect the overlay's maximum block
    /// weight or fail with [`Error::BalanceInfeasible`].
    fn partition(&mut self, phg: &mut PartitionedHypergraph<'_>) -> Result<(), Error>;
}

/// Repeated multi-seed BFS growth.
///
/// Each attempt picks `k` random seed vertices, grows the blocks
/// breadth-first across incident nets while the block weight allows,
/// assigns leftovers to the lightest block and greedily repairs any
/// overweight block. The best feasible attempt by the configured objective
/// wins.
#[derive(Debug)]
pub struct BfsInitialPartitioner {
    pub objective: Objective,
    pub num_attempts: usize,
    pub rng: Pcg64,
}

impl InitialPartitioner for BfsInitialPartitioner {
    fn partition(&mut self, phg: &mut PartitionedHypergraph<'_>) -> Result<(), Error> {
        let span = tracing::info_span!("initial partitioning");
        let _enter = span.enter();

        let hg = phg.hypergraph();
        let k = phg.k();
        let max_part_weight = phg.max_part_weight();

        let mut best: Option<(i64, Vec<PartitionId>)> = None;
        let mut last_overload = (0, 0);
        for _ in 0..self.num_attempts.max(1) {
            let assignment = self.grow(hg, k, max_part_weight);
            match heaviest_overload(hg, k, &assignment) {
                (_, overload) if overload <= max_part_weight => {
                    let value = objective_of(hg, k, &assignment, self.objective);
                    if best.as_ref().is_none_or(|(b, _)| value < *b) {
                        best = Some((value, assignment));
                    }
                }
                overloaded => last_overload = overloaded,
            }
        }

        let (value, assignment) = best.ok_or(Error::BalanceInfeasible {
            block: last_overload.0,
            weight: last_overload.1,
            max_part_weight,
        })?;
        tracing::info!(objective = value, "initial partition found");

        for (v, &block) in assignment.iter().enumerate() {
            phg.set_only_part(v as HypernodeId, block);
        }
        phg.initialize_partition();
        Ok(())
    }
}

impl BfsInitialPartitioner {
    fn grow(
        &mut self,
        hg: &StaticHypergraph,
        k: PartitionId,
        max_part_weight: HypernodeWeight,
    ) -> Vec<PartitionId> {
        let n = hg.num_nodes();
        let mut assignment = vec![INVALID_PARTITION; n];
        let mut block_weight = vec![0 as HypernodeWeight; k as usize];
        let mut queues: Vec<VecDeque<HypernodeId>> = vec![VecDeque::new(); k as usize];
        let mut queued: Vec<ScratchBitmap> = vec![ScratchBitmap::new(n); k as usize];

        let seeds = sample(&mut self.rng, n, (k as usize).min(n));
        for (block, seed) in seeds.into_iter().enumerate() {
            queues[block].push_back(seed as HypernodeId);
            queued[block].set(seed as HypernodeId);
        }

        let mut unassigned = n;
        let mut active = true;
        while active && unassigned > 0 {
            active = false;
            for block in 0..k as usize {
                while let Some(u) = queues[block].pop_front() {
                    if assignment[u as usize] != INVALID_PARTITION {
                        continue;
                    }
                    if block_weight[block] + hg.node_weight(u) > max_part_weight {
                        break;
                    }
                    assignment[u as usize] = block as PartitionId;
                    block_weight[block] += hg.node_weight(u);
                    unassigned -= 1;
                    active = true;
                    for &he in hg.incident_edges(u) {
                        for &v in hg.pins(he) {
                            if assignment[v as usize] == INVALID_PARTITION
                                && !queued[block].contains(v)
                            {
                                queued[block].set(v);
                                queues[block].push_back(v);
                            }
                        }
                    }
                    break;
                }
            }
        }

        // Leftovers (unreached or blocked by the weight bound) go to the
        // lightest block; repair deals with any overload this causes.
        for v in 0..n {
            if assignment[v] == INVALID_PARTITION {
                let lightest = (0..k as usize)
                    .min_by_key(|&b| block_weight[b])
                    .unwrap();
                assignment[v] = lightest as PartitionId;
                block_weight[lightest] += hg.node_weight(v as HypernodeId);
            }
        }

        self.repair(hg, k, max_part_weight, &mut assignment, &mut block_weight);
        assignment
    }

    /// Move vertices out of overweight blocks, cheapest objective loss
    /// first, into the lightest block that can take them. Also makes sure
    /// no block stays empty.
    fn repair(
        &mut self,
        hg: &StaticHypergraph,
        k: PartitionId,
        max_part_weight: HypernodeWeight,
        assignment: &mut [PartitionId],
        block_weight: &mut [HypernodeWeight],
    ) {
        let n = hg.num_nodes();

        // A seed can be stolen by a faster-growing neighbor block; donate
        // the cheapest vertex of the most populous block to any empty one.
        // Donating from a block with two or more vertices guarantees
        // progress.
        let mut population = vec![0_usize; k as usize];
        for &block in assignment.iter() {
            population[block as usize] += 1;
        }
        while let Some(to) = (0..k as usize).find(|&b| population[b] == 0) {
            let from = (0..k as usize).max_by_key(|&b| population[b]).unwrap();
            if population[from] < 2 {
                break;
            }
            let mut best: Option<(i64, HypernodeId)> = None;
            for v in 0..n as HypernodeId {
                if assignment[v as usize] != from as PartitionId {
                    continue;
                }
                let loss = connection_loss(hg, assignment, v, to as PartitionId);
                if best.is_none_or(|(b, _)| loss < b) {
                    best = Some((loss, v));
                }
            }
            let Some((_, v)) = best else { break };
            assignment[v as usize] = to as PartitionId;
            block_weight[from] -= hg.node_weight(v);
            block_weight[to] += hg.node_weight(v);
            population[from] -= 1;
            population[to] += 1;
        }
        for _ in 0..2 * n {
            let Some(from) = (0..k as usize)
                .filter(|&b| block_weight[b] > max_part_weight)
                .max_by_key(|&b| block_weight[b])
            else {
                return;
            };
            let to = (0..k as usize).min_by_key(|&b| block_weight[b]).unwrap();
            if to == from {
                return;
            }

            // Start from a random probe so repeated repairs do not always
            // strip the same corner of the block.
            let offset = self.rng.random_range(0..n);
            let mut best: Option<(i64, HypernodeId)> = None;
            for i in 0..n {
                let v = ((i + offset) % n) as HypernodeId;
                if assignment[v as usize] != from as PartitionId {
                    continue;
                }
                if block_weight[to] + hg.node_weight(v) > max_part_weight {
                    continue;
                }
                let loss = connection_loss(hg, assignment, v, to as PartitionId);
                if best.is_none_or(|(b, _)| loss < b) {
                    best = Some((loss, v));
                }
            }
            let Some((_, v)) = best else { return };
            assignment[v as usize] = to as PartitionId;
            block_weight[from] -= hg.node_weight(v);
            block_weight[to] += hg.node_weight(v);
        }
    }
}

/// How many weighted connections `v` gives up by moving to `to`: incident
/// edge weight to pins of its current block, minus weight to pins already
/// in `to`.
fn connection_loss(
    hg: &StaticHypergraph,
    assignment: &[PartitionId],
    v: HypernodeId,
    to: PartitionId,
) -> i64 {
    let from = assignment[v as usize];
    let mut loss = 0;
    for &he in hg.incident_edges(v) {
        let weight = hg.edge_weight(he);
        for &pin in hg.pins(he) {
            if pin == v {
                continue;
            }
            if assignment[pin as usize] == from {
                loss += weight;
            } else if assignment[pin as usize] == to {
                loss -= weight;
            }
        }
    }
    loss
}

fn heaviest_overload(
    hg: &StaticHypergraph,
    k: PartitionId,
    assignment: &[PartitionId],
) -> (PartitionId, HypernodeWeight) {
    let mut block_weight = vec![0 as HypernodeWeight; k as usize];
    for (v, &block) in assignment.iter().enumerate() {
        block_weight[block as usize] += hg.node_weight(v as HypernodeId);
    }
    let heaviest = (0..k as usize).max_by_key(|&b| block_weight[b]).unwrap();
    (heaviest as PartitionId, block_weight[heaviest])
}

/// Objective value of a raw assignment, without a partitioned overlay.
fn objective_of(
    hg: &StaticHypergraph,
    k: PartitionId,
    assignment: &[PartitionId],
    objective: Objective,
) -> i64 {
    let mut value = 0;
    let mut seen = ScratchBitmap::new(k as usize);
    for e in hg.edges() {
        let mut spanned: Vec<u32> = Vec::new();
        for &pin in hg.pins(e) {
            let block = assignment[pin as usize] as u32;
            if !seen.contains(block) {
                seen.set(block);
                spanned.push(block);
            }
        }
        match objective {
            Objective::Cut if spanned.len() > 1 => value += hg.edge_weight(e),
            Objective::Km1 => value += (spanned.len() as i64 - 1) * hg.edge_weight(e),
            _ => {}
        }
        seen.reset_all(spanned.iter());
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hypergraph::HypergraphBuilder;
    use rand::SeedableRng as _;

    fn run(
        hg: &StaticHypergraph,
        k: PartitionId,
        max_part_weight: HypernodeWeight,
    ) -> Result<Vec<PartitionId>, Error> {
        let mut phg = PartitionedHypergraph::new(hg, k, max_part_weight);
        let mut partitioner = BfsInitialPartitioner {
            objective: Objective::Km1,
            num_attempts: 10,
            rng: Pcg64::seed_from_u64(42),
        };
        partitioner.partition(&mut phg)?;
        let mut out = vec![INVALID_PARTITION; hg.num_nodes()];
        phg.extract_partition(&mut out);
        for block in 0..k {
            assert!(phg.part_weight(block) <= max_part_weight);
        }
        Ok(out)
    }

    #[test]
    fn balanced_bipartition_of_two_cliques() {
        let hg = HypergraphBuilder::new(8)
            .add_edge(5, &[0, 1, 2, 3])
            .add_edge(5, &[4, 5, 6, 7])
            .add_edge(1, &[3, 4])
            .build()
            .unwrap();
        let partition = run(&hg, 2, 4).unwrap();
        assert!(partition.iter().all(|&b| b == 0 || b == 1));
        // Perfect split exists and the objective should find it.
        assert_eq!(partition[0], partition[1]);
        assert_eq!(partition[4], partition[7]);
    }

    #[test]
    fn infeasible_bound_is_reported() {
        let hg = HypergraphBuilder::new(4)
            .add_edge(1, &[0, 1, 2, 3])
            .node_weights(vec![5, 5, 5, 5])
            .build()
            .unwrap();
        let result = run(&hg, 2, 5);
        assert!(matches!(result, Err(Error::BalanceInfeasible { .. })));
    }

    #[test]
    fn every_vertex_is_assigned() {
        // Disconnected singletons still get a block.
        let hg = HypergraphBuilder::new(9)
            .add_edge(1, &[0, 1])
            .add_edge(1, &[2, 3])
            .build()
            .unwrap();
        let partition = run(&hg, 3, 3).unwrap();
        assert!(partition.iter().all(|&b| (0..3).contains(&b)));
    }
}
