use rand::SeedableRng as _;
use rand_pcg::Pcg64;
use rayon::prelude::*;

use std::time::Instant;

use crate::coarsening;
use crate::initial::BfsInitialPartitioner;
use crate::initial::InitialPartitioner as _;
use crate::metrics;
use crate::refinement;
use crate::refinement::Refiner;
use crate::Context;
use crate::Error;
use crate::HyperedgeWeight;
use crate::HypernodeId;
use crate::Partition;
use crate::PartitionId;
use crate::PartitionedHypergraph;
use crate::StaticHypergraph;
use crate::INVALID_HYPERNODE;

/// Diagnostic data for a [`Multilevel`] run.
#[non_exhaustive]
#[derive(Debug, Default, Clone, Copy)]
pub struct Metadata {
    /// Final value of the configured objective.
    pub objective: HyperedgeWeight,
    /// Final imbalance, `max_b weight(b) / ideal - 1`.
    pub imbalance: f64,
    /// Number of contraction levels in the hierarchy.
    pub level_count: usize,
    /// Vertex moves kept by all refinement phases together.
    pub refinement_moves: usize,
}

/// The multilevel partitioner: coarsen, partition the coarsest level,
/// then project back level by level, refining at each one.
///
/// See the crate-level example for usage.
#[derive(Debug, Clone)]
pub struct Multilevel {
    pub context: Context,
}

impl Partition<&StaticHypergraph> for Multilevel {
    type Metadata = Metadata;
    type Error = Error;

    fn partition(
        &mut self,
        part_ids: &mut [PartitionId],
        hg: &StaticHypergraph,
    ) -> Result<Metadata, Error> {
        self.context.validate()?;
        if hg.num_nodes() == 0 {
            return Err(Error::InvalidInput("hypergraph has no vertices".into()));
        }
        if hg.num_nodes() < self.context.k as usize {
            return Err(Error::InvalidInput(format!(
                "cannot split {} vertices into {} non-empty blocks",
                hg.num_nodes(),
                self.context.k
            )));
        }
        if part_ids.len() != hg.num_nodes() {
            return Err(Error::InvalidInput(format!(
                "partition array has {} entries for {} vertices",
                part_ids.len(),
                hg.num_nodes()
            )));
        }
        let deadline = self.context.time_limit.map(|limit| Instant::now() + limit);
        let max_part_weight = self.context.max_part_weight(hg.total_weight());

        let hierarchy = coarsening::coarsen(hg, &self.context);

        // Initial partition on the coarsest level.
        let coarsest = hierarchy.coarsest(hg);
        let mut phg = PartitionedHypergraph::new(coarsest, self.context.k, max_part_weight);
        let mut initial = BfsInitialPartitioner {
            objective: self.context.objective,
            num_attempts: self.context.initial.num_attempts,
            rng: Pcg64::seed_from_u64(self.context.seed),
        };
        initial.partition(&mut phg)?;

        let mut current = vec![0 as PartitionId; coarsest.num_nodes()];
        phg.extract_partition(&mut current);
        let mut refinement_moves = self.refine_level(&mut phg, deadline)?;
        phg.extract_partition(&mut current);
        drop(phg);

        // Uncoarsen: project through each cluster map, then refine.
        let mut levels = hierarchy.levels.iter().rev().peekable();
        while let Some(level) = levels.next() {
            let coarse_parts = current;
            let fine = levels.peek().map_or(hg, |finer| &finer.coarse);
            debug_assert_eq!(level.cluster.len(), fine.num_nodes());

            current = level
                .cluster
                .par_iter()
                .map(|&coarse| {
                    debug_assert_ne!(coarse, INVALID_HYPERNODE);
                    coarse_parts[coarse as usize]
                })
                .collect();

            let mut phg = PartitionedHypergraph::new(fine, self.context.k, max_part_weight);
            for (v, &block) in current.iter().enumerate() {
                phg.set_only_part(v as HypernodeId, block);
            }
            phg.initialize_partition();
            refinement_moves += self.refine_level(&mut phg, deadline)?;
            phg.extract_partition(&mut current);
        }

        part_ids.copy_from_slice(&current);

        // Final numbers, measured on a fresh overlay of the input graph.
        let mut phg = PartitionedHypergraph::new(hg, self.context.k, max_part_weight);
        for (v, &block) in current.iter().enumerate() {
            phg.set_only_part(v as HypernodeId, block);
        }
        phg.initialize_partition();
        let metadata = Metadata {
            objective: metrics::objective(&phg, self.context.objective),
            imbalance: metrics::imbalance(&phg),
            level_count: hierarchy.levels.len(),
            refinement_moves,
        };
        tracing::info!(
            objective = metadata.objective,
            imbalance = metadata.imbalance,
            levels = metadata.level_count,
            "partitioning done",
        );
        Ok(metadata)
    }
}

impl Multilevel {
    /// Run the configured refiners on one level. Each refiner is
    /// initialized right before its pass so it sees the moves of the
    /// previous one.
    fn refine_level(
        &self,
        phg: &mut PartitionedHypergraph<'_>,
        deadline: Option<Instant>,
    ) -> Result<usize, Error> {
        let mut moves = 0;
        let mut refiners: [Box<dyn Refiner>; 3] = [
            refinement::lp_refiner_from(&self.context),
            refinement::fm_refiner_from(&self.context),
            refinement::flow_refiner_from(&self.context),
        ];
        for refiner in &mut refiners {
            refiner.initialize(phg);
            moves += refiner.refine(phg, deadline).move_count;
        }
        // The flow scheduler's weight arbitration is allowed to overshoot
        // momentarily; nothing may leak past the level boundary.
        refinement::rebalance(phg, self.context.objective);
        if cfg!(debug_assertions) {
            phg.check_integrity()?;
        }
        Ok(moves)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hypergraph::HypergraphBuilder;
    use crate::Objective;

    fn partition(
        hg: &StaticHypergraph,
        k: PartitionId,
        epsilon: f64,
        objective: Objective,
    ) -> (Vec<PartitionId>, Metadata) {
        let mut context = Context::new(k, epsilon, objective);
        context.seed = 7;
        let mut part = vec![-1; hg.num_nodes()];
        let metadata = Multilevel { context }.partition(&mut part, hg).unwrap();
        (part, metadata)
    }

    #[test]
    fn rejects_invalid_configurations() {
        let hg = HypergraphBuilder::new(2).add_edge(1, &[0, 1]).build().unwrap();
        let mut part = vec![-1; 2];
        let result = Multilevel {
            context: Context::new(1, 0.0, Objective::Cut),
        }
        .partition(&mut part, &hg);
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn partitions_a_grid_within_balance() {
        let index = |x: u32, y: u32| y * 8 + x;
        let mut edges = Vec::new();
        for y in 0..8 {
            for x in 0..8 {
                if x + 1 < 8 {
                    edges.push((1, vec![index(x, y), index(x + 1, y)]));
                }
                if y + 1 < 8 {
                    edges.push((1, vec![index(x, y), index(x, y + 1)]));
                }
            }
        }
        let hg = HypergraphBuilder::new(64).add_edges(edges).build().unwrap();

        let (part, metadata) = partition(&hg, 4, 0.1, Objective::Km1);
        assert!(part.iter().all(|&b| (0..4).contains(&b)));
        // Every block is non-empty and within the weight bound.
        let mut counts = [0_i64; 4];
        for &b in &part {
            counts[b as usize] += 1;
        }
        assert!(counts.iter().all(|&c| c > 0));
        assert!(counts.iter().all(|&c| c <= 17)); // floor(1.1 * ceil(64/4))
        assert!(metadata.objective > 0);
    }
}
