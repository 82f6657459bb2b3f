//! Partition quality metrics.

use itertools::Itertools as _;
use rayon::prelude::*;

use crate::hypergraph::PartitionedHypergraph;
use crate::HyperedgeId;
use crate::HyperedgeWeight;
use crate::Objective;

/// Total weight of hyperedges spanning more than one block.
pub fn cut(phg: &PartitionedHypergraph<'_>) -> HyperedgeWeight {
    let hg = phg.hypergraph();
    (0..hg.num_edges() as HyperedgeId)
        .into_par_iter()
        .filter(|&he| phg.connectivity(he) > 1)
        .map(|he| hg.edge_weight(he))
        .sum()
}

/// The connectivity metric: sum over all hyperedges of
/// `(connectivity - 1) * weight`.
pub fn km1(phg: &PartitionedHypergraph<'_>) -> HyperedgeWeight {
    let hg = phg.hypergraph();
    (0..hg.num_edges() as HyperedgeId)
        .into_par_iter()
        .map(|he| (phg.connectivity(he).max(1) - 1) as HyperedgeWeight * hg.edge_weight(he))
        .sum()
}

pub fn objective(phg: &PartitionedHypergraph<'_>, objective: Objective) -> HyperedgeWeight {
    match objective {
        Objective::Cut => cut(phg),
        Objective::Km1 => km1(phg),
    }
}

/// The relative overload of the heaviest block:
/// `max_b weight(b) / (W / k) - 1`. Zero for a perfectly balanced
/// partition.
pub fn imbalance(phg: &PartitionedHypergraph<'_>) -> f64 {
    let total = phg.hypergraph().total_weight();
    if total == 0 {
        return 0.0;
    }
    let ideal = total as f64 / phg.k() as f64;
    let heaviest = (0..phg.k())
        .map(|block| phg.part_weight(block))
        .minmax()
        .into_option()
        .unwrap()
        .1;
    heaviest as f64 / ideal - 1.0
}

/// Whether every block respects the maximum block weight.
pub fn is_balanced(phg: &PartitionedHypergraph<'_>) -> bool {
    (0..phg.k()).all(|block| phg.part_weight(block) <= phg.max_part_weight())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hypergraph::HypergraphBuilder;
    use crate::HypernodeId;
    use crate::PartitionId;

    #[test]
    fn cut_and_km1_on_a_three_block_edge() {
        let hg = HypergraphBuilder::new(6)
            .add_edge(3, &[0, 2, 4])
            .add_edge(5, &[0, 1])
            .build()
            .unwrap();
        let mut phg = crate::PartitionedHypergraph::new(&hg, 3, 2);
        for v in 0..6 as HypernodeId {
            phg.set_only_part(v, (v % 3) as PartitionId);
        }
        phg.initialize_partition();

        // Edge 0 spans blocks {0, 1, 2}, edge 1 spans {0, 1}.
        assert_eq!(cut(&phg), 8);
        assert_eq!(km1(&phg), 2 * 3 + 5);
        assert!(is_balanced(&phg));
    }

    #[test]
    fn imbalance_of_a_lopsided_partition() {
        let hg = HypergraphBuilder::new(4).add_edge(1, &[0, 1, 2, 3]).build().unwrap();
        let mut phg = crate::PartitionedHypergraph::new(&hg, 2, 3);
        for v in 0..4 {
            phg.set_only_part(v, i32::from(v == 3));
        }
        phg.initialize_partition();

        // Blocks weigh 3 and 1 against an ideal of 2.
        assert!((imbalance(&phg) - 0.5).abs() < 1e-9);
    }
}
