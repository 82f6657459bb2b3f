//! The coarsening driver: repeatedly cluster and contract until the
//! hypergraph is small enough for initial partitioning.

mod rating;

pub(crate) use rating::heavy_edge_clustering;

use crate::Context;
use crate::HypernodeId;
use crate::StaticHypergraph;

/// One step of the multilevel hierarchy: the cluster map applied to the
/// previous (finer) hypergraph and the coarser hypergraph it produced.
#[derive(Debug)]
pub struct Level {
    /// For every fine vertex, its coarse vertex id.
    pub cluster: Vec<HypernodeId>,
    pub coarse: StaticHypergraph,
}

/// The ordered sequence of levels produced by [`coarsen`], finest first.
#[derive(Debug, Default)]
pub struct Hierarchy {
    pub levels: Vec<Level>,
}

impl Hierarchy {
    /// The hypergraph initial partitioning runs on.
    pub fn coarsest<'a>(&'a self, input: &'a StaticHypergraph) -> &'a StaticHypergraph {
        self.levels.last().map_or(input, |level| &level.coarse)
    }
}

/// Build the multilevel hierarchy for `hg`.
///
/// Each round computes a heavy-edge clustering capped at
/// `max_cluster_weight` and contracts it. Coarsening stops when the vertex
/// count falls below `contraction_limit_multiplier * k` or a round shrinks
/// the hypergraph by less than `minimum_shrink_factor`.
pub fn coarsen(hg: &StaticHypergraph, context: &Context) -> Hierarchy {
    let span = tracing::info_span!("coarsening");
    let _enter = span.enter();

    let contraction_limit =
        context.coarsening.contraction_limit_multiplier as usize * context.k as usize;
    let max_cluster_weight = context.max_cluster_weight(hg.total_weight());

    let mut hierarchy = Hierarchy::default();
    loop {
        let (level, shrink_factor) = {
            let current = hierarchy.coarsest(hg);
            if current.num_nodes() <= contraction_limit {
                break;
            }
            let mut cluster = heavy_edge_clustering(
                current,
                max_cluster_weight,
                context.coarsening.rating_size_limit,
            );
            let coarse = current.contract(&mut cluster);
            let shrink_factor = current.num_nodes() as f64 / coarse.num_nodes() as f64;
            (Level { cluster, coarse }, shrink_factor)
        };
        tracing::debug!(
            nodes = level.coarse.num_nodes(),
            edges = level.coarse.num_edges(),
            shrink_factor,
            "contracted level {}",
            hierarchy.levels.len(),
        );
        hierarchy.levels.push(level);
        if shrink_factor < context.coarsening.minimum_shrink_factor {
            break;
        }
    }
    tracing::info!(
        levels = hierarchy.levels.len(),
        coarsest_nodes = hierarchy.coarsest(hg).num_nodes(),
        "coarsening done",
    );
    hierarchy
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hypergraph::HypergraphBuilder;
    use crate::Objective;

    fn grid_hypergraph(width: u32, height: u32) -> StaticHypergraph {
        let index = |x: u32, y: u32| y * width + x;
        let mut edges = Vec::new();
        for y in 0..height {
            for x in 0..width {
                if x + 1 < width {
                    edges.push((1, vec![index(x, y), index(x + 1, y)]));
                }
                if y + 1 < height {
                    edges.push((1, vec![index(x, y), index(x, y + 1)]));
                }
            }
        }
        HypergraphBuilder::new((width * height) as usize)
            .add_edges(edges)
            .build()
            .unwrap()
    }

    #[test]
    fn hierarchy_shrinks_towards_the_contraction_limit() {
        let hg = grid_hypergraph(30, 30);
        let mut context = Context::new(2, 0.1, Objective::Km1);
        context.coarsening.contraction_limit_multiplier = 20;

        let hierarchy = coarsen(&hg, &context);
        assert!(!hierarchy.levels.is_empty());

        let mut previous = hg.num_nodes();
        for level in &hierarchy.levels {
            assert!(level.coarse.num_nodes() <= previous);
            assert_eq!(level.cluster.len(), previous);
            assert_eq!(level.coarse.total_weight(), hg.total_weight());
            previous = level.coarse.num_nodes();
        }
        assert!(previous < hg.num_nodes());
    }

    #[test]
    fn small_inputs_are_left_alone() {
        let hg = grid_hypergraph(3, 3);
        let context = Context::new(2, 0.1, Objective::Km1);
        let hierarchy = coarsen(&hg, &context);
        assert!(hierarchy.levels.is_empty());
        assert_eq!(hierarchy.coarsest(&hg).num_nodes(), 9);
    }
}
