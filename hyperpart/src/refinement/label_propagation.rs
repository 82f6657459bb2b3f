use rayon::prelude::*;

use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicI64;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Instant;

use super::best_target;
use super::deadline_passed;
use super::Metadata;
use super::Refiner;
use crate::Context;
use crate::HypernodeId;
use crate::Objective;
use crate::PartitionedHypergraph;

/// Parallel label propagation over boundary vertices.
///
/// Each round sweeps the vertices in parallel chunks; a vertex on the cut
/// is locked with a CAS, moved to its best positive-gain target if the
/// balance allows, and unlocked. Rounds repeat until nothing moves or the
/// configured round limit is hit.
#[derive(Debug)]
pub struct LabelPropagationRefiner {
    objective: Objective,
    max_rounds: usize,
    deterministic: bool,
    locks: Vec<AtomicBool>,
}

impl LabelPropagationRefiner {
    pub fn new(objective: Objective, context: &Context) -> Self {
        Self {
            objective,
            max_rounds: context.lp.max_rounds,
            deterministic: context.deterministic,
            locks: Vec::new(),
        }
    }
}

impl Refiner for LabelPropagationRefiner {
    fn initialize(&mut self, phg: &PartitionedHypergraph<'_>) {
        self.locks = (0..phg.hypergraph().num_nodes())
            .map(|_| AtomicBool::new(false))
            .collect();
    }

    fn refine(&mut self, phg: &PartitionedHypergraph<'_>, deadline: Option<Instant>) -> Metadata {
        let span = tracing::info_span!("label propagation");
        let _enter = span.enter();

        let mut metadata = Metadata::default();
        for _ in 0..self.max_rounds {
            if deadline_passed(deadline) {
                break;
            }
            metadata.round_count += 1;

            let round_gain = AtomicI64::new(0);
            let round_moves = AtomicUsize::new(0);
            let visit = |v: HypernodeId| {
                if !phg.is_boundary(v) {
                    return;
                }
                if self.locks[v as usize]
                    .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
                    .is_err()
                {
                    return;
                }
                let from = phg.part_of(v);
                if let Some((to, gain)) = best_target(phg, self.objective, v) {
                    if gain > 0 && phg.change_part(v, from, to, |_| {}) {
                        round_gain.fetch_add(gain, Ordering::Relaxed);
                        round_moves.fetch_add(1, Ordering::Relaxed);
                    }
                }
                self.locks[v as usize].store(false, Ordering::Release);
            };
            let vertices = 0..phg.hypergraph().num_nodes() as HypernodeId;
            if self.deterministic {
                vertices.for_each(visit);
            } else {
                vertices.into_par_iter().for_each(visit);
            }

            let moves = round_moves.load(Ordering::Relaxed);
            metadata.improvement += round_gain.load(Ordering::Relaxed);
            metadata.move_count += moves;
            if moves == 0 {
                break;
            }
        }
        tracing::debug!(
            improvement = metadata.improvement,
            moves = metadata.move_count,
            "label propagation done",
        );
        metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hypergraph::HypergraphBuilder;
    use crate::metrics;
    use crate::PartitionId;

    #[test]
    fn heals_an_obviously_bad_assignment() {
        // Two cliques bridged by one light edge; vertex 3 starts on the
        // wrong side.
        let hg = HypergraphBuilder::new(8)
            .add_edge(5, &[0, 1, 2, 3])
            .add_edge(5, &[4, 5, 6, 7])
            .add_edge(1, &[3, 4])
            .build()
            .unwrap();
        let mut phg = crate::PartitionedHypergraph::new(&hg, 2, 5);
        for (v, block) in [0, 0, 0, 1, 1, 1, 1, 0].into_iter().enumerate() {
            phg.set_only_part(v as HypernodeId, block as PartitionId);
        }
        phg.initialize_partition();
        let before = metrics::km1(&phg);

        let context = Context::new(2, 0.0, Objective::Km1);
        let mut refiner = LabelPropagationRefiner::new(Objective::Km1, &context);
        refiner.initialize(&phg);
        let metadata = refiner.refine(&phg, None);

        assert!(metadata.improvement > 0);
        assert_eq!(metrics::km1(&phg), before - metadata.improvement);
        assert_eq!(metrics::km1(&phg), 1);
        phg.check_integrity().unwrap();
    }

    #[test]
    fn never_worsens_the_partition() {
        let hg = HypergraphBuilder::new(6)
            .add_edge(1, &[0, 1, 2])
            .add_edge(1, &[3, 4, 5])
            .add_edge(2, &[2, 3])
            .build()
            .unwrap();
        let mut phg = crate::PartitionedHypergraph::new(&hg, 2, 3);
        for v in 0..6 {
            phg.set_only_part(v, i32::from(v >= 3));
        }
        phg.initialize_partition();
        let before = metrics::km1(&phg);

        let context = Context::new(2, 0.0, Objective::Km1);
        let mut refiner = LabelPropagationRefiner::new(Objective::Km1, &context);
        refiner.initialize(&phg);
        let metadata = refiner.refine(&phg, None);

        assert!(metrics::km1(&phg) <= before);
        assert_eq!(metadata.improvement, before - metrics::km1(&phg));
    }
}
