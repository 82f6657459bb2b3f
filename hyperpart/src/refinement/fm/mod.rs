//! Localized multi-try k-way FM refinement.
//!
//! Each round spawns many small searches, every one grown from a few
//! claimed boundary seeds. Searches are resumable: a scheduler keeps a
//! max-heap of `(next move gain, search)` and always continues the most
//! promising one, until a global finished-search budget runs out. Applied
//! moves land in a shared append-only tracker; on finalization every search
//! rolls back to its best prefix.

mod search;
mod shared;
mod strategy;

pub use shared::Move;
pub use shared::MoveId;
pub use shared::MoveTracker;
pub use shared::SharedFmData;
pub use strategy::GainStrategy;
pub use strategy::Km1GainCache;

use rand::seq::SliceRandom as _;
use rand::SeedableRng as _;
use rand_pcg::Pcg64;
use rayon::prelude::*;

use std::collections::BinaryHeap;
use std::sync::atomic::Ordering;
use std::sync::Mutex;
use std::time::Instant;

use self::search::FmCore;
use self::search::SearchData;
use self::search::SeedPool;
use super::deadline_passed;
use super::FmAlgorithm;
use super::Metadata;
use super::Refiner;
use crate::Context;
use crate::FmContext;
use crate::HypernodeId;
use crate::PartitionedHypergraph;

/// The multi-try FM refiner; the boundary flavor reuses the same engine
/// with one search per thread seeded by the whole boundary and a single
/// round.
#[derive(Debug)]
pub struct MultitryFmRefiner {
    algorithm: FmAlgorithm,
    config: FmContext,
    strategy: GainStrategy,
    shared: Option<SharedFmData>,
    deterministic: bool,
    rng: Pcg64,
}

impl MultitryFmRefiner {
    pub fn new(context: &Context) -> Self {
        Self {
            algorithm: context.fm.algorithm,
            config: context.fm,
            strategy: GainStrategy::new(context.objective, context.fm.gain_policy),
            shared: None,
            deterministic: context.deterministic,
            rng: Pcg64::seed_from_u64(context.seed ^ 0xf4),
        }
    }

    fn boundary_nodes(&self, phg: &PartitionedHypergraph<'_>) -> Vec<HypernodeId> {
        (0..phg.hypergraph().num_nodes() as HypernodeId)
            .into_par_iter()
            .filter(|&v| phg.is_boundary(v))
            .collect()
    }
}

impl Refiner for MultitryFmRefiner {
    fn initialize(&mut self, phg: &PartitionedHypergraph<'_>) {
        self.shared = Some(SharedFmData::new(phg.hypergraph().num_nodes()));
        self.strategy.initialize(phg);
    }

    fn refine(&mut self, phg: &PartitionedHypergraph<'_>, deadline: Option<Instant>) -> Metadata {
        let span = tracing::info_span!("fm");
        let _enter = span.enter();

        // One worker and sequential setup make a run a pure function of
        // the seed.
        let num_threads = if self.deterministic {
            1
        } else {
            rayon::current_num_threads()
        };
        let (num_searches, num_seeds, max_rounds) = match self.algorithm {
            FmAlgorithm::Boundary => (num_threads, usize::MAX, 1),
            _ => (
                num_threads * self.config.num_searches_per_thread,
                self.config.num_seeds,
                self.config.max_rounds,
            ),
        };

        let mut metadata = Metadata::default();
        for _ in 0..max_rounds {
            if deadline_passed(deadline) {
                break;
            }
            let mut boundary = self.boundary_nodes(phg);
            if boundary.is_empty() {
                break;
            }
            boundary.shuffle(&mut self.rng);
            let pool = SeedPool::new(boundary);

            let shared = self.shared.as_mut().expect("initialize must run first");
            shared.reset(num_searches.min(self.config.finished_tasks_limit_factor * num_threads));
            let shared = self.shared.as_ref().unwrap();
            let core = FmCore {
                phg,
                shared,
                strategy: &self.strategy,
                config: &self.config,
            };

            let searches: Vec<Mutex<SearchData>> = (0..num_searches)
                .map(|i| Mutex::new(SearchData::new(i as u32, phg.hypergraph().num_nodes())))
                .collect();
            if self.deterministic {
                for search in &searches {
                    let mut data = search.lock().unwrap();
                    core.setup(&mut data, &pool, num_seeds);
                }
            } else {
                searches.par_iter().for_each(|search| {
                    let mut data = search.lock().unwrap();
                    core.setup(&mut data, &pool, num_seeds);
                });
            }

            let scheduler: Mutex<BinaryHeap<(i64, usize)>> = Mutex::new(
                searches
                    .iter()
                    .enumerate()
                    .filter_map(|(i, search)| {
                        let data = search.lock().unwrap();
                        data.next_gain().map(|gain| (gain, i))
                    })
                    .collect(),
            );

            let worker = || {
                loop {
                    if deadline_passed(deadline)
                        || shared.finished_tasks.load(Ordering::Relaxed)
                            >= shared.finished_tasks_limit
                    {
                        break;
                    }
                    let Some((_, index)) = scheduler.lock().unwrap().pop() else {
                        break;
                    };
                    let mut data = searches[index].lock().unwrap();
                    match core.resume(&mut data) {
                        Some(gain) => scheduler.lock().unwrap().push((gain, index)),
                        None => {
                            shared.finished_tasks.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                }
            };
            (0..num_threads.min(num_searches))
                .into_par_iter()
                .for_each(|_| worker());

            // Budget or deadline may leave searches mid-flight; rollback
            // and tag release must still happen.
            let mut round = Metadata::default();
            for search in &searches {
                let mut data = search.lock().unwrap();
                if !data.finalized {
                    core.finalize(&mut data);
                }
                round.improvement += data.best_gain;
                round.move_count += data.kept_moves();
            }
            round.round_count = 1;
            tracing::debug!(
                improvement = round.improvement,
                moves = round.move_count,
                "fm round finished",
            );
            metadata = metadata.merge(round);
            if round.improvement <= 0 {
                break;
            }
        }
        metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hypergraph::HypergraphBuilder;
    use crate::metrics;
    use crate::Objective;
    use crate::PartitionId;

    fn refine_with(algorithm: FmAlgorithm) {
        // A ring of four heavy clusters, initially split the worst way.
        let mut builder = HypergraphBuilder::new(16);
        for c in 0..4_u32 {
            let base = 4 * c;
            builder = builder.add_edge(10, &[base, base + 1, base + 2, base + 3]);
            builder = builder.add_edge(1, &[base + 3, (base + 4) % 16]);
        }
        let hg = builder.build().unwrap();

        let mut phg = crate::PartitionedHypergraph::new(&hg, 2, 8);
        // Interleaved: every cluster is split between the blocks.
        for v in 0..16 {
            phg.set_only_part(v, (v % 2) as PartitionId);
        }
        phg.initialize_partition();
        let before = metrics::km1(&phg);

        let mut context = Context::new(2, 0.0, Objective::Km1);
        context.fm.algorithm = algorithm;
        let mut refiner = MultitryFmRefiner::new(&context);
        refiner.initialize(&phg);
        let metadata = refiner.refine(&phg, None);

        let after = metrics::km1(&phg);
        assert!(metadata.improvement > 0);
        assert!(after < before, "km1 {before} -> {after}");
        assert!(metrics::is_balanced(&phg));
        phg.check_integrity().unwrap();
    }

    #[test]
    fn multitry_improves_an_interleaved_partition() {
        refine_with(FmAlgorithm::Multitry);
    }

    #[test]
    fn boundary_flavor_improves_too() {
        refine_with(FmAlgorithm::Boundary);
    }

    #[test]
    fn no_moves_on_an_optimal_partition() {
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

        let context = Context::new(2, 0.0, Objective::Km1);
        let mut refiner = MultitryFmRefiner::new(&context);
        refiner.initialize(&phg);
        let metadata = refiner.refine(&phg, None);

        assert_eq!(metadata.improvement, 0);
        assert_eq!(metrics::km1(&phg), 0);
    }
}
