use rayon::prelude::*;

use std::sync::atomic::AtomicI64;
use std::sync::atomic::Ordering;

use crate::hypergraph::SyncUpdate;
use crate::refinement::best_target;
use crate::refinement::FmGainPolicy;
use crate::HypernodeId;
use crate::Objective;
use crate::PartitionId;
use crate::PartitionedHypergraph;

/// Global km1 gain cache.
///
/// For every vertex `v`, `benefit[v]` is the weight of incident edges whose
/// only pin in `part(v)` is `v` itself, and `penalty[v * k + to]` is the
/// weight of incident edges with no pin in `to`; the km1 gain of moving `v`
/// to `to` is their difference. Both arrays are maintained through the
/// per-edge move hook, except the moved vertex's own benefit, which changes
/// wholesale with its block and is recomputed after the move.
#[derive(Debug, Default)]
pub struct Km1GainCache {
    k: usize,
    benefit: Vec<AtomicI64>,
    penalty: Vec<AtomicI64>,
}

impl Km1GainCache {
    pub fn initialize(&mut self, phg: &PartitionedHypergraph<'_>) {
        let hg = phg.hypergraph();
        let n = hg.num_nodes();
        let k = phg.k() as usize;
        self.k = k;
        self.benefit = (0..n).map(|_| AtomicI64::new(0)).collect();
        self.penalty = (0..n * k).map(|_| AtomicI64::new(0)).collect();

        (0..n as HypernodeId).into_par_iter().for_each(|v| {
            let own = phg.part_of(v);
            let mut benefit = 0;
            for &he in hg.incident_edges(v) {
                let weight = hg.edge_weight(he);
                if phg.pin_count(he, own) == 1 {
                    benefit += weight;
                }
                for to in 0..k as PartitionId {
                    if phg.pin_count(he, to) == 0 {
                        self.penalty[v as usize * k + to as usize]
                            .fetch_add(weight, Ordering::Relaxed);
                    }
                }
            }
            self.benefit[v as usize].store(benefit, Ordering::Relaxed);
        });
    }

    #[inline]
    pub fn gain(&self, v: HypernodeId, to: PartitionId) -> i64 {
        self.benefit[v as usize].load(Ordering::Relaxed)
            - self.penalty[v as usize * self.k + to as usize].load(Ordering::Relaxed)
    }

    /// Per-edge delta maintenance, fed by the hook of `change_part`.
    pub fn record(&self, phg: &PartitionedHypergraph<'_>, update: &SyncUpdate) {
        let hg = phg.hypergraph();
        let w = update.edge_weight;

        if update.pin_count_in_from_after == 0 {
            // `from` lost its last pin of this edge.
            for &p in hg.pins(update.he) {
                self.penalty[p as usize * self.k + update.from as usize]
                    .fetch_add(w, Ordering::Relaxed);
            }
        }
        if update.pin_count_in_from_after == 1 {
            // The remaining pin in `from` now benefits from leaving.
            for &p in hg.pins(update.he) {
                if phg.part_of(p) == update.from {
                    self.benefit[p as usize].fetch_add(w, Ordering::Relaxed);
                }
            }
        }
        if update.pin_count_in_to_after == 1 {
            // `to` saw its first pin of this edge.
            for &p in hg.pins(update.he) {
                self.penalty[p as usize * self.k + update.to as usize]
                    .fetch_sub(w, Ordering::Relaxed);
            }
        }
        if update.pin_count_in_to_after == 2 {
            // The pin that used to be alone in `to` no longer is.
            for &p in hg.pins(update.he) {
                if phg.part_of(p) == update.to {
                    self.benefit[p as usize].fetch_sub(w, Ordering::Relaxed);
                }
            }
        }
    }

    /// Recompute the moved vertex's own benefit from scratch.
    pub fn recompute_benefit(&self, phg: &PartitionedHypergraph<'_>, v: HypernodeId) {
        let hg = phg.hypergraph();
        let own = phg.part_of(v);
        let mut benefit = 0;
        for &he in hg.incident_edges(v) {
            if phg.pin_count(he, own) == 1 {
                benefit += hg.edge_weight(he);
            }
        }
        self.benefit[v as usize].store(benefit, Ordering::Relaxed);
    }
}

/// The gain strategy a search round runs with: either exact recomputation
/// from pin counts at pop time, or the global km1 cache. The cache only
/// models km1; for the cut objective the strategy falls back to
/// recomputation.
#[derive(Debug)]
pub struct GainStrategy {
    objective: Objective,
    cache: Option<Km1GainCache>,
}

impl GainStrategy {
    pub fn new(objective: Objective, policy: FmGainPolicy) -> Self {
        let cache = match (policy, objective) {
            (FmGainPolicy::Cache, Objective::Km1) => Some(Km1GainCache::default()),
            _ => None,
        };
        Self { objective, cache }
    }

    pub fn initialize(&mut self, phg: &PartitionedHypergraph<'_>) {
        if let Some(cache) = &mut self.cache {
            cache.initialize(phg);
        }
    }

    /// Best feasible move for `v`, ties to the lighter block.
    pub fn best_target(
        &self,
        phg: &PartitionedHypergraph<'_>,
        v: HypernodeId,
    ) -> Option<(PartitionId, i64)> {
        let Some(cache) = &self.cache else {
            return best_target(phg, self.objective, v);
        };
        let from = phg.part_of(v);
        let weight = phg.hypergraph().node_weight(v);
        let mut best: Option<(PartitionId, i64)> = None;
        for to in 0..phg.k() {
            if to == from || phg.part_weight(to) + weight > phg.max_part_weight() {
                continue;
            }
            let gain = cache.gain(v, to);
            let better = match best {
                None => true,
                Some((current, best_gain)) => {
                    gain > best_gain
                        || (gain == best_gain && phg.part_weight(to) < phg.part_weight(current))
                }
            };
            if better {
                best = Some((to, gain));
            }
        }
        best
    }

    #[inline]
    pub fn record(&self, phg: &PartitionedHypergraph<'_>, update: &SyncUpdate) {
        if let Some(cache) = &self.cache {
            cache.record(phg, update);
        }
    }

    #[inline]
    pub fn after_move(&self, phg: &PartitionedHypergraph<'_>, v: HypernodeId) {
        if let Some(cache) = &self.cache {
            cache.recompute_benefit(phg, v);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hypergraph::HypergraphBuilder;

    fn assert_cache_is_exact(phg: &PartitionedHypergraph<'_>, cache: &Km1GainCache) {
        for v in 0..phg.hypergraph().num_nodes() as HypernodeId {
            let from = phg.part_of(v);
            for to in 0..phg.k() {
                if to == from {
                    continue;
                }
                assert_eq!(
                    cache.gain(v, to),
                    phg.km1_gain(v, from, to),
                    "cached gain of moving {v} from {from} to {to}"
                );
            }
        }
    }

    #[test]
    fn cache_matches_direct_gains_through_moves() {
        let hg = HypergraphBuilder::new(8)
            .add_edge(3, &[0, 1, 2, 3])
            .add_edge(1, &[2, 4])
            .add_edge(2, &[4, 5, 6])
            .add_edge(1, &[6, 7])
            .add_edge(5, &[0, 7])
            .build()
            .unwrap();
        let mut phg = crate::PartitionedHypergraph::new(&hg, 3, 4);
        for v in 0..8 {
            phg.set_only_part(v, (v % 3) as PartitionId);
        }
        phg.initialize_partition();

        let mut cache = Km1GainCache::default();
        cache.initialize(&phg);
        assert_cache_is_exact(&phg, &cache);

        // A few moves, each funneled through the hook, keep it exact.
        for (v, to) in [(2_u32, 1), (4, 0), (7, 2), (2, 0)] {
            let from = phg.part_of(v);
            if from == to {
                continue;
            }
            phg.change_part_unchecked(v, from, to, |update| cache.record(&phg, &update));
            cache.recompute_benefit(&phg, v);
            assert_cache_is_exact(&phg, &cache);
        }
    }
}
