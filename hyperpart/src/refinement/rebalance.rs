use std::sync::atomic::AtomicI64;
use std::sync::atomic::Ordering;

use crate::HypernodeId;
use crate::Objective;
use crate::PartitionedHypergraph;

/// Repair a partition whose block weights exceed the maximum block weight.
///
/// The flow scheduler's optimistic weight acquisition may overshoot the
/// balance tolerance; this pass walks the overweight blocks, heaviest
/// first, and moves out the vertices whose eviction costs the least
/// objective, into the lightest block that can take them. Sequential and
/// deterministic. Returns the number of vertices moved.
pub fn rebalance(phg: &PartitionedHypergraph<'_>, objective: Objective) -> usize {
    let hg = phg.hypergraph();
    let n = hg.num_nodes();
    let mut moved = 0;

    for _ in 0..2 * n {
        let Some(from) = (0..phg.k())
            .filter(|&b| phg.part_weight(b) > phg.max_part_weight())
            .max_by_key(|&b| phg.part_weight(b))
        else {
            break;
        };

        let mut best: Option<(i64, HypernodeId, i32)> = None;
        for v in 0..n as HypernodeId {
            if phg.part_of(v) != from {
                continue;
            }
            let weight = hg.node_weight(v);
            let to = (0..phg.k())
                .filter(|&b| b != from && phg.part_weight(b) + weight <= phg.max_part_weight())
                .min_by_key(|&b| phg.part_weight(b));
            let Some(to) = to else { continue };
            let gain = match objective {
                Objective::Cut => phg.cut_gain(v, from, to),
                Objective::Km1 => phg.km1_gain(v, from, to),
            };
            if best.is_none_or(|(g, _, _)| gain > g) {
                best = Some((gain, v, to));
            }
        }

        // No vertex of the overweight block fits anywhere else.
        let Some((_, v, to)) = best else { break };
        if phg.change_part(v, from, to, |_| {}) {
            moved += 1;
        } else {
            break;
        }
    }

    if moved > 0 {
        tracing::debug!(moved, "rebalanced partition");
    }
    moved
}

/// An accumulator for objective deltas observed through the move hook; the
/// flow tasks use it to judge a tentative move sequence.
#[derive(Debug, Default)]
pub(crate) struct GainAccumulator {
    km1: AtomicI64,
    cut: AtomicI64,
}

impl GainAccumulator {
    pub(crate) fn record(&self, update: &crate::hypergraph::SyncUpdate) {
        // Connectivity delta: `from` lost its last pin and/or `to` gained
        // its first.
        let mut km1 = 0;
        if update.pin_count_in_from_after == 0 {
            km1 += update.edge_weight;
        }
        if update.pin_count_in_to_after == 1 {
            km1 -= update.edge_weight;
        }
        self.km1.fetch_add(km1, Ordering::Relaxed);

        let size = update.edge_size;
        if size > 1 {
            if update.pin_count_in_to_after == size {
                // Edge became uncut.
                self.cut.fetch_add(update.edge_weight, Ordering::Relaxed);
            }
            if update.pin_count_in_from_after == size - 1 {
                // Edge was uncut before the move.
                self.cut.fetch_sub(update.edge_weight, Ordering::Relaxed);
            }
        }
    }

    pub(crate) fn gain(&self, objective: Objective) -> i64 {
        match objective {
            Objective::Cut => self.cut.load(Ordering::Relaxed),
            Objective::Km1 => self.km1.load(Ordering::Relaxed),
        }
    }
}
