//! Parallel coarsening: collapse a cluster assignment into a smaller
//! hypergraph, merging identical nets and dropping single-pin nets.

use rayon::prelude::*;

use std::sync::atomic::AtomicI64;
use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering;

use super::sort_windows;
use super::Hyperedge;
use super::Hypernode;
use super::StaticHypergraph;
use crate::as_atomic_u32;
use crate::as_atomic_usize;
use crate::bitset::ScratchBitmap;
use crate::prefix_sum::parallel_prefix_sum;
use crate::HyperedgeId;
use crate::HypernodeId;
use crate::INVALID_HYPERNODE;

const EDGE_HASH_SEED: u64 = 31;

/// Fingerprint of a contracted hyperedge, used to detect identical nets.
/// Ordered by `(hash, size, he)` so that identical candidates form
/// contiguous runs after sorting.
#[derive(Debug, Clone, Copy)]
struct ContractedEdgeInfo {
    he: HyperedgeId,
    hash: u64,
    size: u32,
    valid: bool,
}

impl StaticHypergraph {
    /// Contract all vertices with the same cluster id into a single coarse
    /// vertex.
    ///
    /// `cluster` holds one arbitrary non-negative id per fine vertex
    /// (entries of disabled vertices are ignored). On return it has been
    /// rewritten in place so that each fine vertex carries the id of its
    /// coarse vertex in `0..coarse.num_nodes()`, or [`INVALID_HYPERNODE`]
    /// for disabled vertices.
    ///
    /// Hyperedges whose pins collapse into a single coarse vertex are
    /// removed; groups of hyperedges with identical coarse pin sets are
    /// merged into one with their summed weight. The total vertex weight is
    /// preserved.
    ///
    /// # Panics
    ///
    /// Panics if no coarse vertex survives, which indicates a caller bug.
    pub fn contract(&self, cluster: &mut Vec<HypernodeId>) -> StaticHypergraph {
        let n = self.num_nodes();
        let m = self.num_edges();
        assert_eq!(cluster.len(), n);

        // Compactify cluster ids: mark, prefix-sum, rewrite.
        let max_cluster = cluster
            .par_iter()
            .zip(&self.hypernodes)
            .filter(|(_, hn)| hn.enabled)
            .map(|(&c, _)| c)
            .max()
            .expect("contraction of a hypergraph without enabled vertices");
        let mut mapping = vec![0_usize; max_cluster as usize + 1];
        {
            let mapping = as_atomic_usize(&mut mapping);
            cluster
                .par_iter()
                .zip(&self.hypernodes)
                .filter(|(_, hn)| hn.enabled)
                .for_each(|(&c, _)| mapping[c as usize].store(1, Ordering::Relaxed));
        }
        let num_coarse_nodes = parallel_prefix_sum(&mut mapping);
        assert!(num_coarse_nodes > 0);
        cluster
            .par_iter_mut()
            .zip(&self.hypernodes)
            .for_each(|(c, hn)| {
                *c = if hn.enabled {
                    mapping[*c as usize] as HypernodeId
                } else {
                    INVALID_HYPERNODE
                };
            });

        // Coarse pin lists, deduplicated per edge through a set-then-reset
        // bitmap (first-seen order; no sorting involved), and fingerprints.
        let mut coarse_pin_lists: Vec<Vec<HypernodeId>> = vec![Vec::new(); m];
        let mut infos: Vec<ContractedEdgeInfo> = vec![
            ContractedEdgeInfo {
                he: 0,
                hash: u64::MAX,
                size: 0,
                valid: false,
            };
            m
        ];
        coarse_pin_lists
            .par_iter_mut()
            .zip(infos.par_iter_mut())
            .enumerate()
            .for_each_init(
                || ScratchBitmap::new(num_coarse_nodes),
                |seen, (he, (pins, info))| {
                    let he = he as HyperedgeId;
                    if self.is_edge_enabled(he) {
                        for &pin in self.pins(he) {
                            let cv = cluster[pin as usize];
                            if cv != INVALID_HYPERNODE && !seen.contains(cv) {
                                seen.set(cv);
                                pins.push(cv);
                            }
                        }
                        seen.reset_all(pins.iter());
                    }
                    if pins.len() > 1 {
                        let mut hash = EDGE_HASH_SEED;
                        for &cv in pins.iter() {
                            hash = hash.wrapping_add((cv as u64).wrapping_mul(cv as u64));
                        }
                        *info = ContractedEdgeInfo {
                            he,
                            hash,
                            size: pins.len() as u32,
                            valid: true,
                        };
                    } else {
                        // Single-pin (or pinless) net: removed.
                        pins.clear();
                        info.he = he;
                    }
                },
            );

        // Identical-net detection: sort fingerprints, then process each
        // equal-hash run. A candidate whose pin set is contained in the
        // representative's (same size) is merged into it.
        infos.par_sort_unstable_by_key(|info| (info.hash, info.size, info.he));

        let merged_weights: Vec<AtomicI64> = (0..m).map(|_| AtomicI64::new(0)).collect();
        infos
            .par_chunk_by_mut(|a, b| a.hash == b.hash)
            .for_each_init(
                || ScratchBitmap::new(num_coarse_nodes),
                |seen, run| {
                    for i in 0..run.len() {
                        if !run[i].valid {
                            continue;
                        }
                        let rep = run[i];
                        let rep_pins = &coarse_pin_lists[rep.he as usize];
                        for &cv in rep_pins {
                            seen.set(cv);
                        }
                        let mut weight = self.edge_weight(rep.he);
                        for candidate in run[i + 1..].iter_mut() {
                            if candidate.valid
                                && candidate.size == rep.size
                                && coarse_pin_lists[candidate.he as usize]
                                    .iter()
                                    .all(|&cv| seen.contains(cv))
                            {
                                candidate.valid = false;
                                weight += self.edge_weight(candidate.he);
                            }
                        }
                        merged_weights[rep.he as usize].store(weight, Ordering::Relaxed);
                        seen.reset_all(rep_pins);
                    }
                },
            );

        // Assign coarse edge ids and pin offsets to the survivors.
        let mut survived = vec![0_usize; m];
        {
            let survived = as_atomic_usize(&mut survived);
            infos.par_iter().for_each(|info| {
                if info.valid {
                    survived[info.he as usize].store(1, Ordering::Relaxed);
                }
            });
        }
        let mut edge_ids = survived.clone();
        let num_coarse_edges = parallel_prefix_sum(&mut edge_ids);
        let mut pin_offsets: Vec<usize> = survived
            .par_iter()
            .zip(&coarse_pin_lists)
            .map(|(&s, pins)| s * pins.len())
            .collect();
        let num_coarse_pins = parallel_prefix_sum(&mut pin_offsets);

        let mut fine_of_coarse = vec![0 as HyperedgeId; num_coarse_edges];
        {
            let fine_of_coarse = as_atomic_u32(&mut fine_of_coarse);
            survived.par_iter().enumerate().for_each(|(he, &s)| {
                if s == 1 {
                    fine_of_coarse[edge_ids[he]].store(he as HyperedgeId, Ordering::Relaxed);
                }
            });
        }

        // Emit coarse edges.
        let mut incidence = vec![0 as HypernodeId; num_coarse_pins];
        {
            let incidence = as_atomic_u32(&mut incidence);
            survived.par_iter().enumerate().for_each(|(he, &s)| {
                if s == 1 {
                    let begin = pin_offsets[he];
                    for (slot, &cv) in coarse_pin_lists[he].iter().enumerate() {
                        incidence[begin + slot].store(cv, Ordering::Relaxed);
                    }
                }
            });
        }
        let hyperedges: Vec<Hyperedge> = fine_of_coarse
            .par_iter()
            .map(|&he| Hyperedge {
                begin: pin_offsets[he as usize],
                size: coarse_pin_lists[he as usize].len() as u32,
                weight: merged_weights[he as usize].load(Ordering::Relaxed),
                enabled: true,
            })
            .collect();

        // Emit coarse vertices: degrees, offsets, incident-net scatter.
        let degrees: Vec<AtomicU32> = (0..num_coarse_nodes).map(|_| AtomicU32::new(0)).collect();
        hyperedges.par_iter().for_each(|he| {
            for slot in he.begin..he.begin + he.size as usize {
                degrees[incidence[slot] as usize].fetch_add(1, Ordering::Relaxed);
            }
        });
        let mut first_incident: Vec<usize> = degrees
            .iter()
            .map(|d| d.load(Ordering::Relaxed) as usize)
            .collect();
        let total_degree = parallel_prefix_sum(&mut first_incident);
        debug_assert_eq!(total_degree, num_coarse_pins);

        let mut incident_nets = vec![0 as HyperedgeId; total_degree];
        {
            let nets = as_atomic_u32(&mut incident_nets);
            let mut cursors = first_incident.clone();
            let cursors = as_atomic_usize(&mut cursors);
            hyperedges.par_iter().enumerate().for_each(|(ce, he)| {
                for slot in he.begin..he.begin + he.size as usize {
                    let cv = incidence[slot] as usize;
                    let pos = cursors[cv].fetch_add(1, Ordering::Relaxed);
                    nets[pos].store(ce as HyperedgeId, Ordering::Relaxed);
                }
            });
        }
        sort_windows(
            &mut incident_nets,
            degrees.iter().map(|d| d.load(Ordering::Relaxed) as usize),
        );

        // Aggregate vertex weights and communities onto the coarse ids. No
        // vertex weight is lost, so the total carries over.
        let weights: Vec<AtomicI64> = (0..num_coarse_nodes).map(|_| AtomicI64::new(0)).collect();
        let communities: Vec<AtomicU32> = (0..num_coarse_nodes).map(|_| AtomicU32::new(0)).collect();
        cluster
            .par_iter()
            .enumerate()
            .filter(|&(_, &c)| c != INVALID_HYPERNODE)
            .for_each(|(v, &c)| {
                let v = v as HypernodeId;
                weights[c as usize].fetch_add(self.node_weight(v), Ordering::Relaxed);
                communities[c as usize].store(self.community_of(v), Ordering::Relaxed);
            });

        let hypernodes: Vec<Hypernode> = first_incident
            .par_iter()
            .enumerate()
            .map(|(u, &begin)| Hypernode {
                begin,
                degree: degrees[u].load(Ordering::Relaxed),
                weight: weights[u].load(Ordering::Relaxed),
                community: communities[u].load(Ordering::Relaxed),
                enabled: true,
            })
            .collect();

        let max_edge_size = hyperedges.par_iter().map(|he| he.size).max().unwrap_or(0);

        StaticHypergraph {
            hypernodes,
            incident_nets,
            hyperedges,
            incidence,
            num_pins: num_coarse_pins,
            total_weight: self.total_weight,
            max_edge_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hypergraph::HypergraphBuilder;

    fn sorted_pins(hg: &StaticHypergraph, e: HyperedgeId) -> Vec<HypernodeId> {
        let mut pins = hg.pins(e).to_vec();
        pins.sort_unstable();
        pins
    }

    #[test]
    fn identity_cluster_round_trips() {
        let hg = HypergraphBuilder::new(5)
            .add_edge(2, &[0, 1, 2])
            .add_edge(3, &[1, 3])
            .add_edge(1, &[2, 3, 4])
            .build()
            .unwrap();
        let mut cluster: Vec<HypernodeId> = (0..5).collect();
        let coarse = hg.contract(&mut cluster);

        assert_eq!(coarse.num_nodes(), 5);
        assert_eq!(coarse.num_edges(), 3);
        assert_eq!(coarse.num_pins(), 8);
        assert_eq!(coarse.total_weight(), hg.total_weight());
        assert_eq!(coarse.max_edge_size(), 3);

        // Same weights and pin multisets, up to within-edge order and edge
        // renumbering.
        let mut fine: Vec<_> = (0..3)
            .map(|e| (sorted_pins(&hg, e), hg.edge_weight(e)))
            .collect();
        let mut contracted: Vec<_> = (0..3)
            .map(|e| (sorted_pins(&coarse, e), coarse.edge_weight(e)))
            .collect();
        fine.sort();
        contracted.sort();
        assert_eq!(fine, contracted);
    }

    #[test]
    fn pairwise_cluster_keeps_cross_cluster_edges() {
        // 8 vertices clustered pairwise; a path of 2-pin edges between
        // consecutive vertices.
        let hg = HypergraphBuilder::new(8)
            .add_edges((0..7).map(|v| (1, vec![v, v + 1])))
            .build()
            .unwrap();
        let mut cluster: Vec<HypernodeId> = vec![0, 0, 1, 1, 2, 2, 3, 3];
        let coarse = hg.contract(&mut cluster);

        assert_eq!(coarse.num_nodes(), 4);
        assert_eq!(cluster, vec![0, 0, 1, 1, 2, 2, 3, 3]);
        // The three inter-pair edges survive; intra-pair ones collapse.
        assert_eq!(coarse.num_edges(), 3);
        let mut edges: Vec<_> = (0..3).map(|e| sorted_pins(&coarse, e)).collect();
        edges.sort();
        assert_eq!(edges, vec![vec![0, 1], vec![1, 2], vec![2, 3]]);
        assert!((0..4).all(|u| coarse.node_weight(u) == 2));
        assert_eq!(coarse.total_weight(), 8);
    }

    #[test]
    fn identical_nets_merge_with_summed_weights() {
        let hg = HypergraphBuilder::new(4)
            .add_edge(1, &[0, 1, 2])
            .add_edge(2, &[0, 1, 2])
            .add_edge(3, &[2, 1, 0])
            .add_edge(7, &[1, 3])
            .build()
            .unwrap();
        let mut cluster: Vec<HypernodeId> = (0..4).collect();
        let coarse = hg.contract(&mut cluster);

        assert_eq!(coarse.num_edges(), 2);
        let mut edges: Vec<_> = (0..2)
            .map(|e| (sorted_pins(&coarse, e), coarse.edge_weight(e)))
            .collect();
        edges.sort();
        assert_eq!(edges, vec![(vec![0, 1, 2], 6), (vec![1, 3], 7)]);
    }

    #[test]
    fn single_pin_nets_are_removed() {
        let hg = HypergraphBuilder::new(4)
            .add_edge(1, &[0, 1])
            .add_edge(1, &[2, 3])
            .add_edge(5, &[0, 1, 2, 3])
            .build()
            .unwrap();
        // Merge {0,1} and {2,3}; their 2-pin nets become single-pin.
        let mut cluster: Vec<HypernodeId> = vec![0, 0, 1, 1];
        let coarse = hg.contract(&mut cluster);

        assert_eq!(coarse.num_nodes(), 2);
        assert_eq!(coarse.num_edges(), 1);
        assert_eq!(sorted_pins(&coarse, 0), vec![0, 1]);
        assert_eq!(coarse.edge_weight(0), 5);
        assert_eq!(coarse.node_weight(0), 2);
    }

    #[test]
    fn contraction_is_deterministic() {
        let hg = HypergraphBuilder::new(100)
            .add_edges((0..200).map(|e| {
                let pins: Vec<HypernodeId> =
                    (0..4).map(|i| (e * 17 + i * 31) % 100).collect();
                (1 + (e % 3) as i64, pins)
            }))
            .build()
            .unwrap();
        let cluster_of = |v: HypernodeId| v / 3;

        let mut cluster_a: Vec<HypernodeId> = (0..100).map(cluster_of).collect();
        let mut cluster_b = cluster_a.clone();
        let a = hg.contract(&mut cluster_a);
        let b = hg.contract(&mut cluster_b);

        assert_eq!(cluster_a, cluster_b);
        assert_eq!(a.num_nodes(), b.num_nodes());
        assert_eq!(a.num_edges(), b.num_edges());
        assert_eq!(a.incidence, b.incidence);
        assert_eq!(a.incident_nets, b.incident_nets);
    }
}
