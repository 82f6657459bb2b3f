//! Hypergraph storage: immutable CSR-like pin and incidence arrays, the
//! parallel contraction operator, and the concurrent partitioned overlay.

mod connectivity;
mod contraction;
mod partitioned;

pub use connectivity::ConnectivitySetIter;
pub use connectivity::ConnectivitySets;
pub use partitioned::PartitionedHypergraph;
pub use partitioned::SyncUpdate;

use rayon::prelude::*;

use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering;

use crate::as_atomic_u32;
use crate::as_atomic_usize;
use crate::bitset::ScratchBitmap;
use crate::prefix_sum::parallel_prefix_sum;
use crate::Error;
use crate::HyperedgeId;
use crate::HyperedgeWeight;
use crate::HypernodeId;
use crate::HypernodeWeight;

#[derive(Debug, Clone, Copy)]
pub(crate) struct Hypernode {
    pub(crate) begin: usize,
    pub(crate) degree: u32,
    pub(crate) weight: HypernodeWeight,
    pub(crate) community: u32,
    pub(crate) enabled: bool,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct Hyperedge {
    pub(crate) begin: usize,
    pub(crate) size: u32,
    pub(crate) weight: HyperedgeWeight,
    pub(crate) enabled: bool,
}

/// An immutable hypergraph in compact adjacency-array form.
///
/// Vertices and hyperedges are dense `u32` indices. For each vertex, the ids
/// of its incident nets occupy a window of `incident_nets`, sorted
/// ascending; for each hyperedge, its pins occupy a window of `incidence`.
/// The two arrays are adjoint: vertex `v` appears in the window of edge `e`
/// exactly when `e` appears in the window of `v`.
///
/// Instances are produced by [`HypergraphBuilder`] or by
/// [`contract`][StaticHypergraph::contract] and never mutated afterwards.
#[derive(Debug, Default)]
pub struct StaticHypergraph {
    pub(crate) hypernodes: Vec<Hypernode>,
    pub(crate) incident_nets: Vec<HyperedgeId>,
    pub(crate) hyperedges: Vec<Hyperedge>,
    pub(crate) incidence: Vec<HypernodeId>,
    pub(crate) num_pins: usize,
    pub(crate) total_weight: HypernodeWeight,
    pub(crate) max_edge_size: u32,
}

impl StaticHypergraph {
    #[inline]
    pub fn num_nodes(&self) -> usize {
        self.hypernodes.len()
    }

    #[inline]
    pub fn num_edges(&self) -> usize {
        self.hyperedges.len()
    }

    #[inline]
    pub fn num_pins(&self) -> usize {
        self.num_pins
    }

    #[inline]
    pub fn total_weight(&self) -> HypernodeWeight {
        self.total_weight
    }

    /// Size of the largest enabled hyperedge.
    #[inline]
    pub fn max_edge_size(&self) -> u32 {
        self.max_edge_size
    }

    #[inline]
    pub fn node_weight(&self, v: HypernodeId) -> HypernodeWeight {
        self.hypernodes[v as usize].weight
    }

    #[inline]
    pub fn node_degree(&self, v: HypernodeId) -> u32 {
        self.hypernodes[v as usize].degree
    }

    #[inline]
    pub fn is_node_enabled(&self, v: HypernodeId) -> bool {
        self.hypernodes[v as usize].enabled
    }

    #[inline]
    pub fn community_of(&self, v: HypernodeId) -> u32 {
        self.hypernodes[v as usize].community
    }

    /// Attach a community structure; one entry per vertex.
    pub fn set_communities(&mut self, communities: &[u32]) {
        assert_eq!(communities.len(), self.num_nodes());
        self.hypernodes
            .par_iter_mut()
            .zip(communities)
            .for_each(|(hn, &c)| hn.community = c);
    }

    /// The ids of the nets incident to `v`, sorted ascending.
    #[inline]
    pub fn incident_edges(&self, v: HypernodeId) -> &[HyperedgeId] {
        let hn = &self.hypernodes[v as usize];
        &self.incident_nets[hn.begin..hn.begin + hn.degree as usize]
    }

    #[inline]
    pub fn edge_weight(&self, e: HyperedgeId) -> HyperedgeWeight {
        self.hyperedges[e as usize].weight
    }

    #[inline]
    pub fn edge_size(&self, e: HyperedgeId) -> u32 {
        self.hyperedges[e as usize].size
    }

    #[inline]
    pub fn is_edge_enabled(&self, e: HyperedgeId) -> bool {
        self.hyperedges[e as usize].enabled
    }

    /// The pins of `e`.
    #[inline]
    pub fn pins(&self, e: HyperedgeId) -> &[HypernodeId] {
        let he = &self.hyperedges[e as usize];
        &self.incidence[he.begin..he.begin + he.size as usize]
    }

    /// Iterator over all enabled vertex ids.
    pub fn nodes(&self) -> impl Iterator<Item = HypernodeId> + '_ {
        (0..self.num_nodes() as HypernodeId).filter(move |&v| self.is_node_enabled(v))
    }

    /// Iterator over all enabled hyperedge ids.
    pub fn edges(&self) -> impl Iterator<Item = HyperedgeId> + '_ {
        (0..self.num_edges() as HyperedgeId).filter(move |&e| self.is_edge_enabled(e))
    }
}

/// Builds a [`StaticHypergraph`] from an edge-pin list.
///
/// # Example
///
/// ```rust
/// use hyperpart::hypergraph::HypergraphBuilder;
///
/// let hg = HypergraphBuilder::new(4)
///     .add_edge(1, &[0, 1])
///     .add_edge(2, &[1, 2, 3])
///     .build()
///     .unwrap();
///
/// assert_eq!(hg.num_nodes(), 4);
/// assert_eq!(hg.num_pins(), 5);
/// assert_eq!(hg.incident_edges(1), &[0, 1]);
/// ```
#[derive(Debug)]
pub struct HypergraphBuilder {
    num_nodes: usize,
    edge_weights: Vec<HyperedgeWeight>,
    pin_lists: Vec<Vec<HypernodeId>>,
    node_weights: Option<Vec<HypernodeWeight>>,
    stable: bool,
}

impl HypergraphBuilder {
    pub fn new(num_nodes: usize) -> Self {
        Self {
            num_nodes,
            edge_weights: Vec::new(),
            pin_lists: Vec::new(),
            node_weights: None,
            stable: true,
        }
    }

    pub fn add_edge(mut self, weight: HyperedgeWeight, pins: &[HypernodeId]) -> Self {
        self.edge_weights.push(weight);
        self.pin_lists.push(pins.to_vec());
        self
    }

    pub fn add_edges<I>(mut self, edges: I) -> Self
    where
        I: IntoIterator<Item = (HyperedgeWeight, Vec<HypernodeId>)>,
    {
        for (weight, pins) in edges {
            self.edge_weights.push(weight);
            self.pin_lists.push(pins);
        }
        self
    }

    /// One weight per vertex; unit weights when absent.
    pub fn node_weights(mut self, weights: Vec<HypernodeWeight>) -> Self {
        self.node_weights = Some(weights);
        self
    }

    /// When disabled, pins keep their input order inside each edge window
    /// instead of being sorted. Sorting removes any scheduling-induced
    /// nondeterminism from upstream producers and is the default.
    pub fn stable_construction(mut self, stable: bool) -> Self {
        self.stable = stable;
        self
    }

    pub fn build(mut self) -> Result<StaticHypergraph, Error> {
        let n = self.num_nodes;

        if let Some(weights) = &self.node_weights {
            if weights.len() != n {
                return Err(Error::InvalidInput(format!(
                    "expected {n} vertex weights, got {}",
                    weights.len()
                )));
            }
        }
        for (e, pins) in self.pin_lists.iter().enumerate() {
            if pins.is_empty() {
                return Err(Error::InvalidInput(format!("hyperedge {e} has no pins")));
            }
            if let Some(&pin) = pins.iter().find(|&&pin| pin as usize >= n) {
                return Err(Error::InvalidInput(format!(
                    "hyperedge {e} references pin {pin}, but there are only {n} vertices"
                )));
            }
        }

        // Drop duplicate pins through a set-then-reset bitmap; sorting is
        // only for the stable mode.
        self.pin_lists
            .par_iter_mut()
            .for_each_init(
                || ScratchBitmap::new(n),
                |seen, pins| {
                    pins.retain(|&pin| {
                        let fresh = !seen.contains(pin);
                        if fresh {
                            seen.set(pin);
                        }
                        fresh
                    });
                    seen.reset_all(pins.iter());
                    if self.stable {
                        pins.sort_unstable();
                    }
                },
            );

        // Per-vertex degrees, by a parallel sweep over edges.
        let degrees: Vec<AtomicU32> = (0..n).map(|_| AtomicU32::new(0)).collect();
        self.pin_lists.par_iter().for_each(|pins| {
            for &pin in pins {
                degrees[pin as usize].fetch_add(1, Ordering::Relaxed);
            }
        });

        let mut first_incident: Vec<usize> = degrees
            .iter()
            .map(|d| d.load(Ordering::Relaxed) as usize)
            .collect();
        let total_pins = parallel_prefix_sum(&mut first_incident);

        let mut edge_offsets: Vec<usize> = self.pin_lists.iter().map(Vec::len).collect();
        let total_pins_by_edges = parallel_prefix_sum(&mut edge_offsets);
        debug_assert_eq!(total_pins, total_pins_by_edges);

        let mut incidence = vec![0 as HypernodeId; total_pins];
        let mut incident_nets = vec![0 as HyperedgeId; total_pins];
        {
            let incidence = as_atomic_u32(&mut incidence);
            let nets = as_atomic_u32(&mut incident_nets);
            let mut cursors = first_incident.clone();
            let cursors = as_atomic_usize(&mut cursors);

            self.pin_lists
                .par_iter()
                .zip(&edge_offsets)
                .enumerate()
                .for_each(|(e, (pins, &offset))| {
                    for (slot, &pin) in pins.iter().enumerate() {
                        incidence[offset + slot].store(pin, Ordering::Relaxed);
                        let pos = cursors[pin as usize].fetch_add(1, Ordering::Relaxed);
                        nets[pos].store(e as HyperedgeId, Ordering::Relaxed);
                    }
                });
        }

        // Deterministic iteration order for incident nets.
        sort_windows(&mut incident_nets, degrees.iter().map(|d| d.load(Ordering::Relaxed) as usize));

        let node_weights = self
            .node_weights
            .take()
            .unwrap_or_else(|| vec![1; n]);
        let total_weight = node_weights.par_iter().sum();

        let hypernodes: Vec<Hypernode> = first_incident
            .par_iter()
            .zip(&degrees)
            .zip(&node_weights)
            .map(|((&begin, degree), &weight)| Hypernode {
                begin,
                degree: degree.load(Ordering::Relaxed),
                weight,
                community: 0,
                enabled: true,
            })
            .collect();

        let hyperedges: Vec<Hyperedge> = edge_offsets
            .par_iter()
            .zip(&self.pin_lists)
            .zip(&self.edge_weights)
            .map(|((&begin, pins), &weight)| Hyperedge {
                begin,
                size: pins.len() as u32,
                weight,
                enabled: true,
            })
            .collect();

        let max_edge_size = hyperedges.par_iter().map(|he| he.size).max().unwrap_or(0);

        Ok(StaticHypergraph {
            hypernodes,
            incident_nets,
            hyperedges,
            incidence,
            num_pins: total_pins,
            total_weight,
            max_edge_size,
        })
    }
}

/// Sort each variable-length window of `values` in parallel. Windows are
/// carved out with `split_at_mut` so they can be handed to rayon as disjoint
/// mutable slices.
pub(crate) fn sort_windows(values: &mut [u32], lens: impl IntoIterator<Item = usize>) {
    let mut rest = values;
    let mut windows = Vec::new();
    for len in lens {
        let (window, tail) = std::mem::take(&mut rest).split_at_mut(len);
        windows.push(window);
        rest = tail;
    }
    windows
        .par_iter_mut()
        .for_each(|window| window.sort_unstable());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny() -> StaticHypergraph {
        // 7 vertices, 4 edges; the shape used throughout the module tests.
        HypergraphBuilder::new(7)
            .add_edge(1, &[0, 2])
            .add_edge(1, &[0, 1, 3, 4])
            .add_edge(1, &[3, 4, 6])
            .add_edge(1, &[2, 5, 6])
            .build()
            .unwrap()
    }

    #[test]
    fn construction_totals() {
        let hg = tiny();
        assert_eq!(hg.num_nodes(), 7);
        assert_eq!(hg.num_edges(), 4);
        assert_eq!(hg.num_pins(), 12);
        assert_eq!(hg.total_weight(), 7);
        assert_eq!(hg.max_edge_size(), 4);

        let degree_sum: u32 = (0..7).map(|v| hg.node_degree(v)).sum();
        let size_sum: u32 = (0..4).map(|e| hg.edge_size(e)).sum();
        assert_eq!(degree_sum as usize, hg.num_pins());
        assert_eq!(size_sum as usize, hg.num_pins());
    }

    #[test]
    fn incidence_and_incident_nets_are_adjoint() {
        let hg = tiny();
        for e in 0..hg.num_edges() as HyperedgeId {
            for &pin in hg.pins(e) {
                assert!(hg.incident_edges(pin).contains(&e));
            }
        }
        for v in 0..hg.num_nodes() as HypernodeId {
            for &e in hg.incident_edges(v) {
                assert!(hg.pins(e).contains(&v));
            }
        }
    }

    #[test]
    fn windows_are_sorted_and_unique() {
        let hg = tiny();
        for v in 0..hg.num_nodes() as HypernodeId {
            let nets = hg.incident_edges(v);
            assert!(nets.windows(2).all(|w| w[0] < w[1]), "nets of {v}: {nets:?}");
        }
        for e in 0..hg.num_edges() as HyperedgeId {
            let pins = hg.pins(e);
            assert!(pins.windows(2).all(|w| w[0] < w[1]), "pins of {e}: {pins:?}");
        }
    }

    #[test]
    fn duplicate_pins_are_dropped() {
        let hg = HypergraphBuilder::new(3)
            .add_edge(1, &[0, 1, 1, 2, 0])
            .build()
            .unwrap();
        assert_eq!(hg.pins(0), &[0, 1, 2]);
        assert_eq!(hg.num_pins(), 3);
    }

    #[test]
    fn rejects_bad_input() {
        assert!(HypergraphBuilder::new(3).add_edge(1, &[]).build().is_err());
        assert!(HypergraphBuilder::new(3).add_edge(1, &[0, 3]).build().is_err());
        assert!(HypergraphBuilder::new(2)
            .add_edge(1, &[0, 1])
            .node_weights(vec![1])
            .build()
            .is_err());
    }

    #[test]
    fn custom_weights() {
        let hg = HypergraphBuilder::new(3)
            .add_edge(4, &[0, 1])
            .add_edge(5, &[1, 2])
            .node_weights(vec![2, 3, 4])
            .build()
            .unwrap();
        assert_eq!(hg.total_weight(), 9);
        assert_eq!(hg.node_weight(1), 3);
        assert_eq!(hg.edge_weight(1), 5);
    }
}
