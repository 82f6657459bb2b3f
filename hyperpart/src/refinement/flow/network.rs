//! Flow networks for block-pair refinement: a hypergraph region is
//! Lawler-expanded (edge-in/edge-out vertices joined by an arc of the
//! hyperedge's weight) and a min cut is computed with Dinic's algorithm.

use std::collections::HashMap;
use std::collections::VecDeque;

use crate::bitset::ScratchBitmap;
use crate::HyperedgeId;
use crate::HypernodeId;
use crate::PartitionId;
use crate::PartitionedHypergraph;

const INF: i64 = i64::MAX / 4;

const SOURCE: usize = 0;
const SINK: usize = 1;

#[derive(Debug, Clone, Copy)]
struct Arc {
    to: usize,
    cap: i64,
}

/// A directed flow network with residual bookkeeping. Arcs are stored in
/// pairs, so `index ^ 1` is the reverse arc.
#[derive(Debug, Default)]
pub struct FlowNetwork {
    arcs: Vec<Arc>,
    adjacent: Vec<Vec<usize>>,
}

impl FlowNetwork {
    pub fn with_nodes(count: usize) -> Self {
        Self {
            arcs: Vec::new(),
            adjacent: vec![Vec::new(); count],
        }
    }

    pub fn add_node(&mut self) -> usize {
        self.adjacent.push(Vec::new());
        self.adjacent.len() - 1
    }

    pub fn add_arc(&mut self, from: usize, to: usize, cap: i64) {
        self.adjacent[from].push(self.arcs.len());
        self.arcs.push(Arc { to, cap });
        self.adjacent[to].push(self.arcs.len());
        self.arcs.push(Arc { to: from, cap: 0 });
    }

    /// Dinic: BFS level graph, then blocking flows by DFS, until the sink
    /// is unreachable. Returns the max-flow value.
    pub fn max_flow(&mut self) -> i64 {
        let n = self.adjacent.len();
        let mut flow = 0;
        let mut level = vec![-1_i32; n];
        let mut next_arc = vec![0_usize; n];

        loop {
            level.iter_mut().for_each(|l| *l = -1);
            level[SOURCE] = 0;
            let mut queue = VecDeque::from([SOURCE]);
            while let Some(u) = queue.pop_front() {
                for &a in &self.adjacent[u] {
                    let arc = self.arcs[a];
                    if arc.cap > 0 && level[arc.to] < 0 {
                        level[arc.to] = level[u] + 1;
                        queue.push_back(arc.to);
                    }
                }
            }
            if level[SINK] < 0 {
                return flow;
            }
            next_arc.iter_mut().for_each(|n| *n = 0);
            while let Some(pushed) = self.blocking_flow(SOURCE, INF, &level, &mut next_arc) {
                flow += pushed;
            }
        }
    }

    fn blocking_flow(
        &mut self,
        u: usize,
        limit: i64,
        level: &[i32],
        next_arc: &mut [usize],
    ) -> Option<i64> {
        if u == SINK {
            return Some(limit);
        }
        while next_arc[u] < self.adjacent[u].len() {
            let a = self.adjacent[u][next_arc[u]];
            let Arc { to, cap } = self.arcs[a];
            if cap > 0 && level[to] == level[u] + 1 {
                if let Some(pushed) = self.blocking_flow(to, limit.min(cap), level, next_arc) {
                    self.arcs[a].cap -= pushed;
                    self.arcs[a ^ 1].cap += pushed;
                    return Some(pushed);
                }
            }
            next_arc[u] += 1;
        }
        None
    }

    /// Nodes reachable from the source in the residual graph; the
    /// source-side of the min cut.
    pub fn source_side(&self) -> Vec<bool> {
        let mut reachable = vec![false; self.adjacent.len()];
        reachable[SOURCE] = true;
        let mut queue = VecDeque::from([SOURCE]);
        while let Some(u) = queue.pop_front() {
            for &a in &self.adjacent[u] {
                let arc = self.arcs[a];
                if arc.cap > 0 && !reachable[arc.to] {
                    reachable[arc.to] = true;
                    queue.push_back(arc.to);
                }
            }
        }
        reachable
    }
}

/// A block-pair subproblem: the extracted region vertices and the network
/// they induce.
#[derive(Debug)]
pub struct RegionNetwork {
    pub network: FlowNetwork,
    /// Region vertices, in network order (`vertex i` is network node
    /// `2 + i`).
    pub region: Vec<HypernodeId>,
}

impl RegionNetwork {
    /// After max-flow, which side each region vertex ends on: `true` means
    /// source side (`b0`).
    pub fn sides(&self) -> Vec<bool> {
        let reachable = self.network.source_side();
        (0..self.region.len()).map(|i| reachable[2 + i]).collect()
    }
}

/// Lawler-expand the pair region around the given cut hyperedges.
///
/// The region contains the pins of the cut edges that lie in `b0` or `b1`
/// and pass `admit` (node ownership), capped at `max_region_size`. Modeled
/// hyperedges are those incident to the region and living entirely inside
/// the pair; pins outside the region act as terminals for their side.
pub fn build_region_network(
    phg: &PartitionedHypergraph<'_>,
    b0: PartitionId,
    b1: PartitionId,
    cut_edges: &[HyperedgeId],
    max_region_size: usize,
    mut admit: impl FnMut(HypernodeId) -> bool,
) -> RegionNetwork {
    let hg = phg.hypergraph();
    let mut region = Vec::new();
    let mut region_index: HashMap<HypernodeId, usize> = HashMap::new();
    let mut in_region = ScratchBitmap::new(hg.num_nodes());

    'collect: for &he in cut_edges {
        for &pin in hg.pins(he) {
            let part = phg.part_of(pin);
            if part != b0 && part != b1 {
                continue;
            }
            if in_region.contains(pin) {
                continue;
            }
            if region.len() >= max_region_size {
                break 'collect;
            }
            if !admit(pin) {
                continue;
            }
            in_region.set(pin);
            region_index.insert(pin, region.len());
            region.push(pin);
        }
    }

    let mut network = FlowNetwork::with_nodes(2 + region.len());
    let mut seen_edges = ScratchBitmap::new(hg.num_edges());
    let mut touched_edges = Vec::new();
    for &v in &region {
        for &he in hg.incident_edges(v) {
            if seen_edges.contains(he) {
                continue;
            }
            seen_edges.set(he);
            touched_edges.push(he);
            // Only edges living entirely inside the pair are modeled; an
            // edge touching a third block keeps its cut status regardless
            // of how the pair's pins are shuffled.
            if phg.pin_count(he, b0) + phg.pin_count(he, b1) < hg.edge_size(he) {
                continue;
            }
            let edge_in = network.add_node();
            let edge_out = network.add_node();
            network.add_arc(edge_in, edge_out, hg.edge_weight(he));
            let mut source_terminal = false;
            let mut sink_terminal = false;
            for &pin in hg.pins(he) {
                match region_index.get(&pin) {
                    Some(&i) => {
                        network.add_arc(2 + i, edge_in, INF);
                        network.add_arc(edge_out, 2 + i, INF);
                    }
                    None if phg.part_of(pin) == b0 => source_terminal = true,
                    None => sink_terminal = true,
                }
            }
            if source_terminal {
                network.add_arc(SOURCE, edge_in, INF);
            }
            if sink_terminal {
                network.add_arc(edge_out, SINK, INF);
            }
        }
    }
    in_region.reset_all(region.iter());
    seen_edges.reset_all(touched_edges.iter());

    RegionNetwork { network, region }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hypergraph::HypergraphBuilder;

    #[test]
    fn dinic_on_a_known_network() {
        //        (3)        (2)
        //   S ---------> 2 ----> 3 ----> T
        //    \          ^  \            ^
        //     \ (2)    /(1) \ (3)      / (4)
        //      `----> 4 -----`--> ... (node 4 also feeds 3)
        let mut network = FlowNetwork::with_nodes(5);
        network.add_arc(0, 2, 3);
        network.add_arc(0, 4, 2);
        network.add_arc(4, 2, 1);
        network.add_arc(2, 3, 3);
        network.add_arc(4, 3, 2);
        network.add_arc(3, 1, 4);

        assert_eq!(network.max_flow(), 4);
        let side = network.source_side();
        assert!(side[0]);
        assert!(!side[1]);
    }

    #[test]
    fn region_network_separates_a_path() {
        // 0 - 1 -- 2 - 3 with the cut currently at {1, 2}.
        let hg = HypergraphBuilder::new(4)
            .add_edge(2, &[0, 1])
            .add_edge(1, &[1, 2])
            .add_edge(2, &[2, 3])
            .build()
            .unwrap();
        let mut phg = crate::PartitionedHypergraph::new(&hg, 2, 4);
        for v in 0..4 {
            phg.set_only_part(v, i32::from(v >= 2));
        }
        phg.initialize_partition();

        let mut rn = build_region_network(&phg, 0, 1, &[1], 100, |_| true);
        assert_eq!(rn.region, vec![1, 2]);

        // The light middle edge is the min cut; both sides keep their
        // vertices.
        let flow = rn.network.max_flow();
        assert_eq!(flow, 1);
        let sides = rn.sides();
        assert!(sides[0]);
        assert!(!sides[1]);
    }
}
