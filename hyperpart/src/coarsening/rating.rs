use rayon::prelude::*;

use crate::StaticHypergraph;
use crate::HypernodeId;
use crate::HypernodeWeight;
use crate::INVALID_HYPERNODE;

/// Sparse per-thread score accumulator, reset by walking the touched
/// entries.
#[derive(Debug, Clone)]
struct RatingMap {
    scores: Vec<f64>,
    touched: Vec<HypernodeId>,
}

impl RatingMap {
    fn new(len: usize) -> Self {
        Self {
            scores: vec![0.0; len],
            touched: Vec::new(),
        }
    }
}

/// Compute a heavy-edge clustering of `hg`.
///
/// Every vertex rates its neighbors with `w(e) / (|e| - 1)` summed over
/// shared hyperedges and normalized by the product of the two cluster
/// weights, so already-heavy clusters attract fewer merges. Edges above
/// `rating_size_limit` are ignored, as are neighbors in a different
/// community. Each vertex then joins its best-rated neighbor as long as
/// the merged cluster stays within `max_cluster_weight`. Rating runs in
/// parallel; the commit pass is sequential in vertex order, so the result
/// is a function of the input alone.
pub(crate) fn heavy_edge_clustering(
    hg: &StaticHypergraph,
    max_cluster_weight: HypernodeWeight,
    rating_size_limit: usize,
) -> Vec<HypernodeId> {
    let n = hg.num_nodes();

    let preferred: Vec<HypernodeId> = (0..n as HypernodeId)
        .into_par_iter()
        .map_init(
            || RatingMap::new(n),
            |map, u| {
                if !hg.is_node_enabled(u) {
                    return INVALID_HYPERNODE;
                }
                for &he in hg.incident_edges(u) {
                    let size = hg.edge_size(he);
                    if size < 2 || size as usize > rating_size_limit {
                        continue;
                    }
                    let contribution = hg.edge_weight(he) as f64 / (size - 1) as f64;
                    for &v in hg.pins(he) {
                        if v == u
                            || !hg.is_node_enabled(v)
                            || hg.community_of(v) != hg.community_of(u)
                            || hg.node_weight(v) + hg.node_weight(u) > max_cluster_weight
                        {
                            continue;
                        }
                        if map.scores[v as usize] == 0.0 {
                            map.touched.push(v);
                        }
                        map.scores[v as usize] += contribution;
                    }
                }

                let mut best = INVALID_HYPERNODE;
                let mut best_score = 0.0;
                let u_weight = hg.node_weight(u) as f64;
                for &v in &map.touched {
                    let connection = map.scores[v as usize];
                    map.scores[v as usize] = 0.0;
                    let score = connection / (u_weight * hg.node_weight(v) as f64);
                    if score > best_score || (score == best_score && v < best) {
                        best_score = score;
                        best = v;
                    }
                }
                map.touched.clear();
                best
            },
        )
        .collect();

    // Sequential commit: join representatives while the weight cap holds.
    let mut cluster: Vec<HypernodeId> = (0..n as HypernodeId).collect();
    let mut cluster_weight: Vec<HypernodeWeight> =
        (0..n as HypernodeId).map(|v| hg.node_weight(v)).collect();

    let find = |cluster: &[HypernodeId], mut v: HypernodeId| {
        while cluster[v as usize] != v {
            v = cluster[v as usize];
        }
        v
    };

    for u in 0..n as HypernodeId {
        let v = preferred[u as usize];
        if v == INVALID_HYPERNODE || cluster[u as usize] != u {
            continue;
        }
        let root = find(&cluster, v);
        if root == u {
            continue;
        }
        if cluster_weight[root as usize] + cluster_weight[u as usize] > max_cluster_weight {
            continue;
        }
        cluster_weight[root as usize] += cluster_weight[u as usize];
        cluster[u as usize] = root;
    }

    // Flatten chains so every entry points at its representative.
    for u in 0..n {
        cluster[u] = find(&cluster, u as HypernodeId);
    }
    cluster
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hypergraph::HypergraphBuilder;

    #[test]
    fn clusters_respect_the_weight_cap() {
        let hg = HypergraphBuilder::new(6)
            .add_edge(10, &[0, 1])
            .add_edge(10, &[2, 3])
            .add_edge(1, &[1, 2])
            .add_edge(10, &[4, 5])
            .build()
            .unwrap();
        let cluster = heavy_edge_clustering(&hg, 2, 1000);

        // Heavy pairs merge, the cap of 2 forbids anything bigger.
        assert_eq!(cluster[0], cluster[1]);
        assert_eq!(cluster[2], cluster[3]);
        assert_eq!(cluster[4], cluster[5]);
        assert_ne!(cluster[1], cluster[2]);
    }

    #[test]
    fn communities_are_never_mixed() {
        let mut hg = HypergraphBuilder::new(4)
            .add_edge(100, &[1, 2])
            .add_edge(1, &[0, 1])
            .add_edge(1, &[2, 3])
            .build()
            .unwrap();
        hg.set_communities(&[0, 0, 1, 1]);
        let cluster = heavy_edge_clustering(&hg, 100, 1000);

        assert_ne!(cluster[1], cluster[2]);
        assert_eq!(cluster[0], cluster[1]);
        assert_eq!(cluster[2], cluster[3]);
    }

    #[test]
    fn heaviest_connection_wins() {
        let hg = HypergraphBuilder::new(3)
            .add_edge(1, &[0, 1])
            .add_edge(5, &[1, 2])
            .build()
            .unwrap();
        let cluster = heavy_edge_clustering(&hg, 10, 1000);
        assert_eq!(cluster[1], cluster[2]);
    }

    #[test]
    fn merges_normalize_by_cluster_weight() {
        // Vertex 0 is connected to a heavy vertex by a heavy edge and to a
        // light vertex by a lighter one; the normalized score prefers the
        // light partner (4 / (1*4) = 1 against 2 / (1*1) = 2).
        let hg = HypergraphBuilder::new(3)
            .add_edge(4, &[0, 1])
            .add_edge(2, &[0, 2])
            .node_weights(vec![1, 4, 1])
            .build()
            .unwrap();
        let cluster = heavy_edge_clustering(&hg, 5, 1000);
        assert_eq!(cluster[0], cluster[2]);
        assert_ne!(cluster[1], cluster[0]);
    }
}
