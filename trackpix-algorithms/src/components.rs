//! Connected-component labelling of cells.
//!
//! Uses a union-find data structure over the cells of one module. Cells are
//! visited in canonical `(channel1, channel0)` order so the component
//! labelling does not depend on the order cells were read in.

use trackpix_core::ChannelCoord;

/// Union-Find data structure for connected component detection.
pub(crate) struct UnionFind {
    parent: Vec<usize>,
    rank: Vec<usize>,
}

impl UnionFind {
    pub(crate) fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            rank: vec![0; n],
        }
    }

    pub(crate) fn find(&mut self, x: usize) -> usize {
        let mut root = x;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        // Path compression
        let mut node = x;
        while self.parent[node] != root {
            let next = self.parent[node];
            self.parent[node] = root;
            node = next;
        }
        root
    }

    pub(crate) fn union(&mut self, x: usize, y: usize) {
        let px = self.find(x);
        let py = self.find(y);

        if px == py {
            return;
        }

        match self.rank[px].cmp(&self.rank[py]) {
            std::cmp::Ordering::Less => self.parent[px] = py,
            std::cmp::Ordering::Greater => self.parent[py] = px,
            std::cmp::Ordering::Equal => {
                self.parent[py] = px;
                self.rank[px] += 1;
            }
        }
    }
}

/// Groups cells into 8-connected components.
///
/// `coords` are the channel coordinates of the module's cells. The returned
/// clusters hold indices into `coords`; each cluster lists its cells in
/// canonical order and clusters are ordered by their first canonical cell.
/// Cells sharing the same channels land in the same cluster.
pub(crate) fn connected_components(coords: &[ChannelCoord]) -> Vec<Vec<usize>> {
    if coords.is_empty() {
        return Vec::new();
    }

    let mut order: Vec<usize> = (0..coords.len()).collect();
    order.sort_by_key(|&i| (coords[i].channel1, coords[i].channel0, i));

    let n = order.len();
    let mut uf = UnionFind::new(n);

    // Positions are canonical ranks; a neighbour can only be in the same or
    // the previous channel1 row, so the backward scan stops early.
    for pos in 1..n {
        let current = coords[order[pos]];
        for prev in (0..pos).rev() {
            let candidate = coords[order[prev]];
            if current.channel1 - candidate.channel1 > 1 {
                break;
            }
            if candidate.same_channel(&current) || candidate.is_adjacent(&current) {
                uf.union(pos, prev);
            }
        }
    }

    let mut label_of_root = vec![usize::MAX; n];
    let mut clusters: Vec<Vec<usize>> = Vec::new();
    for pos in 0..n {
        let root = uf.find(pos);
        if label_of_root[root] == usize::MAX {
            label_of_root[root] = clusters.len();
            clusters.push(Vec::new());
        }
        clusters[label_of_root[root]].push(order[pos]);
    }
    clusters
}
