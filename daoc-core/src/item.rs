//! The working view of one agglomeration iteration.
//!
//! Nodes and clusters are both reduced to [`WorkItem`]s: id, self-weight,
//! share-weighted base-node count and the ordered bidirectional links to the
//! other items of the same level. Item indices follow ascending ids, so all
//! deterministic sweeps iterate plain ranges.

use crate::graph::{AccWeight, Id};

/// A bidirectional link of a working item.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct WorkLink {
    /// Index of the destination item within the level.
    pub dest: usize,
    /// Bidirectional (inbound + outbound) link weight.
    pub weight: AccWeight,
}

/// One item (node or cluster) of the current level.
#[derive(Clone, Debug)]
pub(crate) struct WorkItem {
    /// Node or cluster id, strictly increasing with the item index.
    pub id: Id,
    /// Self-weight of the item.
    pub weight: AccWeight,
    /// Share-weighted number of base nodes below the item.
    pub nodes: f64,
    /// Links ordered by destination index, unique.
    pub links: Vec<WorkLink>,
}

impl WorkItem {
    /// Weighted degree: self-weight plus bidirectional link weight.
    pub fn degree(&self) -> AccWeight {
        self.weight + self.links.iter().map(|ln| ln.weight).sum::<AccWeight>()
    }

    /// Bidirectional link weight towards item `dest`, if linked.
    pub fn link_to(&self, dest: usize) -> Option<AccWeight> {
        self.links
            .binary_search_by_key(&dest, |ln| ln.dest)
            .ok()
            .map(|pos| self.links[pos].weight)
    }
}

/// Modularity gain of merging two items with degrees `di` and `dj` connected
/// by the bidirectional weight `wij`, against the total weight `w`.
///
/// Gamma scales the coverage term, so gamma = 1 is Newman modularity,
/// gamma > 1 favors merging (coarser clusters) and gamma < 1 resists it
/// (finer clusters).
#[inline]
pub(crate) fn merge_gain(wij: AccWeight, di: AccWeight, dj: AccWeight, w: AccWeight, gamma: f64) -> f64 {
    (gamma * 2.0 * wij - 2.0 * di * dj / w) / w
}

/// Modularity of a level treated as a partition, at resolution `gamma`.
pub(crate) fn modularity(items: &[WorkItem], w: AccWeight, gamma: f64) -> f64 {
    if w <= 0.0 {
        return 0.0;
    }
    items
        .iter()
        .map(|it| {
            let d = it.degree();
            (gamma * it.weight - d * d / w) / w
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A triangle of unit edges as working items: degree 2 each, W = 6.
    pub(crate) fn triangle() -> (Vec<WorkItem>, AccWeight) {
        let items = (0..3u32)
            .map(|id| WorkItem {
                id,
                weight: 0.0,
                nodes: 1.0,
                links: (0..3)
                    .filter(|&d| d != id as usize)
                    .map(|dest| WorkLink { dest, weight: 1.0 })
                    .collect(),
            })
            .collect();
        (items, 6.0)
    }

    #[test]
    fn triangle_pair_gain_is_one_ninth() {
        let (items, w) = triangle();
        let g = merge_gain(1.0, items[0].degree(), items[1].degree(), w, 1.0);
        assert!((g - 1.0 / 9.0).abs() < 1e-12);
    }

    #[test]
    fn gamma_scales_the_coverage_term() {
        let (items, w) = triangle();
        let d = items[0].degree();
        assert!(merge_gain(1.0, d, d, w, 2.0) > merge_gain(1.0, d, d, w, 1.0));
        assert!(merge_gain(1.0, d, d, w, 0.1) < 0.0);
    }

    #[test]
    fn singleton_partition_of_triangle_has_negative_modularity() {
        let (items, w) = triangle();
        // Q = -3 * (2/6)^2 = -1/3 for the all-singletons partition.
        assert!((modularity(&items, w, 1.0) + 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn merged_triangle_has_zero_modularity() {
        let merged = vec![WorkItem {
            id: 0,
            weight: 6.0,
            nodes: 3.0,
            links: Vec::new(),
        }];
        assert!(modularity(&merged, 6.0, 1.0).abs() < 1e-12);
    }
}
