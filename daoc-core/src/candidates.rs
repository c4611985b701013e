//! Mutual-best merge candidate selection.
//!
//! For every item of the current level the selector finds the set of
//! neighbors maximizing the modularity gain, then keeps only the mutual
//! pairs: `j` is a candidate of `i` iff their gain equals both items' best
//! gains. Ties are kept as sets; all ordering is by ascending item index
//! (equal to ascending id), which makes the result a total order independent
//! of insertion order.
//!
//! Two accelerations apply, both strictly result-preserving:
//! - AOH equivalence: items whose self-weight and link multiset hash equally
//!   and verify equal share one best-gain scan.
//! - Prefilter: an O(links) upper bound skips items whose best gain cannot
//!   reach the merge threshold; such items would end with an empty candidate
//!   set anyway.

use std::collections::HashMap;

use tracing::debug;

use crate::{
    aoh::AggHash,
    item::{merge_gain, WorkItem},
    num,
    options::ClusterOptions,
};

/// Candidate sets of one level.
#[derive(Debug)]
pub(crate) struct Candidates {
    /// Best gain per item; `NEG_INFINITY` when the item has no links.
    pub best: Vec<f64>,
    /// Mutual-best candidate indices per item, ascending.
    pub sets: Vec<Vec<usize>>,
    /// Maximal best gain over the level.
    pub global_best: f64,
}

impl Candidates {
    /// Whether `cand` is a mutual-best candidate of `item`.
    pub fn mutual(&self, item: usize, cand: usize) -> bool {
        self.sets[item].binary_search(&cand).is_ok()
    }
}

/// Computes the mutual-best candidate sets of the level.
///
/// `margin` is the minimal admissible best gain (rule 3 of the candidate
/// selection); pass `f64::NEG_INFINITY` while a root bound forces merging.
pub(crate) fn select(
    items: &[WorkItem],
    w: f64,
    gamma: f64,
    margin: f64,
    opts: &ClusterOptions,
) -> Candidates {
    let n = items.len();
    let rep = if opts.use_ahash {
        equivalence_reps(items)
    } else {
        (0..n).collect()
    };

    let degrees: Vec<f64> = items.iter().map(WorkItem::degree).collect();
    let skip = prefilter(items, w, gamma, margin, opts);

    // Best-gain scan, shared across each AOH equivalence class.
    let mut best = vec![f64::NEG_INFINITY; n];
    let mut tied: Vec<Vec<usize>> = vec![Vec::new(); n];
    for i in 0..n {
        if rep[i] != i {
            continue;
        }
        if skip.as_ref().is_some_and(|s| s[i]) {
            continue;
        }
        let mut ibest = f64::NEG_INFINITY;
        let mut itied: Vec<usize> = Vec::new();
        let scale = items[i].links.len().max(1);
        for ln in &items[i].links {
            let gain = merge_gain(ln.weight, degrees[i], degrees[ln.dest], w, gamma);
            if num::lt(ibest, gain, scale) {
                ibest = gain;
                itied.clear();
                itied.push(ln.dest);
            } else if num::approx_eq(gain, ibest, scale) {
                itied.push(ln.dest);
            }
        }
        best[i] = ibest;
        tied[i] = itied;
    }
    // Clones of an equivalence class copy the representative's result; the
    // gains coincide because self-weights and link multisets are identical.
    for i in 0..n {
        let r = rep[i];
        if r != i {
            best[i] = best[r];
            tied[i] = tied[r].clone();
        }
    }

    let mut global_best = f64::NEG_INFINITY;
    for &b in &best {
        if b > global_best {
            global_best = b;
        }
    }

    // Apply the gain margin and the mutuality filter. The margin comparison
    // is tolerance-based so true-zero gains survive accumulated rounding.
    let mut sets: Vec<Vec<usize>> = vec![Vec::new(); n];
    let admissible: Vec<bool> = best
        .iter()
        .map(|&b| b >= margin || (margin.is_finite() && num::approx_eq(b, margin, 1024)))
        .collect();
    for i in 0..n {
        if !admissible[i] {
            continue;
        }
        let scale = items[i].links.len().max(1);
        let mut set: Vec<usize> = tied[i]
            .iter()
            .copied()
            .filter(|&j| {
                admissible[j]
                    && num::approx_eq(best[i], best[j], scale)
                    && tied[j].contains(&i)
            })
            .collect();
        set.sort_unstable();
        sets[i] = set;
    }

    debug!(
        items = n,
        global_best,
        candidates = sets.iter().filter(|s| !s.is_empty()).count(),
        "selected mutual candidates"
    );
    Candidates {
        best,
        sets,
        global_best,
    }
}

/// Groups structurally equivalent items, returning the representative index
/// of each item (itself when unique or first of its class).
fn equivalence_reps(items: &[WorkItem]) -> Vec<usize> {
    let mut buckets: HashMap<AggHash, Vec<usize>> = HashMap::new();
    for (i, it) in items.iter().enumerate() {
        let mut h = AggHash::new();
        let wbits = it.weight.to_bits();
        h.add(wbits as u32);
        h.add((wbits >> 32) as u32);
        for ln in &it.links {
            h.add(ln.dest as u32);
            let lbits = ln.weight.to_bits();
            h.add(lbits as u32);
            h.add((lbits >> 32) as u32);
        }
        buckets.entry(h).or_default().push(i);
    }

    let mut rep: Vec<usize> = (0..items.len()).collect();
    for bucket in buckets.values() {
        if bucket.len() < 2 {
            continue;
        }
        // Equal hashes are only a fast path; verify contents before sharing.
        for pos in 1..bucket.len() {
            let i = bucket[pos];
            for &r in &bucket[..pos] {
                if rep[r] == r
                    && items[i].weight == items[r].weight
                    && items[i].links == items[r].links
                {
                    rep[i] = r;
                    break;
                }
            }
        }
    }
    rep
}

/// Marks items whose best possible gain cannot reach `margin`.
///
/// The bound drops the non-negative null-model term, so a marked item is
/// guaranteed to end with an empty candidate set in the full scan; skipping
/// it cannot change the output. Returns `None` when the filter is inactive
/// or not worthwhile per `filter_margin`.
fn prefilter(
    items: &[WorkItem],
    w: f64,
    gamma: f64,
    margin: f64,
    opts: &ClusterOptions,
) -> Option<Vec<bool>> {
    if !opts.prefilter || !margin.is_finite() {
        return None;
    }
    let mut skip = vec![false; items.len()];
    let mut dropped = 0usize;
    for (i, it) in items.iter().enumerate() {
        let wmax = it
            .links
            .iter()
            .map(|ln| ln.weight)
            .fold(f64::NEG_INFINITY, f64::max);
        if !wmax.is_finite() {
            continue; // no links, nothing to skip
        }
        let upper = gamma * 2.0 * wmax / w;
        if upper < margin && !num::approx_eq(upper, margin, it.links.len()) {
            skip[i] = true;
            dropped += 1;
        }
    }
    // Applying the filter only pays off when enough items are droppable.
    if (dropped as f64) <= f64::from(opts.filter_margin) * items.len() as f64 {
        return None;
    }
    debug!(dropped, total = items.len(), "prefilter engaged");
    Some(skip)
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::item::WorkLink;

    fn ring(n: usize) -> (Vec<WorkItem>, f64) {
        let items = (0..n)
            .map(|i| {
                let mut links = vec![
                    WorkLink { dest: (i + n - 1) % n, weight: 1.0 },
                    WorkLink { dest: (i + 1) % n, weight: 1.0 },
                ];
                links.sort_by_key(|ln| ln.dest);
                WorkItem {
                    id: i as u32,
                    weight: 0.0,
                    nodes: 1.0,
                    links,
                }
            })
            .collect();
        (items, 2.0 * n as f64)
    }

    #[test]
    fn ring_neighbors_are_mutual_ties() {
        let (items, w) = ring(4);
        let cands = select(&items, w, 1.0, 0.0, &ClusterOptions::new());
        for i in 0..4 {
            let mut expected = vec![(i + 3) % 4, (i + 1) % 4];
            expected.sort_unstable();
            assert_eq!(cands.sets[i], expected, "item {i}");
        }
        assert!(cands.global_best > 0.0);
    }

    #[test]
    fn margin_empties_low_gain_items() {
        let (items, w) = ring(4);
        let cands = select(&items, w, 1.0, 0.5, &ClusterOptions::new());
        assert!(cands.sets.iter().all(Vec::is_empty));
        // The reported global best stays below the margin either way.
        assert!(cands.global_best < 0.5);
    }

    #[test]
    fn mutuality_requires_equal_bests() {
        // 0 -2- 1 -1- 2: node 1 prefers 0, so (1, 2) is not mutual.
        let items = vec![
            WorkItem { id: 0, weight: 0.0, nodes: 1.0, links: vec![WorkLink { dest: 1, weight: 2.0 }] },
            WorkItem {
                id: 1,
                weight: 0.0,
                nodes: 1.0,
                links: vec![WorkLink { dest: 0, weight: 2.0 }, WorkLink { dest: 2, weight: 1.0 }],
            },
            WorkItem { id: 2, weight: 0.0, nodes: 1.0, links: vec![WorkLink { dest: 1, weight: 1.0 }] },
        ];
        let cands = select(&items, 6.0, 1.0, f64::NEG_INFINITY, &ClusterOptions::new());
        assert_eq!(cands.sets[0], vec![1]);
        assert_eq!(cands.sets[1], vec![0]);
        assert!(cands.sets[2].is_empty());
    }

    #[test]
    fn ahash_on_and_off_agree() {
        // Star with twin leaves: the leaves are structurally equivalent.
        let leaves = 5usize;
        let mut items = vec![WorkItem {
            id: 0,
            weight: 0.0,
            nodes: 1.0,
            links: (1..=leaves).map(|d| WorkLink { dest: d, weight: 1.0 }).collect(),
        }];
        for i in 1..=leaves {
            items.push(WorkItem {
                id: i as u32,
                weight: 4.0,
                nodes: 1.0,
                links: vec![WorkLink { dest: 0, weight: 1.0 }],
            });
        }
        let w: f64 = items.iter().map(WorkItem::degree).sum();
        let with = select(&items, w, 1.0, 0.0, &ClusterOptions::new());
        let mut opts = ClusterOptions::new();
        opts.use_ahash = false;
        let without = select(&items, w, 1.0, 0.0, &opts);
        assert_eq!(with.sets, without.sets);
        for (a, b) in with.best.iter().zip(&without.best) {
            assert_eq!(a.to_bits(), b.to_bits());
        }
    }

    #[test]
    fn prefilter_is_byte_identical() {
        let (items, w) = ring(10);
        let on = select(&items, w, 1.0, 0.0, &ClusterOptions::new());
        let mut opts = ClusterOptions::new();
        opts.prefilter = false;
        let off = select(&items, w, 1.0, 0.0, &opts);
        assert_eq!(on.sets, off.sets);
    }
}
