//! Merge planning: from mutual-best candidate sets to non-conflicting merge
//! groups.
//!
//! Default policy keeps the mutual-best invariant per pair: groups grow only
//! while every pair inside stays mutual-best (cliques in the candidate
//! graph); chain components that are not cliques split, with the remaining
//! pairwise edges deferred to later iterations. The `chains` policy instead
//! absorbs whole connected components, producing the most aggressive
//! coarsening.
//!
//! Overlap admission: an item whose candidates depend exclusively on it from
//! at least two sides is a shared hub. The hub does not seed a group of its
//! own; its candidates form (or keep) their groups and the hub joins them:
//! the group with the smallest candidate id in crisp mode, every group with
//! a proportional share in fuzzy mode.

use tracing::debug;

use crate::{
    candidates::Candidates,
    hierarchy::Share,
    item::WorkItem,
    options::Overlap,
};

/// The merge plan of one iteration.
#[derive(Debug)]
pub(crate) struct MergePlan {
    /// Per item: `(group, share)` memberships; an empty list propagates the
    /// item to the next level as a wrapper.
    pub memberships: Vec<Vec<(usize, Share)>>,
    /// The number of surviving merge groups.
    pub merges: usize,
}

/// Union-find over item indices, used by the chains policy to collect the
/// connected components of the candidate graph.
#[derive(Clone, Debug)]
struct DisjointSet {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl DisjointSet {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            rank: vec![0; n],
        }
    }

    fn find(&mut self, mut node: usize) -> usize {
        let mut root = node;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        while self.parent[node] != node {
            let parent = self.parent[node];
            self.parent[node] = root;
            node = parent;
        }
        root
    }

    fn union(&mut self, left: usize, right: usize) {
        let mut left = self.find(left);
        let mut right = self.find(right);
        if left == right {
            return;
        }
        if self.rank[left] < self.rank[right] {
            std::mem::swap(&mut left, &mut right);
        }
        self.parent[right] = left;
        if self.rank[left] == self.rank[right] {
            self.rank[left] = self.rank[left].saturating_add(1);
        }
    }
}

/// Builds the merge plan for the level.
pub(crate) fn plan(
    items: &[WorkItem],
    cands: &Candidates,
    overlap: Overlap,
    chains: bool,
) -> MergePlan {
    let n = items.len();
    debug_assert_eq!(cands.sets.len(), n);

    // Shared hubs: at least two candidates depend exclusively on this item.
    let hub: Vec<bool> = (0..n)
        .map(|i| {
            let deps = cands.sets[i]
                .iter()
                .filter(|&&j| cands.sets[j].len() == 1 && cands.sets[j][0] == i)
                .count();
            deps >= 2
        })
        .collect();

    let mut group: Vec<Option<usize>> = vec![None; n];
    let mut groups: Vec<Vec<usize>> = Vec::new();
    let mut shared: Vec<Vec<(usize, Share)>> = vec![Vec::new(); n];

    // Core pass over the non-hub candidate edges in lexicographic order.
    if chains {
        let mut dsu = DisjointSet::new(n);
        let mut joined = vec![false; n];
        for i in 0..n {
            if hub[i] {
                continue;
            }
            for &j in &cands.sets[i] {
                if j > i && !hub[j] {
                    dsu.union(i, j);
                    joined[i] = true;
                    joined[j] = true;
                }
            }
        }
        // Materialize components in first-member order.
        let mut comp_group: Vec<Option<usize>> = vec![None; n];
        for i in 0..n {
            if !joined[i] {
                continue;
            }
            let root = dsu.find(i);
            let slot = *comp_group[root].get_or_insert_with(|| {
                groups.push(Vec::new());
                groups.len() - 1
            });
            group[i] = Some(slot);
            groups[slot].push(i);
        }
    } else {
        for i in 0..n {
            if hub[i] {
                continue;
            }
            for &j in cands.sets[i].iter().filter(|&&j| j > i && !hub[j]) {
                match (group[i], group[j]) {
                    (None, None) => {
                        let slot = groups.len();
                        groups.push(vec![i, j]);
                        group[i] = Some(slot);
                        group[j] = Some(slot);
                    }
                    (Some(g), None) => {
                        if groups[g].iter().all(|&m| cands.mutual(j, m)) {
                            groups[g].push(j);
                            group[j] = Some(g);
                        }
                    }
                    (None, Some(g)) => {
                        if groups[g].iter().all(|&m| cands.mutual(i, m)) {
                            groups[g].push(i);
                            group[i] = Some(g);
                        }
                    }
                    (Some(_), Some(_)) => {}
                }
            }
        }
    }

    // Hub attachment in index order.
    for h in 0..n {
        if !hub[h] {
            continue;
        }
        // Candidates that are hubs themselves resolve on their own turn.
        let cands_of_h: Vec<usize> = cands.sets[h].iter().copied().filter(|&j| !hub[j]).collect();
        if cands_of_h.is_empty() {
            continue;
        }
        for &j in &cands_of_h {
            if group[j].is_none() {
                let slot = groups.len();
                groups.push(vec![j]);
                group[j] = Some(slot);
            }
        }
        // Distinct groups in first-candidate order with candidate counts.
        let mut targets: Vec<(usize, usize)> = Vec::new();
        for &j in &cands_of_h {
            let g = group[j].expect("hub candidates were just seeded");
            match targets.iter_mut().find(|(slot, _)| *slot == g) {
                Some((_, cnt)) => *cnt += 1,
                None => targets.push((g, 1)),
            }
        }
        if overlap == Overlap::Crisp || targets.len() == 1 {
            let (g, _) = targets[0];
            groups[g].push(h);
            group[h] = Some(g);
        } else {
            let total = cands_of_h.len() as f64;
            shared[h] = targets
                .iter()
                .map(|&(g, cnt)| (g, cnt as Share / total))
                .collect();
        }
    }

    // Second chance for stranded items: join a candidate's group when the
    // mutual-best invariant holds against all its members.
    for x in 0..n {
        if group[x].is_some() || !shared[x].is_empty() || cands.sets[x].is_empty() {
            continue;
        }
        for &j in &cands.sets[x] {
            if let Some(g) = group[j] {
                let ok = if chains {
                    true
                } else {
                    groups[g].iter().all(|&m| cands.mutual(x, m))
                };
                if ok {
                    groups[g].push(x);
                    group[x] = Some(g);
                    break;
                }
            }
        }
    }

    // Dissolve singleton seeds that no hub ended up joining.
    let mut shared_counts = vec![0usize; groups.len()];
    for memb in &shared {
        for &(g, _) in memb {
            shared_counts[g] += 1;
        }
    }
    for (g, members) in groups.iter().enumerate() {
        if members.len() == 1 && shared_counts[g] == 0 {
            group[members[0]] = None;
        }
    }

    let mut memberships: Vec<Vec<(usize, Share)>> = vec![Vec::new(); n];
    let mut live = vec![false; groups.len()];
    for i in 0..n {
        if let Some(g) = group[i] {
            memberships[i].push((g, 1.0));
            live[g] = true;
        } else if !shared[i].is_empty() {
            memberships[i].clone_from(&shared[i]);
            for &(g, _) in &shared[i] {
                live[g] = true;
            }
        }
    }
    let merges = live.iter().filter(|&&l| l).count();
    debug!(items = n, merges, "merge plan built");
    MergePlan {
        memberships,
        merges,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use rstest::rstest;

    use crate::{candidates, item::WorkLink, options::ClusterOptions};

    fn items_from_edges(n: usize, edges: &[(usize, usize, f64)], selfw: &[f64]) -> (Vec<WorkItem>, f64) {
        let mut links: Vec<Vec<WorkLink>> = vec![Vec::new(); n];
        for &(a, b, w) in edges {
            links[a].push(WorkLink { dest: b, weight: w });
            links[b].push(WorkLink { dest: a, weight: w });
        }
        let items: Vec<WorkItem> = (0..n)
            .map(|i| {
                let mut ls = links[i].clone();
                ls.sort_by_key(|ln| ln.dest);
                WorkItem {
                    id: i as u32,
                    weight: selfw.get(i).copied().unwrap_or(0.0),
                    nodes: 1.0,
                    links: ls,
                }
            })
            .collect();
        let w = items.iter().map(WorkItem::degree).sum();
        (items, w)
    }

    fn plan_for(
        n: usize,
        edges: &[(usize, usize, f64)],
        selfw: &[f64],
        overlap: Overlap,
        chains: bool,
    ) -> MergePlan {
        let (items, w) = items_from_edges(n, edges, selfw);
        let cands = candidates::select(&items, w, 1.0, 0.0, &ClusterOptions::new());
        plan(&items, &cands, overlap, chains)
    }

    fn group_of(plan: &MergePlan, item: usize) -> usize {
        assert_eq!(plan.memberships[item].len(), 1);
        plan.memberships[item][0].0
    }

    #[test]
    fn triangle_merges_into_one_group() {
        let plan = plan_for(
            3,
            &[(0, 1, 1.0), (0, 2, 1.0), (1, 2, 1.0)],
            &[],
            Overlap::Crisp,
            false,
        );
        assert_eq!(plan.merges, 1);
        let g = group_of(&plan, 0);
        assert_eq!(group_of(&plan, 1), g);
        assert_eq!(group_of(&plan, 2), g);
    }

    #[rstest]
    #[case(false)]
    #[case(true)]
    fn square_splits_into_adjacent_pairs(#[case] chains: bool) {
        // With all ties, cliques pick {0,1} and {2,3}; the chains policy
        // instead coarsens the whole cycle at once.
        let plan = plan_for(
            4,
            &[(0, 1, 1.0), (1, 2, 1.0), (2, 3, 1.0), (0, 3, 1.0)],
            &[],
            Overlap::Crisp,
            chains,
        );
        if chains {
            assert_eq!(plan.merges, 1);
        } else {
            assert_eq!(plan.merges, 2);
            assert_eq!(group_of(&plan, 0), group_of(&plan, 1));
            assert_eq!(group_of(&plan, 2), group_of(&plan, 3));
            assert_ne!(group_of(&plan, 0), group_of(&plan, 2));
        }
    }

    #[test]
    fn star_hub_is_shared_in_fuzzy_mode() {
        // Nodes 0, 1, 3 carry heavy self-weights and link only to node 2.
        let plan = plan_for(
            4,
            &[(0, 2, 1.0), (1, 2, 1.0), (2, 3, 1.0)],
            &[12.0, 12.0, 0.0, 12.0],
            Overlap::Fuzzy,
            false,
        );
        assert_eq!(plan.merges, 3);
        assert_eq!(plan.memberships[2].len(), 3);
        for &(_, share) in &plan.memberships[2] {
            assert!((share - 1.0 / 3.0).abs() < 1e-12);
        }
        let sum: f64 = plan.memberships[2].iter().map(|&(_, s)| s).sum();
        assert!((sum - 1.0).abs() < 1e-12);
    }

    #[test]
    fn star_hub_joins_smallest_group_in_crisp_mode() {
        let plan = plan_for(
            4,
            &[(0, 2, 1.0), (1, 2, 1.0), (2, 3, 1.0)],
            &[12.0, 12.0, 0.0, 12.0],
            Overlap::Crisp,
            false,
        );
        assert_eq!(plan.merges, 1);
        assert_eq!(group_of(&plan, 0), group_of(&plan, 2));
        // The remaining leaves propagate as wrappers.
        assert!(plan.memberships[1].is_empty());
        assert!(plan.memberships[3].is_empty());
    }

    #[test]
    fn tied_path_pairs_up_without_hubs() {
        // Path 0-1-2-3 with equal weights: no exclusive double dependency,
        // so greedy cliques pair the ends.
        let plan = plan_for(
            4,
            &[(0, 1, 1.0), (1, 2, 1.0), (2, 3, 1.0)],
            &[],
            Overlap::Fuzzy,
            false,
        );
        assert_eq!(plan.merges, 2);
        assert_eq!(group_of(&plan, 0), group_of(&plan, 1));
        assert_eq!(group_of(&plan, 2), group_of(&plan, 3));
    }

    #[test]
    fn items_without_candidates_propagate() {
        let plan = plan_for(3, &[(0, 1, 1.0)], &[], Overlap::Crisp, false);
        assert_eq!(plan.merges, 1);
        assert!(plan.memberships[2].is_empty());
    }
}
