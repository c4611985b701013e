//! Materialization of the next hierarchy level from a merge plan.
//!
//! Clusters are created in the order their first member appears in the item
//! sequence, which pins the freshly assigned cluster ids and therefore the
//! whole downstream output. Items without any membership are lifted by
//! propagated wrapper clusters so every level remains a complete clustering.

use std::collections::BTreeMap;

use crate::{
    graph::{AccWeight, Id},
    hierarchy::{Cluster, ClusterLink, Level, Owner, Share},
    item::{WorkItem, WorkLink},
    merger::MergePlan,
    num,
    options::{Reduction, ReductionSeverity},
    reduction,
};

/// The outcome of building one level.
pub(crate) struct BuiltLevel {
    /// The new level, clusters ordered by id.
    pub level: Level,
    /// Owner edges of each item of the previous level, parallel to `items`.
    pub owners: Vec<Vec<Owner>>,
    /// Working items of the new level for the next iteration.
    pub frontier: Vec<WorkItem>,
}

/// Builds the next level from the merge plan.
///
/// `next_id` is the hierarchy-wide cluster id counter, advanced by the number
/// of created clusters (wrappers included).
pub(crate) fn build(
    items: &[WorkItem],
    plan: &MergePlan,
    next_id: &mut Id,
    reduction_opts: Reduction,
) -> BuiltLevel {
    let n = items.len();
    debug_assert_eq!(plan.memberships.len(), n);

    // Slot assignment: scan items in index order; a merge group obtains its
    // slot when its first member appears, a wrapper right at its item.
    let mut slot_of_group: BTreeMap<usize, usize> = BTreeMap::new();
    let mut wrapper_slot: Vec<Option<usize>> = vec![None; n];
    let mut propagated: Vec<bool> = Vec::new();
    for (i, memb) in plan.memberships.iter().enumerate() {
        if memb.is_empty() {
            wrapper_slot[i] = Some(propagated.len());
            propagated.push(true);
        } else {
            for &(g, _) in memb {
                slot_of_group.entry(g).or_insert_with(|| {
                    propagated.push(false);
                    propagated.len() - 1
                });
            }
        }
    }
    let slots_num = propagated.len();

    // Full memberships including wrappers, keyed by slot.
    let mut memb: Vec<Vec<(usize, Share)>> = vec![Vec::new(); n];
    for (i, m) in plan.memberships.iter().enumerate() {
        if m.is_empty() {
            let slot = wrapper_slot[i].expect("wrapper slot was just assigned");
            memb[i].push((slot, 1.0));
        } else {
            memb[i] = m.iter().map(|&(g, s)| (slot_of_group[&g], s)).collect();
        }
    }

    let mut weight = vec![0.0 as AccWeight; slots_num];
    let mut nodes_num = vec![0.0f64; slots_num];
    let mut descendants: Vec<Vec<usize>> = vec![Vec::new(); slots_num];
    for (i, item) in items.iter().enumerate() {
        for &(slot, share) in &memb[i] {
            weight[slot] += share * item.weight;
            nodes_num[slot] += share * item.nodes;
            descendants[slot].push(i);
        }
    }

    // Aggregate links: intra-group weight doubles into the cluster
    // self-weight, the rest accumulates into ordered inter-cluster links.
    let mut inter: BTreeMap<(usize, usize), AccWeight> = BTreeMap::new();
    for (a, item) in items.iter().enumerate() {
        for ln in &item.links {
            let b = ln.dest;
            if b <= a {
                continue; // each unordered pair once
            }
            for &(ga, sa) in &memb[a] {
                for &(gb, sb) in &memb[b] {
                    let wpart = sa * sb * ln.weight;
                    if ga == gb {
                        weight[ga] += 2.0 * wpart;
                    } else {
                        *inter.entry((ga.min(gb), ga.max(gb))).or_insert(0.0) += wpart;
                    }
                }
            }
        }
    }
    let mut links: Vec<Vec<ClusterLink>> = vec![Vec::new(); slots_num];
    for (&(a, b), &w) in &inter {
        links[a].push(ClusterLink { dest: b, weight: w });
        links[b].push(ClusterLink { dest: a, weight: w });
    }
    for ls in &mut links {
        ls.sort_by_key(|ln| ln.dest);
    }

    let mut level = Level::default();
    for slot in 0..slots_num {
        let id = *next_id;
        *next_id += 1;
        level.clusters.push(Cluster {
            id,
            descendants: std::mem::take(&mut descendants[slot]),
            owners: Vec::new(),
            weight: weight[slot],
            links: std::mem::take(&mut links[slot]),
            propagated: propagated[slot],
            nodes_num: nodes_num[slot],
        });
    }

    if reduction_opts.skip_nodes {
        if let Some(severity) = reduction_opts.severity {
            reduce_level(&mut level, severity);
        }
    }

    // Owner edges of the previous level items; shares equal the membership
    // shares and sum to 1 per item.
    let owners: Vec<Vec<Owner>> = memb
        .iter()
        .map(|m| {
            let mut ow: Vec<Owner> = m
                .iter()
                .map(|&(slot, share)| Owner { dest: slot, share })
                .collect();
            ow.sort_by_key(|o| o.dest);
            debug_assert!(num::approx_eq(
                ow.iter().map(|o| o.share).sum::<f64>(),
                1.0,
                ow.len()
            ));
            ow
        })
        .collect();

    let frontier = level
        .clusters
        .iter()
        .map(|cl| WorkItem {
            id: cl.id,
            weight: cl.weight,
            nodes: cl.nodes_num,
            links: cl
                .links
                .iter()
                .map(|ln| WorkLink {
                    dest: ln.dest,
                    weight: ln.weight,
                })
                .collect(),
        })
        .collect();

    BuiltLevel {
        level,
        owners,
        frontier,
    }
}

/// Folds the lightest inter-cluster links into the endpoint self-weights
/// under the same deterministic rule as the input-graph reduction. A link is
/// folded only when both endpoints select it, keeping the link lists
/// symmetric.
fn reduce_level(level: &mut Level, severity: ReductionSeverity) {
    let size = level.clusters.len();
    let folds = reduction::select_level_folds(
        size,
        |i| {
            level.clusters[i]
                .links
                .iter()
                .map(|ln| (ln.dest, ln.weight))
                .collect()
        },
        severity,
    );
    for fold in folds {
        let Ok(pos) = level.clusters[fold.src]
            .links
            .binary_search_by_key(&fold.dst, |ln| ln.dest)
        else {
            continue;
        };
        let w = level.clusters[fold.src].links.remove(pos).weight;
        if let Ok(pos) = level.clusters[fold.dst]
            .links
            .binary_search_by_key(&fold.src, |ln| ln.dest)
        {
            level.clusters[fold.dst].links.remove(pos);
        }
        level.clusters[fold.src].weight += w;
        level.clusters[fold.dst].weight += w;
    }
}
