//! Reduction of insignificant links into node self-weights.
//!
//! The lightest links of a node are redistributed into the self-weights of
//! their endpoints until a minimum retained count is reached. Links are
//! ranked by ascending weight and the fold boundary is determined by a
//! monotone heavy/light accumulation rule: the retained heavy tail
//! accumulates with the severity-specific ratio function and the reduced
//! light head must stay strictly below that accumulation. The boundary is
//! finally rolled back over equal weights, so the decision never depends on
//! the input order of the links.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::{
    error::{CoreError, LinkErrors, Result},
    graph::{AccWeight, Id, InpLink, Node},
    num,
    options::ReductionSeverity,
};

/// Ratio of the heavy-link weight drop permitted below the heaviest link.
fn head_drop_ratio(severity: ReductionSeverity) -> AccWeight {
    match severity {
        ReductionSeverity::Severe => 0.85,
        _ => 0.5,
    }
}

/// Weight ratio of the `i`-th retained heavy link, `i >= 1`.
fn heavy_ratio(severity: ReductionSeverity, i: usize, lsnum: usize, rlsmin: usize) -> AccWeight {
    match severity {
        ReductionSeverity::Severe => {
            (i as AccWeight / (rlsmin as AccWeight + 2.0 * ((lsnum - rlsmin) as AccWeight).sqrt()))
                .min(1.0)
        }
        _ => 2.0 * i as AccWeight / (lsnum as AccWeight - 2.0),
    }
}

/// Minimal number of links a node retains after the reduction.
///
/// Scales with the logarithm of the declared graph size; lower severity
/// keeps more links.
#[must_use]
pub fn reduced_links_marg(nodes_num: usize, severity: ReductionSeverity) -> usize {
    let base = ((nodes_num + 1) as f64).log2().ceil() as usize;
    let marg = match severity {
        ReductionSeverity::Accurate => 4 * base,
        ReductionSeverity::Mean => 2 * base,
        ReductionSeverity::Severe => base,
    };
    marg.max(3)
}

/// Selects the fold boundary: the number of leading (lightest) links of the
/// weight-sorted `weights` to fold, following the heavy/light accumulation
/// rule. `self_marker` flags self-links, which are skipped while collecting
/// the heavy tail.
fn fold_boundary(
    weights: &[AccWeight],
    self_marker: &[bool],
    severity: ReductionSeverity,
    rlsmin: usize,
) -> usize {
    let lsnum = weights.len();
    let accurate = severity == ReductionSeverity::Accurate;
    let rwh = head_drop_ratio(severity);

    let mut ih = lsnum;
    let mut wh0d = 0.0;
    let mut wcur = 0.0;
    let mut wh = 0.0;
    let mut hnum = 0usize;
    let mut skips = 0usize;

    // Take the heavy tail with two distinct weights, skipping self-links.
    let mut i = 0usize;
    let mut j = 0usize;
    while (i < rlsmin + skips || j < 2) && i < lsnum {
        ih -= 1;
        if !self_marker[ih] {
            let w = weights[ih];
            if !accurate && wh != 0.0 {
                // The accurate policy uses only the highest weight as the
                // margin instead of the sliding accumulation.
                hnum += 1;
                wh += w * heavy_ratio(severity, hnum, lsnum, rlsmin);
            } else if wh == 0.0 {
                wh = w;
                wcur = w;
                wh0d = w * rwh;
            }
            if num::lt(w, wcur, lsnum) {
                wcur = w;
                j += 1;
            }
        } else {
            skips += 1;
        }
        i += 1;
    }

    // Early exit when even the lightest link is permanently retained.
    if !num::lt(weights[0], wh0d.min(weights[ih]), lsnum) {
        return 0;
    }

    let mut il = 0usize;
    let mut wl = 0.0;
    if accurate {
        while num::lt(wl, wh * rwh, lsnum) && wl < wh && il != ih {
            wl += weights[il];
            il += 1;
        }
    } else {
        while il != ih {
            // Tail links above half of the head weight are never folded.
            wcur = wh0d.min(weights[ih]);
            while il != ih && num::lt(weights[il], wcur, lsnum) && wl < wh {
                wl += weights[il];
                il += 1;
            }
            if !num::lt(wl, wh, lsnum) {
                break;
            }
            if il != ih {
                ih -= 1;
                if !self_marker[ih] {
                    hnum += 1;
                    wh += weights[ih] * heavy_ratio(severity, hnum, lsnum, rlsmin);
                }
            }
        }
    }

    // Roll the boundary back over equal weights so the reduction does not
    // depend on the order of equally weighted links.
    wcur = weights[il];
    while il != 0 {
        il -= 1;
        if num::lt(weights[il], wcur, lsnum) {
            break;
        }
    }
    if il == 0 {
        return 0;
    }
    il + 1
}

/// Reduces the input links of a node before they are inserted into the
/// graph, moving the folded weights into the endpoint self-weights.
///
/// Applicable only to weighted directed input links; the caller guarantees
/// `links.len() > rlsmin`.
///
/// # Errors
/// Returns [`CoreError::MissingNode`] when a folded link points to a node
/// absent from `id_index`.
#[allow(clippy::too_many_arguments)]
pub(crate) fn reduce_input_links(
    src_idx: usize,
    links: &mut Vec<InpLink>,
    nodes: &mut [Node],
    id_index: &HashMap<Id, usize>,
    severity: ReductionSeverity,
    rlsmin: usize,
    sumdups: bool,
    errs: &mut LinkErrors,
) -> Result<()> {
    debug_assert!(rlsmin > 0 && links.len() > rlsmin, "redundant reduction call");
    let sid = nodes[src_idx].id;
    links.sort_by(|a, b| {
        a.weight
            .total_cmp(&b.weight)
            .then_with(|| a.id.cmp(&b.id))
    });

    let weights: Vec<AccWeight> = links.iter().map(|ln| AccWeight::from(ln.weight)).collect();
    let self_marker: Vec<bool> = links.iter().map(|ln| ln.id == sid).collect();
    let bound = fold_boundary(&weights, &self_marker, severity, rlsmin);
    if bound == 0 {
        return Ok(());
    }

    let mut seen = HashSet::new();
    for ln in &links[..bound] {
        if !sumdups && !seen.insert(ln.id) {
            errs.add(sid, ln.id);
            continue;
        }
        let w = AccWeight::from(ln.weight);
        if ln.id != sid {
            let dest_idx = *id_index.get(&ln.id).ok_or(CoreError::MissingNode {
                src: sid,
                dst: ln.id,
            })?;
            // An arc splits between the endpoints; the complementary arc of
            // the pair folds the other half on the destination side.
            let half = w / 2.0;
            nodes[src_idx].add_weight(half);
            nodes[dest_idx].add_weight(half);
        } else {
            nodes[src_idx].add_weight(w * 2.0);
        }
    }
    debug!(node = sid, folded = bound, total = links.len(), "reduced input links");
    links.drain(..bound);
    Ok(())
}

/// A fold decision for a symmetric cluster-level link.
pub(crate) struct LevelFold {
    /// Index of the link owner within the level.
    pub src: usize,
    /// Index of the link destination within the level.
    pub dst: usize,
}

/// Selects cluster-level links to fold under the `SKIP_NODES` reduction.
///
/// `links_of` yields `(dest, bidirectional weight)` pairs per cluster. A link
/// is folded only when both endpoints independently select it, keeping the
/// level link lists symmetric.
pub(crate) fn select_level_folds(
    level_size: usize,
    links_of: impl Fn(usize) -> Vec<(usize, AccWeight)>,
    severity: ReductionSeverity,
) -> Vec<LevelFold> {
    let rlsmin = reduced_links_marg(level_size, severity);
    let mut chosen: HashSet<(usize, usize)> = HashSet::new();
    let mut folds = Vec::new();
    for src in 0..level_size {
        let mut links = links_of(src);
        if links.len() <= rlsmin {
            continue;
        }
        links.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        let weights: Vec<AccWeight> = links.iter().map(|l| l.1).collect();
        let self_marker = vec![false; links.len()];
        let bound = fold_boundary(&weights, &self_marker, severity, rlsmin);
        for &(dst, _) in &links[..bound] {
            let key = (src.min(dst), src.max(dst));
            if !chosen.insert(key) {
                // The partner already selected it; both agree, fold it.
                folds.push(LevelFold {
                    src: key.0,
                    dst: key.1,
                });
            }
        }
    }
    folds
}

#[cfg(test)]
mod tests {
    use super::*;

    use rstest::rstest;

    use crate::error::NodeErrors;
    use crate::graph::Graph;
    use crate::options::Reduction;

    #[rstest]
    #[case(ReductionSeverity::Accurate, 1000, 40)]
    #[case(ReductionSeverity::Mean, 1000, 20)]
    #[case(ReductionSeverity::Severe, 1000, 10)]
    #[case(ReductionSeverity::Severe, 1, 3)]
    fn retained_count_scales_with_size_and_severity(
        #[case] severity: ReductionSeverity,
        #[case] nodes: usize,
        #[case] expected: usize,
    ) {
        assert_eq!(reduced_links_marg(nodes, severity), expected);
    }

    #[test]
    fn equal_weights_are_never_partially_folded() {
        let weights = vec![1.0; 20];
        let self_marker = vec![false; 20];
        assert_eq!(
            fold_boundary(&weights, &self_marker, ReductionSeverity::Mean, 3),
            0
        );
    }

    #[test]
    fn light_head_folds_below_the_heavy_tail() {
        // Two decades between the light head and the heavy tail.
        let mut weights: Vec<AccWeight> = vec![0.01; 12];
        weights.extend([1.0, 1.5, 2.0, 2.5]);
        let self_marker = vec![false; weights.len()];
        let bound = fold_boundary(&weights, &self_marker, ReductionSeverity::Mean, 3);
        assert!(bound >= 12 && bound < weights.len(), "bound = {bound}");
    }

    #[test]
    fn reduction_preserves_total_bidirectional_weight() {
        // A hub with many light arcs plus their complements, so both halves
        // of each pair fold symmetrically.
        let n: u32 = 24;
        let mut g = Graph::new(
            n + 1,
            true,
            false,
            false,
            Reduction {
                severity: Some(ReductionSeverity::Severe),
                ..Reduction::default()
            },
        )
        .expect("reduced graph must build");
        assert!(g.reduced());
        let mut nderrs = NodeErrors::new("test");
        let mut lnerrs = LinkErrors::new("test");
        g.add_nodes(n + 1, 0, &mut nderrs);
        let hub_links: Vec<InpLink> = (1..=n)
            .map(|i| InpLink::weighted(i, if i <= 16 { 0.001 } else { 4.0 + i as f32 }))
            .collect();
        let total_inp: AccWeight = hub_links.iter().map(|l| AccWeight::from(l.weight)).sum();
        g.add_node_links(true, 0, hub_links.clone(), &mut lnerrs)
            .expect("hub links");
        for ln in &hub_links {
            g.add_node_links(true, ln.id, vec![InpLink::weighted(0, ln.weight)], &mut lnerrs)
                .expect("complement arc");
        }
        let released = g.release();
        let mut w: AccWeight = 0.0;
        for nd in &released.nodes {
            w += nd.weight();
            w += nd.links.iter().map(|l| AccWeight::from(l.weight)).sum::<AccWeight>();
        }
        let expected = 2.0 * total_inp;
        assert!(
            (w - expected).abs() < 1e-9 * expected,
            "bidirectional weight drifted: {w} vs {expected}"
        );
        // Something must actually have been folded.
        let hub = released
            .nodes
            .iter()
            .find(|nd| nd.id == 0)
            .expect("hub node");
        assert!(hub.links.len() < n as usize);
        assert!(hub.weight() > 0.0);
    }

    #[test]
    fn level_folds_require_agreement_of_both_endpoints() {
        // The hub cluster selects its light links, but every partner is
        // below the reduction margin and selects nothing, so no link folds.
        let hub: Vec<(usize, AccWeight)> = (1..=24)
            .map(|d| (d, if d <= 16 { 0.001 } else { 4.0 + d as AccWeight }))
            .collect();
        let folds = select_level_folds(
            25,
            |i| {
                if i == 0 {
                    hub.clone()
                } else {
                    vec![(0, hub[i - 1].1)]
                }
            },
            ReductionSeverity::Severe,
        );
        assert!(folds.is_empty());
    }
}
