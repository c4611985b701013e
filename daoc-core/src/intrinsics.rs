//! Intrinsic quality measures of a flat clustering over a graph.
//!
//! Evaluates conductance, modularity at a requested resolution, and the
//! expected static (Newman) resolution with its modularity, for clusterings
//! loaded from a file rather than produced by the engine. Fuzzy memberships
//! are honoured through the member shares.

use std::collections::HashMap;

use tracing::debug;

use crate::{
    error::{CoreError, Result},
    graph::{Id, Node},
    hierarchy::Share,
};

/// Selection of the measures to evaluate.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IntrinsicsFlags {
    /// Evaluate the mean conductance.
    pub conductance: bool,
    /// Evaluate modularity at the requested gamma.
    pub modularity: bool,
    /// Evaluate the expected static (Newman) gamma and its modularity.
    pub gamma: bool,
}

impl IntrinsicsFlags {
    /// All measures enabled.
    #[must_use]
    pub fn all() -> Self {
        Self {
            conductance: true,
            modularity: true,
            gamma: true,
        }
    }

    /// Whether any measure is requested.
    #[must_use]
    pub fn any(&self) -> bool {
        self.conductance || self.modularity || self.gamma
    }
}

/// Evaluated intrinsic measures.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Intrinsics {
    /// Mean conductance over the clusters.
    pub conductance: f64,
    /// Modularity at the requested gamma.
    pub modularity: f64,
    /// Expected static (Newman) gamma of the clustering.
    pub gamma: f64,
    /// Modularity at the expected gamma.
    pub gamma_modularity: f64,
    /// The number of evaluated clusters.
    pub clusters: usize,
}

/// Per-cluster aggregates shared by the measures.
struct ClusterAgg {
    /// Internal weight (share-scaled self-weights plus doubled intra links).
    internal: f64,
    /// Share-weighted degree sum of the members.
    degree: f64,
}

/// Evaluates the requested measures of `clusters` over `nodes`.
///
/// Each cluster lists `(node id, share)` members; a share of 1 denotes full
/// membership. Shares of an overlapping node are expected to sum to 1
/// across its clusters.
///
/// # Errors
/// Returns [`CoreError::MissingNode`] when a member id is absent from the
/// graph.
pub fn intrinsic_measures(
    nodes: &[Node],
    clusters: &[Vec<(Id, Share)>],
    gamma: f64,
    flags: IntrinsicsFlags,
) -> Result<Intrinsics> {
    let idx_of: HashMap<Id, usize> = nodes
        .iter()
        .enumerate()
        .map(|(i, nd)| (nd.id, i))
        .collect();

    // Bidirectional weights and degrees of the nodes.
    let mut bidir: Vec<HashMap<usize, f64>> = vec![HashMap::new(); nodes.len()];
    for (i, nd) in nodes.iter().enumerate() {
        for ln in &nd.links {
            let j = *idx_of.get(&ln.dest).ok_or(CoreError::MissingNode {
                src: nd.id,
                dst: ln.dest,
            })?;
            let w = f64::from(ln.weight);
            *bidir[i].entry(j).or_insert(0.0) += w;
            *bidir[j].entry(i).or_insert(0.0) += w;
        }
    }
    let degrees: Vec<f64> = nodes
        .iter()
        .enumerate()
        .map(|(i, nd)| nd.weight() + bidir[i].values().sum::<f64>())
        .collect();
    let w: f64 = degrees.iter().sum();
    if w <= 0.0 || clusters.is_empty() {
        return Ok(Intrinsics::default());
    }

    let mut aggs = Vec::with_capacity(clusters.len());
    for members in clusters {
        let mut resolved = Vec::with_capacity(members.len());
        for &(id, share) in members {
            let idx = *idx_of
                .get(&id)
                .ok_or(CoreError::MissingNode { src: id, dst: id })?;
            resolved.push((idx, share));
        }
        let mut internal: f64 = resolved
            .iter()
            .map(|&(idx, share)| share * nodes[idx].weight())
            .sum();
        for (p, &(a, sa)) in resolved.iter().enumerate() {
            for &(b, sb) in &resolved[p + 1..] {
                if let Some(&wab) = bidir[a].get(&b) {
                    internal += 2.0 * sa * sb * wab;
                }
            }
        }
        let degree: f64 = resolved.iter().map(|&(idx, s)| s * degrees[idx]).sum();
        aggs.push(ClusterAgg { internal, degree });
    }

    let modularity_at = |g: f64| -> f64 {
        aggs.iter()
            .map(|agg| (g * agg.internal - agg.degree * agg.degree / w) / w)
            .sum()
    };

    let mut out = Intrinsics {
        clusters: aggs.len(),
        ..Intrinsics::default()
    };
    if flags.conductance {
        let mut sum = 0.0;
        for agg in &aggs {
            let cut = (agg.degree - agg.internal).max(0.0);
            let denom = agg.degree.min(w - agg.degree);
            sum += if denom > 0.0 { cut / denom } else { 0.0 };
        }
        out.conductance = sum / aggs.len() as f64;
    }
    if flags.modularity {
        out.modularity = modularity_at(gamma);
    }
    if flags.gamma {
        let (g, q) = newman_gamma(&aggs, w, &modularity_at);
        out.gamma = g;
        out.gamma_modularity = q;
    }
    debug!(clusters = out.clusters, "intrinsic measures evaluated");
    Ok(out)
}

/// The expected static resolution of the clustering per the planted
/// partition maximum-likelihood equivalence, with its modularity.
fn newman_gamma(aggs: &[ClusterAgg], w: f64, modularity_at: &dyn Fn(f64) -> f64) -> (f64, f64) {
    let m = w / 2.0;
    let m_in: f64 = aggs.iter().map(|a| a.internal).sum::<f64>() / 2.0;
    let e_in: f64 = aggs
        .iter()
        .map(|a| a.degree * a.degree / (2.0 * w))
        .sum::<f64>();
    if e_in <= 0.0 || e_in >= m || m_in <= 0.0 || m_in >= m {
        return (1.0, modularity_at(1.0));
    }
    let win = m_in / e_in;
    let wout = (m - m_in) / (m - e_in);
    if win <= 0.0 || wout <= 0.0 || (win - wout).abs() < f64::EPSILON {
        return (1.0, modularity_at(1.0));
    }
    let gamma = (win - wout) / (win.ln() - wout.ln());
    (gamma, modularity_at(gamma))
}
