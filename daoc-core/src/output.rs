//! Output selectors over a built hierarchy: significant (representative)
//! clusters, all distinct clusters, and per-level / custom-level views.
//!
//! Selection never mutates the hierarchy; selectors return `(level, index)`
//! handles that the printers unwrap on demand.

use std::collections::BTreeMap;

use crate::{
    graph::AccWeight,
    hierarchy::{Hierarchy, Share},
};

/// Complement of the squared inverse exponent, `1 - e^-2`.
pub const CEXPM2: f32 = 0.864_664_7;
/// Inverse golden ratio.
pub const RGOLDINV: f32 = 0.618_034;

/// Minimal root base accepted by [`SzMin::Root`].
pub const ROOT_BASE_MIN: u8 = 2;
/// Maximal root base accepted by [`SzMin::Root`].
pub const ROOT_BASE_MAX: u8 = 8;

/// Minimal size of the output clusters, absolute or derived from the number
/// of input nodes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SzMin {
    /// Absolute number of member nodes.
    Abs(u32),
    /// Binary logarithm of the number of nodes.
    Log2,
    /// Natural logarithm of the number of nodes.
    LogE,
    /// Golden-ratio logarithm of the number of nodes.
    PowGoldInv,
    /// `base`-th root of the number of nodes, base in [2, 8].
    Root(u8),
}

impl SzMin {
    /// Resolves the threshold for a network of `nodes` input nodes.
    #[must_use]
    pub fn resolve(self, nodes: usize) -> f64 {
        let n = nodes.max(1) as f64;
        match self {
            Self::Abs(v) => f64::from(v),
            Self::Log2 => n.log2(),
            Self::LogE => n.ln(),
            Self::PowGoldInv => n.ln() / (1.0 / f64::from(RGOLDINV)).ln(),
            Self::Root(base) => n.powf(1.0 / f64::from(base.clamp(ROOT_BASE_MIN, ROOT_BASE_MAX))),
        }
    }
}

/// Options of the significant-cluster selection.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SignifOptions {
    /// Emit only clusters having at most a single owner (`S` variant).
    pub single_owner: bool,
    /// Require any one owner to satisfy the constraints (`s`); otherwise all
    /// owners must (`a`, the strictest).
    pub any_owner: bool,
    /// Compare against the direct owners only (`d`) instead of the whole
    /// owner hierarchy (`h`).
    pub direct: bool,
    /// Allowed density drop relative to the owner, multiplier >= 0;
    /// 1 keeps the density non-decreasing, 0 admits any density.
    pub densdrop: f32,
    /// Bound the density drop linearly from 1 at the root level down to
    /// `densdrop` at the bottom level.
    pub densbound: bool,
    /// Weight step ratio in (0, 1]: a descendant must weigh at least
    /// `wrstep` of its owner; 1 admits any weight.
    pub wrstep: f32,
    /// Treat `wrstep` as the range `[1 - wrstep, wrstep]` of the owner
    /// weight, `wrstep` in (0.5, 1).
    pub wrange: bool,
    /// Minimal number of member nodes of non-root output clusters.
    pub szmin: SzMin,
}

impl Default for SignifOptions {
    fn default() -> Self {
        // The recommended default: single owner satisfied, direct owners.
        Self {
            single_owner: false,
            any_owner: true,
            direct: true,
            densdrop: 1.0,
            densbound: false,
            wrstep: 1.0,
            wrange: false,
            szmin: SzMin::Abs(3),
        }
    }
}

/// A selected cluster handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Selected {
    /// Level index, 0 for the bottom.
    pub level: usize,
    /// Cluster index within the level.
    pub index: usize,
}

/// Selects the significant (representative) clusters top-down.
///
/// Root clusters are always representative. A descendant is emitted iff its
/// density and weight satisfy the configured constraints against its owners
/// (any one or all of them; direct or transitive) and it is large enough.
/// Propagated wrappers are never emitted; traversal descends through them.
#[must_use]
pub fn significant_clusters(hier: &Hierarchy, opts: &SignifOptions) -> Vec<Selected> {
    let levels = hier.levels();
    if levels.is_empty() {
        return Vec::new();
    }
    let top = levels.len() - 1;
    let szmin = opts.szmin.resolve(hier.nodes().len());
    let mut selected = Vec::new();

    for (levi, lev) in levels.iter().enumerate().rev() {
        for (ci, cl) in lev.clusters.iter().enumerate() {
            if cl.propagated {
                continue;
            }
            if levi == top || cl.owners.is_empty() {
                selected.push(Selected { level: levi, index: ci });
                continue;
            }
            if opts.single_owner && cl.owners.len() > 1 {
                continue;
            }
            if cl.nodes_num < szmin {
                continue;
            }
            let densdrop = effective_densdrop(opts, levi, top);
            let satisfied = |owner_weight: AccWeight, owner_density: f64| {
                let dens_ok = cl.density() >= f64::from(densdrop) * owner_density;
                let weight_ok = if opts.wrange {
                    cl.weight >= f64::from(1.0 - opts.wrstep) * owner_weight
                        && cl.weight <= f64::from(opts.wrstep) * owner_weight
                } else {
                    cl.weight >= f64::from(opts.wrstep) * owner_weight
                };
                dens_ok && weight_ok
            };
            let owners = owner_metrics(hier, levi, ci, opts.direct);
            let ok = if opts.any_owner {
                owners.iter().any(|&(w, d)| satisfied(w, d))
            } else {
                owners.iter().all(|&(w, d)| satisfied(w, d))
            };
            if ok {
                selected.push(Selected { level: levi, index: ci });
            }
        }
    }
    selected
}

/// Density drop threshold at `levi`, linearly bounded towards the top level
/// when requested.
fn effective_densdrop(opts: &SignifOptions, levi: usize, top: usize) -> f32 {
    if opts.densbound && top > 0 {
        let depth = (top - levi) as f32 / top as f32;
        1.0 - depth * (1.0 - opts.densdrop)
    } else {
        opts.densdrop
    }
}

/// Weight/density pairs of the direct or transitive owners of a cluster,
/// looking through propagated wrappers.
fn owner_metrics(hier: &Hierarchy, level: usize, index: usize, direct: bool) -> Vec<(AccWeight, f64)> {
    let mut metrics = Vec::new();
    let mut frontier = vec![(level, index)];
    while let Some((levi, ci)) = frontier.pop() {
        for ow in &hier.levels()[levi].clusters[ci].owners {
            let owner = &hier.levels()[levi + 1].clusters[ow.dest];
            if owner.propagated {
                // Look through the wrapper to the next real owner.
                frontier.push((levi + 1, ow.dest));
                continue;
            }
            metrics.push((owner.weight, owner.density()));
            if !direct {
                frontier.push((levi + 1, ow.dest));
            }
        }
    }
    metrics
}

/// Lists every distinct cluster once, skipping propagated wrappers.
#[must_use]
pub fn all_distinct_clusters(hier: &Hierarchy) -> Vec<Selected> {
    let mut selected = Vec::new();
    for (levi, lev) in hier.levels().iter().enumerate() {
        for (ci, cl) in lev.clusters.iter().enumerate() {
            if !cl.propagated {
                selected.push(Selected { level: levi, index: ci });
            }
        }
    }
    selected
}

/// Margin interpretation of the custom-level selection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LevMarg {
    /// No margins: enumerate every level.
    #[default]
    None,
    /// Margins bound the number of clusters on the level.
    ClsNum,
    /// Margins are level indices counted from the bottom.
    LevId,
    /// Margins count multiplicative steps of the bottom level size.
    LevStepNum,
}

/// Options of the per-level and custom-level selection.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CustomLevsOptions {
    /// Margin interpretation.
    pub levmarg: LevMarg,
    /// Lower margin; 0 disables it.
    pub margmin: u32,
    /// Upper margin; `u32::MAX` disables it.
    pub margmax: u32,
    /// Multiplicative thinning step in (0, 1); 0 disables thinning: a level
    /// is kept only when its size dropped to this ratio of the previously
    /// kept level.
    pub step_ratio: f32,
}

impl Default for CustomLevsOptions {
    fn default() -> Self {
        Self {
            levmarg: LevMarg::None,
            margmin: 0,
            margmax: u32::MAX,
            step_ratio: 0.0,
        }
    }
}

/// Selects the level indices (bottom-up) satisfying the custom-level
/// options.
#[must_use]
pub fn custom_levels(hier: &Hierarchy, opts: &CustomLevsOptions) -> Vec<usize> {
    let sizes: Vec<usize> = hier.levels().iter().map(|lev| lev.fullsize()).collect();
    if sizes.is_empty() {
        return Vec::new();
    }
    let in_margins = |levi: usize| -> bool {
        match opts.levmarg {
            LevMarg::None => true,
            LevMarg::LevId => levi >= opts.margmin as usize && levi <= opts.margmax as usize,
            LevMarg::ClsNum => {
                let size = sizes[levi] as u32;
                size >= opts.margmin && size <= opts.margmax
            }
            LevMarg::LevStepNum => {
                if opts.step_ratio <= 0.0 {
                    return true;
                }
                let bound =
                    sizes[0] as f64 * f64::from(opts.step_ratio).powi(opts.margmin as i32);
                (sizes[levi] as f64) <= bound
            }
        }
    };

    let mut kept = Vec::new();
    let mut size_marg = f64::INFINITY;
    for (levi, &size) in sizes.iter().enumerate() {
        if !in_margins(levi) {
            continue;
        }
        if opts.step_ratio > 0.0 && opts.step_ratio < 1.0 {
            if (size as f64) > size_marg {
                continue;
            }
            size_marg = size as f64 * f64::from(opts.step_ratio);
        }
        kept.push(levi);
    }
    // The top selected level is always reported so the view reaches the
    // coarsest admissible resolution.
    if let Some(top) = (0..sizes.len()).rev().find(|&l| in_margins(l)) {
        if kept.last() != Some(&top) {
            kept.push(top);
        }
    }
    kept
}

/// Selects the single level whose cluster count is closest to `clsnum`
/// (the `~<clsnum>` form); ties resolve to the finer level.
#[must_use]
pub fn approx_level(hier: &Hierarchy, clsnum: u32) -> Option<usize> {
    let sizes: Vec<usize> = hier.levels().iter().map(|lev| lev.fullsize()).collect();
    sizes
        .iter()
        .enumerate()
        .min_by_key(|&(_, &size)| (size as i64 - i64::from(clsnum)).unsigned_abs())
        .map(|(levi, _)| levi)
}

/// Restricts unwrapped cluster members to the owner holding the maximum
/// share of each node, simplifying fuzzy overlaps.
///
/// Takes `(handle, members)` pairs as produced by [`Hierarchy::unwrap`] and
/// drops every node entry that is not the node's maximal share; ties keep
/// the first handle in the input order.
#[must_use]
pub fn max_share_filter(
    clusters: Vec<(Selected, BTreeMap<usize, Share>)>,
) -> Vec<(Selected, BTreeMap<usize, Share>)> {
    let mut best: BTreeMap<usize, (usize, Share)> = BTreeMap::new();
    for (pos, (_, members)) in clusters.iter().enumerate() {
        for (&node, &share) in members {
            match best.get(&node) {
                Some(&(_, s)) if s >= share => {}
                _ => {
                    best.insert(node, (pos, share));
                }
            }
        }
    }
    clusters
        .into_iter()
        .enumerate()
        .map(|(pos, (sel, members))| {
            let members = members
                .into_iter()
                .filter(|&(node, _)| best[&node].0 == pos)
                .collect();
            (sel, members)
        })
        .collect()
}
