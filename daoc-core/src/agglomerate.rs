//! The agglomeration loop: drives candidate selection, merging and level
//! building from the base nodes until a termination condition holds.
//!
//! Every pass is a deterministic sweep over the current level in id order,
//! so for the same input graph and options the produced hierarchy is
//! byte-identical across runs and platforms, regardless of the node input
//! order.

use std::collections::{BTreeMap, HashMap};

use tracing::{debug, info, warn};

use crate::{
    candidates,
    error::{CoreError, LinkErrors, Result},
    graph::{canonicalize, Graph, Id, Node},
    hierarchy::{HierScore, Hierarchy, Level},
    item::{self, WorkItem, WorkLink},
    level,
    merger::{self, MergePlan},
    num,
    options::{ClusterOptions, Validation, GAMMA_AUTO},
};

/// Resolution schedule of the loop: static, or a multi-resolution sweep.
#[derive(Debug)]
struct GammaSchedule {
    current: f64,
    ratio: f64,
    ratio_max: f64,
    gamma_max: f64,
    dynamic: bool,
}

impl GammaSchedule {
    fn new(opts: &ClusterOptions, w: f64) -> Self {
        if opts.gamma_ratio > 0.0 {
            let auto_min = (2.0 / w).clamp(1e-6, 1e6);
            let auto_max = (w / 2.0).clamp(1e-6, 1e6);
            let gamma_min = if opts.gamma_min == GAMMA_AUTO {
                auto_min
            } else {
                opts.gamma_min.max(1e-6)
            };
            let gamma_max = if opts.gamma_max == GAMMA_AUTO {
                auto_max
            } else {
                opts.gamma_max
            };
            Self {
                current: gamma_min,
                ratio: opts.gamma_ratio,
                ratio_max: opts.gamma_ratio_max,
                gamma_max: gamma_max.max(gamma_min),
                dynamic: true,
            }
        } else {
            Self {
                current: opts.gamma,
                ratio: 0.0,
                ratio_max: 0.0,
                gamma_max: opts.gamma,
                dynamic: false,
            }
        }
    }

    /// Whether another coarsening step is available.
    fn exhausted(&self) -> bool {
        !self.dynamic || self.current >= self.gamma_max
    }

    /// Advances gamma towards the coarse bound. The step ratio anneals
    /// towards `ratio_max` near gamma = 1 and relaxes away from it.
    fn step(&mut self) {
        debug_assert!(self.dynamic);
        let eff = self.ratio + (self.ratio_max - self.ratio) / (1.0 + self.current.ln().abs());
        self.current = (self.current / eff).min(self.gamma_max);
    }
}

impl Graph {
    /// Clusters the graph, transferring its nodes into the hierarchy.
    ///
    /// # Errors
    /// Propagates validation and option errors from [`cluster`].
    pub fn build_hierarchy(&mut self, opts: &ClusterOptions) -> Result<Hierarchy> {
        let released = self.release();
        cluster(released.nodes, !released.directed, opts)
    }
}

/// Clusters the nodes into a full hierarchy.
///
/// `edges` signals symmetric link weights (an undirected input). The nodes
/// are taken over by the returned hierarchy; the links must be ordered by
/// destination id and unique, which the standard validation fixes when
/// violated.
///
/// # Errors
/// Returns [`CoreError::InvalidOption`] for inconsistent options,
/// [`CoreError::MissingNode`] for links to absent nodes,
/// [`CoreError::InconsistentLinks`] under severe validation, and
/// [`CoreError::InvariantViolation`] when an internal invariant breaks.
pub fn cluster(mut nodes: Vec<Node>, edges: bool, opts: &ClusterOptions) -> Result<Hierarchy> {
    opts.validate()?;
    if nodes.is_empty() {
        return Ok(Hierarchy {
            edges,
            ..Hierarchy::default()
        });
    }

    // Canonical item order: ascending node ids, independent of the input
    // (and of the shuffle option).
    nodes.sort_by_key(|nd| nd.id);
    let idx_of: HashMap<Id, usize> = nodes
        .iter()
        .enumerate()
        .map(|(i, nd)| (nd.id, i))
        .collect();

    validate_nodes(&mut nodes, opts.validation)?;
    let (mut frontier, w, links_num) = base_frontier(&nodes, &idx_of)?;
    debug!(nodes = nodes.len(), links = links_num, weight = w, "clustering started");

    let mut hierarchy = Hierarchy {
        nodes,
        node_owners: Vec::new(),
        levels: Vec::new(),
        score: HierScore::default(),
        edges,
    };
    if w <= 0.0 {
        // Weightless input: every node becomes its own root cluster.
        let mut next_id = 0;
        finalize_roots(&mut hierarchy, &mut frontier, &mut next_id, opts);
        hierarchy.score = HierScore {
            clusters: hierarchy.levels.iter().map(Level::pure_size).sum(),
            modularity: 0.0,
            weight: 0.0,
        };
        return Ok(hierarchy);
    }

    let mut gamma = GammaSchedule::new(opts, w);
    let margin = effective_margin(opts, links_num);
    let mut next_id: Id = 0;

    while frontier.len() > 1 {
        let bound = opts.root_bound;
        let bounded = opts.root_max > 0;
        let force_up = bounded && bound.up && frontier.len() > opts.root_max as usize;

        let cands = candidates::select(&frontier, w, gamma.current, margin, opts);
        let mut plan = merger::plan(&frontier, &cands, opts.overlap, opts.chains);

        if plan.merges == 0 {
            if force_up {
                // The bound overrides the gain margin: admit non-positive
                // gains (or non-negative only, per policy) to keep shrinking.
                let relaxed = if bound.nonnegative { 0.0 } else { f64::NEG_INFINITY };
                let relaxed_cands = candidates::select(&frontier, w, gamma.current, relaxed, opts);
                plan = merger::plan(&frontier, &relaxed_cands, opts.overlap, opts.chains);
                if plan.merges == 0 && bound.standalone {
                    plan = standalone_pairs(&frontier);
                }
                if plan.merges == 0 {
                    debug!(size = frontier.len(), "root bound unreachable, stopping");
                    break;
                }
            } else if !gamma.exhausted() {
                gamma.step();
                continue;
            } else {
                break;
            }
        }

        let built = level::build(&frontier, &plan, &mut next_id, opts.reduction);
        install_owners(&mut hierarchy, built.owners);
        frontier = built.frontier;
        hierarchy.levels.push(built.level);

        check_level(&frontier, w, gamma.current, opts, hierarchy.levels.len())?;

        if bounded && bound.down && frontier.len() <= opts.root_max as usize {
            debug!(size = frontier.len(), "root bound reached, stopping");
            break;
        }
        if !gamma.exhausted() {
            gamma.step();
        }
    }

    if hierarchy.levels.is_empty() {
        // Nothing merged at all: the nodes become their own root clusters.
        finalize_roots(&mut hierarchy, &mut frontier, &mut next_id, opts);
    }

    hierarchy.score = HierScore {
        clusters: hierarchy.levels.iter().map(Level::pure_size).sum(),
        modularity: item::modularity(&frontier, w, gamma.current),
        weight: w,
    };
    info!(
        levels = hierarchy.levels.len(),
        clusters = hierarchy.score.clusters,
        roots = hierarchy.root().len(),
        modularity = hierarchy.score.modularity,
        "hierarchy built"
    );
    Ok(hierarchy)
}

/// Per-level checks: weight conservation, the modularity range at the
/// Newman resolution, and the informative trace.
fn check_level(
    frontier: &[WorkItem],
    w: f64,
    gamma: f64,
    opts: &ClusterOptions,
    levnum: usize,
) -> Result<()> {
    let total: f64 = frontier.iter().map(WorkItem::degree).sum();
    if !num::approx_eq(total, w, frontier.len().max(1024)) {
        return Err(CoreError::InvariantViolation {
            invariant: "weight conservation",
            details: format!("level {levnum} degree sum {total} != total weight {w}"),
        });
    }
    let q = item::modularity(frontier, w, gamma);
    if gamma == 1.0 && !(-0.5 - num::eps(frontier.len())..=1.0 + num::eps(frontier.len())).contains(&q) {
        return Err(CoreError::InvariantViolation {
            invariant: "modularity range",
            details: format!("level {levnum} modularity {q} outside [-0.5, 1]"),
        });
    }
    if opts.mod_trace {
        info!(level = levnum, clusters = frontier.len(), gamma, modularity = q, "iteration");
    } else {
        debug!(level = levnum, clusters = frontier.len(), gamma, modularity = q, "iteration");
    }
    Ok(())
}

/// Installs the owner edges produced by the level builder onto the previous
/// level (or onto the nodes for the first built level).
fn install_owners(hierarchy: &mut Hierarchy, owners: Vec<Vec<crate::hierarchy::Owner>>) {
    match hierarchy.levels.last_mut() {
        None => hierarchy.node_owners = owners,
        Some(prev) => {
            for (cl, ow) in prev.clusters.iter_mut().zip(owners) {
                cl.owners = ow;
            }
        }
    }
}

/// Pairs the remaining items by descending pseudo-weight (degree, then id)
/// for the stand-alone root bounding.
fn standalone_pairs(items: &[WorkItem]) -> MergePlan {
    let mut order: Vec<usize> = (0..items.len()).collect();
    order.sort_by(|&a, &b| {
        items[b]
            .degree()
            .total_cmp(&items[a].degree())
            .then_with(|| items[a].id.cmp(&items[b].id))
    });
    let mut memberships: Vec<Vec<(usize, f64)>> = vec![Vec::new(); items.len()];
    let mut merges = 0;
    for pair in order.chunks_exact(2) {
        memberships[pair[0]].push((merges, 1.0));
        memberships[pair[1]].push((merges, 1.0));
        merges += 1;
    }
    warn!(pairs = merges, "folding stand-alone clusters towards the root");
    MergePlan { memberships, merges }
}

/// Builds a terminal level where every remaining item becomes its own root
/// cluster (used when no merges happen at all, e.g. a single node).
fn finalize_roots(
    hierarchy: &mut Hierarchy,
    frontier: &mut Vec<WorkItem>,
    next_id: &mut Id,
    opts: &ClusterOptions,
) {
    let plan = MergePlan {
        memberships: vec![Vec::new(); frontier.len()],
        merges: 0,
    };
    let mut built = level::build(frontier, &plan, next_id, opts.reduction);
    for cl in &mut built.level.clusters {
        cl.propagated = false;
    }
    install_owners(hierarchy, built.owners);
    *frontier = built.frontier;
    hierarchy.levels.push(built.level);
}

/// The minimal admissible merge gain derived from the options.
fn effective_margin(opts: &ClusterOptions, links_num: usize) -> f64 {
    if opts.gain_marg > 0.0 {
        if opts.gain_marg_div {
            opts.gain_marg / (links_num.max(1) as f64).sqrt()
        } else {
            opts.gain_marg
        }
    } else {
        // Negative margins are functionally zero: merges need a
        // non-negative gain unless a root bound overrides this.
        0.0
    }
}

/// Validates and fixes node links per the configured severity.
fn validate_nodes(nodes: &mut [Node], validation: Validation) -> Result<()> {
    if validation == Validation::None {
        return Ok(());
    }
    let mut errs = LinkErrors::new("link validation");
    for i in 0..nodes.len() {
        let nd = &nodes[i];
        let sorted = nd
            .links
            .windows(2)
            .all(|pair| pair[0].dest < pair[1].dest);
        let negative = nd.links.iter().any(|ln| ln.weight < 0.0);
        if sorted && !negative {
            continue;
        }
        if validation == Validation::Severe {
            return Err(CoreError::InconsistentLinks { node: nd.id });
        }
        let id = nd.id;
        let mut links = std::mem::take(&mut nodes[i].links);
        links.retain(|ln| {
            if ln.weight < 0.0 {
                errs.add(id, ln.dest);
                false
            } else {
                true
            }
        });
        let (fixed, dups) = canonicalize(links, true);
        for dst in dups {
            errs.add(id, dst);
        }
        nodes[i].links = fixed;
    }
    errs.drain();
    Ok(())
}

/// Converts the base nodes into working items with bidirectional link
/// weights, returning the items, the total weight W and the link count.
fn base_frontier(
    nodes: &[Node],
    idx_of: &HashMap<Id, usize>,
) -> Result<(Vec<WorkItem>, f64, usize)> {
    let n = nodes.len();
    let mut bidir: Vec<BTreeMap<usize, f64>> = vec![BTreeMap::new(); n];
    let mut links_num = 0usize;
    for (i, nd) in nodes.iter().enumerate() {
        links_num += nd.links.len();
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
    let mut items = Vec::with_capacity(n);
    let mut total = 0.0;
    for (i, nd) in nodes.iter().enumerate() {
        let links: Vec<WorkLink> = bidir[i]
            .iter()
            .map(|(&dest, &weight)| WorkLink { dest, weight })
            .collect();
        let it = WorkItem {
            id: nd.id,
            weight: nd.weight(),
            nodes: 1.0,
            links,
        };
        total += it.degree();
        items.push(it);
    }
    Ok((items, total, links_num))
}
