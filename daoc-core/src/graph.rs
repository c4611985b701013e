//! Input graph model: typed nodes with ordered unique weighted links.
//!
//! The graph is a construction surface for the parsers and the embedding API.
//! Links are kept sorted by destination id and unique per source at all
//! times, so downstream consumers never sort. An undirected link materializes
//! both directions, each carrying half of the original weight; a directed arc
//! is stored once with its full weight; a self-link (edge or arc alike) is
//! doubled into the node self-weight. The total bidirectional weight of the
//! graph is therefore twice the plain input weight.
//!
//! Construction is input-order independent: whatever order nodes and links
//! arrive in (including the `shuffle` mode that randomizes creation order to
//! demonstrate exactly that), the per-node link sequences end up identical.

use std::collections::HashMap;

use rand::{rngs::StdRng, Rng, SeedableRng};
use tracing::debug;

use crate::{
    error::{CoreError, LinkErrors, NodeErrors, Result},
    options::{Reduction, ReductionSeverity},
    reduction,
};

/// Node identifier taken from the input network.
pub type Id = u32;
/// Storage type of a single link weight.
pub type LinkWeight = f32;
/// Accumulator type for sums of link weights.
pub type AccWeight = f64;

/// An input link handed to the graph builder.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct InpLink {
    /// Destination node id.
    pub id: Id,
    /// Link weight; 1 for unweighted networks.
    pub weight: LinkWeight,
}

impl InpLink {
    /// A link with the default unit weight.
    #[must_use]
    pub fn new(id: Id) -> Self {
        Self { id, weight: 1.0 }
    }

    /// A link with an explicit weight.
    #[must_use]
    pub fn weighted(id: Id, weight: LinkWeight) -> Self {
        Self { id, weight }
    }
}

/// A stored outbound link, ordered by destination id and unique per source.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Link {
    /// Destination node id.
    pub dest: Id,
    /// Stored weight (half of the input weight for undirected links).
    pub weight: LinkWeight,
}

/// A graph node: identity, accumulated self-weight and ordered links.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Node {
    /// Node id from the input network.
    pub id: Id,
    /// Self-weight; a self-link of weight w contributes 2w here.
    weight: AccWeight,
    /// Outbound links, sorted by `dest` and unique.
    pub links: Vec<Link>,
}

impl Node {
    fn new(id: Id) -> Self {
        Self {
            id,
            weight: 0.0,
            links: Vec::new(),
        }
    }

    /// Accumulated self-weight of the node.
    #[must_use]
    pub fn weight(&self) -> AccWeight {
        self.weight
    }

    /// Adds to the node self-weight.
    pub fn add_weight(&mut self, w: AccWeight) {
        self.weight += w;
    }
}

/// Nodes handed over by [`Graph::release`].
#[derive(Debug)]
pub struct ReleasedNodes {
    /// The graph nodes with ordered unique links.
    pub nodes: Vec<Node>,
    /// Whether any directed (asymmetric) links were added.
    pub directed: bool,
    /// Whether the graph carried explicit link weights.
    pub weighted: bool,
    /// Declared node count from the input header, 0 if unknown.
    pub declared: Id,
}

/// Input graph under construction.
#[derive(Debug)]
pub struct Graph {
    nodes: Vec<Node>,
    id_index: HashMap<Id, usize>,
    declared: Id,
    weighted: bool,
    directed: bool,
    sumdups: bool,
    reduction: Reduction,
    /// Minimal number of links each node retains under reduction; 0 disables.
    rlsmin: usize,
    rng: Option<StdRng>,
}

impl Graph {
    /// Creates a graph builder.
    ///
    /// `nodes_num` is the declared node count (0 when unknown) and is
    /// required for the link-reduction pre-pass, which also demands weighted
    /// links. `shuffle` randomizes node creation order to exercise the
    /// input-order independence of the clustering; it never influences the
    /// stored link sequences. `sumdups` accumulates weights of duplicated
    /// links instead of reporting and dropping them.
    ///
    /// # Errors
    /// Returns [`CoreError::UnsupportedReduction`] when a reduction is
    /// requested for an unweighted graph or without a declared node count.
    pub fn new(
        nodes_num: Id,
        weighted: bool,
        shuffle: bool,
        sumdups: bool,
        reduction: Reduction,
    ) -> Result<Self> {
        // Input-graph reduction folds links as they arrive, which is only
        // sound when the lightest-link margin is known up front.
        let core = Reduction {
            severity: if reduction.skip_nodes {
                None
            } else {
                reduction.severity
            },
            ..reduction
        };
        if core.enabled() && !(weighted && nodes_num > 0) {
            return Err(CoreError::UnsupportedReduction);
        }
        let rlsmin = core
            .severity
            .map_or(0, |sev| reduction::reduced_links_marg(nodes_num as usize, sev));
        Ok(Self {
            nodes: Vec::with_capacity(nodes_num as usize),
            id_index: HashMap::with_capacity(nodes_num as usize),
            declared: nodes_num,
            weighted,
            directed: false,
            sumdups,
            reduction: core,
            rlsmin,
            rng: shuffle.then(StdRng::from_entropy),
        })
    }

    /// Number of constructed nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether no nodes were constructed yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Whether any directed (asymmetric) links were added.
    #[must_use]
    pub fn directed(&self) -> bool {
        self.directed
    }

    /// Whether the graph carries explicit link weights.
    #[must_use]
    pub fn weighted(&self) -> bool {
        self.weighted
    }

    /// Whether the input links are being reduced on construction.
    #[must_use]
    pub fn reduced(&self) -> bool {
        self.rlsmin > 0
    }

    /// Declared node count from the input header, 0 if unknown.
    #[must_use]
    pub fn declared(&self) -> Id {
        self.declared
    }

    /// Immutable view of the constructed nodes.
    #[must_use]
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Looks up a node by id.
    #[must_use]
    pub fn node(&self, id: Id) -> Option<&Node> {
        self.id_index.get(&id).map(|&i| &self.nodes[i])
    }

    /// Preallocates `number` nodes with sequential ids starting at `id0`.
    ///
    /// Duplicated ids are reported into `errs` and skipped.
    pub fn add_nodes(&mut self, number: Id, id0: Id, errs: &mut NodeErrors) {
        if number == 0 {
            return;
        }
        let mut lo = id0;
        let mut hi = id0 + number;
        if let Some(mut rng) = self.rng.take() {
            // Two-ended creation order so node positions differ between runs.
            while lo != hi {
                let nid = if rng.gen::<bool>() {
                    let v = lo;
                    lo += 1;
                    v
                } else {
                    hi -= 1;
                    hi
                };
                self.add_node(nid, errs);
            }
            self.rng = Some(rng);
        } else {
            for nid in lo..hi {
                self.add_node(nid, errs);
            }
        }
    }

    /// Preallocates nodes with the given ids, reporting duplicates.
    pub fn add_node_ids(&mut self, ids: &[Id], errs: &mut NodeErrors) {
        if let Some(mut rng) = self.rng.take() {
            let mut lo = 0usize;
            let mut hi = ids.len();
            while lo != hi {
                let i = if rng.gen::<bool>() {
                    let v = lo;
                    lo += 1;
                    v
                } else {
                    hi -= 1;
                    hi
                };
                self.add_node(ids[i], errs);
            }
            self.rng = Some(rng);
        } else {
            for &nid in ids {
                self.add_node(nid, errs);
            }
        }
    }

    fn add_node(&mut self, nid: Id, errs: &mut NodeErrors) -> usize {
        match self.id_index.get(&nid) {
            Some(&idx) => {
                errs.add(nid);
                idx
            }
            None => {
                let idx = self.nodes.len();
                self.nodes.push(Node::new(nid));
                self.id_index.insert(nid, idx);
                idx
            }
        }
    }

    /// Appends a batch of links to an existing node.
    ///
    /// All endpoints must already exist. Duplicated links are summed when the
    /// graph was configured with `sumdups`, otherwise reported into `errs`
    /// and dropped. On a reduced graph this must be the single batch for the
    /// node, as the lightest links are folded into self-weights immediately.
    ///
    /// # Errors
    /// Returns [`CoreError::MissingNode`] when `src` or a link destination
    /// does not exist.
    pub fn add_node_links(
        &mut self,
        directed: bool,
        src: Id,
        mut links: Vec<InpLink>,
        errs: &mut LinkErrors,
    ) -> Result<()> {
        let src_idx = *self
            .id_index
            .get(&src)
            .ok_or(CoreError::MissingNode { src, dst: src })?;
        if self.rlsmin > 0 && directed && links.len() > self.rlsmin {
            let severity = self
                .reduction
                .severity
                .unwrap_or(ReductionSeverity::Mean);
            reduction::reduce_input_links(
                src_idx,
                &mut links,
                &mut self.nodes,
                &self.id_index,
                severity,
                self.rlsmin,
                self.sumdups,
                errs,
            )?;
        }
        for ln in links {
            self.add_link_idx(directed, src_idx, ln.id, ln.weight, errs)?;
        }
        Ok(())
    }

    /// Appends links to a node, creating any missing endpoints first.
    ///
    /// # Errors
    /// Propagates [`CoreError`] from the link insertion.
    pub fn add_node_and_links(
        &mut self,
        directed: bool,
        src: Id,
        links: Vec<InpLink>,
        errs: &mut LinkErrors,
    ) -> Result<()> {
        let mut ids = Vec::with_capacity(1 + links.len());
        ids.push(src);
        ids.extend(links.iter().map(|ln| ln.id));
        // Most endpoints usually exist already; duplicate warnings here would
        // only be noise.
        let mut nderrs = NodeErrors::new("implicit node creation");
        self.add_node_ids(&ids, &mut nderrs);
        self.add_node_links(directed, src, links, errs)
    }

    /// Adds a single link between existing nodes.
    ///
    /// # Errors
    /// Returns [`CoreError::MissingNode`] when an endpoint does not exist and
    /// [`CoreError::UnsupportedReduction`] on a reduced graph, where links
    /// can only be supplied in one batch per node.
    pub fn add_link(
        &mut self,
        directed: bool,
        src: Id,
        dst: Id,
        weight: LinkWeight,
        errs: &mut LinkErrors,
    ) -> Result<()> {
        let src_idx = *self
            .id_index
            .get(&src)
            .ok_or(CoreError::MissingNode { src, dst })?;
        if self.rlsmin > 0 && !self.nodes[src_idx].links.is_empty() {
            return Err(CoreError::UnsupportedReduction);
        }
        self.add_link_idx(directed, src_idx, dst, weight, errs)
    }

    fn add_link_idx(
        &mut self,
        directed: bool,
        src_idx: usize,
        dst: Id,
        weight: LinkWeight,
        errs: &mut LinkErrors,
    ) -> Result<()> {
        let src = self.nodes[src_idx].id;
        let dst_idx = *self
            .id_index
            .get(&dst)
            .ok_or(CoreError::MissingNode { src, dst })?;
        if dst_idx == src_idx {
            // A self-link is specified identically via an edge or an arc and
            // always doubles into the self-weight.
            let node = &mut self.nodes[src_idx];
            if node.weight() == 0.0 || self.sumdups {
                node.add_weight(AccWeight::from(weight) * 2.0);
            } else {
                errs.add(src, dst);
            }
            return Ok(());
        }
        if directed {
            insert_link(&mut self.nodes[src_idx], dst, weight, self.sumdups, errs);
            self.directed = true;
        } else {
            // Both directions at half weight keep the per-pair bidirectional
            // weight equal to the input weight.
            let half = weight / 2.0;
            insert_link(&mut self.nodes[src_idx], dst, half, self.sumdups, errs);
            let src_id = src;
            insert_link(&mut self.nodes[dst_idx], src_id, half, self.sumdups, errs);
        }
        Ok(())
    }

    /// Hands all nodes over to the caller, resetting the graph.
    #[must_use]
    pub fn release(&mut self) -> ReleasedNodes {
        debug!(
            nodes = self.nodes.len(),
            directed = self.directed,
            "releasing graph nodes"
        );
        let released = ReleasedNodes {
            nodes: std::mem::take(&mut self.nodes),
            directed: self.directed,
            weighted: self.weighted,
            declared: self.declared,
        };
        self.id_index.clear();
        self.declared = 0;
        self.directed = false;
        self.rlsmin = 0;
        self.reduction = Reduction::default();
        released
    }
}

/// Inserts `Link(dst, weight)` into the source links keeping them ordered by
/// destination id and unique; duplicates are summed or reported per policy.
pub(crate) fn insert_link(
    src: &mut Node,
    dst: Id,
    weight: LinkWeight,
    sumdups: bool,
    errs: &mut LinkErrors,
) {
    debug_assert_ne!(src.id, dst, "a non-selflink is expected");
    let links = &mut src.links;
    // Appending in id order is the dominant case for sorted inputs.
    match links.last() {
        Some(last) if last.dest < dst => links.push(Link { dest: dst, weight }),
        None => links.push(Link { dest: dst, weight }),
        _ => match links.binary_search_by_key(&dst, |ln| ln.dest) {
            Ok(pos) => {
                if sumdups {
                    links[pos].weight += weight;
                } else {
                    errs.add(src.id, dst);
                }
            }
            Err(pos) => links.insert(pos, Link { dest: dst, weight }),
        },
    }
}

/// Sorts links by destination id, collapsing duplicates.
///
/// Returns the canonical links and the destinations of the collapsed
/// duplicates (summed when `sumdups`, dropped otherwise). Used by the
/// standard validation pass to fix manually edited links.
#[must_use]
pub fn canonicalize(mut links: Vec<Link>, sumdups: bool) -> (Vec<Link>, Vec<Id>) {
    links.sort_by_key(|ln| ln.dest);
    let mut dups = Vec::new();
    let mut out: Vec<Link> = Vec::with_capacity(links.len());
    for ln in links {
        match out.last_mut() {
            Some(last) if last.dest == ln.dest => {
                if sumdups {
                    last.weight += ln.weight;
                }
                dups.push(ln.dest);
            }
            _ => out.push(ln),
        }
    }
    (out, dups)
}

#[cfg(test)]
mod tests {
    use super::*;

    use rstest::rstest;

    fn build_graph() -> Graph {
        Graph::new(0, true, false, false, Reduction::default()).expect("graph must build")
    }

    #[test]
    fn undirected_link_stores_half_weight_both_directions() {
        let mut g = build_graph();
        let mut nderrs = NodeErrors::new("test");
        let mut lnerrs = LinkErrors::new("test");
        g.add_node_ids(&[0, 1], &mut nderrs);
        g.add_node_links(false, 0, vec![InpLink::weighted(1, 3.0)], &mut lnerrs)
            .expect("links must insert");
        assert_eq!(g.node(0).expect("node 0").links, vec![Link { dest: 1, weight: 1.5 }]);
        assert_eq!(g.node(1).expect("node 1").links, vec![Link { dest: 0, weight: 1.5 }]);
        assert!(!g.directed());
    }

    #[test]
    fn self_link_doubles_into_self_weight_for_edges_and_arcs() {
        let mut g = build_graph();
        let mut nderrs = NodeErrors::new("test");
        let mut lnerrs = LinkErrors::new("test");
        g.add_node_ids(&[0, 1], &mut nderrs);
        g.add_node_links(false, 0, vec![InpLink::weighted(0, 2.0)], &mut lnerrs)
            .expect("edge self-link");
        g.add_node_links(true, 1, vec![InpLink::weighted(1, 2.0)], &mut lnerrs)
            .expect("arc self-link");
        assert_eq!(g.node(0).expect("node 0").weight(), 4.0);
        assert_eq!(g.node(1).expect("node 1").weight(), 4.0);
        // An arc elsewhere still marks the graph directed; a self-arc not.
        assert!(!g.directed());
    }

    #[rstest]
    #[case(true, 5.0)]
    #[case(false, 2.0)]
    fn duplicated_links_follow_the_sumdups_policy(#[case] sumdups: bool, #[case] expected: f32) {
        let mut g = Graph::new(0, true, false, sumdups, Reduction::default()).expect("graph");
        let mut nderrs = NodeErrors::new("test");
        let mut lnerrs = LinkErrors::new("test");
        g.add_node_ids(&[0, 1], &mut nderrs);
        g.add_node_links(true, 0, vec![InpLink::weighted(1, 2.0)], &mut lnerrs)
            .expect("first link");
        g.add_node_links(true, 0, vec![InpLink::weighted(1, 3.0)], &mut lnerrs)
            .expect("duplicate link");
        assert_eq!(g.node(0).expect("node 0").links[0].weight, expected);
        assert_eq!(lnerrs.is_empty(), sumdups);
    }

    #[test]
    fn duplicated_nodes_are_reported_not_fatal() {
        let mut g = build_graph();
        let mut nderrs = NodeErrors::new("test");
        g.add_node_ids(&[3, 3, 4], &mut nderrs);
        assert_eq!(g.len(), 2);
        assert!(!nderrs.is_empty());
    }

    #[test]
    fn missing_endpoint_is_fatal() {
        let mut g = build_graph();
        let mut nderrs = NodeErrors::new("test");
        let mut lnerrs = LinkErrors::new("test");
        g.add_node_ids(&[0], &mut nderrs);
        let err = g
            .add_node_links(true, 0, vec![InpLink::new(9)], &mut lnerrs)
            .expect_err("the destination is absent");
        assert_eq!(err.code(), crate::error::CoreErrorCode::MissingNode);
    }

    #[test]
    fn add_node_and_links_creates_missing_endpoints() {
        let mut g = build_graph();
        let mut lnerrs = LinkErrors::new("test");
        g.add_node_and_links(false, 7, vec![InpLink::new(8), InpLink::new(9)], &mut lnerrs)
            .expect("auto-added endpoints");
        assert_eq!(g.len(), 3);
        assert_eq!(g.node(7).expect("node 7").links.len(), 2);
    }

    #[test]
    fn links_stay_sorted_regardless_of_insertion_order() {
        let mut g = build_graph();
        let mut nderrs = NodeErrors::new("test");
        let mut lnerrs = LinkErrors::new("test");
        g.add_node_ids(&[0, 1, 2, 3, 4], &mut nderrs);
        g.add_node_links(
            true,
            0,
            vec![InpLink::new(4), InpLink::new(1), InpLink::new(3), InpLink::new(2)],
            &mut lnerrs,
        )
        .expect("links must insert");
        let dests: Vec<Id> = g.node(0).expect("node 0").links.iter().map(|l| l.dest).collect();
        assert_eq!(dests, vec![1, 2, 3, 4]);
    }

    #[test]
    fn shuffle_preserves_link_order_and_membership() {
        let mut plain = build_graph();
        let mut shuffled = Graph::new(0, true, true, false, Reduction::default()).expect("graph");
        for g in [&mut plain, &mut shuffled] {
            let mut nderrs = NodeErrors::new("test");
            let mut lnerrs = LinkErrors::new("test");
            g.add_nodes(16, 0, &mut nderrs);
            for i in 0..15 {
                g.add_node_links(false, i, vec![InpLink::new(i + 1)], &mut lnerrs)
                    .expect("chain link");
            }
        }
        for id in 0..16 {
            let a = plain.node(id).expect("plain node");
            let b = shuffled.node(id).expect("shuffled node");
            assert_eq!(a.links, b.links, "node #{id} links must match");
        }
    }

    #[test]
    fn release_resets_the_graph() {
        let mut g = build_graph();
        let mut nderrs = NodeErrors::new("test");
        g.add_node_ids(&[0, 1], &mut nderrs);
        let released = g.release();
        assert_eq!(released.nodes.len(), 2);
        assert!(g.is_empty());
        assert!(g.node(0).is_none());
    }

    #[test]
    fn canonicalize_sorts_and_collapses() {
        let links = vec![
            Link { dest: 3, weight: 1.0 },
            Link { dest: 1, weight: 2.0 },
            Link { dest: 3, weight: 4.0 },
        ];
        let (fixed, dups) = canonicalize(links, true);
        assert_eq!(
            fixed,
            vec![Link { dest: 1, weight: 2.0 }, Link { dest: 3, weight: 5.0 }]
        );
        assert_eq!(dups, vec![3]);
    }
}
