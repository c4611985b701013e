//! Node-vectorization printer: projects nodes onto the significant clusters
//! (dimensions) of the hierarchy.
//!
//! The output carries a header with the node and dimension counts, the
//! value encoding, the compression mode, the minimal output value and the
//! numbered flag; one line per dimension listing `nid[:encoded]`
//! projections; and a footer listing per-dimension metadata
//! `id#level%rdens/rweight:wsim-wdis[!root]`.

use std::collections::BTreeMap;
use std::io::Write;

use daoc_core::{Hierarchy, Selected, Share};

use crate::error::PrintResult;

/// Value encoding of the node projections.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum NodeVecValue {
    /// Presence bit: a node is listed when its projection reaches 0.5.
    Bit,
    /// 8-bit quantized projection.
    #[default]
    Uint8,
    /// 16-bit quantized projection.
    Uint16,
    /// Raw 32-bit float projection.
    Float32,
}

impl NodeVecValue {
    /// Lowercase name used in the output header.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bit => "bit",
            Self::Uint8 => "uint8",
            Self::Uint16 => "uint16",
            Self::Float32 => "float32",
        }
    }
}

/// Dimension compression mode.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum NodeVecCompression {
    /// Keep all selected dimensions.
    #[default]
    None,
    /// Accurate compression of near-duplicate dimensions.
    Accurate,
    /// Severe compression retaining the strongest dimensions only.
    Severe,
}

impl NodeVecCompression {
    /// Lowercase name used in the output header.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Accurate => "accurate",
            Self::Severe => "severe",
        }
    }
}

/// Options of the node-vectorization output.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NodeVecOptions {
    /// Value encoding of the projections.
    pub value: NodeVecValue,
    /// Dimension compression mode (recorded in the header).
    pub compression: NodeVecCompression,
    /// Minimal projection value emitted.
    pub valmin: f32,
    /// Number the dimension lines with the cluster ids.
    pub numbered: bool,
    /// Declared number of nodes; the actual count is used when larger.
    pub dclnds: u32,
}

impl Default for NodeVecOptions {
    fn default() -> Self {
        Self {
            value: NodeVecValue::default(),
            compression: NodeVecCompression::default(),
            valmin: 0.0,
            numbered: false,
            dclnds: 0,
        }
    }
}

/// Printer of node vectors over selected dimensions.
#[derive(Debug)]
pub struct NodeVecPrinter<'a> {
    hier: &'a Hierarchy,
}

impl<'a> NodeVecPrinter<'a> {
    /// Creates a printer over the hierarchy.
    #[must_use]
    pub fn new(hier: &'a Hierarchy) -> Self {
        Self { hier }
    }

    /// Prints the dimensions with their member projections.
    ///
    /// `dims` pairs each selected cluster with its unwrapped members; the
    /// accumulated member share is the projection value.
    ///
    /// # Errors
    /// Returns [`PrintError`](crate::PrintError) when writing fails.
    pub fn print<W: Write>(
        &self,
        out: &mut W,
        dims: &[(Selected, BTreeMap<usize, Share>)],
        opts: &NodeVecOptions,
    ) -> PrintResult<()> {
        let top = self.hier.levels().len().saturating_sub(1);
        let rootdims = dims.iter().filter(|(sel, _)| sel.level == top).count();
        let nodes = (self.hier.nodes().len() as u32).max(opts.dclnds);
        writeln!(
            out,
            "# Nodes: {nodes}, Dimensions: {}, Rootdims: {rootdims}, Value: {}, Compression: {}, Valmin: {}, Numbered: {}",
            dims.len(),
            opts.value.as_str(),
            opts.compression.as_str(),
            opts.valmin,
            u8::from(opts.numbered),
        )?;

        for (sel, members) in dims {
            if opts.numbered {
                write!(out, "{}> ", self.hier.cluster(sel.level, sel.index).id)?;
            }
            let mut first = true;
            for (&node, &share) in members {
                if share < f64::from(opts.valmin) {
                    continue;
                }
                let id = self.hier.nodes()[node].id;
                let token = encode(id, share, opts);
                if let Some(token) = token {
                    if !first {
                        write!(out, " ")?;
                    }
                    first = false;
                    write!(out, "{token}")?;
                }
            }
            writeln!(out)?;
        }

        // Per-dimension metadata footer.
        write!(out, "# Diminfo>")?;
        for (sel, _) in dims {
            let cl = self.hier.cluster(sel.level, sel.index);
            let (rdens, rweight) = self.owner_ratios(sel);
            let desrank = sel.level + 1;
            let orank = top - sel.level;
            let wsim = (desrank as f64).powf(-1.0 / 3.0);
            let wdis = 1.0 / ((orank + 1) as f64).sqrt();
            write!(
                out,
                " {}#{}%{rdens}/{rweight}:{wsim}-{wdis}",
                cl.id, sel.level
            )?;
            if cl.owners.is_empty() {
                write!(out, "!")?;
            }
        }
        writeln!(out)?;
        Ok(())
    }

    /// Density and weight ratios of a dimension relative to its first
    /// owner; 1 for root clusters.
    fn owner_ratios(&self, sel: &Selected) -> (f64, f64) {
        let cl = self.hier.cluster(sel.level, sel.index);
        let Some(owner) = cl.owners.first() else {
            return (1.0, 1.0);
        };
        let owner = &self.hier.levels()[sel.level + 1].clusters[owner.dest];
        let rdens = if owner.density() > 0.0 {
            cl.density() / owner.density()
        } else {
            1.0
        };
        let rweight = if owner.weight > 0.0 {
            cl.weight / owner.weight
        } else {
            1.0
        };
        (rdens, rweight)
    }
}

/// Encodes one projection token, or `None` when the value quantizes away.
fn encode(id: daoc_core::Id, share: Share, opts: &NodeVecOptions) -> Option<String> {
    match opts.value {
        NodeVecValue::Bit => (share >= 0.5).then(|| format!("{id}")),
        NodeVecValue::Uint8 => encode_quantized(id, share, opts.valmin, f64::from(u8::MAX)),
        NodeVecValue::Uint16 => encode_quantized(id, share, opts.valmin, f64::from(u16::MAX)),
        NodeVecValue::Float32 => (share > 0.0).then(|| format!("{id}:{share}")),
    }
}

/// Quantizes the projection so the value recovers as `1/encoded`.
fn encode_quantized(id: daoc_core::Id, share: Share, valmin: f32, vmax: f64) -> Option<String> {
    let corr = (f64::from(valmin) - 0.5 / vmax).max(0.0);
    let v = ((share - corr) / (1.0 - corr) * vmax).round();
    if v <= 0.0 {
        return None;
    }
    Some(format!("{id}:{}", vmax - v + 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    use daoc_core::{
        significant_clusters, ClusterOptions, Graph, InpLink, LinkErrors, NodeErrors, Reduction,
        SignifOptions, SzMin,
    };

    fn hierarchy() -> Hierarchy {
        let mut g = Graph::new(6, true, false, false, Reduction::default()).expect("graph");
        let mut nderrs = NodeErrors::new("t");
        let mut lnerrs = LinkErrors::new("t");
        g.add_nodes(6, 0, &mut nderrs);
        for &(a, b) in &[(0, 1), (0, 2), (1, 2), (3, 4), (3, 5), (4, 5), (2, 3)] {
            g.add_node_links(false, a, vec![InpLink::new(b)], &mut lnerrs)
                .expect("link");
        }
        g.build_hierarchy(&ClusterOptions::new()).expect("hierarchy")
    }

    fn dims(hier: &Hierarchy) -> Vec<(Selected, BTreeMap<usize, Share>)> {
        let opts = SignifOptions {
            szmin: SzMin::Abs(1),
            densdrop: 0.0,
            wrstep: 0.0,
            ..SignifOptions::default()
        };
        significant_clusters(hier, &opts)
            .into_iter()
            .map(|sel| {
                let members = hier.unwrap(sel.level, sel.index);
                (sel, members)
            })
            .collect()
    }

    #[test]
    fn header_and_footer_frame_the_projections() {
        let hier = hierarchy();
        let dims = dims(&hier);
        let mut buf = Vec::new();
        NodeVecPrinter::new(&hier)
            .print(&mut buf, &dims, &NodeVecOptions::default())
            .expect("print");
        let text = String::from_utf8(buf).expect("utf8");
        let mut lines = text.lines();
        let header = lines.next().expect("header");
        assert!(header.starts_with("# Nodes: 6, Dimensions: "));
        assert!(header.contains("Value: uint8"));
        let footer = text.lines().last().expect("footer");
        assert!(footer.starts_with("# Diminfo>"));
        assert!(footer.contains('!'), "root dimensions must be flagged");
        assert_eq!(text.lines().count(), dims.len() + 2);
    }

    #[test]
    fn bit_encoding_lists_strong_members_plainly() {
        let hier = hierarchy();
        let dims = dims(&hier);
        let opts = NodeVecOptions {
            value: NodeVecValue::Bit,
            ..NodeVecOptions::default()
        };
        let mut buf = Vec::new();
        NodeVecPrinter::new(&hier)
            .print(&mut buf, &dims, &opts)
            .expect("print");
        let text = String::from_utf8(buf).expect("utf8");
        for line in text.lines().skip(1).take(dims.len()) {
            assert!(!line.contains(':'), "bit encoding has no values: {line}");
        }
    }

    #[test]
    fn float_encoding_keeps_full_shares() {
        let hier = hierarchy();
        let dims = dims(&hier);
        let opts = NodeVecOptions {
            value: NodeVecValue::Float32,
            numbered: true,
            ..NodeVecOptions::default()
        };
        let mut buf = Vec::new();
        NodeVecPrinter::new(&hier)
            .print(&mut buf, &dims, &opts)
            .expect("print");
        let text = String::from_utf8(buf).expect("utf8");
        assert!(text.lines().nth(1).expect("first dim").contains('>'));
        assert!(text.contains(":1"));
    }
}
