//! Cluster Nodes List (CNL) parser and printer.
//!
//! One line per cluster: an optional `cid>` prefix followed by
//! `nid[:share]` members. The optional header comment reads
//! `# Clusters: N, Nodes: M, Fuzzy: {0,1}, Numbered: {0,1}`. Shares are
//! emitted only when they differ from the implied equal split across the
//! node owners.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use daoc_core::{Hierarchy, Id, Selected, Share};

use crate::error::{ParseError, ParseResult, PrintResult};

/// Output sub-format of the clusters.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum ClsFmt {
    /// Space-separated members without the header.
    Pure,
    /// Space-separated members with the header.
    Simple,
    /// Members with unequal shares, with the header.
    Shared,
    /// Numbered clusters with member shares (the default).
    #[default]
    Extended,
}

impl ClsFmt {
    /// Whether the header line is emitted.
    #[must_use]
    pub fn with_header(self) -> bool {
        self != Self::Pure
    }

    /// Whether cluster ids prefix the lines.
    #[must_use]
    pub fn numbered(self) -> bool {
        self == Self::Extended
    }

    /// Whether unequal shares are emitted.
    #[must_use]
    pub fn with_shares(self) -> bool {
        matches!(self, Self::Shared | Self::Extended)
    }
}

/// A flat clustering loaded from a CNL file: per cluster, the optional id
/// and the `(node id, share)` members.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CnlClustering {
    /// Cluster ids as listed; empty when the file is unnumbered.
    pub ids: Vec<Option<Id>>,
    /// Member lists with shares (1 unless specified).
    pub clusters: Vec<Vec<(Id, Share)>>,
}

/// Parser of flat CNL clusterings, used by the evaluation mode.
#[derive(Debug, Default)]
pub struct CnlParser;

impl CnlParser {
    /// Loads a clustering from a file.
    ///
    /// # Errors
    /// Returns [`ParseError`] on I/O failures and malformed content.
    pub fn load(path: &Path) -> ParseResult<CnlClustering> {
        let file = File::open(path).map_err(|source| ParseError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(BufReader::new(file))
    }

    /// Parses a clustering from a reader.
    ///
    /// # Errors
    /// Returns [`ParseError`] with line context on malformed content.
    pub fn parse<R: BufRead>(reader: R) -> ParseResult<CnlClustering> {
        let mut out = CnlClustering::default();
        for (lnum, line) in reader.lines().enumerate() {
            let lnum = lnum + 1;
            let line = line.map_err(|source| ParseError::Io {
                path: Path::new("<cnl>").to_path_buf(),
                source,
            })?;
            let mut text = line.trim();
            if text.is_empty() || text.starts_with('#') {
                continue;
            }
            let mut cid = None;
            if let Some((head, rest)) = text.split_once('>') {
                cid = Some(parse_num(head.trim(), lnum, "cluster id")?);
                text = rest;
            }
            let mut members = Vec::new();
            for tok in text.split_whitespace() {
                let member = match tok.split_once(':') {
                    Some((id, share)) => {
                        let share: Share = parse_num(share, lnum, "node share")?;
                        if !(0.0..=1.0).contains(&share) || share == 0.0 {
                            return Err(ParseError::syntax(
                                lnum,
                                format!("node share must be in (0, 1], got `{share}`"),
                            ));
                        }
                        (parse_num(id, lnum, "node id")?, share)
                    }
                    None => (parse_num(tok, lnum, "node id")?, 1.0),
                };
                members.push(member);
            }
            if members.is_empty() {
                return Err(ParseError::syntax(lnum, "a cluster line lists no members"));
            }
            out.ids.push(cid);
            out.clusters.push(members);
        }
        Ok(out)
    }
}

/// Printer of cluster levels and selections in the CNL format.
#[derive(Debug)]
pub struct CnlPrinter<'a> {
    hier: &'a Hierarchy,
}

impl<'a> CnlPrinter<'a> {
    /// Creates a printer over the hierarchy.
    #[must_use]
    pub fn new(hier: &'a Hierarchy) -> Self {
        Self { hier }
    }

    /// Prints the selected clusters with their unwrapped members.
    ///
    /// # Errors
    /// Returns [`PrintError`] when writing fails.
    pub fn print<W: Write>(
        &self,
        out: &mut W,
        clusters: &[(Selected, BTreeMap<usize, Share>)],
        fmt: ClsFmt,
    ) -> PrintResult<()> {
        if fmt.with_header() {
            let fuzzy = u8::from(fmt.with_shares());
            let numbered = u8::from(fmt.numbered());
            writeln!(
                out,
                "# Clusters: {}, Nodes: {}, Fuzzy: {fuzzy}, Numbered: {numbered}",
                clusters.len(),
                self.hier.nodes().len(),
            )?;
        }
        for (sel, members) in clusters {
            if members.is_empty() {
                continue;
            }
            if fmt.numbered() {
                write!(out, "{}> ", self.hier.cluster(sel.level, sel.index).id)?;
            }
            let mut first = true;
            for (&node, &share) in members {
                if !first {
                    write!(out, " ")?;
                }
                first = false;
                let id = self.hier.nodes()[node].id;
                if fmt.with_shares() && !equal_share(self.hier, node, share) {
                    write!(out, "{id}:{share}")?;
                } else {
                    write!(out, "{id}")?;
                }
            }
            writeln!(out)?;
        }
        Ok(())
    }
}

/// Whether the accumulated share equals the implied equal split across the
/// node owners, in which case it is omitted from the output.
fn equal_share(hier: &Hierarchy, node: usize, share: Share) -> bool {
    let owners = hier.node_owners()[node].len().max(1);
    let implied = 1.0 / owners as Share;
    (share - implied).abs() <= f64::EPSILON * 4.0 * owners as Share
}

fn parse_num<T: std::str::FromStr>(text: &str, lnum: usize, what: &str) -> ParseResult<T> {
    text.parse()
        .map_err(|_| ParseError::syntax(lnum, format!("invalid {what} `{text}`")))
}
