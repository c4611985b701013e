//! Readable Hierarchy from Bottom (RHB) printer and parser.
//!
//! The format lists the whole hierarchy bottom-up: a `/Hierarchy` header
//! with the level and cluster counts, a `/Nodes` section giving each node's
//! owners (with shares when unequal), and one `/Level i pure:P extended:E`
//! section per level listing each cluster's owners. Printing a parsed
//! hierarchy reproduces the input byte for byte.

use std::fmt::Write as _;
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use daoc_core::{Hierarchy, Id, Share};

use crate::error::{ParseError, ParseResult, PrintResult};

/// An ownership entry: the owner id and the share when explicitly listed.
pub type OwnerEntry = (Id, Option<Share>);

/// One `id> owners...` line of an RHB section.
#[derive(Clone, Debug, PartialEq)]
pub struct RhbEntry {
    /// Node or cluster id.
    pub id: Id,
    /// Owner cluster ids with optional explicit shares.
    pub owners: Vec<OwnerEntry>,
}

/// One `/Level` section.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RhbLevel {
    /// The number of distinct clusters on the level.
    pub pure: usize,
    /// The number of clusters including propagated wrappers.
    pub extended: usize,
    /// Per-cluster ownership entries.
    pub entries: Vec<RhbEntry>,
}

/// The structural view of a hierarchy carried by an RHB file.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RhbHierarchy {
    /// Total number of distinct clusters, from the `/Hierarchy` header.
    pub clusters: usize,
    /// Per-node ownership entries.
    pub nodes: Vec<RhbEntry>,
    /// Levels bottom-up.
    pub levels: Vec<RhbLevel>,
}

impl RhbHierarchy {
    /// Extracts the structural view of a built hierarchy.
    ///
    /// Shares are listed only when the owners of an element hold unequal
    /// shares (fuzzy overlaps).
    #[must_use]
    pub fn render(hier: &Hierarchy) -> Self {
        let owner_entries = |owners: &[daoc_core::Owner], level: usize| -> Vec<OwnerEntry> {
            let unequal = owners.len() >= 2
                && owners
                    .windows(2)
                    .any(|pair| (pair[0].share - pair[1].share).abs() > f64::EPSILON * 4.0);
            owners
                .iter()
                .map(|ow| {
                    let id = hier.levels()[level].clusters[ow.dest].id;
                    (id, unequal.then_some(ow.share))
                })
                .collect()
        };

        let nodes = hier
            .nodes()
            .iter()
            .zip(hier.node_owners())
            .map(|(nd, owners)| RhbEntry {
                id: nd.id,
                owners: owner_entries(owners, 0),
            })
            .collect();

        let levels = hier
            .levels()
            .iter()
            .enumerate()
            .map(|(levi, lev)| RhbLevel {
                pure: lev.pure_size(),
                extended: lev.fullsize(),
                entries: lev
                    .clusters
                    .iter()
                    .map(|cl| RhbEntry {
                        id: cl.id,
                        owners: owner_entries(&cl.owners, levi + 1),
                    })
                    .collect(),
            })
            .collect();

        Self {
            clusters: hier.score().clusters,
            nodes,
            levels,
        }
    }

    /// Serializes the hierarchy in the RHB text format.
    ///
    /// # Errors
    /// Returns [`PrintError`] when writing fails.
    pub fn print<W: Write>(&self, out: &mut W) -> PrintResult<()> {
        writeln!(
            out,
            "/Hierarchy levels:{} clusters:{}",
            self.levels.len(),
            self.clusters
        )?;
        writeln!(out)?;
        writeln!(out, "/Nodes {}", self.nodes.len())?;
        writeln!(out, "# node1_id> owner1_id[:share1] owner2_id[:share2] ...")?;
        for entry in &self.nodes {
            writeln!(out, "{}", render_entry(entry))?;
        }
        for (levi, lev) in self.levels.iter().enumerate() {
            writeln!(out)?;
            writeln!(
                out,
                "/Level {levi} pure:{} extended:{}",
                lev.pure, lev.extended
            )?;
            for entry in &lev.entries {
                writeln!(out, "{}", render_entry(entry))?;
            }
        }
        Ok(())
    }

    /// Loads an RHB hierarchy from a file.
    ///
    /// # Errors
    /// Returns [`ParseError`] on I/O failures and malformed content.
    pub fn load(path: &Path) -> ParseResult<Self> {
        let file = File::open(path).map_err(|source| ParseError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(BufReader::new(file))
    }

    /// Parses an RHB hierarchy from a reader.
    ///
    /// # Errors
    /// Returns [`ParseError`] with line context on malformed content.
    pub fn parse<R: BufRead>(reader: R) -> ParseResult<Self> {
        #[derive(PartialEq)]
        enum Section {
            Prelude,
            Nodes,
            Level,
        }
        let mut out = Self::default();
        let mut declared_levels = 0usize;
        let mut declared_nodes = 0usize;
        let mut section = Section::Prelude;

        for (lnum, line) in reader.lines().enumerate() {
            let lnum = lnum + 1;
            let line = line.map_err(|source| ParseError::Io {
                path: Path::new("<rhb>").to_path_buf(),
                source,
            })?;
            let text = line.trim();
            if text.is_empty() || text.starts_with('#') {
                continue;
            }
            if let Some(rest) = text.strip_prefix('/') {
                let mut tokens = rest.split_whitespace();
                match tokens.next().unwrap_or("").to_ascii_lowercase().as_str() {
                    "hierarchy" => {
                        for tok in tokens {
                            if let Some(v) = tok.strip_prefix("levels:") {
                                declared_levels = parse_num(v, lnum, "level count")?;
                            } else if let Some(v) = tok.strip_prefix("clusters:") {
                                out.clusters = parse_num(v, lnum, "cluster count")?;
                            }
                        }
                    }
                    "nodes" => {
                        if let Some(tok) = tokens.next() {
                            declared_nodes = parse_num(tok, lnum, "node count")?;
                        }
                        section = Section::Nodes;
                    }
                    "level" => {
                        let mut level = RhbLevel::default();
                        let index: usize = parse_num(
                            tokens
                                .next()
                                .ok_or_else(|| ParseError::syntax(lnum, "missing level index"))?,
                            lnum,
                            "level index",
                        )?;
                        if index != out.levels.len() {
                            return Err(ParseError::syntax(
                                lnum,
                                format!("level {index} out of order, expected {}", out.levels.len()),
                            ));
                        }
                        for tok in tokens {
                            if let Some(v) = tok.strip_prefix("pure:") {
                                level.pure = parse_num(v, lnum, "pure count")?;
                            } else if let Some(v) = tok.strip_prefix("extended:") {
                                level.extended = parse_num(v, lnum, "extended count")?;
                            }
                        }
                        out.levels.push(level);
                        section = Section::Level;
                    }
                    _ => {
                        return Err(ParseError::UnknownSection {
                            line: lnum,
                            section: text.to_owned(),
                        })
                    }
                }
                continue;
            }
            let entry = parse_entry(text, lnum)?;
            match section {
                Section::Nodes => out.nodes.push(entry),
                Section::Level => out
                    .levels
                    .last_mut()
                    .expect("a level section is open")
                    .entries
                    .push(entry),
                Section::Prelude => {
                    return Err(ParseError::syntax(lnum, "entry outside any section"))
                }
            }
        }

        if declared_levels != out.levels.len() {
            return Err(ParseError::syntax(
                0,
                format!(
                    "the header declares {declared_levels} levels but {} are listed",
                    out.levels.len()
                ),
            ));
        }
        if declared_nodes != out.nodes.len() {
            return Err(ParseError::syntax(
                0,
                format!(
                    "the /Nodes section declares {declared_nodes} nodes but {} are listed",
                    out.nodes.len()
                ),
            ));
        }
        Ok(out)
    }
}

fn render_entry(entry: &RhbEntry) -> String {
    let mut line = format!("{}>", entry.id);
    for (id, share) in &entry.owners {
        match share {
            Some(share) => {
                let _ = write!(line, " {id}:{share}");
            }
            None => {
                let _ = write!(line, " {id}");
            }
        }
    }
    line
}

fn parse_entry(text: &str, lnum: usize) -> ParseResult<RhbEntry> {
    let (head, rest) = text
        .split_once('>')
        .ok_or_else(|| ParseError::syntax(lnum, "missing '>' after the element id"))?;
    let id: Id = parse_num(head.trim(), lnum, "element id")?;
    let mut owners = Vec::new();
    for tok in rest.split_whitespace() {
        let owner = match tok.split_once(':') {
            Some((oid, share)) => (
                parse_num(oid, lnum, "owner id")?,
                Some(parse_num(share, lnum, "owner share")?),
            ),
            None => (parse_num(tok, lnum, "owner id")?, None),
        };
        owners.push(owner);
    }
    Ok(RhbEntry { id, owners })
}

fn parse_num<T: std::str::FromStr>(text: &str, lnum: usize, what: &str) -> ParseResult<T> {
    text.parse()
        .map_err(|_| ParseError::syntax(lnum, format!("invalid {what} `{text}`")))
}
