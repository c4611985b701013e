//! Readable Compact Graph (RCG, former HIG) parser.
//!
//! Section-header text format: an optional `/Graph` line carrying the
//! weighted flag, an optional `/Nodes <count> [<start_id>]` declaration, and
//! `/Edges` / `/Arcs` sections whose payload lines read
//! `src> dst[:w] dst[:w] ...`. Whole-line comments start with `#`. At least
//! one `/Arcs` section makes the graph directed; self-links double into the
//! node self-weight whether specified as an edge or an arc.

use std::fs::File;
use std::io::{BufRead, BufReader};

use tracing::warn;

use daoc_core::{Graph, Id, InpLink, LinkErrors, LinkWeight, NodeErrors, Reduction};

use crate::error::{ParseError, ParseResult};
use crate::format::InputOptions;

/// The active payload section of the file body.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Section {
    None,
    Edges,
    Arcs,
}

/// Parser of the RCG input format.
#[derive(Debug)]
pub struct RcgParser {
    opts: InputOptions,
}

impl RcgParser {
    /// Creates a parser with the given input options.
    #[must_use]
    pub fn new(opts: InputOptions) -> Self {
        Self { opts }
    }

    /// Loads the graph from the configured file.
    ///
    /// # Errors
    /// Returns [`ParseError`] on I/O failures and malformed content.
    pub fn load(&self) -> ParseResult<Graph> {
        let file = File::open(&self.opts.filename).map_err(|source| ParseError::Io {
            path: self.opts.filename.clone(),
            source,
        })?;
        self.parse(BufReader::new(file))
    }

    /// Parses the graph from a reader.
    ///
    /// # Errors
    /// Returns [`ParseError`] with line context on malformed content.
    pub fn parse<R: BufRead>(&self, reader: R) -> ParseResult<Graph> {
        let mut weighted = true;
        let mut declared: Id = 0;
        let mut id_start: Option<Id> = None;
        let mut section = Section::None;
        let mut graph: Option<Graph> = None;
        let mut nderrs = NodeErrors::new("duplicated nodes are skipped");
        let mut lnerrs = LinkErrors::new("duplicated links are skipped");
        let mut solo = NodeErrors::new("nodes specified without any links");

        for (lnum, line) in reader.lines().enumerate() {
            let lnum = lnum + 1;
            let line = line.map_err(|source| ParseError::Io {
                path: self.opts.filename.clone(),
                source,
            })?;
            let text = line.trim();
            if text.is_empty() || text.starts_with('#') {
                continue;
            }
            if let Some(rest) = text.strip_prefix('/') {
                let mut tokens = rest.split_whitespace();
                let name = tokens.next().unwrap_or("").to_ascii_lowercase();
                match name.as_str() {
                    "graph" => {
                        for tok in tokens {
                            let tok = tok.to_ascii_lowercase();
                            if let Some(v) = tok.strip_prefix("weighted:") {
                                weighted = parse_flag(v, lnum)?;
                            }
                            // Other attributes (e.g. validated) are accepted
                            // and ignored.
                        }
                    }
                    "nodes" => {
                        if graph.is_some() {
                            return Err(ParseError::syntax(
                                lnum,
                                "/Nodes must precede the link sections",
                            ));
                        }
                        if let Some(tok) = tokens.next() {
                            declared = parse_num(tok, lnum, "node count")?;
                        }
                        if let Some(tok) = tokens.next() {
                            id_start = Some(parse_num(tok, lnum, "start id")?);
                        }
                    }
                    "edges" => section = Section::Edges,
                    "arcs" => section = Section::Arcs,
                    _ => {
                        return Err(ParseError::UnknownSection {
                            line: lnum,
                            section: text.to_owned(),
                        })
                    }
                }
                continue;
            }
            if section == Section::None {
                return Err(ParseError::syntax(
                    lnum,
                    "payload before any /Edges or /Arcs section",
                ));
            }
            let g = match graph.as_mut() {
                Some(g) => g,
                None => {
                    let mut g = Graph::new(
                        declared,
                        weighted,
                        self.opts.shuffle,
                        self.opts.sumdups,
                        Reduction::default(),
                    )?;
                    if declared > 0 && id_start.is_some() {
                        g.add_nodes(declared, id_start.unwrap_or(0), &mut nderrs);
                    }
                    graph.insert(g)
                }
            };
            parse_link_line(
                g,
                text,
                lnum,
                weighted,
                section == Section::Arcs,
                id_start.is_some(),
                &mut lnerrs,
                &mut solo,
            )?;
        }

        nderrs.drain();
        lnerrs.drain();
        solo.drain();
        match graph {
            Some(g) => Ok(g),
            None => {
                // A headers-only file still yields the declared nodes.
                let mut g = Graph::new(
                    declared,
                    weighted,
                    self.opts.shuffle,
                    self.opts.sumdups,
                    Reduction::default(),
                )?;
                if declared > 0 {
                    let mut errs = NodeErrors::new("duplicated nodes are skipped");
                    g.add_nodes(declared, id_start.unwrap_or(0), &mut errs);
                    errs.drain();
                }
                if declared == 0 {
                    warn!("the input network contains no link sections");
                }
                Ok(g)
            }
        }
    }
}

/// Parses one payload line `src> dst[:w] dst[:w] ...` into the graph.
#[allow(clippy::too_many_arguments)]
fn parse_link_line(
    graph: &mut Graph,
    text: &str,
    lnum: usize,
    weighted: bool,
    directed: bool,
    preallocated: bool,
    lnerrs: &mut LinkErrors,
    solo: &mut NodeErrors,
) -> ParseResult<()> {
    let (src_text, rest) = text
        .split_once('>')
        .ok_or_else(|| ParseError::syntax(lnum, "missing '>' after the source node id"))?;
    let src: Id = parse_num(src_text.trim(), lnum, "source node id")?;

    let mut links: Vec<InpLink> = Vec::new();
    for tok in rest.split_whitespace() {
        let link = match tok.split_once(':') {
            Some((id, w)) => {
                if !weighted {
                    return Err(ParseError::syntax(
                        lnum,
                        "link weight specified in an unweighted network",
                    ));
                }
                let weight: LinkWeight = parse_weight(w, lnum)?;
                InpLink::weighted(parse_num(id, lnum, "destination id")?, weight)
            }
            None => InpLink::new(parse_num(tok, lnum, "destination id")?),
        };
        links.push(link);
    }

    if links.is_empty() {
        solo.add(src);
        let mut errs = NodeErrors::new("duplicated nodes are skipped");
        graph.add_node_ids(&[src], &mut errs);
        return Ok(());
    }
    if preallocated {
        graph.add_node_links(directed, src, links, lnerrs)?;
    } else {
        graph.add_node_and_links(directed, src, links, lnerrs)?;
    }
    Ok(())
}

fn parse_flag(text: &str, lnum: usize) -> ParseResult<bool> {
    match text {
        "0" => Ok(false),
        "1" => Ok(true),
        other => Err(ParseError::syntax(lnum, format!("invalid flag `{other}`"))),
    }
}

fn parse_num<T: std::str::FromStr>(text: &str, lnum: usize, what: &str) -> ParseResult<T> {
    text.parse()
        .map_err(|_| ParseError::syntax(lnum, format!("invalid {what} `{text}`")))
}

fn parse_weight(text: &str, lnum: usize) -> ParseResult<LinkWeight> {
    let w: LinkWeight = parse_num(text, lnum, "link weight")?;
    if w < 0.0 || !w.is_finite() {
        return Err(ParseError::syntax(
            lnum,
            format!("link weight must be a non-negative float, got `{text}`"),
        ));
    }
    Ok(w)
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Cursor;

    fn parse(content: &str) -> ParseResult<Graph> {
        RcgParser::new(InputOptions::default()).parse(Cursor::new(content.to_owned()))
    }

    #[test]
    fn parses_declared_nodes_and_edges() {
        let g = parse(
            "# sample network\n\
             /Graph weighted:1\n\
             /Nodes 3 0\n\
             /Edges\n\
             0> 1:2 2\n\
             1> 2:0.5\n",
        )
        .expect("network must parse");
        assert_eq!(g.len(), 3);
        assert!(!g.directed());
        // Undirected storage halves the weight per direction.
        let n0 = g.node(0).expect("node 0");
        assert_eq!(n0.links.len(), 2);
        assert_eq!(n0.links[0].weight, 1.0);
        assert_eq!(n0.links[1].weight, 0.5);
    }

    #[test]
    fn arcs_section_makes_the_graph_directed() {
        let g = parse("/Arcs\n0> 1:2\n1> 0:1\n").expect("network must parse");
        assert!(g.directed());
        assert_eq!(g.node(0).expect("node 0").links[0].weight, 2.0);
    }

    #[test]
    fn self_link_doubles_into_self_weight() {
        let g = parse("/Edges\n0> 0:3 1\n").expect("network must parse");
        assert_eq!(g.node(0).expect("node 0").weight(), 6.0);
    }

    #[test]
    fn unknown_section_is_fatal() {
        let err = parse("/Blobs\n").expect_err("unknown section must fail");
        assert!(matches!(err, ParseError::UnknownSection { line: 1, .. }));
    }

    #[test]
    fn negative_weight_is_fatal() {
        let err = parse("/Edges\n0> 1:-2\n").expect_err("negative weight must fail");
        assert!(matches!(err, ParseError::Syntax { line: 2, .. }));
    }

    #[test]
    fn node_line_without_links_is_reported_not_fatal() {
        let g = parse("/Edges\n5>\n0> 1\n").expect("network must parse");
        assert_eq!(g.len(), 3);
        assert!(g.node(5).expect("node 5").links.is_empty());
    }

    #[test]
    fn payload_outside_sections_is_fatal() {
        let err = parse("0> 1\n").expect_err("payload needs a section");
        assert!(matches!(err, ParseError::Syntax { line: 1, .. }));
    }
}
