//! Network Specified by Links (NSE edges / NSA arcs) parser.
//!
//! Line-oriented `src dst [weight]` payload with optional commented header
//! lines declaring the node/link counts and the weighted flag, e.g.
//! `# Nodes: 5 Edges: 4 Weighted: 0`. Consecutive lines sharing a source are
//! batched before insertion, matching the construction path of the graph.

use std::fs::File;
use std::io::{BufRead, BufReader};

use tracing::{debug, warn};

use daoc_core::{Graph, Id, InpLink, LinkErrors, Reduction};

use crate::error::{ParseError, ParseResult};
use crate::format::{FileFormat, InputOptions};

/// Parser of the NSE/NSA input formats.
#[derive(Debug)]
pub struct NslParser {
    opts: InputOptions,
    directed: bool,
}

impl NslParser {
    /// Creates a parser; the directedness comes from the format (`nsa` is
    /// directed, `nse` is not).
    #[must_use]
    pub fn new(opts: InputOptions) -> Self {
        let directed = opts.format == FileFormat::Nsa;
        Self { opts, directed }
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
        let size = file
            .metadata()
            .map(|meta| meta.len() as usize)
            .unwrap_or(0);
        self.parse_sized(BufReader::new(file), size)
    }

    /// Parses the graph from a reader.
    ///
    /// # Errors
    /// Returns [`ParseError`] with line context on malformed content.
    pub fn parse<R: BufRead>(&self, reader: R) -> ParseResult<Graph> {
        self.parse_sized(reader, 0)
    }

    fn parse_sized<R: BufRead>(&self, reader: R, size: usize) -> ParseResult<Graph> {
        let mut header = Header::default();
        let mut graph: Option<Graph> = None;
        let mut lnerrs = LinkErrors::new("duplicated links are skipped");
        let mut batch_src: Option<Id> = None;
        let mut batch: Vec<InpLink> = Vec::new();
        let mut links_seen = 0usize;

        for (lnum, line) in reader.lines().enumerate() {
            let lnum = lnum + 1;
            let line = line.map_err(|source| ParseError::Io {
                path: self.opts.filename.clone(),
                source,
            })?;
            let text = line.trim();
            if text.is_empty() {
                continue;
            }
            if let Some(comment) = text.strip_prefix('#') {
                if graph.is_none() {
                    header.scan(comment);
                }
                continue;
            }
            let g = match graph.as_mut() {
                Some(g) => g,
                None => {
                    let nodes = header.nodes.unwrap_or_else(|| estimate_nodes(size, self.directed));
                    let weighted = header.weighted.unwrap_or(true);
                    if header.nodes.is_none() && nodes > 0 {
                        debug!(estimated = nodes, "node count was not declared, preallocating");
                    }
                    graph.insert(Graph::new(
                        nodes,
                        weighted,
                        self.opts.shuffle,
                        self.opts.sumdups,
                        Reduction::default(),
                    )?)
                }
            };

            let mut tokens = text.split_whitespace();
            let src: Id = parse_num(tokens.next().unwrap_or(""), lnum, "source id")?;
            let dst: Id = parse_num(
                tokens
                    .next()
                    .ok_or_else(|| ParseError::syntax(lnum, "the dest id is expected"))?,
                lnum,
                "dest id",
            )?;
            let link = match tokens.next() {
                Some(wtext) if g.weighted() => {
                    let w: f32 = parse_num(wtext, lnum, "link weight")?;
                    if w < 0.0 || !w.is_finite() {
                        return Err(ParseError::syntax(
                            lnum,
                            format!("link weight must be a non-negative float, got `{wtext}`"),
                        ));
                    }
                    InpLink::weighted(dst, w)
                }
                _ => InpLink::new(dst),
            };

            if batch_src != Some(src) && !batch.is_empty() {
                let node = batch_src.expect("a non-empty batch has a source");
                g.add_node_and_links(self.directed, node, std::mem::take(&mut batch), &mut lnerrs)?;
            }
            batch_src = Some(src);
            batch.push(link);
            links_seen += 1;
        }

        let mut g = match graph {
            Some(g) => g,
            None => Graph::new(
                0,
                header.weighted.unwrap_or(true),
                self.opts.shuffle,
                self.opts.sumdups,
                Reduction::default(),
            )?,
        };
        if let (Some(node), false) = (batch_src, batch.is_empty()) {
            g.add_node_and_links(self.directed, node, batch, &mut lnerrs)?;
        }
        lnerrs.drain();
        if let Some(declared) = header.links {
            if declared != links_seen {
                warn!(
                    declared,
                    actual = links_seen,
                    "the header link count does not match the payload"
                );
            }
        }
        Ok(g)
    }
}

/// Header fields scanned from the leading comment lines.
#[derive(Debug, Default)]
struct Header {
    nodes: Option<Id>,
    links: Option<usize>,
    weighted: Option<bool>,
}

impl Header {
    /// Scans one comment line for `Nodes:`, `Edges:`/`Arcs:`/`Links:` and
    /// `Weighted:` declarations.
    fn scan(&mut self, comment: &str) {
        let mut tokens = comment.split_whitespace().peekable();
        while let Some(tok) = tokens.next() {
            let key = tok.trim_end_matches(':').to_ascii_lowercase();
            let value = match tok.contains(':') && !tok.ends_with(':') {
                true => tok.split_once(':').map(|(_, v)| v.to_owned()),
                false => tokens.peek().map(|v| (*v).to_owned()),
            };
            let Some(value) = value else { continue };
            match key.as_str() {
                "nodes" => self.nodes = value.parse().ok(),
                "edges" | "arcs" | "links" => self.links = value.parse().ok(),
                "weighted" => self.weighted = value.parse::<u8>().ok().map(|v| v != 0),
                _ => {}
            }
        }
    }
}

/// Estimates the node count from the file size when the header omits it;
/// scales sub-linearly so large link lists do not over-allocate.
fn estimate_nodes(size: usize, directed: bool) -> Id {
    if size == 0 {
        return 0;
    }
    let mut els = size / 8; // average bytes per payload element
    if directed {
        els /= 2;
    }
    (els as f64).powf(0.78) as Id
}

fn parse_num<T: std::str::FromStr>(text: &str, lnum: usize, what: &str) -> ParseResult<T> {
    text.parse()
        .map_err(|_| ParseError::syntax(lnum, format!("invalid {what} `{text}`")))
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Cursor;

    fn parse(fmt: FileFormat, content: &str) -> ParseResult<Graph> {
        let opts = InputOptions {
            format: fmt,
            ..InputOptions::default()
        };
        NslParser::new(opts).parse(Cursor::new(content.to_owned()))
    }

    #[test]
    fn parses_edges_with_header() {
        let g = parse(
            FileFormat::Nse,
            "# Nodes: 3 Edges: 2 Weighted: 1\n0 1 2.0\n1 2 1.0\n",
        )
        .expect("network must parse");
        assert_eq!(g.len(), 3);
        assert!(!g.directed());
        assert_eq!(g.node(0).expect("node 0").links[0].weight, 1.0);
    }

    #[test]
    fn nsa_format_is_directed() {
        let g = parse(FileFormat::Nsa, "0 1 2\n1 0 2\n").expect("network must parse");
        assert!(g.directed());
        assert_eq!(g.node(0).expect("node 0").links[0].weight, 2.0);
    }

    #[test]
    fn unweighted_header_ignores_missing_weights() {
        let g = parse(FileFormat::Nse, "# Weighted: 0\n0 1\n1 2\n").expect("must parse");
        assert_eq!(g.node(1).expect("node 1").links.len(), 2);
    }

    #[test]
    fn missing_dest_is_fatal() {
        let err = parse(FileFormat::Nse, "0\n").expect_err("dest id is mandatory");
        assert!(matches!(err, ParseError::Syntax { line: 1, .. }));
    }

    #[test]
    fn batches_flush_on_source_change_and_at_eof() {
        let g = parse(FileFormat::Nse, "0 1\n0 2\n3 4\n").expect("must parse");
        assert_eq!(g.len(), 5);
        assert_eq!(g.node(0).expect("node 0").links.len(), 2);
        assert_eq!(g.node(3).expect("node 3").links.len(), 1);
    }
}
