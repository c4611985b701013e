//! Format adapters of the DAOC clustering engine.
//!
//! Parsers of the RCG, NSE/NSA and CNL input formats plus printers (and,
//! for round-trips, a parser) of the CNL and RHB output formats and the
//! node-vectorization projection.

mod cnl;
mod error;
mod format;
mod nodevec;
mod nsl;
mod rcg;
mod rhb;

use std::path::Path;

pub use crate::{
    cnl::{ClsFmt, CnlClustering, CnlParser, CnlPrinter},
    error::{ParseError, ParseResult, PrintError, PrintResult},
    format::{FileFormat, InputOptions},
    nodevec::{NodeVecCompression, NodeVecOptions, NodeVecPrinter, NodeVecValue},
    nsl::NslParser,
    rcg::RcgParser,
    rhb::{OwnerEntry, RhbEntry, RhbHierarchy, RhbLevel},
};

/// Creates the parent directory of an output path when it does not exist.
///
/// # Errors
/// Returns [`PrintError`] when the directory cannot be created.
pub fn ensure_parent_dir(path: &Path) -> PrintResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}
