//! Error types for the DAOC core library.
//!
//! Defines the error enum exposed by the public API, a convenient result
//! alias, and the warning collectors that accumulate recoverable input issues
//! until they are drained to the trace sink.

use std::fmt;

use thiserror::Error;
use tracing::warn;

/// Stable codes describing [`CoreError`] variants.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum CoreErrorCode {
    /// A clustering option carried an invalid value.
    InvalidOption,
    /// A link referred to a node id absent from the graph.
    MissingNode,
    /// Severe validation found inconsistent node links.
    InconsistentLinks,
    /// Link reduction was requested for an unsupported graph kind.
    UnsupportedReduction,
    /// An internal algorithmic invariant was violated.
    InvariantViolation,
    /// The hierarchy has not been constructed yet.
    NoHierarchy,
}

impl CoreErrorCode {
    /// Return the stable machine-readable representation of this error code.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidOption => "DAOC_INVALID_OPTION",
            Self::MissingNode => "DAOC_MISSING_NODE",
            Self::InconsistentLinks => "DAOC_INCONSISTENT_LINKS",
            Self::UnsupportedReduction => "DAOC_UNSUPPORTED_REDUCTION",
            Self::InvariantViolation => "DAOC_INVARIANT_VIOLATION",
            Self::NoHierarchy => "DAOC_NO_HIERARCHY",
        }
    }
}

impl fmt::Display for CoreErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error type produced by graph construction and clustering.
#[non_exhaustive]
#[derive(Clone, Debug, Error, PartialEq)]
pub enum CoreError {
    /// A clustering option carried an invalid value.
    #[error("invalid option `{name}`: {message}")]
    InvalidOption {
        /// Name of the offending option.
        name: &'static str,
        /// Explanation of the constraint that was violated.
        message: String,
    },
    /// A link referred to a node id absent from the graph.
    #[error("link {src} -> {dst} refers to a non-existent node")]
    MissingNode {
        /// Source node id of the link.
        src: u32,
        /// Destination node id of the link.
        dst: u32,
    },
    /// Severe validation found inconsistent node links.
    #[error("node #{node} has unsorted or duplicated links")]
    InconsistentLinks {
        /// Node id whose links failed validation.
        node: u32,
    },
    /// Link reduction was requested for an unsupported graph kind.
    #[error("link reduction requires weighted directed links and a declared node count")]
    UnsupportedReduction,
    /// An internal algorithmic invariant was violated; indicates a bug.
    #[error("invariant `{invariant}` violated: {details}")]
    InvariantViolation {
        /// Name of the broken invariant.
        invariant: &'static str,
        /// Observed values that broke it.
        details: String,
    },
    /// The hierarchy has not been constructed yet.
    #[error("the hierarchy has not been constructed")]
    NoHierarchy,
}

impl CoreError {
    /// Retrieve the stable [`CoreErrorCode`] for this error.
    #[must_use]
    pub const fn code(&self) -> CoreErrorCode {
        match self {
            Self::InvalidOption { .. } => CoreErrorCode::InvalidOption,
            Self::MissingNode { .. } => CoreErrorCode::MissingNode,
            Self::InconsistentLinks { .. } => CoreErrorCode::InconsistentLinks,
            Self::UnsupportedReduction => CoreErrorCode::UnsupportedReduction,
            Self::InvariantViolation { .. } => CoreErrorCode::InvariantViolation,
            Self::NoHierarchy => CoreErrorCode::NoHierarchy,
        }
    }
}

/// Convenient alias for results returned by the core API.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Accumulator for recoverable node-level warnings (duplicated ids, nodes
/// without links).
///
/// Nothing is reported until [`NodeErrors::drain`] is called, so tight graph
/// construction loops stay free of logging.
#[derive(Debug, Default)]
pub struct NodeErrors {
    context: &'static str,
    ids: Vec<u32>,
}

impl NodeErrors {
    /// Creates a collector labelled with the message prefix used on drain.
    #[must_use]
    pub fn new(context: &'static str) -> Self {
        Self {
            context,
            ids: Vec::new(),
        }
    }

    /// Records an offending node id.
    pub fn add(&mut self, id: u32) {
        self.ids.push(id);
    }

    /// Whether any warnings were recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Emits the accumulated warnings to the trace sink and clears the list.
    pub fn drain(&mut self) {
        if self.ids.is_empty() {
            return;
        }
        warn!(
            context = self.context,
            count = self.ids.len(),
            nodes = ?self.ids,
            "node warnings"
        );
        self.ids.clear();
    }
}

/// Accumulator for recoverable link-level warnings (duplicated links).
#[derive(Debug, Default)]
pub struct LinkErrors {
    context: &'static str,
    links: Vec<(u32, u32)>,
}

impl LinkErrors {
    /// Creates a collector labelled with the message prefix used on drain.
    #[must_use]
    pub fn new(context: &'static str) -> Self {
        Self {
            context,
            links: Vec::new(),
        }
    }

    /// Records an offending link by its source and destination ids.
    pub fn add(&mut self, src: u32, dst: u32) {
        self.links.push((src, dst));
    }

    /// Whether any warnings were recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// Emits the accumulated warnings to the trace sink and clears the list.
    pub fn drain(&mut self) {
        if self.links.is_empty() {
            return;
        }
        warn!(
            context = self.context,
            count = self.links.len(),
            links = ?self.links,
            "link warnings"
        );
        self.links.clear();
    }
}
