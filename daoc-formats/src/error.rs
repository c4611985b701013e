//! Error types of the format adapters.

use std::{io, path::PathBuf};

use thiserror::Error;

use daoc_core::CoreError;

/// Errors raised while parsing an input network or clustering file.
///
/// All parse errors are fatal and carry the line context of the offending
/// input.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ParseError {
    /// The input file could not be opened or read.
    #[error("failed to read `{path}`: {source}")]
    Io {
        /// Offending path.
        path: PathBuf,
        /// Underlying operating system error.
        #[source]
        source: io::Error,
    },
    /// A line could not be interpreted.
    #[error("line {line}: {message}")]
    Syntax {
        /// 1-based line number.
        line: usize,
        /// Description of the violation.
        message: String,
    },
    /// An unknown section marker was encountered.
    #[error("line {line}: unknown section `{section}`")]
    UnknownSection {
        /// 1-based line number.
        line: usize,
        /// The unrecognized section text.
        section: String,
    },
    /// Graph construction rejected the parsed data.
    #[error(transparent)]
    Core(#[from] CoreError),
}

impl ParseError {
    /// Convenience constructor for syntax errors.
    #[must_use]
    pub fn syntax(line: usize, message: impl Into<String>) -> Self {
        Self::Syntax {
            line,
            message: message.into(),
        }
    }
}

/// Errors raised while serializing results.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum PrintError {
    /// Writing the output failed.
    #[error("failed to write output: {source}")]
    Io {
        /// Underlying operating system error.
        #[from]
        source: io::Error,
    },
}

/// Convenient alias for parser results.
pub type ParseResult<T> = Result<T, ParseError>;
/// Convenient alias for printer results.
pub type PrintResult<T> = Result<T, PrintError>;
