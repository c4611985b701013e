//! File format identification and shared input options.

use std::fmt;
use std::path::{Path, PathBuf};

/// Supported file formats of the networks and clusterings.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum FileFormat {
    /// The extension is not registered.
    #[default]
    Unknown,
    /// Readable Compact Graph.
    Rcg,
    /// Network Specified by Edges.
    Nse,
    /// Network Specified by Arcs.
    Nsa,
    /// Cluster Nodes List.
    Cnl,
    /// Readable Hierarchy from Bottom.
    Rhb,
}

impl FileFormat {
    /// The default input format assumed when identification fails.
    pub const DEFAULT_INPUT: Self = Self::Rcg;

    /// Infers the format from the file extension.
    #[must_use]
    pub fn from_path(path: &Path) -> Self {
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            return Self::Unknown;
        };
        match ext.to_ascii_lowercase().as_str() {
            "rcg" | "hig" => Self::Rcg,
            "nse" | "nsl" | "ncol" | "ll" => Self::Nse,
            "nsa" => Self::Nsa,
            "cnl" => Self::Cnl,
            "rhb" => Self::Rhb,
            _ => Self::Unknown,
        }
    }

    /// Short lowercase name of the format.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Rcg => "rcg",
            Self::Nse => "nse",
            Self::Nsa => "nsa",
            Self::Cnl => "cnl",
            Self::Rhb => "rhb",
        }
    }
}

impl fmt::Display for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Input network options shared by the parsers.
#[derive(Clone, Debug, Default)]
pub struct InputOptions {
    /// Input format; `Unknown` triggers extension-based identification.
    pub format: FileFormat,
    /// Path of the input network.
    pub filename: PathBuf,
    /// Accumulate weights of duplicated links instead of skipping them.
    pub sumdups: bool,
    /// Shuffle node and link creation order.
    pub shuffle: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    use rstest::rstest;

    #[rstest]
    #[case("net.rcg", FileFormat::Rcg)]
    #[case("net.HIG", FileFormat::Rcg)]
    #[case("net.nse", FileFormat::Nse)]
    #[case("net.ncol", FileFormat::Nse)]
    #[case("net.nsa", FileFormat::Nsa)]
    #[case("clusters.cnl", FileFormat::Cnl)]
    #[case("hier.rhb", FileFormat::Rhb)]
    #[case("plain.txt", FileFormat::Unknown)]
    #[case("noext", FileFormat::Unknown)]
    fn infers_format_from_extension(#[case] name: &str, #[case] expected: FileFormat) {
        assert_eq!(FileFormat::from_path(Path::new(name)), expected);
    }
}
