//! DAOC facade crate.
//!
//! Re-exports the public surface of `daoc-core` (clustering engine) and
//! `daoc-formats` (network parsers and hierarchy printers) so applications can
//! depend on a single crate.

pub use daoc_core::*;

pub mod formats {
    //! Input/output adapters for the RCG, NSL, CNL and RHB file formats.
    pub use daoc_formats::*;
}
