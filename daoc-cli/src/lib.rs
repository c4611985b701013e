//! Library surface of the DAOC command-line client.
//!
//! Exposes the argument grammar, the execution driver, the logging
//! bootstrap and the phase timings for reuse in tests and embeddings.

pub mod cli;
pub mod logging;
pub mod timing;
