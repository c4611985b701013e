//! Command-line interface of the DAOC clustering engine.
//!
//! `commands` decodes the compact option grammar; `run` drives the input
//! parsing, clustering (or evaluation) and the requested outputs.

mod commands;
mod run;


pub use commands::{
    parse_bound_spec, parse_cli, parse_cluster_spec, parse_eval_spec, parse_filter_spec,
    parse_format_spec, parse_gamma_spec, parse_margin_spec, parse_nodevec_spec,
    parse_reduction_spec, parse_validation_spec, Cli, CliError, OutKind, OutputSpec, ParsedInput,
    DEFAULT_GAMMA_RATIO,
};
pub use run::{default_output_name, execute, strategy_summary};
