//! CLI entry point of the DAOC clustering engine.
//!
//! Parses the compact argument grammar, executes the clustering (or the
//! evaluation mode) and maps failures to a non-zero exit code. Logging is
//! initialised eagerly so subsequent operations emit structured diagnostics
//! via `tracing`.

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::error;

use daoc_cli::{
    cli::{execute, parse_cli, Cli, CliError},
    logging::{self, LoggingError},
};
use daoc_core::CoreError;

fn try_main() -> Result<()> {
    let cli = Cli::parse();
    let parsed = parse_cli(cli).context("failed to parse the arguments")?;
    execute(parsed).context("failed to execute the request")?;
    Ok(())
}

fn main() -> ExitCode {
    if let Err(err) = logging::init_logging() {
        report_logging_init_error(&err);
        return ExitCode::FAILURE;
    }
    match try_main() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            if let Some(cli_error) = err.downcast_ref::<CliError>() {
                log_cli_error(cli_error);
            } else {
                error!(error = %err, "execution failed");
            }
            ExitCode::FAILURE
        }
    }
}

#[expect(
    clippy::print_stderr,
    reason = "one-off diagnostic before tracing is initialised"
)]
fn report_logging_init_error(err: &LoggingError) {
    eprintln!("failed to initialize logging: {err}");
}

fn log_cli_error(err: &CliError) {
    match err {
        CliError::Core(core) => log_core_error(core),
        _ => error!(error = %err, "execution failed"),
    }
}

fn log_core_error(err: &CoreError) {
    error!(error = %err, code = %err.code(), "clustering failed");
}
