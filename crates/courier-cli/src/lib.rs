//! Command-line runtime for the courier message kernel.
//!
//! [`run`] parses arguments, initialises telemetry and selects one of three
//! modes: inline dispatch against a local registry, client relay to a running
//! daemon, or the daemon itself. Stdout carries only envelopes; diagnostics
//! and fatal errors go to stderr.

use std::ffi::OsString;
use std::io::{self, BufReader, IsTerminal, Read, Write};
use std::process::ExitCode;

use clap::Parser;
use courier_config::Config;
use courierd::{KernelOptions, Registry, ShutdownFlag, builtin_registry, run_daemon, telemetry};
use tracing::{debug, warn};

mod cli;
mod client;
mod errors;
mod inline;
mod transport;

use cli::{Cli, Mode};
use errors::{AppError, is_daemon_not_running};

const CLI_TARGET: &str = env!("CARGO_PKG_NAME");
const USAGE_EXIT: u8 = 2;

/// Runs the CLI with the process's stdin and the provided output handles.
#[must_use]
pub fn run<I, W, E>(args: I, stdout: &mut W, stderr: &mut E) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    W: Write,
    E: Write,
{
    let stdin = io::stdin();
    let stdin_is_terminal = stdin.is_terminal();
    run_with_input(args, stdin, stdin_is_terminal, stdout, stderr)
}

pub(crate) fn run_with_input<I, R, W, E>(
    args: I,
    input: R,
    stdin_is_terminal: bool,
    stdout: &mut W,
    stderr: &mut E,
) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    R: Read + Send + 'static,
    W: Write,
    E: Write,
{
    let result = Cli::try_parse_from(args)
        .map_err(AppError::CliUsage)
        .and_then(|cli| execute(&cli, input, stdin_is_terminal, stdout));

    match result {
        Ok(exit_code) => exit_code,
        Err(AppError::CliUsage(error)) => {
            if error.use_stderr() {
                let _ = write!(stderr, "{error}");
            } else {
                let _ = write!(stdout, "{error}");
            }
            ExitCode::from(u8::try_from(error.exit_code()).unwrap_or(USAGE_EXIT))
        }
        Err(error) => {
            let _ = writeln!(stderr, "{error}");
            if let AppError::Client(client_error) = &error
                && is_daemon_not_running(client_error)
            {
                let _ = writeln!(stderr, "start one with `courier --mode daemon`");
            }
            ExitCode::FAILURE
        }
    }
}

fn execute<R, W>(
    cli: &Cli,
    input: R,
    stdin_is_terminal: bool,
    stdout: &mut W,
) -> Result<ExitCode, AppError>
where
    R: Read + Send + 'static,
    W: Write,
{
    telemetry::initialise(&cli.config)?;
    let mode = cli.resolve_mode(stdin_is_terminal);
    debug!(target: CLI_TARGET, ?mode, "runtime mode selected");

    match mode {
        Mode::Inline => {
            let registry = local_registry(&cli.config)?;
            match cli.one_shot() {
                Some(request) => inline::run_one_shot(&registry, request, stdout),
                None => inline::run_stream(&registry, BufReader::new(input), stdout),
            }
        }
        Mode::Client => {
            let registry = local_registry(&cli.config)?;
            client::run(&cli.config, &registry, cli.one_shot(), input, stdout)
        }
        Mode::Daemon => {
            if cli.type_name.is_some() {
                warn!(target: CLI_TARGET, "positional arguments are ignored in daemon mode");
            }
            run_daemon(&cli.config)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Built-in capabilities for in-process dispatch and argument conversion.
///
/// The shutdown flag is private to the invocation: `Syscall.Shutdown` run
/// inline has nothing to stop.
fn local_registry(config: &Config) -> Result<Registry, AppError> {
    let options = KernelOptions::from_config(config, ShutdownFlag::new());
    Ok(builtin_registry(&options)?)
}

#[cfg(test)]
mod tests;
