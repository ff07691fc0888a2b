//! In-process dispatch without a daemon.

use std::io::{BufRead, Write};
use std::process::ExitCode;

use courier_protocol::{Kind, write_envelope};
use courierd::{Pipeline, Registry, dispatch};
use tracing::debug;

use crate::cli::OneShot;
use crate::errors::AppError;

const INLINE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::inline");

/// Dispatches a single request built from command-line arguments.
///
/// Exits with failure when the outcome is an `error` envelope.
pub(crate) fn run_one_shot<W: Write>(
    registry: &Registry,
    request: OneShot<'_>,
    stdout: &mut W,
) -> Result<ExitCode, AppError> {
    let envelope = registry.envelope_from_args(request.type_name, request.arguments)?;
    let outcome = dispatch(&envelope, registry);
    write_envelope(stdout, &outcome)?;
    Ok(exit_code_for(outcome.kind))
}

/// Runs the unauthenticated pipeline over `input` until end of stream.
pub(crate) fn run_stream<R: BufRead, W: Write>(
    registry: &Registry,
    input: R,
    stdout: &mut W,
) -> Result<ExitCode, AppError> {
    let summary = Pipeline::new(registry).run(input, stdout)?;
    debug!(
        target: INLINE_TARGET,
        processed = summary.processed,
        skipped = summary.skipped,
        written = summary.written,
        "inline stream finished"
    );
    Ok(ExitCode::SUCCESS)
}

pub(crate) fn exit_code_for(kind: Kind) -> ExitCode {
    if kind == Kind::Error {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
