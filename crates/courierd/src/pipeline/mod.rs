//! Per-connection processing: decode, gate, log, dispatch, encode.
//!
//! A [`Pipeline`] drives one stream to completion. Each line is processed
//! fully, and its outcome written and flushed, before the next line is read,
//! so a slow consumer throttles the producer and replies follow request
//! order.

mod gate;

use std::io::{self, BufRead, Write};

use courier_protocol::{
    EncodeError, Envelope, Kind, Line, LineReader, ProtocolViolation, decode, write_envelope,
};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::dispatch::dispatch;
use crate::registry::Registry;

use self::gate::{Admission, Gate};

pub(crate) const PIPELINE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::pipeline");

/// Failures that end a pipeline run early.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Reading the input stream failed.
    #[error("failed to read input: {0}")]
    Read(#[source] io::Error),
    /// Writing an outcome failed.
    #[error(transparent)]
    Write(#[from] EncodeError),
}

/// Counters describing a finished run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PipelineSummary {
    /// Envelopes that passed decoding.
    pub processed: usize,
    /// Lines dropped as protocol violations.
    pub skipped: usize,
    /// Outcome envelopes written.
    pub written: usize,
    /// `true` when the authentication gate closed the stream.
    pub rejected: bool,
}

enum Step {
    Emit(Envelope),
    Silent,
    Terminate(Envelope),
}

/// Stage composition bound to a registry.
#[derive(Debug, Clone, Copy)]
pub struct Pipeline<'a> {
    registry: &'a Registry,
    authenticate: bool,
}

impl<'a> Pipeline<'a> {
    /// Builds a pipeline without the authentication gate.
    #[must_use]
    pub const fn new(registry: &'a Registry) -> Self {
        Self {
            registry,
            authenticate: false,
        }
    }

    /// Requires `Syscall.Authenticate` as the first envelope.
    #[must_use]
    pub const fn with_authentication(mut self) -> Self {
        self.authenticate = true;
        self
    }

    /// Processes `reader` until end of stream or until the gate closes it.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] when the input cannot be read or an outcome
    /// cannot be written. Malformed lines are not errors; they are logged and
    /// counted in [`PipelineSummary::skipped`].
    pub fn run<R, W>(&self, reader: R, writer: &mut W) -> Result<PipelineSummary, PipelineError>
    where
        R: BufRead,
        W: Write,
    {
        let mut lines = LineReader::new(reader);
        let mut gate = if self.authenticate {
            Gate::guarded()
        } else {
            Gate::open()
        };
        let mut summary = PipelineSummary::default();

        while let Some(line) = lines.next_line().map_err(PipelineError::Read)? {
            let Some(envelope) = decode_stage(line, lines.limit(), &mut summary) else {
                continue;
            };
            summary.processed += 1;
            log_stage(&envelope);
            match self.step(&envelope, &mut gate) {
                Step::Emit(outcome) => {
                    write_envelope(writer, &outcome)?;
                    summary.written += 1;
                }
                Step::Silent => {}
                Step::Terminate(outcome) => {
                    write_envelope(writer, &outcome)?;
                    summary.written += 1;
                    summary.rejected = true;
                    break;
                }
            }
        }
        Ok(summary)
    }

    fn step(&self, envelope: &Envelope, gate: &mut Gate) -> Step {
        match gate.admit(envelope) {
            Admission::Reject(error) => {
                info!(
                    target: PIPELINE_TARGET,
                    type_name = %envelope.type_name,
                    "closing unauthenticated connection"
                );
                Step::Terminate(error)
            }
            Admission::Handshake => {
                let outcome = dispatch(envelope, self.registry);
                if gate.settle(&outcome) {
                    Step::Emit(outcome)
                } else {
                    info!(target: PIPELINE_TARGET, "authentication failed; closing connection");
                    Step::Terminate(outcome)
                }
            }
            Admission::Pass if envelope.kind == Kind::Event => {
                info!(
                    target: PIPELINE_TARGET,
                    type_name = %envelope.type_name,
                    id = envelope.id(),
                    "event received"
                );
                Step::Silent
            }
            Admission::Pass => Step::Emit(dispatch(envelope, self.registry)),
        }
    }
}

fn decode_stage(line: Line, limit: usize, summary: &mut PipelineSummary) -> Option<Envelope> {
    let result = match line {
        Line::Complete(bytes) => decode(&bytes),
        Line::Oversized { size } => Err(ProtocolViolation::Oversized { size, limit }),
    };
    match result {
        Ok(envelope) => envelope,
        Err(violation) => {
            summary.skipped += 1;
            warn!(
                target: PIPELINE_TARGET,
                error = %violation,
                "skipping protocol violation"
            );
            None
        }
    }
}

fn log_stage(envelope: &Envelope) {
    debug!(
        target: PIPELINE_TARGET,
        id = envelope.id(),
        kind = %envelope.kind,
        type_name = %envelope.type_name,
        correlation = envelope.correlation(),
        causation = envelope.causation(),
        "envelope received"
    );
}

#[cfg(test)]
mod tests;
