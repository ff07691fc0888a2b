//! Newline-delimited JSON codec for envelopes.
//!
//! Decoding is per line: a line that does not hold a well-formed envelope is
//! reported as a [`ProtocolViolation`] so the caller can skip it and carry on
//! with the rest of the stream. Encoding always yields exactly one line;
//! `serde_json` escapes control characters inside strings, so an embedded
//! newline can never split an envelope across lines.

use std::io::{self, Write};

use thiserror::Error;

use crate::envelope::Envelope;

/// Reasons a line was rejected by the decoder.
#[derive(Debug, Error)]
pub enum ProtocolViolation {
    /// The line is not JSON, or its JSON is not an envelope.
    #[error("malformed envelope: {message}")]
    Malformed {
        /// Parser diagnostic.
        message: String,
        /// Underlying parse error.
        #[source]
        source: serde_json::Error,
    },
    /// The line exceeded the framing limit and was discarded.
    #[error("line of {size} bytes exceeds the {limit} byte limit")]
    Oversized {
        /// Bytes consumed for the discarded line.
        size: usize,
        /// Configured limit.
        limit: usize,
    },
}

impl ProtocolViolation {
    fn malformed(source: serde_json::Error) -> Self {
        Self::Malformed {
            message: source.to_string(),
            source,
        }
    }
}

/// Errors raised while writing envelopes.
#[derive(Debug, Error)]
pub enum EncodeError {
    /// Serialisation failed.
    #[error("failed to serialise envelope: {0}")]
    Serialise(#[from] serde_json::Error),
    /// Writing to the sink failed.
    #[error("failed to write envelope: {0}")]
    Io(#[from] io::Error),
}

/// Decodes one line into an envelope.
///
/// Trailing whitespace, including the newline delimiter, is ignored. Blank
/// lines decode to `Ok(None)`.
///
/// # Errors
///
/// Returns [`ProtocolViolation::Malformed`] when the line is not valid JSON,
/// lacks `kind` or `type`, names an unknown kind, or has an empty type.
pub fn decode(line: &[u8]) -> Result<Option<Envelope>, ProtocolViolation> {
    let trimmed = line.trim_ascii();
    if trimmed.is_empty() {
        return Ok(None);
    }
    serde_json::from_slice(trimmed)
        .map(Some)
        .map_err(ProtocolViolation::malformed)
}

/// Encodes an envelope as one compact JSON line, newline included.
///
/// # Errors
///
/// Returns [`EncodeError::Serialise`] if the payload cannot be serialised.
pub fn encode(envelope: &Envelope) -> Result<Vec<u8>, EncodeError> {
    let mut line = serde_json::to_vec(envelope)?;
    line.push(b'\n');
    Ok(line)
}

/// Writes an envelope line to `writer` and flushes it.
///
/// # Errors
///
/// Returns [`EncodeError`] when serialisation or IO fails.
pub fn write_envelope<W: Write>(writer: &mut W, envelope: &Envelope) -> Result<(), EncodeError> {
    let line = encode(envelope)?;
    writer.write_all(&line)?;
    writer.flush()?;
    Ok(())
}
