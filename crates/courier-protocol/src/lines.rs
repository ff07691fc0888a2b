//! Bounded line framing over buffered readers.

use std::io::{self, BufRead};

/// Maximum size of a single envelope line in bytes, delimiter included.
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

/// One framed line.
#[derive(Debug, PartialEq, Eq)]
pub enum Line {
    /// A complete line, delimiter included when present.
    Complete(Vec<u8>),
    /// A line that exceeded the limit; its bytes were discarded.
    Oversized {
        /// Number of bytes consumed for the line.
        size: usize,
    },
}

/// Splits a byte stream into newline-terminated lines of bounded size.
///
/// An oversized line is consumed up to and including its newline so that the
/// following line is framed correctly.
#[derive(Debug)]
pub struct LineReader<R> {
    inner: R,
    limit: usize,
}

impl<R: BufRead> LineReader<R> {
    /// Wraps `inner` with the default [`MAX_LINE_BYTES`] limit.
    pub const fn new(inner: R) -> Self {
        Self::with_limit(inner, MAX_LINE_BYTES)
    }

    /// Wraps `inner` with a custom limit.
    pub const fn with_limit(inner: R, limit: usize) -> Self {
        Self { inner, limit }
    }

    /// Configured line limit.
    pub const fn limit(&self) -> usize {
        self.limit
    }

    /// Reads the next line.
    ///
    /// Returns `Ok(None)` at end of stream. A final line without a trailing
    /// newline is still returned.
    ///
    /// # Errors
    ///
    /// Propagates read errors other than interruptions.
    pub fn next_line(&mut self) -> io::Result<Option<Line>> {
        let mut buffer = Vec::new();
        let mut discarded = 0_usize;
        let mut oversized = false;

        loop {
            let available = match self.inner.fill_buf() {
                Ok(bytes) => bytes,
                Err(error) if error.kind() == io::ErrorKind::Interrupted => continue,
                Err(error) => return Err(error),
            };

            if available.is_empty() {
                return Ok(if oversized {
                    Some(Line::Oversized { size: discarded })
                } else if buffer.is_empty() {
                    None
                } else {
                    Some(Line::Complete(buffer))
                });
            }

            let newline = available.iter().position(|byte| *byte == b'\n');
            let take = newline.map_or(available.len(), |pos| pos + 1);

            if oversized {
                discarded += take;
            } else {
                buffer.extend_from_slice(available.get(..take).unwrap_or_default());
                if buffer.len() > self.limit {
                    oversized = true;
                    discarded = buffer.len();
                    buffer = Vec::new();
                }
            }
            self.inner.consume(take);

            if newline.is_some() {
                return Ok(Some(if oversized {
                    Line::Oversized { size: discarded }
                } else {
                    Line::Complete(buffer)
                }));
            }
        }
    }
}
