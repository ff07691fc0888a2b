//! Wire types shared by the courier kernel and its clients.
//!
//! Every message is an [`Envelope`]: a `kind`, a dotted `type`, an opaque
//! `data` payload and lineage [`Metadata`]. Envelopes travel as
//! newline-delimited JSON, one compact object per line:
//!
//! ```json
//! {"kind":"query","type":"Ping","data":{"payload":"hi"},"metadata":{"id":"…","timestamp":1700000000000}}
//! ```
//!
//! The [`codec`] module converts between lines and envelopes, and
//! [`LineReader`] frames a byte stream into bounded lines.

pub mod codec;
mod envelope;
mod error_body;
mod lines;

pub use codec::{EncodeError, ProtocolViolation, decode, encode, write_envelope};
pub use envelope::{Envelope, InvalidEnvelope, Kind, Metadata, new_message_id, now_millis};
pub use error_body::{ErrorBody, ErrorCode};
pub use lines::{Line, LineReader, MAX_LINE_BYTES};
