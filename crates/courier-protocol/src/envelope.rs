//! The message envelope and its lineage rules.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::error_body::ErrorBody;

/// What an envelope means to the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    /// Mutates state.
    Command,
    /// Read-only and idempotent.
    Query,
    /// Notification; no reply is expected.
    Event,
    /// Successful outcome of a command or query.
    Reply,
    /// Failed outcome of a command or query.
    Error,
}

impl Kind {
    /// Returns `true` for kinds the dispatcher answers.
    #[must_use]
    pub const fn is_request(self) -> bool {
        matches!(self, Self::Command | Self::Query)
    }

    /// Returns `true` for reply and error kinds.
    #[must_use]
    pub const fn is_outcome(self) -> bool {
        matches!(self, Self::Reply | Self::Error)
    }

    /// Canonical wire spelling.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Command => "command",
            Self::Query => "query",
            Self::Event => "event",
            Self::Reply => "reply",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Identity and lineage of an envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    /// Unique identifier of this envelope instance.
    pub id: String,
    /// Creation time in milliseconds since the Unix epoch.
    pub timestamp: u64,
    /// Session or workflow identifier shared by related envelopes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation: Option<String>,
    /// Identifier of the envelope that directly produced this one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub causation: Option<String>,
}

impl Metadata {
    /// Fresh metadata with a new id, the current time and no lineage.
    #[must_use]
    pub fn fresh() -> Self {
        Self {
            id: new_message_id(),
            timestamp: now_millis(),
            correlation: None,
            causation: None,
        }
    }
}

/// The unit exchanged between callers and the kernel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "WireEnvelope")]
pub struct Envelope {
    /// Message kind.
    pub kind: Kind,
    /// Dotted capability name, for example `Syscall.Authenticate`.
    #[serde(rename = "type")]
    pub type_name: String,
    /// Capability-specific payload.
    pub data: Value,
    /// Identity and lineage.
    pub metadata: Metadata,
}

impl Envelope {
    /// Builds an envelope with a fresh id and timestamp.
    pub fn new(kind: Kind, type_name: impl Into<String>, data: Value) -> Self {
        Self {
            kind,
            type_name: type_name.into(),
            data,
            metadata: Metadata::fresh(),
        }
    }

    /// Builds a `command` envelope.
    pub fn command(type_name: impl Into<String>, data: Value) -> Self {
        Self::new(Kind::Command, type_name, data)
    }

    /// Builds a `query` envelope.
    pub fn query(type_name: impl Into<String>, data: Value) -> Self {
        Self::new(Kind::Query, type_name, data)
    }

    /// Builds an `event` envelope.
    pub fn event(type_name: impl Into<String>, data: Value) -> Self {
        Self::new(Kind::Event, type_name, data)
    }

    /// Sets the correlation id.
    #[must_use]
    pub fn with_correlation(mut self, correlation: impl Into<String>) -> Self {
        self.metadata.correlation = Some(correlation.into());
        self
    }

    /// Sets the causation id.
    #[must_use]
    pub fn with_causation(mut self, causation: impl Into<String>) -> Self {
        self.metadata.causation = Some(causation.into());
        self
    }

    /// Envelope id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.metadata.id
    }

    /// Correlation id, if any.
    #[must_use]
    pub fn correlation(&self) -> Option<&str> {
        self.metadata.correlation.as_deref()
    }

    /// Causation id, if any.
    #[must_use]
    pub fn causation(&self) -> Option<&str> {
        self.metadata.causation.as_deref()
    }

    /// Wraps `data` as the successful reply to `request`.
    ///
    /// The reply gets a fresh id, keeps the request's type and correlation,
    /// and names the request as its cause.
    #[must_use]
    pub fn reply_to(request: &Self, data: Value) -> Self {
        Self::outcome(Kind::Reply, request, data)
    }

    /// Wraps `body` as the failed outcome of `request`.
    #[must_use]
    pub fn error_to(request: &Self, body: &ErrorBody) -> Self {
        Self::outcome(Kind::Error, request, body.to_value())
    }

    fn outcome(kind: Kind, request: &Self, data: Value) -> Self {
        Self {
            kind,
            type_name: request.type_name.clone(),
            data,
            metadata: Metadata {
                id: new_message_id(),
                timestamp: now_millis(),
                correlation: request.metadata.correlation.clone(),
                causation: Some(request.metadata.id.clone()),
            },
        }
    }

    /// Parses the payload of an `error` envelope.
    #[must_use]
    pub fn error_body(&self) -> Option<ErrorBody> {
        if self.kind != Kind::Error {
            return None;
        }
        serde_json::from_value(self.data.clone()).ok()
    }
}

/// Generates a new envelope id (UUID v4, 122 random bits).
#[must_use]
pub fn new_message_id() -> String {
    Uuid::new_v4().to_string()
}

/// Milliseconds since the Unix epoch on the process-local clock.
#[must_use]
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

/// Lenient wire shape: metadata and data may be omitted by callers.
#[derive(Deserialize)]
struct WireEnvelope {
    kind: Kind,
    #[serde(rename = "type")]
    type_name: String,
    #[serde(default)]
    data: Value,
    #[serde(default)]
    metadata: Option<WireMetadata>,
}

#[derive(Deserialize)]
struct WireMetadata {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    timestamp: Option<u64>,
    #[serde(default)]
    correlation: Option<String>,
    #[serde(default)]
    causation: Option<String>,
}

/// Structural problems found after the JSON itself parsed.
#[derive(Debug, Error)]
pub enum InvalidEnvelope {
    /// The `type` field is empty or whitespace.
    #[error("envelope type is empty")]
    EmptyType,
    /// The metadata id is present but empty.
    #[error("envelope id is empty")]
    EmptyId,
}

impl TryFrom<WireEnvelope> for Envelope {
    type Error = InvalidEnvelope;

    fn try_from(wire: WireEnvelope) -> Result<Self, Self::Error> {
        let type_name = wire.type_name.trim().to_owned();
        if type_name.is_empty() {
            return Err(InvalidEnvelope::EmptyType);
        }
        let metadata = match wire.metadata {
            Some(meta) => {
                if meta.id.as_deref().is_some_and(|id| id.trim().is_empty()) {
                    return Err(InvalidEnvelope::EmptyId);
                }
                Metadata {
                    id: meta.id.unwrap_or_else(new_message_id),
                    timestamp: meta.timestamp.unwrap_or_else(now_millis),
                    correlation: meta.correlation,
                    causation: meta.causation,
                }
            }
            None => Metadata::fresh(),
        };
        Ok(Self {
            kind: wire.kind,
            type_name,
            data: wire.data,
            metadata,
        })
    }
}
