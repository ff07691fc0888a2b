use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Machine-readable failure category carried by `error` envelopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// A line on the stream could not be decoded.
    Protocol,
    /// No capability is registered under the requested type.
    UnknownCapability,
    /// The envelope kind is not a command or query.
    NotDispatchable,
    /// A query was sent to a command capability or vice versa.
    KindMismatch,
    /// The payload failed input validation.
    InvalidInput,
    /// The capability failed while processing.
    ExecutionFailed,
    /// The capability produced output that failed validation.
    InvalidOutput,
    /// The connection has not authenticated.
    Unauthenticated,
    /// A code this build does not know.
    #[serde(other)]
    Other,
}

impl ErrorCode {
    /// Wire spelling of the code.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Protocol => "protocol",
            Self::UnknownCapability => "unknown_capability",
            Self::NotDispatchable => "not_dispatchable",
            Self::KindMismatch => "kind_mismatch",
            Self::InvalidInput => "invalid_input",
            Self::ExecutionFailed => "execution_failed",
            Self::InvalidOutput => "invalid_output",
            Self::Unauthenticated => "unauthenticated",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Payload of an `error` envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Failure category.
    pub code: ErrorCode,
    /// Human-readable description.
    pub message: String,
    /// Optional structured context, such as the failing schema path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl ErrorBody {
    /// Builds a body without details.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    /// Attaches structured details.
    #[must_use]
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Renders the body as a JSON object.
    #[must_use]
    pub fn to_value(&self) -> Value {
        let mut object = Map::new();
        object.insert("code".to_owned(), Value::from(self.code.as_str()));
        object.insert("message".to_owned(), Value::from(self.message.clone()));
        if let Some(details) = &self.details {
            object.insert("details".to_owned(), details.clone());
        }
        Value::Object(object)
    }
}
