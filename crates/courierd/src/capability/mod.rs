//! The contract every capability satisfies.
//!
//! A capability pairs a data-driven [`Schema`] with a static Rust type for
//! both its input and its output. The schemas are checked at runtime and
//! rendered for introspection; the associated types give `process` a typed
//! signature. [`ErasedCapability`] hides the associated types so the
//! registry can store heterogeneous capabilities behind one trait object.

mod schema;

use std::error::Error as StdError;

use courier_protocol::{Envelope, Kind};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use thiserror::Error;

pub use self::schema::{ObjectSchema, Schema, SchemaViolation};

/// Whether a capability may have side effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CapabilityKind {
    /// Mutates state.
    Command,
    /// Read-only and idempotent.
    Query,
}

impl CapabilityKind {
    /// Envelope kind used when building requests for this capability.
    #[must_use]
    pub const fn envelope_kind(self) -> Kind {
        match self {
            Self::Command => Kind::Command,
            Self::Query => Kind::Query,
        }
    }

    /// Returns `true` when `kind` is the request kind this capability serves.
    #[must_use]
    pub fn accepts(self, kind: Kind) -> bool {
        self.envelope_kind() == kind
    }

    /// Wire spelling.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        self.envelope_kind().as_str()
    }
}

/// Failures raised by capability code.
#[derive(Debug, Error)]
pub enum CapabilityError {
    /// The capability refused or failed the request.
    #[error("{message}")]
    Failed {
        /// Caller-facing description.
        message: String,
    },
    /// Command-line arguments could not be turned into an input.
    #[error("invalid arguments: {message}")]
    InvalidArguments {
        /// Caller-facing description.
        message: String,
    },
    /// A collaborator failed.
    #[error(transparent)]
    Collaborator(#[from] Box<dyn StdError + Send + Sync>),
}

impl CapabilityError {
    /// Builds a [`CapabilityError::Failed`].
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }

    /// Builds a [`CapabilityError::InvalidArguments`].
    pub fn invalid_arguments(message: impl Into<String>) -> Self {
        Self::InvalidArguments {
            message: message.into(),
        }
    }
}

/// A unit of behaviour addressed by a dotted type name.
///
/// Implementations must be cheap to share: the registry holds one instance
/// for the life of the process and calls it from every connection thread.
/// Capabilities with mutable state synchronise it themselves.
pub trait Capability: Send + Sync + 'static {
    /// Typed input, deserialised from the envelope's `data`.
    type Input: DeserializeOwned + Serialize;
    /// Typed output, serialised into the reply's `data`.
    type Output: Serialize;

    /// Dotted type name, for example `Syscall.Authenticate`.
    fn name(&self) -> &'static str;

    /// Command or query.
    fn kind(&self) -> CapabilityKind;

    /// One-line description shown by introspection.
    fn summary(&self) -> &'static str {
        ""
    }

    /// Shape accepted in the request's `data`.
    fn input_schema(&self) -> Schema;

    /// Shape produced in the reply's `data`.
    fn output_schema(&self) -> Schema;

    /// Runs the capability.
    ///
    /// # Errors
    ///
    /// Returns [`CapabilityError`] when the request cannot be served; the
    /// dispatcher turns it into an `error` envelope.
    fn process(
        &self,
        input: Self::Input,
        envelope: &Envelope,
    ) -> Result<Self::Output, CapabilityError>;

    /// Builds an input from a flat argument list.
    ///
    /// The default accepts either no arguments (an empty object) or a single
    /// argument holding a JSON document.
    ///
    /// # Errors
    ///
    /// Returns [`CapabilityError::InvalidArguments`] when the arguments do
    /// not describe a valid input.
    fn from_args(&self, args: &[String]) -> Result<Self::Input, CapabilityError> {
        let value = json_from_args(args)?;
        serde_json::from_value(value)
            .map_err(|error| CapabilityError::invalid_arguments(error.to_string()))
    }
}

/// Interprets arguments as zero or one JSON document.
///
/// # Errors
///
/// Returns [`CapabilityError::InvalidArguments`] for more than one argument
/// or a single argument that is not JSON.
pub fn json_from_args(args: &[String]) -> Result<Value, CapabilityError> {
    match args {
        [] => Ok(Value::Object(Map::new())),
        [document] => serde_json::from_str(document).map_err(|error| {
            CapabilityError::invalid_arguments(format!("argument is not JSON: {error}"))
        }),
        _ => Err(CapabilityError::invalid_arguments(format!(
            "expected at most one JSON argument, received {}",
            args.len()
        ))),
    }
}

/// Static description of a registered capability.
#[derive(Debug, Clone, PartialEq)]
pub struct CapabilityDescriptor {
    /// Dotted type name.
    pub name: &'static str,
    /// Command or query.
    pub kind: CapabilityKind,
    /// One-line description.
    pub summary: &'static str,
    /// Input schema.
    pub input: Schema,
    /// Output schema.
    pub output: Schema,
}

impl CapabilityDescriptor {
    pub(crate) fn of<C: Capability>(capability: &C) -> Self {
        Self {
            name: capability.name(),
            kind: capability.kind(),
            summary: capability.summary(),
            input: capability.input_schema(),
            output: capability.output_schema(),
        }
    }

    /// Machine-readable form used by `Syscall.Describe`.
    #[must_use]
    pub fn to_json(&self) -> Value {
        let mut object = Map::new();
        object.insert("type".to_owned(), Value::from(self.name));
        object.insert("kind".to_owned(), Value::from(self.kind.as_str()));
        object.insert("summary".to_owned(), Value::from(self.summary));
        object.insert("input".to_owned(), self.input.to_json());
        object.insert("output".to_owned(), self.output.to_json());
        Value::Object(object)
    }
}

/// Why a type-erased invocation failed.
#[derive(Debug)]
pub(crate) enum InvocationError {
    Input(serde_json::Error),
    Process(CapabilityError),
    Output(serde_json::Error),
}

/// Object-safe view of a [`Capability`].
pub(crate) trait ErasedCapability: Send + Sync {
    fn data_from_args(&self, args: &[String]) -> Result<Value, CapabilityError>;

    fn invoke(&self, data: Value, envelope: &Envelope) -> Result<Value, InvocationError>;
}

impl<C: Capability> ErasedCapability for C {
    fn data_from_args(&self, args: &[String]) -> Result<Value, CapabilityError> {
        let input = self.from_args(args)?;
        serde_json::to_value(input)
            .map_err(|error| CapabilityError::invalid_arguments(error.to_string()))
    }

    fn invoke(&self, data: Value, envelope: &Envelope) -> Result<Value, InvocationError> {
        let input: C::Input = serde_json::from_value(data).map_err(InvocationError::Input)?;
        let output = self
            .process(input, envelope)
            .map_err(InvocationError::Process)?;
        serde_json::to_value(output).map_err(InvocationError::Output)
    }
}
