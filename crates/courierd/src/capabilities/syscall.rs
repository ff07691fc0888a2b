//! The `Syscall.*` capabilities that control the kernel itself.

use courier_protocol::Envelope;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use subtle::ConstantTimeEq;
use tracing::info;

use crate::capability::{Capability, CapabilityDescriptor, CapabilityError, CapabilityKind, Schema};
use crate::shutdown::ShutdownFlag;

/// Type name of the connection handshake.
pub const AUTHENTICATE: &str = "Syscall.Authenticate";
/// Type name of the shutdown request.
pub const SHUTDOWN: &str = "Syscall.Shutdown";
/// Type name of the introspection query.
pub const DESCRIBE: &str = "Syscall.Describe";

const SYSCALL_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::syscall");

/// Request body for `Syscall.Authenticate`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// Shared secret presented by the caller.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Free-form caller label, used only for logging.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client: Option<String>,
}

/// Reply body for `Syscall.Authenticate`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Always `true` on success.
    pub authenticated: bool,
    /// Session identifier the caller should use as correlation.
    pub session: String,
}

/// Checks the caller's token against the configured secret.
///
/// Without a configured secret every caller is accepted.
#[derive(Debug, Clone, Default)]
pub struct Authenticate {
    token: Option<String>,
}

impl Authenticate {
    /// Builds the capability around an optional expected token.
    #[must_use]
    pub const fn new(token: Option<String>) -> Self {
        Self { token }
    }
}

impl Capability for Authenticate {
    type Input = Credentials;
    type Output = Session;

    fn name(&self) -> &'static str {
        AUTHENTICATE
    }

    fn kind(&self) -> CapabilityKind {
        CapabilityKind::Command
    }

    fn summary(&self) -> &'static str {
        "Opens an authenticated session on the current connection."
    }

    fn input_schema(&self) -> Schema {
        Schema::object()
            .optional("token", Schema::String)
            .optional("client", Schema::String)
            .into()
    }

    fn output_schema(&self) -> Schema {
        Schema::object()
            .required("authenticated", Schema::Boolean)
            .required("session", Schema::String)
            .into()
    }

    fn process(&self, input: Credentials, envelope: &Envelope) -> Result<Session, CapabilityError> {
        if let Some(expected) = &self.token
            && !token_matches(expected, input.token.as_deref())
        {
            info!(
                target: SYSCALL_TARGET,
                client = input.client.as_deref().unwrap_or("unknown"),
                "authentication rejected"
            );
            return Err(CapabilityError::failed("invalid credentials"));
        }
        let session = envelope
            .correlation()
            .unwrap_or_else(|| envelope.id())
            .to_owned();
        info!(
            target: SYSCALL_TARGET,
            client = input.client.as_deref().unwrap_or("unknown"),
            session = %session,
            "session opened"
        );
        Ok(Session {
            authenticated: true,
            session,
        })
    }
}

/// Acknowledgement returned by `Syscall.Shutdown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShutdownAck {
    /// Always `true`.
    pub shutting_down: bool,
}

/// Empty request body.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoInput {}

/// Asks the daemon to stop accepting connections and drain.
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    flag: ShutdownFlag,
}

impl Shutdown {
    /// Builds the capability around the daemon's shutdown flag.
    #[must_use]
    pub const fn new(flag: ShutdownFlag) -> Self {
        Self { flag }
    }
}

impl Capability for Shutdown {
    type Input = NoInput;
    type Output = ShutdownAck;

    fn name(&self) -> &'static str {
        SHUTDOWN
    }

    fn kind(&self) -> CapabilityKind {
        CapabilityKind::Command
    }

    fn summary(&self) -> &'static str {
        "Stops the daemon after in-flight requests finish."
    }

    fn input_schema(&self) -> Schema {
        Schema::empty_object()
    }

    fn output_schema(&self) -> Schema {
        Schema::object()
            .required("shutting_down", Schema::Boolean)
            .into()
    }

    fn process(
        &self,
        _input: NoInput,
        envelope: &Envelope,
    ) -> Result<ShutdownAck, CapabilityError> {
        info!(
            target: SYSCALL_TARGET,
            request = envelope.id(),
            correlation = envelope.correlation(),
            "shutdown requested by caller"
        );
        self.flag.request();
        Ok(ShutdownAck {
            shutting_down: true,
        })
    }
}

/// Reply body for `Syscall.Describe`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Catalogue {
    /// One entry per registered capability, ordered by type name.
    pub capabilities: Vec<Value>,
}

/// Lists every registered capability with its schemas.
#[derive(Debug, Clone, Default)]
pub struct Describe {
    catalogue: Vec<Value>,
}

impl Describe {
    /// Freezes the catalogue rendered from `descriptors`.
    #[must_use]
    pub fn new(descriptors: &[CapabilityDescriptor]) -> Self {
        Self {
            catalogue: descriptors.iter().map(CapabilityDescriptor::to_json).collect(),
        }
    }
}

impl Capability for Describe {
    type Input = NoInput;
    type Output = Catalogue;

    fn name(&self) -> &'static str {
        DESCRIBE
    }

    fn kind(&self) -> CapabilityKind {
        CapabilityKind::Query
    }

    fn summary(&self) -> &'static str {
        "Lists registered capabilities and their schemas."
    }

    fn input_schema(&self) -> Schema {
        Schema::empty_object()
    }

    fn output_schema(&self) -> Schema {
        Schema::object()
            .required(
                "capabilities",
                Schema::array(Schema::object().allow_additional().into()),
            )
            .into()
    }

    fn process(&self, _input: NoInput, _envelope: &Envelope) -> Result<Catalogue, CapabilityError> {
        Ok(Catalogue {
            capabilities: self.catalogue.clone(),
        })
    }
}

fn token_matches(expected: &str, presented: Option<&str>) -> bool {
    presented.is_some_and(|presented| bool::from(expected.as_bytes().ct_eq(presented.as_bytes())))
}
