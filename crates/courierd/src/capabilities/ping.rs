use courier_protocol::Envelope;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::capability::{Capability, CapabilityError, CapabilityKind, Schema};

/// Type name of the liveness check.
pub const PING: &str = "Ping";

/// Echoes its payload back unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct Ping;

/// Input and output of [`Ping`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PingPayload {
    /// Arbitrary JSON echoed verbatim.
    pub payload: Value,
}

impl Ping {
    fn schema() -> Schema {
        Schema::object().required("payload", Schema::Any).into()
    }
}

impl Capability for Ping {
    type Input = PingPayload;
    type Output = PingPayload;

    fn name(&self) -> &'static str {
        PING
    }

    fn kind(&self) -> CapabilityKind {
        CapabilityKind::Query
    }

    fn summary(&self) -> &'static str {
        "Echoes the payload back unchanged."
    }

    fn input_schema(&self) -> Schema {
        Self::schema()
    }

    fn output_schema(&self) -> Schema {
        Self::schema()
    }

    fn process(
        &self,
        input: PingPayload,
        _envelope: &Envelope,
    ) -> Result<PingPayload, CapabilityError> {
        Ok(input)
    }

    /// Joins the arguments with spaces into a string payload.
    fn from_args(&self, args: &[String]) -> Result<PingPayload, CapabilityError> {
        Ok(PingPayload {
            payload: Value::String(args.join(" ")),
        })
    }
}
