//! Turns one request envelope into exactly one outcome envelope.
//!
//! Dispatch never fails: every problem between lookup and reply wrapping is
//! reported to the caller as an `error` envelope whose causation is the
//! request id. The steps run in a fixed order:
//!
//! 1. look the type up in the [`Registry`];
//! 2. check that the envelope kind is a request and matches the capability;
//! 3. validate `data` against the input schema and deserialise it;
//! 4. run the capability behind a panic boundary;
//! 5. validate the output against the output schema;
//! 6. wrap the output as a `reply`.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use courier_protocol::{Envelope, ErrorBody, ErrorCode};
use tracing::{debug, warn};

use crate::capability::{CapabilityError, InvocationError};
use crate::registry::{RegisteredCapability, Registry};

pub(crate) const DISPATCH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::dispatch");

/// Routes `envelope` to its capability and returns the outcome.
#[must_use]
pub fn dispatch(envelope: &Envelope, registry: &Registry) -> Envelope {
    match run(envelope, registry) {
        Ok(reply) => reply,
        Err(body) => {
            debug!(
                target: DISPATCH_TARGET,
                request = envelope.id(),
                type_name = %envelope.type_name,
                code = %body.code,
                message = %body.message,
                "request failed"
            );
            Envelope::error_to(envelope, &body)
        }
    }
}

fn run(envelope: &Envelope, registry: &Registry) -> Result<Envelope, ErrorBody> {
    let entry = registry.get(&envelope.type_name).ok_or_else(|| {
        ErrorBody::new(
            ErrorCode::UnknownCapability,
            format!("unknown capability: {}", envelope.type_name),
        )
    })?;
    check_kind(envelope, entry)?;

    entry.input_schema().validate(&envelope.data).map_err(|violation| {
        ErrorBody::new(ErrorCode::InvalidInput, format!("invalid input: {violation}"))
            .with_details(violation.to_details())
    })?;

    let output = invoke(entry, envelope)?;

    entry.output_schema().validate(&output).map_err(|violation| {
        warn!(
            target: DISPATCH_TARGET,
            type_name = %envelope.type_name,
            violation = %violation,
            "capability produced output outside its schema"
        );
        ErrorBody::new(ErrorCode::InvalidOutput, format!("invalid output: {violation}"))
            .with_details(violation.to_details())
    })?;

    Ok(Envelope::reply_to(envelope, output))
}

fn check_kind(envelope: &Envelope, entry: &RegisteredCapability) -> Result<(), ErrorBody> {
    if !envelope.kind.is_request() {
        return Err(ErrorBody::new(
            ErrorCode::NotDispatchable,
            format!(
                "{} envelopes cannot be dispatched; send a command or query",
                envelope.kind
            ),
        ));
    }
    if !entry.kind().accepts(envelope.kind) {
        return Err(ErrorBody::new(
            ErrorCode::KindMismatch,
            format!(
                "{} is a {}; it cannot be sent as a {}",
                envelope.type_name,
                entry.kind().as_str(),
                envelope.kind
            ),
        ));
    }
    Ok(())
}

fn invoke(
    entry: &RegisteredCapability,
    envelope: &Envelope,
) -> Result<serde_json::Value, ErrorBody> {
    let data = envelope.data.clone();
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| entry.invoke(data, envelope)));
    match outcome {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(InvocationError::Input(error))) => Err(ErrorBody::new(
            ErrorCode::InvalidInput,
            format!("invalid input: {error}"),
        )),
        Ok(Err(InvocationError::Process(error))) => Err(execution_failed(&error)),
        Ok(Err(InvocationError::Output(error))) => Err(ErrorBody::new(
            ErrorCode::InvalidOutput,
            format!("invalid output: {error}"),
        )),
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            warn!(
                target: DISPATCH_TARGET,
                type_name = %envelope.type_name,
                request = envelope.id(),
                panic = %message,
                "capability panicked"
            );
            Err(ErrorBody::new(
                ErrorCode::ExecutionFailed,
                format!("capability panicked: {message}"),
            ))
        }
    }
}

fn execution_failed(error: &CapabilityError) -> ErrorBody {
    ErrorBody::new(ErrorCode::ExecutionFailed, error.to_string())
}

/// Extracts the message carried by a panic payload.
#[must_use]
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_owned()
    }
}
