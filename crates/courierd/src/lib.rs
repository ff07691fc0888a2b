//! The courier message kernel.
//!
//! The kernel routes [`Envelope`](courier_protocol::Envelope)s to
//! capabilities. A [`Capability`] declares a type name, whether it is a
//! command or a query, and schemas for its input and output; a [`Registry`]
//! holds a fixed set of them for the life of the process. [`dispatch`]
//! turns one request into exactly one `reply` or `error`, and a [`Pipeline`]
//! applies it to a whole newline-delimited stream.
//!
//! Three runtime modes share this machinery:
//!
//! - inline: one pipeline over stdin and stdout, no socket;
//! - daemon: a [`Daemon`] serving a Unix socket, one thread per connection,
//!   each connection opening with `Syscall.Authenticate`;
//! - client: a caller relaying envelopes to a running daemon (see the
//!   `courier` binary).
//!
//! Diagnostics go through `tracing` to stderr; see [`telemetry`].

pub mod capabilities;
mod capability;
mod daemon;
mod dispatch;
mod health;
mod pipeline;
mod registry;
mod shutdown;
pub mod telemetry;
mod transport;

pub use capabilities::{KernelOptions, builtin_capabilities, builtin_registry};
pub use capability::{
    Capability, CapabilityDescriptor, CapabilityError, CapabilityKind, ObjectSchema, Schema,
    SchemaViolation, json_from_args,
};
pub use daemon::{Daemon, DaemonError, DaemonOptions, DrainReport, run_daemon};
pub use dispatch::{dispatch, panic_message};
pub use health::{HealthReporter, StructuredHealthReporter};
pub use pipeline::{Pipeline, PipelineError, PipelineSummary};
pub use registry::{RegisteredCapability, Registry, RegistryBuilder, RegistryError};
pub use shutdown::{SHUTDOWN_SIGNALS, ShutdownError, ShutdownFlag};
pub use telemetry::TelemetryError;
pub use transport::ListenerError;

#[cfg(test)]
mod tests;
