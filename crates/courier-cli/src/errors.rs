//! Error types for the CLI runtime.

use std::io;

use camino::Utf8PathBuf;
use courier_config::SocketLocatorError;
use courier_protocol::EncodeError;
use courierd::{CapabilityError, DaemonError, PipelineError, RegistryError, TelemetryError};
use thiserror::Error;

#[derive(Debug, Error)]
pub(crate) enum AppError {
    #[error("{0}")]
    CliUsage(clap::Error),
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),
    #[error("failed to build the capability registry: {0}")]
    Registry(#[from] RegistryError),
    #[error("cannot build request: {0}")]
    Arguments(#[from] CapabilityError),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error("failed to write output: {0}")]
    Output(#[from] EncodeError),
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error(transparent)]
    Daemon(#[from] DaemonError),
}

/// Failures while relaying envelopes to a daemon.
#[derive(Debug, Error)]
pub(crate) enum ClientError {
    #[error(transparent)]
    Locate(#[from] SocketLocatorError),
    #[error("failed to connect to daemon at {socket}: {source}")]
    Connect {
        socket: Utf8PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to send request to daemon: {0}")]
    Send(#[source] io::Error),
    #[error("failed to encode request: {0}")]
    Encode(#[from] EncodeError),
    #[error("failed to read response from daemon: {0}")]
    Receive(#[source] io::Error),
    #[error("daemon closed the connection during authentication")]
    Closed,
    #[error("daemon sent an unreadable reply: {0}")]
    Reply(#[source] courier_protocol::ProtocolViolation),
    #[error("failed to forward daemon output: {0}")]
    Forward(#[source] io::Error),
    #[error("failed to start the input forwarder: {0}")]
    Spawn(#[source] io::Error),
}

/// Returns true when the error means nothing is listening on the socket.
pub(crate) fn is_daemon_not_running(error: &ClientError) -> bool {
    match error {
        ClientError::Connect { source, .. } => matches!(
            source.kind(),
            io::ErrorKind::ConnectionRefused | io::ErrorKind::NotFound
        ),
        _ => false,
    }
}
