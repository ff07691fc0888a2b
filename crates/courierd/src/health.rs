//! Structured health reporting for daemon lifecycle events.

use std::sync::Arc;

use courier_config::SocketPath;

use crate::daemon::{DaemonError, DrainReport};

const HEALTH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::health");

/// Observer trait used to surface lifecycle events to telemetry sinks.
#[cfg_attr(test, mockall::automock)]
pub trait HealthReporter: Send + Sync {
    /// Invoked before the socket is prepared.
    fn daemon_starting(&self, socket: &SocketPath);

    /// Invoked when a socket file left by a dead daemon was removed.
    fn stale_socket_removed(&self, socket: &SocketPath);

    /// Invoked once the listener accepts connections.
    fn daemon_listening(&self, socket: &SocketPath);

    /// Invoked when the shutdown flag is first observed.
    fn shutdown_requested(&self);

    /// Invoked after the drain sequence completes.
    fn daemon_drained(&self, report: &DrainReport);

    /// Invoked when start-up or shutdown fails.
    fn daemon_failed(&self, error: &DaemonError);
}

impl<T> HealthReporter for Arc<T>
where
    T: HealthReporter + ?Sized,
{
    fn daemon_starting(&self, socket: &SocketPath) {
        (**self).daemon_starting(socket);
    }

    fn stale_socket_removed(&self, socket: &SocketPath) {
        (**self).stale_socket_removed(socket);
    }

    fn daemon_listening(&self, socket: &SocketPath) {
        (**self).daemon_listening(socket);
    }

    fn shutdown_requested(&self) {
        (**self).shutdown_requested();
    }

    fn daemon_drained(&self, report: &DrainReport) {
        (**self).daemon_drained(report);
    }

    fn daemon_failed(&self, error: &DaemonError) {
        (**self).daemon_failed(error);
    }
}

/// Default reporter that records lifecycle events using `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredHealthReporter;

impl StructuredHealthReporter {
    /// Builds a new reporter.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl HealthReporter for StructuredHealthReporter {
    fn daemon_starting(&self, socket: &SocketPath) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "daemon_starting",
            socket = %socket,
            "starting daemon"
        );
    }

    fn stale_socket_removed(&self, socket: &SocketPath) {
        tracing::warn!(
            target: HEALTH_TARGET,
            event = "stale_socket_removed",
            socket = %socket,
            "removed stale socket left by a previous daemon"
        );
    }

    fn daemon_listening(&self, socket: &SocketPath) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "daemon_listening",
            socket = %socket,
            "daemon accepting connections"
        );
    }

    fn shutdown_requested(&self) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "shutdown_requested",
            "shutdown requested; draining connections"
        );
    }

    fn daemon_drained(&self, report: &DrainReport) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "daemon_drained",
            served = report.served,
            abandoned = report.abandoned,
            "daemon stopped"
        );
    }

    fn daemon_failed(&self, error: &DaemonError) {
        tracing::error!(
            target: HEALTH_TARGET,
            event = "daemon_failed",
            error = %error,
            "daemon failed"
        );
    }
}
