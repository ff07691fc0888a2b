//! Daemon lifecycle: bind, serve, drain.
//!
//! [`Daemon::start`] prepares the socket directory, binds the socket (taking
//! over a stale one) and starts the accept loop. [`Daemon::wait`] blocks until
//! the shutdown flag is raised, by a signal or by `Syscall.Shutdown`, and then
//! drains open connections within the configured timeout.

mod errors;

use std::sync::Arc;
use std::time::Duration;

use courier_config::{Config, SocketPath};
use tracing::{info, warn};

use crate::capabilities::{KernelOptions, builtin_registry};
use crate::health::{HealthReporter, StructuredHealthReporter};
use crate::registry::Registry;
use crate::shutdown::ShutdownFlag;
use crate::transport::{
    ConnectionTracker, DrainOutcome, ListenerHandle, PipelineConnectionHandler, SocketListener,
};

pub use self::errors::DaemonError;

const DAEMON_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::daemon");

/// Summary of a completed shutdown.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DrainReport {
    /// Connections accepted during the daemon's lifetime.
    pub served: usize,
    /// Connections still open when the drain timeout expired.
    pub abandoned: usize,
}

impl From<DrainOutcome> for DrainReport {
    fn from(outcome: DrainOutcome) -> Self {
        Self {
            served: outcome.served,
            abandoned: outcome.abandoned,
        }
    }
}

/// Socket and timing parameters for a daemon instance.
#[derive(Debug, Clone)]
pub struct DaemonOptions {
    /// Socket to bind.
    pub socket: SocketPath,
    /// Upper bound on the drain wait.
    pub drain_timeout: Duration,
}

impl DaemonOptions {
    /// Resolves options from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`DaemonError::Locate`] when no socket path can be derived.
    pub fn from_config(config: &Config) -> Result<Self, DaemonError> {
        Ok(Self {
            socket: config.daemon_socket()?,
            drain_timeout: config.drain_timeout(),
        })
    }
}

/// A running daemon.
pub struct Daemon {
    socket: SocketPath,
    drain_timeout: Duration,
    shutdown: ShutdownFlag,
    listener: ListenerHandle,
    tracker: ConnectionTracker,
    reporter: Arc<dyn HealthReporter>,
}

impl std::fmt::Debug for Daemon {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("Daemon")
            .field("socket", &self.socket)
            .field("drain_timeout", &self.drain_timeout)
            .field("shutdown", &self.shutdown)
            .finish_non_exhaustive()
    }
}

impl Daemon {
    /// Starts a daemon serving the built-in capabilities.
    ///
    /// # Errors
    ///
    /// Returns [`DaemonError`] when the socket cannot be located, prepared or
    /// bound, including when another daemon already answers on it.
    pub fn start(
        config: &Config,
        shutdown: ShutdownFlag,
        reporter: Arc<dyn HealthReporter>,
    ) -> Result<Self, DaemonError> {
        let registry = builtin_registry(&KernelOptions::from_config(config, shutdown.clone()))?;
        let options = DaemonOptions::from_config(config)?;
        Self::start_with(options, Arc::new(registry), shutdown, reporter)
    }

    /// Starts a daemon over an arbitrary registry.
    ///
    /// The registry should include `Syscall.Authenticate`, since every
    /// connection must open with it.
    ///
    /// # Errors
    ///
    /// Returns [`DaemonError`] when the socket cannot be prepared or bound.
    pub fn start_with(
        options: DaemonOptions,
        registry: Arc<Registry>,
        shutdown: ShutdownFlag,
        reporter: Arc<dyn HealthReporter>,
    ) -> Result<Self, DaemonError> {
        let DaemonOptions {
            socket,
            drain_timeout,
        } = options;
        reporter.daemon_starting(&socket);
        let tracker = ConnectionTracker::new();
        let started = bind_and_serve(&socket, registry, &shutdown, &tracker, reporter.as_ref());
        let listener = match started {
            Ok(listener) => listener,
            Err(error) => {
                reporter.daemon_failed(&error);
                return Err(error);
            }
        };
        reporter.daemon_listening(&socket);
        Ok(Self {
            socket,
            drain_timeout,
            shutdown,
            listener,
            tracker,
            reporter,
        })
    }

    /// Socket the daemon listens on.
    #[must_use]
    pub const fn socket(&self) -> &SocketPath {
        &self.socket
    }

    /// Flag that stops the daemon when raised.
    #[must_use]
    pub fn shutdown_flag(&self) -> ShutdownFlag {
        self.shutdown.clone()
    }

    /// Blocks until shutdown is requested, then drains connections.
    ///
    /// The socket file is removed before draining begins, so a new daemon
    /// can bind while this one finishes its in-flight requests.
    ///
    /// # Errors
    ///
    /// Returns [`DaemonError::Listener`] if the accept thread panicked.
    pub fn wait(self) -> Result<DrainReport, DaemonError> {
        let Self {
            drain_timeout,
            listener,
            tracker,
            reporter,
            ..
        } = self;
        if let Err(error) = listener.join() {
            let error = DaemonError::from(error);
            reporter.daemon_failed(&error);
            return Err(error);
        }
        reporter.shutdown_requested();
        tracker.close_reads();
        let report = DrainReport::from(tracker.wait_drained(drain_timeout));
        if report.abandoned > 0 {
            warn!(
                target: DAEMON_TARGET,
                abandoned = report.abandoned,
                timeout_ms = u64::try_from(drain_timeout.as_millis()).unwrap_or(u64::MAX),
                "drain timeout expired with connections still open"
            );
        }
        reporter.daemon_drained(&report);
        Ok(report)
    }
}

fn bind_and_serve(
    socket: &SocketPath,
    registry: Arc<Registry>,
    shutdown: &ShutdownFlag,
    tracker: &ConnectionTracker,
    reporter: &dyn HealthReporter,
) -> Result<ListenerHandle, DaemonError> {
    socket.prepare_directory()?;
    let listener = SocketListener::bind(socket, reporter)?;
    let handler = Arc::new(PipelineConnectionHandler::new(registry));
    Ok(listener.start(handler, shutdown.clone(), tracker.clone())?)
}

/// Runs the daemon in the foreground until a signal or `Syscall.Shutdown`
/// stops it.
///
/// # Errors
///
/// Returns [`DaemonError`] if signals cannot be installed or the daemon fails
/// to start.
pub fn run_daemon(config: &Config) -> Result<DrainReport, DaemonError> {
    let shutdown = ShutdownFlag::new();
    shutdown.register_signals()?;
    let reporter: Arc<dyn HealthReporter> = Arc::new(StructuredHealthReporter::new());
    let daemon = Daemon::start(config, shutdown, reporter)?;
    info!(
        target: DAEMON_TARGET,
        socket = %daemon.socket(),
        "daemon ready"
    );
    daemon.wait()
}
