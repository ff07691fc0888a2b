//! Defines the unified error surface for daemon start-up and supervision.

use courier_config::{SocketLocatorError, SocketPreparationError};
use thiserror::Error;

use crate::registry::RegistryError;
use crate::shutdown::ShutdownError;
use crate::transport::ListenerError;

/// Errors surfaced while starting or stopping the daemon.
#[derive(Debug, Error)]
pub enum DaemonError {
    /// No socket path could be derived.
    #[error("failed to locate daemon socket: {source}")]
    Locate {
        /// Underlying locator error.
        #[from]
        source: SocketLocatorError,
    },
    /// The socket directory could not be prepared.
    #[error("failed to prepare daemon socket: {source}")]
    Prepare {
        /// Underlying filesystem error.
        #[from]
        source: SocketPreparationError,
    },
    /// The capability table is inconsistent.
    #[error("failed to build capability registry: {source}")]
    Registry {
        /// Underlying registry error.
        #[from]
        source: RegistryError,
    },
    /// Binding or running the listener failed.
    #[error("daemon socket listener failed: {source}")]
    Listener {
        /// Underlying listener error.
        #[from]
        source: ListenerError,
    },
    /// Signal handlers could not be installed.
    #[error("failed to install shutdown signals: {source}")]
    Signals {
        /// Underlying signal error.
        #[from]
        source: ShutdownError,
    },
}

impl DaemonError {
    /// Returns `true` when another daemon already owns the socket.
    #[must_use]
    pub const fn is_already_running(&self) -> bool {
        matches!(
            self,
            Self::Listener {
                source: ListenerError::AlreadyRunning { .. }
            }
        )
    }
}
