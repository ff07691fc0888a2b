//! Process-wide shutdown flag shared by signals, capabilities and the
//! accept loop.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGQUIT, SIGTERM};
use signal_hook::flag;
use thiserror::Error;

/// Signals that request a graceful shutdown.
pub const SHUTDOWN_SIGNALS: [i32; 4] = [SIGTERM, SIGINT, SIGQUIT, SIGHUP];

/// Errors reported while installing signal handlers.
#[derive(Debug, Error)]
pub enum ShutdownError {
    /// Installing a signal handler failed.
    #[error("failed to install handler for signal {signal}: {source}")]
    Install {
        /// Signal number.
        signal: i32,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}

/// Cloneable handle to a single shutdown request bit.
#[derive(Debug, Clone, Default)]
pub struct ShutdownFlag(Arc<AtomicBool>);

impl ShutdownFlag {
    /// Creates a flag that has not been raised.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Raises the flag. Idempotent.
    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Returns `true` once any holder has raised the flag.
    #[must_use]
    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Routes termination signals to this flag.
    ///
    /// A second signal while the flag is already raised terminates the
    /// process immediately with exit status 1.
    ///
    /// # Errors
    ///
    /// Returns [`ShutdownError::Install`] if a handler cannot be registered.
    pub fn register_signals(&self) -> Result<(), ShutdownError> {
        for signal in SHUTDOWN_SIGNALS {
            flag::register_conditional_shutdown(signal, 1, Arc::clone(&self.0))
                .and_then(|_| flag::register(signal, Arc::clone(&self.0)))
                .map_err(|source| ShutdownError::Install { signal, source })?;
        }
        Ok(())
    }
}
