//! Shared configuration for the courier kernel binaries.
//!
//! The [`Config`] type is flattened into the `courier` command-line parser so
//! every setting can be supplied as a flag or through its `COURIER_*`
//! environment variable. The crate also owns the socket locator, which both
//! the daemon and its clients use to agree on where the Unix domain socket
//! lives.

mod defaults;
mod logging;
mod socket;

use std::time::Duration;

use camino::Utf8PathBuf;
use clap::Args;

pub use defaults::{
    AUTH_TOKEN_ENV, DEFAULT_DRAIN_TIMEOUT_MS, DEFAULT_LOG_FILTER, DRAIN_TIMEOUT_ENV, LOG_FILTER_ENV,
    LOG_FORMAT_ENV, SOCKET_ENV, default_log_format,
};
pub use logging::{LogFormat, LogFormatParseError};
pub use socket::{
    FALLBACK_BASE_DIRECTORY, NAMESPACE, SOCKET_FILE_NAME, SocketLocator, SocketLocatorError,
    SocketOrigin, SocketPath, SocketPreparationError,
};

/// Runtime settings shared by every kernel mode.
#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct Config {
    /// Path of the daemon socket. Defaults to the socket locator's answer.
    #[arg(long = "socket", env = SOCKET_ENV, value_name = "PATH")]
    pub daemon_socket: Option<Utf8PathBuf>,
    /// Tracing filter expression applied to diagnostics on stderr.
    #[arg(long, env = LOG_FILTER_ENV, default_value = DEFAULT_LOG_FILTER)]
    pub log_filter: String,
    /// Diagnostic output format.
    #[arg(long, env = LOG_FORMAT_ENV, default_value_t = default_log_format())]
    pub log_format: LogFormat,
    /// Shared secret expected by `Syscall.Authenticate`.
    #[arg(long, env = AUTH_TOKEN_ENV, hide_env_values = true)]
    pub auth_token: Option<String>,
    /// Upper bound on how long the daemon waits for connections to drain.
    #[arg(
        long = "drain-timeout-ms",
        env = DRAIN_TIMEOUT_ENV,
        default_value_t = DEFAULT_DRAIN_TIMEOUT_MS
    )]
    pub drain_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            daemon_socket: None,
            log_filter: DEFAULT_LOG_FILTER.to_owned(),
            log_format: default_log_format(),
            auth_token: None,
            drain_timeout_ms: DEFAULT_DRAIN_TIMEOUT_MS,
        }
    }
}

impl Config {
    /// Resolves the daemon socket, consulting the locator when no explicit
    /// path was configured.
    ///
    /// # Errors
    ///
    /// Returns [`SocketLocatorError`] when no base directory is usable.
    pub fn daemon_socket(&self) -> Result<SocketPath, SocketLocatorError> {
        match &self.daemon_socket {
            Some(path) => Ok(SocketPath::explicit(path.clone())),
            None => SocketLocator::from_env().locate(),
        }
    }

    /// Returns the tracing filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Returns the diagnostic output format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Returns the expected authentication token, if one is configured.
    #[must_use]
    pub fn auth_token(&self) -> Option<&str> {
        self.auth_token.as_deref().filter(|token| !token.is_empty())
    }

    /// Returns the connection drain budget used during shutdown.
    #[must_use]
    pub const fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }
}
