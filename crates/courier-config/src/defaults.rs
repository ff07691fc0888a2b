/// Environment variable overriding the daemon socket path.
pub const SOCKET_ENV: &str = "COURIER_SOCKET";

/// Environment variable holding the tracing filter.
pub const LOG_FILTER_ENV: &str = "COURIER_LOG";

/// Environment variable selecting the diagnostic format.
pub const LOG_FORMAT_ENV: &str = "COURIER_LOG_FORMAT";

/// Environment variable holding the shared authentication secret.
pub const AUTH_TOKEN_ENV: &str = "COURIER_AUTH_TOKEN";

/// Environment variable bounding the shutdown drain.
pub const DRAIN_TIMEOUT_ENV: &str = "COURIER_DRAIN_TIMEOUT_MS";

/// Default log filter expression used by the binaries.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Default drain budget, in milliseconds.
pub const DEFAULT_DRAIN_TIMEOUT_MS: u64 = 10_000;

/// Default logging format for the binaries.
///
/// Diagnostics share the terminal with protocol output, so the compact
/// format is the default and JSON is opt-in.
#[must_use]
pub const fn default_log_format() -> crate::logging::LogFormat {
    crate::logging::LogFormat::Compact
}
