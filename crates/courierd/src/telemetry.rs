//! Tracing set-up shared by `courierd` and `courier`.
//!
//! Events are written to stderr only: stdout carries the envelope stream in
//! inline and client modes.

use std::io::{self, IsTerminal};

use courier_config::{Config, LogFormat};
use once_cell::sync::OnceCell;
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::fmt::{self, time::UtcTime};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{EnvFilter, Layer, Registry};

static INSTALLED: OnceCell<()> = OnceCell::new();

/// Errors encountered while installing the stderr subscriber.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// The configured filter expression does not parse.
    #[error("invalid log filter {filter:?}: {source}")]
    Filter {
        /// Expression taken from `--log-filter` or `COURIER_LOG`.
        filter: String,
        /// Parser diagnostic.
        #[source]
        source: ParseError,
    },
    /// Some other subscriber already owns the global dispatcher.
    #[error("failed to install the tracing subscriber: {0}")]
    Install(#[from] TryInitError),
}

/// Installs the stderr subscriber on first use; later calls are no-ops.
///
/// ```rust
/// use courier_config::Config;
/// use courierd::telemetry;
///
/// # fn main() -> Result<(), courierd::TelemetryError> {
/// let config = Config::default();
/// telemetry::initialise(&config)?;
/// telemetry::initialise(&config)?;
/// # Ok(())
/// # }
/// ```
///
/// # Errors
///
/// Returns [`TelemetryError`] when the filter does not parse or another
/// subscriber is already installed.
pub fn initialise(config: &Config) -> Result<(), TelemetryError> {
    INSTALLED.get_or_try_init(|| install(config))?;
    Ok(())
}

fn install(config: &Config) -> Result<(), TelemetryError> {
    let filter =
        EnvFilter::try_new(config.log_filter()).map_err(|source| TelemetryError::Filter {
            filter: config.log_filter().to_owned(),
            source,
        })?;
    tracing_subscriber::registry()
        .with(stderr_layer(config.log_format()).with_filter(filter))
        .try_init()?;
    Ok(())
}

fn stderr_layer(format: LogFormat) -> Box<dyn Layer<Registry> + Send + Sync> {
    let layer = fmt::layer()
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal())
        .with_timer(UtcTime::rfc_3339());
    match format {
        LogFormat::Json => layer.json().flatten_event(true).boxed(),
        LogFormat::Compact => layer.compact().boxed(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_initialisation_succeeds() {
        let config = Config::default();

        initialise(&config).expect("first initialisation");
        initialise(&config).expect("second initialisation");
    }

    #[test]
    fn unparseable_filter_is_reported_before_installing() {
        let config = Config {
            log_filter: "courierd=chatty".to_owned(),
            ..Config::default()
        };

        let error = install(&config).expect_err("filter must not parse");

        assert!(
            matches!(&error, TelemetryError::Filter { filter, .. } if filter == "courierd=chatty"),
            "{error}"
        );
    }
}
