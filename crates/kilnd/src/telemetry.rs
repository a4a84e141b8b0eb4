//! Process-wide `tracing` set-up for the daemon.
//!
//! Every connection runs on threads named after its role (`-receiver`,
//! `-stdin`, `-writer`), so records always carry the thread name alongside
//! the module target.

use std::io::{self, IsTerminal};

use once_cell::sync::OnceCell;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::fmt::{self, time::UtcTime};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};

use kiln_config::{Config, LogFormat};

static INSTALLED: OnceCell<TelemetryHandle> = OnceCell::new();

/// Describes the subscriber that is installed for the process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryHandle {
    format: LogFormat,
    filter: String,
}

impl TelemetryHandle {
    /// Output format chosen by the first successful initialisation.
    #[must_use]
    pub const fn format(&self) -> LogFormat {
        self.format
    }

    /// Filter directives chosen by the first successful initialisation.
    #[must_use]
    pub fn filter(&self) -> &str {
        &self.filter
    }
}

/// Errors encountered while configuring telemetry.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// The configured filter directives do not parse.
    #[error("invalid log filter `{filter}`: {source}")]
    Filter {
        /// Rejected directives.
        filter: String,
        /// Parser failure.
        #[source]
        source: ParseError,
    },
    /// Something else already installed a global subscriber.
    #[error("a global tracing subscriber is already installed")]
    AlreadyInstalled(#[source] TryInitError),
}

/// Installs the global subscriber on first use.
///
/// Later calls, whatever their configuration, return the handle describing
/// the subscriber that was installed first.
///
/// ```rust
/// use kiln_config::{Config, LogFormat};
/// use kilnd::telemetry;
///
/// # fn main() -> Result<(), kilnd::TelemetryError> {
/// let config = Config {
///     log_format: LogFormat::Compact,
///     ..Config::default()
/// };
/// let handle = telemetry::initialise(&config)?;
/// assert_eq!(handle.format(), LogFormat::Compact);
/// assert_eq!(telemetry::initialise(&Config::default())?, handle);
/// # Ok(())
/// # }
/// ```
///
/// # Errors
///
/// Returns [`TelemetryError`] if the filter does not parse or another
/// subscriber has already been installed globally.
pub fn initialise(config: &Config) -> Result<&'static TelemetryHandle, TelemetryError> {
    INSTALLED.get_or_try_init(|| install(config))
}

fn install(config: &Config) -> Result<TelemetryHandle, TelemetryError> {
    let filter = parse_filter(config.log_filter())?;
    let registry = tracing_subscriber::registry().with(filter);

    let installed = match config.log_format() {
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .flatten_event(true)
                    .with_current_span(false)
                    .with_thread_names(true)
                    .with_timer(UtcTime::rfc_3339())
                    .with_writer(io::stderr),
            )
            .try_init(),
        LogFormat::Compact => registry
            .with(
                fmt::layer()
                    .compact()
                    .with_thread_names(true)
                    .with_ansi(io::stderr().is_terminal())
                    .with_timer(UtcTime::rfc_3339())
                    .with_writer(io::stderr),
            )
            .try_init(),
    };
    installed.map_err(TelemetryError::AlreadyInstalled)?;

    Ok(TelemetryHandle {
        format: config.log_format(),
        filter: config.log_filter().to_owned(),
    })
}

fn parse_filter(directives: &str) -> Result<EnvFilter, TelemetryError> {
    EnvFilter::builder()
        .parse(directives)
        .map_err(|source| TelemetryError::Filter {
            filter: directives.to_owned(),
            source,
        })
}
