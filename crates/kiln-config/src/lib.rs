//! Shared configuration for the kiln daemon.
//!
//! Values are layered by `ortho_config`: built-in defaults, then `KILN_*`
//! environment variables, then command-line flags. Invalid overrides fail
//! fast rather than silently falling back to a default.

mod defaults;
mod logging;


use std::ffi::OsString;
use std::sync::Arc;
use std::time::Duration;

use ortho_config::{OrthoConfig, OrthoError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use defaults::{
    DEFAULT_FLUSH_TIMEOUT_MS, DEFAULT_LOG_FILTER, DEFAULT_MAX_MESSAGE_BYTES,
    DEFAULT_THREAD_PREFIX, default_flush_timeout_ms, default_log_filter, default_log_format,
    default_max_message_bytes, default_thread_prefix,
};
pub use logging::{LogFormat, LogFormatParseError};

/// Environment variable overriding `Config::log_filter`.
pub const LOG_FILTER_ENV: &str = "KILN_LOG_FILTER";
/// Environment variable overriding `Config::log_format`.
pub const LOG_FORMAT_ENV: &str = "KILN_LOG_FORMAT";
/// Environment variable overriding `Config::max_message_bytes`.
pub const MAX_MESSAGE_BYTES_ENV: &str = "KILN_MAX_MESSAGE_BYTES";
/// Environment variable overriding `Config::thread_prefix`.
pub const THREAD_PREFIX_ENV: &str = "KILN_THREAD_PREFIX";
/// Environment variable overriding `Config::flush_timeout_ms`.
pub const FLUSH_TIMEOUT_MS_ENV: &str = "KILN_FLUSH_TIMEOUT_MS";

/// Errors raised while resolving configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A layer could not be read or merged.
    #[error("failed to load configuration: {0}")]
    Load(#[source] Arc<OrthoError>),
    /// A value loaded but is outside the accepted range.
    #[error("{variable} {reason}")]
    OutOfRange {
        /// Variable that carried the value.
        variable: &'static str,
        /// Why the value was rejected.
        reason: &'static str,
    },
}

/// Resolved daemon configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, OrthoConfig)]
#[ortho_config(prefix = "KILN_")]
pub struct Config {
    /// `tracing` filter directive applied to daemon logs.
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
    /// Output format for daemon logs.
    #[serde(default = "default_log_format")]
    pub log_format: LogFormat,
    /// Largest inbound message line accepted from a client.
    #[serde(default = "default_max_message_bytes")]
    pub max_message_bytes: usize,
    /// Prefix applied to connection thread names.
    #[serde(default = "default_thread_prefix")]
    pub thread_prefix: String,
    /// How long stopping a channel waits for queued messages to drain.
    #[serde(default = "default_flush_timeout_ms")]
    pub flush_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_filter: default_log_filter(),
            log_format: default_log_format(),
            max_message_bytes: default_max_message_bytes(),
            thread_prefix: default_thread_prefix(),
            flush_timeout_ms: default_flush_timeout_ms(),
        }
    }
}

impl Config {
    /// Resolves configuration from defaults and the `KILN_*` environment.
    ///
    /// The host process's own arguments are never interpreted.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when an override is present but invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_args([OsString::from(env!("CARGO_PKG_NAME"))])
    }

    /// Resolves configuration from defaults, the environment and `args`.
    ///
    /// `args` starts with the program name; flags such as
    /// `--max-message-bytes` take precedence over the environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when any layer is invalid or the merged values
    /// fail [`Config::validate`].
    pub fn from_args<I, T>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let config = Self::load_from_iter(args).map_err(ConfigError::Load)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks invariants that the layered sources cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::OutOfRange`] when `max_message_bytes` is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_message_bytes == 0 {
            return Err(ConfigError::OutOfRange {
                variable: MAX_MESSAGE_BYTES_ENV,
                reason: "must be greater than zero",
            });
        }
        Ok(())
    }

    /// Returns how long a stopping channel waits for its writer.
    #[must_use]
    pub const fn flush_timeout(&self) -> Duration {
        Duration::from_millis(self.flush_timeout_ms)
    }

    /// Returns the configured log filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Returns the configured log format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Name given to the thread that receives client messages.
    #[must_use]
    pub fn receiver_thread_name(&self) -> String {
        format!("{}-receiver", self.thread_prefix)
    }

    /// Name given to the thread that delivers client stdin.
    #[must_use]
    pub fn stdin_thread_name(&self) -> String {
        format!("{}-stdin", self.thread_prefix)
    }

    /// Name given to the thread that writes outbound messages.
    #[must_use]
    pub fn writer_thread_name(&self) -> String {
        format!("{}-writer", self.thread_prefix)
    }
}
