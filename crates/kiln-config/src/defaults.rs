use crate::logging::LogFormat;

/// Default log filter expression used by the daemon.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Largest inbound message line accepted from a client, in bytes.
pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 1024 * 1024;

/// Time a stopping channel waits for queued messages to reach the client.
pub const DEFAULT_FLUSH_TIMEOUT_MS: u64 = 2_000;

/// Prefix applied to the names of connection threads.
pub const DEFAULT_THREAD_PREFIX: &str = "kiln-connection";

/// Owned log filter value used where allocation is required (e.g. serde).
pub fn default_log_filter() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default logging format for the daemon.
pub fn default_log_format() -> LogFormat {
    LogFormat::Json
}

/// Default inbound message size limit.
pub const fn default_max_message_bytes() -> usize {
    DEFAULT_MAX_MESSAGE_BYTES
}

/// Owned thread prefix used where allocation is required (e.g. serde).
pub fn default_thread_prefix() -> String {
    DEFAULT_THREAD_PREFIX.to_owned()
}

/// Default flush timeout in milliseconds.
pub const fn default_flush_timeout_ms() -> u64 {
    DEFAULT_FLUSH_TIMEOUT_MS
}
