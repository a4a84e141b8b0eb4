//! Error types for channel operations.

use std::io;
use std::time::Duration;

use kiln_protocol::ProtocolError;
use thiserror::Error;

/// Errors surfaced while exchanging messages with a client.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// Reading from or configuring the socket failed.
    #[error("client channel I/O error: {0}")]
    Io(#[from] io::Error),
    /// An inbound line was not a valid message.
    #[error("could not decode client message: {0}")]
    Decode(#[from] ProtocolError),
    /// An outbound message could not be encoded.
    #[error("could not encode {kind} message: {source}")]
    Encode {
        /// Wire tag of the rejected message.
        kind: &'static str,
        /// Underlying encoding failure.
        #[source]
        source: ProtocolError,
    },
    /// An inbound line exceeded the configured size limit.
    #[error("client message exceeds {limit} byte limit")]
    MessageTooLarge {
        /// Configured limit in bytes.
        limit: usize,
    },
    /// The channel was stopped or its writer has gone away.
    #[error("client channel is closed")]
    Closed,
    /// A channel thread could not be started.
    #[error("failed to spawn thread {name}: {source}")]
    Spawn {
        /// Name of the thread.
        name: String,
        /// Underlying spawn failure.
        #[source]
        source: io::Error,
    },
    /// Queued messages were still unwritten when the flush timeout expired.
    #[error("client did not accept queued messages within {timeout:?}")]
    FlushTimedOut {
        /// Configured flush timeout.
        timeout: Duration,
    },
    /// The outbound writer thread panicked.
    #[error("channel writer thread panicked")]
    WriterPanic,
}
