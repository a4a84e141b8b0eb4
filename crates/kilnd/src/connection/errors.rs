//! Error types for connection operations.

use std::fmt;
use std::io;

use thiserror::Error;

use crate::channel::ChannelError;

/// The two handler slots a connection exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerKind {
    /// Receives the client's standard input.
    Stdin,
    /// Notified when the client disconnects.
    Disconnect,
}

impl fmt::Display for HandlerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stdin => f.write_str("stdin"),
            Self::Disconnect => f.write_str("disconnect"),
        }
    }
}

/// Errors surfaced by [`DaemonConnection`](super::DaemonConnection).
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// A handler was registered while another one is still attached.
    ///
    /// This is a caller contract violation; detach the current handler with
    /// `None` before registering a new one.
    #[error("multiple {kind} handlers not supported")]
    MultipleHandlers {
        /// Slot that was already occupied.
        kind: HandlerKind,
    },
    /// A connection thread could not be started.
    #[error("failed to spawn thread {name}: {source}")]
    Spawn {
        /// Name of the thread.
        name: String,
        /// Underlying spawn failure.
        #[source]
        source: io::Error,
    },
    /// A connection thread panicked outside handler code.
    #[error("thread {name} panicked")]
    ThreadPanic {
        /// Name of the thread.
        name: String,
    },
    /// The underlying channel failed.
    #[error(transparent)]
    Channel(#[from] ChannelError),
}
