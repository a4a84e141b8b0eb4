//! Connection core for the kiln build daemon.
//!
//! Each client that connects to the daemon is served by one
//! [`DaemonConnection`]. The connection owns a [`Channel`] to the client and
//! runs a dedicated receive thread that classifies inbound messages. Stdin
//! traffic is buffered in order and relayed to at most one registered
//! [`StdinHandler`]; the end of the client stream is announced both as an
//! end-of-input notification and to a one-shot disconnect action. Build
//! lifecycle reports travel the other way through the connection's dispatch
//! operations.
//!
//! ## Teardown
//!
//! [`DaemonConnection::stop`] quiesces the connection in four strictly
//! ordered phases:
//!
//! 1. Detach the disconnect action, waiting for a running notification.
//! 2. Stop the channel, which unblocks the receive thread.
//! 3. Join the receive thread.
//! 4. Detach the stdin handler, discarding undelivered input and joining the
//!    delivery thread.
//!
//! Handlers never run under an internal lock, so they may call back into the
//! connection, including calling `stop`, without deadlocking.

pub mod channel;
mod connection;
pub mod telemetry;

pub use channel::{Channel, ChannelError, ConnectionStream, StreamChannel};
pub use connection::{
    ConnectionError, DaemonConnection, DisconnectAction, HandlerKind, StdinHandler,
};
pub use telemetry::{TelemetryError, TelemetryHandle};

#[cfg(test)]
mod tests;
