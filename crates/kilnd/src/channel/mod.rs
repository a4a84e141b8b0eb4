//! Message channel between the daemon and a connected client.
//!
//! The connection core only depends on the [`Channel`] trait. [`StreamChannel`]
//! implements it over a connected TCP or Unix socket using JSONL framing.

mod errors;
mod stream;

use kiln_protocol::Message;

pub use self::errors::ChannelError;
pub use self::stream::{ConnectionStream, StreamChannel};

const CHANNEL_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::channel");

/// Duplex, typed message transport to a single client.
///
/// Implementations must tolerate concurrent `dispatch` calls alongside one
/// outstanding `receive`.
pub trait Channel: Send + Sync {
    /// Blocks until the next message arrives.
    ///
    /// Returns `Ok(None)` once the stream has ended, including after
    /// [`Channel::stop`].
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError`] when the transport fails. A line that cannot
    /// be decoded or exceeds the size limit is reported as
    /// [`ChannelError::Decode`] or [`ChannelError::MessageTooLarge`] and has
    /// already been consumed, so receiving may continue.
    fn receive(&self) -> Result<Option<Message>, ChannelError>;

    /// Queues a message for delivery without waiting for it to be written.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError`] when the message cannot be encoded or the
    /// channel has been closed.
    fn dispatch(&self, message: Message) -> Result<(), ChannelError>;

    /// Closes the channel, unblocking any outstanding [`Channel::receive`].
    ///
    /// Must return even when the client has stopped reading.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError`] if queued outbound messages could not be
    /// flushed.
    fn stop(&self) -> Result<(), ChannelError>;
}
