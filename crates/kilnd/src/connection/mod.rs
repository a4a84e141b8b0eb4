//! Per-client connection facade.
//!
//! A [`DaemonConnection`] ties a [`Channel`] to a receive thread, an ordered
//! stdin relay and a latched disconnect notifier, and forwards the daemon's
//! build reports back to the client.

mod disconnect;
mod errors;
mod handler;
mod receiver;
mod stdin;

use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use kiln_config::Config;
use kiln_protocol::{BuildResult, BuildStarted, DaemonUnavailable, Message, OutputEvent};
use tracing::debug;

use crate::channel::Channel;

pub(crate) use self::disconnect::DisconnectQueue;
pub use self::errors::{ConnectionError, HandlerKind};
pub use self::handler::{DisconnectAction, StdinHandler};
#[cfg(test)]
pub(crate) use self::receiver::run_receive_loop;
pub(crate) use self::stdin::StdinQueue;

const CONNECTION_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::connection");

/// Daemon-side view of one connected client.
///
/// Inbound stdin commands are relayed to the handler registered with
/// [`DaemonConnection::on_stdin`]; the end of the client stream is reported
/// to it as end of input and to the action registered with
/// [`DaemonConnection::on_disconnect`]. Outbound reports are handed straight
/// to the channel.
///
/// Callers must invoke [`DaemonConnection::stop`] to release the connection's
/// threads.
pub struct DaemonConnection {
    channel: Arc<dyn Channel>,
    stdin: Arc<StdinQueue>,
    disconnect: Arc<DisconnectQueue>,
    receiver: Mutex<Option<JoinHandle<()>>>,
    receiver_name: String,
}

impl DaemonConnection {
    /// Starts serving `channel`, spawning the receive thread.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::Spawn`] if the receive thread cannot be
    /// started.
    pub fn start(channel: Arc<dyn Channel>, config: &Config) -> Result<Self, ConnectionError> {
        let stdin = Arc::new(StdinQueue::new(config.stdin_thread_name()));
        let disconnect = Arc::new(DisconnectQueue::new());
        let receiver_name = config.receiver_thread_name();
        let receiver = receiver::spawn_receiver(
            receiver_name.clone(),
            Arc::clone(&channel),
            Arc::clone(&stdin),
            Arc::clone(&disconnect),
        )?;
        debug!(
            target: CONNECTION_TARGET,
            thread = %receiver_name,
            "connection started"
        );

        Ok(Self {
            channel,
            stdin,
            disconnect,
            receiver: Mutex::new(Some(receiver)),
            receiver_name,
        })
    }

    /// Registers the handler for client stdin, or detaches it with `None`.
    ///
    /// Commands received before a handler is attached are buffered and
    /// delivered in order. Detaching discards the backlog and waits for the
    /// handler's current call to return.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::MultipleHandlers`] if a handler is already
    /// attached, and [`ConnectionError::Spawn`] if its delivery thread cannot
    /// be started.
    pub fn on_stdin(&self, handler: Option<Box<dyn StdinHandler>>) -> Result<(), ConnectionError> {
        self.stdin.set_handler(handler)
    }

    /// Registers the action to run when the client disconnects, or removes it
    /// with `None`.
    ///
    /// If the client has already gone, the action runs before this returns.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::MultipleHandlers`] if an action is already
    /// registered.
    pub fn on_disconnect(&self, action: Option<DisconnectAction>) -> Result<(), ConnectionError> {
        self.disconnect.set_handler(action)
    }

    /// Tells the client that the daemon cannot take its build.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::Channel`] if the message cannot be queued.
    pub fn daemon_unavailable(&self, message: DaemonUnavailable) -> Result<(), ConnectionError> {
        self.dispatch(message.into())
    }

    /// Tells the client that its build has started.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::Channel`] if the message cannot be queued.
    pub fn build_started(&self, message: BuildStarted) -> Result<(), ConnectionError> {
        self.dispatch(message.into())
    }

    /// Forwards build output to the client.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::Channel`] if the event cannot be queued.
    pub fn log_event(&self, event: OutputEvent) -> Result<(), ConnectionError> {
        self.dispatch(event.into())
    }

    /// Reports the build's final result to the client.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::Channel`] if the result cannot be queued.
    pub fn completed(&self, result: BuildResult) -> Result<(), ConnectionError> {
        self.dispatch(result.into())
    }

    /// Stops the connection and waits for its threads to finish.
    ///
    /// Teardown runs in a fixed order, each step completing before the next
    /// begins: the disconnect action is removed (waiting for it if it is
    /// running), the channel is stopped, the receive thread is joined, and
    /// finally the stdin handler is detached with its backlog discarded.
    /// Every step runs even when an earlier one fails.
    ///
    /// # Errors
    ///
    /// Returns the first failure encountered.
    pub fn stop(&self) -> Result<(), ConnectionError> {
        debug!(target: CONNECTION_TARGET, "stopping connection");
        self.disconnect.shutdown();
        let channel = self.channel.stop().map_err(ConnectionError::from);
        let receiver = self.join_receiver();
        let stdin = self.stdin.shutdown();
        channel.and(receiver).and(stdin)
    }

    fn dispatch(&self, message: Message) -> Result<(), ConnectionError> {
        Ok(self.channel.dispatch(message)?)
    }

    fn join_receiver(&self) -> Result<(), ConnectionError> {
        let handle = self
            .receiver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(handle) = handle else {
            return Ok(());
        };
        // A disconnect action stopping its own connection runs on this thread.
        if handle.thread().id() == thread::current().id() {
            return Ok(());
        }
        handle.join().map_err(|_| ConnectionError::ThreadPanic {
            name: self.receiver_name.clone(),
        })
    }
}
