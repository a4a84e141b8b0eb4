//! Receive loop classifying inbound client messages.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{debug, warn};

use super::disconnect::DisconnectQueue;
use super::stdin::StdinQueue;
use super::{CONNECTION_TARGET, ConnectionError};
use crate::channel::{Channel, ChannelError};

/// Starts the receive loop on a thread called `name`.
pub(crate) fn spawn_receiver(
    name: String,
    channel: Arc<dyn Channel>,
    stdin: Arc<StdinQueue>,
    disconnect: Arc<DisconnectQueue>,
) -> Result<JoinHandle<()>, ConnectionError> {
    thread::Builder::new()
        .name(name.clone())
        .spawn(move || run_receive_loop(channel.as_ref(), &stdin, &disconnect))
        .map_err(|source| ConnectionError::Spawn { name, source })
}

/// Reads messages until the stream ends or the transport fails.
///
/// Lines that do not decode are dropped like any other unexpected message.
/// Only a clean end of stream is announced downstream. A transport failure
/// ends the loop without signalling stdin or the disconnect action.
pub(crate) fn run_receive_loop(
    channel: &dyn Channel,
    stdin: &StdinQueue,
    disconnect: &DisconnectQueue,
) {
    loop {
        let message = match channel.receive() {
            Ok(Some(message)) => message,
            Ok(None) => {
                debug!(target: CONNECTION_TARGET, "client stream ended");
                stdin.disconnect();
                disconnect.disconnect();
                return;
            }
            Err(error @ (ChannelError::Decode(_) | ChannelError::MessageTooLarge { .. })) => {
                warn!(
                    target: CONNECTION_TARGET,
                    error = %error,
                    "dropped unreadable message from client"
                );
                continue;
            }
            Err(error) => {
                warn!(
                    target: CONNECTION_TARGET,
                    error = %error,
                    "could not receive message from client"
                );
                return;
            }
        };

        match message.into_io_command() {
            Ok(command) => stdin.enqueue(command),
            Err(other) => warn!(
                target: CONNECTION_TARGET,
                message = ?other,
                "received unexpected message from client"
            ),
        }
    }
}
