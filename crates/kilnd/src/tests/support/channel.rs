//! In-memory channel driven by a scripted client.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, mpsc};

use kiln_protocol::{CloseInput, ForwardInput, Message};

use super::EventLog;
use crate::channel::{Channel, ChannelError};

enum Inbound {
    Message(Message),
    Failure(io::ErrorKind),
    End,
}

/// [`Channel`] whose inbound side is fed by a [`MemoryClient`].
///
/// Dispatched messages are kept for inspection and `stop` is recorded in the
/// shared [`EventLog`] as `"channel stopped"`.
pub struct MemoryChannel {
    inbound: Mutex<mpsc::Receiver<Inbound>>,
    wake: Mutex<mpsc::Sender<Inbound>>,
    dispatched: Mutex<Vec<Message>>,
    stopped: AtomicBool,
    events: EventLog,
}

/// Client end of a [`MemoryChannel`].
pub struct MemoryClient {
    sender: mpsc::Sender<Inbound>,
}

impl MemoryChannel {
    pub fn pair(events: EventLog) -> (Arc<Self>, MemoryClient) {
        let (sender, receiver) = mpsc::channel();
        let channel = Arc::new(Self {
            inbound: Mutex::new(receiver),
            wake: Mutex::new(sender.clone()),
            dispatched: Mutex::new(Vec::new()),
            stopped: AtomicBool::new(false),
            events,
        });
        (channel, MemoryClient { sender })
    }

    pub fn dispatched(&self) -> Vec<Message> {
        self.dispatched
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

impl Channel for MemoryChannel {
    fn receive(&self) -> Result<Option<Message>, ChannelError> {
        let inbound = self.inbound.lock().unwrap_or_else(PoisonError::into_inner);
        match inbound.recv() {
            Ok(Inbound::Message(message)) => Ok(Some(message)),
            Ok(Inbound::Failure(kind)) => Err(ChannelError::Io(io::Error::new(
                kind,
                "scripted transport failure",
            ))),
            Ok(Inbound::End) | Err(_) => Ok(None),
        }
    }

    fn dispatch(&self, message: Message) -> Result<(), ChannelError> {
        if self.is_stopped() {
            return Err(ChannelError::Closed);
        }
        self.dispatched
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message);
        Ok(())
    }

    fn stop(&self) -> Result<(), ChannelError> {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.events.record("channel stopped");
        // Unblocks an outstanding receive the way a socket shutdown would.
        let _ = self
            .wake
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .send(Inbound::End);
        Ok(())
    }
}

impl MemoryClient {
    pub fn send(&self, message: impl Into<Message>) {
        self.push(Inbound::Message(message.into()));
    }

    pub fn send_input(&self, bytes: &[u8]) {
        self.send(Message::ForwardInput(ForwardInput::new(bytes)));
    }

    pub fn close_input(&self, reason: &str) {
        self.send(Message::CloseInput(CloseInput::new(reason)));
    }

    /// Ends the stream, as a client closing its socket would.
    pub fn hang_up(&self) {
        self.push(Inbound::End);
    }

    /// Makes the next receive fail with a transport error.
    pub fn break_transport(&self) {
        self.push(Inbound::Failure(io::ErrorKind::ConnectionReset));
    }

    fn push(&self, inbound: Inbound) {
        self.sender
            .send(inbound)
            .expect("memory channel receiver is alive");
    }
}
