//! Ordered relay of client stdin commands to a single handler.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use kiln_protocol::{CloseInput, IoCommand};
use tracing::{debug, warn};

use super::handler::{HandlerFailure, StdinHandler, run_guarded};
use super::{CONNECTION_TARGET, ConnectionError, HandlerKind};

/// Buffers stdin commands and delivers them, in order, to at most one
/// handler on a dedicated consumer thread.
pub(crate) struct StdinQueue {
    shared: Arc<Shared>,
    thread_name: String,
}

struct Shared {
    state: Mutex<State>,
    changed: Condvar,
}

struct State {
    commands: VecDeque<IoCommand>,
    /// Bumped each time the active consumer is removed; a consumer exits as
    /// soon as the epoch it was started with is no longer current.
    epoch: u64,
    consumer: Option<JoinHandle<()>>,
    disconnected: bool,
}

enum Delivery {
    Continue,
    Finished,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Waits for the next command, or `None` once `epoch` has been removed.
    fn next_command(&self, epoch: u64) -> Option<IoCommand> {
        let mut state = self.lock();
        loop {
            if state.epoch != epoch {
                return None;
            }
            if let Some(command) = state.commands.pop_front() {
                return Some(command);
            }
            state = self
                .changed
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

impl StdinQueue {
    pub(crate) fn new(thread_name: impl Into<String>) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    commands: VecDeque::new(),
                    epoch: 0,
                    consumer: None,
                    disconnected: false,
                }),
                changed: Condvar::new(),
            }),
            thread_name: thread_name.into(),
        }
    }

    /// Appends a command and wakes the consumer.
    pub(crate) fn enqueue(&self, command: IoCommand) {
        let mut state = self.shared.lock();
        state.commands.push_back(command);
        self.shared.changed.notify_all();
    }

    /// Attaches `handler`, or detaches the current one when `None`.
    ///
    /// Detaching discards buffered input and blocks until the consumer thread
    /// has exited, including any handler call it is running.
    pub(crate) fn set_handler(
        &self,
        handler: Option<Box<dyn StdinHandler>>,
    ) -> Result<(), ConnectionError> {
        match handler {
            Some(handler) => self.start_consuming(handler),
            None => self.stop_consuming(),
        }
    }

    /// Replaces buffered input with a single disconnect end-of-input.
    pub(crate) fn disconnect(&self) {
        let mut state = self.shared.lock();
        state.disconnected = true;
        state.commands.clear();
        state
            .commands
            .push_back(IoCommand::Close(CloseInput::disconnected()));
        self.shared.changed.notify_all();
    }

    pub(crate) fn shutdown(&self) -> Result<(), ConnectionError> {
        self.stop_consuming()
    }

    #[cfg(test)]
    pub(crate) fn pending(&self) -> Vec<IoCommand> {
        self.shared.lock().commands.iter().cloned().collect()
    }

    /// Attaches `handler`; after a disconnect every new handler is re-armed
    /// with one end-of-input, even if an earlier handler already saw it.
    fn start_consuming(&self, handler: Box<dyn StdinHandler>) -> Result<(), ConnectionError> {
        let mut state = self.shared.lock();
        if state.consumer.is_some() {
            return Err(ConnectionError::MultipleHandlers {
                kind: HandlerKind::Stdin,
            });
        }
        // A handler attached after an earlier one consumed or discarded the
        // disconnect still needs to see end of input.
        if state.disconnected && state.commands.is_empty() {
            state
                .commands
                .push_back(IoCommand::Close(CloseInput::disconnected()));
        }

        let epoch = state.epoch;
        let shared = Arc::clone(&self.shared);
        let consumer = thread::Builder::new()
            .name(self.thread_name.clone())
            .spawn(move || consume(&shared, epoch, handler))
            .map_err(|source| ConnectionError::Spawn {
                name: self.thread_name.clone(),
                source,
            })?;
        state.consumer = Some(consumer);
        Ok(())
    }

    fn stop_consuming(&self) -> Result<(), ConnectionError> {
        let consumer = {
            let mut state = self.shared.lock();
            state.commands.clear();
            state.epoch = state.epoch.wrapping_add(1);
            self.shared.changed.notify_all();
            state.consumer.take()
        };
        let Some(consumer) = consumer else {
            return Ok(());
        };
        // A handler detaching itself cannot wait for its own thread.
        if consumer.thread().id() == thread::current().id() {
            return Ok(());
        }
        consumer
            .join()
            .map_err(|_| ConnectionError::ThreadPanic {
                name: self.thread_name.clone(),
            })
    }
}

fn consume(shared: &Shared, epoch: u64, mut handler: Box<dyn StdinHandler>) {
    while let Some(command) = shared.next_command(epoch) {
        match deliver(handler.as_mut(), command) {
            Ok(Delivery::Continue) => {}
            Ok(Delivery::Finished) => {
                debug!(target: CONNECTION_TARGET, "delivered end of input");
                return;
            }
            Err(failure) => {
                warn!(
                    target: CONNECTION_TARGET,
                    error = %failure,
                    "could not forward client stdin"
                );
                return;
            }
        }
    }
    debug!(target: CONNECTION_TARGET, "stdin handler removed");
}

fn deliver(
    handler: &mut dyn StdinHandler,
    command: IoCommand,
) -> Result<Delivery, HandlerFailure> {
    run_guarded(|| match command {
        IoCommand::Forward(input) => handler.on_input(input).map(|()| Delivery::Continue),
        IoCommand::Close(_) => handler.on_end_of_input().map(|()| Delivery::Finished),
    })
}
