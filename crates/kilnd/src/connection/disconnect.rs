//! One-shot, latched notification of client disconnects.

use std::mem;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};

use tracing::{debug, warn};

use super::handler::{DisconnectAction, run_guarded};
use super::{CONNECTION_TARGET, ConnectionError, HandlerKind};

/// Holds at most one disconnect action and fires it once the client has gone.
///
/// The disconnect is latched: an action registered after the client left
/// fires immediately on the registering thread.
pub(crate) struct DisconnectQueue {
    state: Mutex<NotifierState>,
    idle: Condvar,
}

enum NotifierState {
    /// No action registered and no disconnect seen.
    Idle,
    /// Action registered, waiting for the disconnect.
    Armed(DisconnectAction),
    /// Disconnect seen, no action registered.
    Latched,
    /// The registered action is running on `thread`.
    ///
    /// `detached` is set when the action removes itself while running.
    Notifying { thread: ThreadId, detached: bool },
    /// The registered action has run.
    Notified,
}

impl NotifierState {
    const fn has_handler(&self) -> bool {
        matches!(
            self,
            Self::Armed(_) | Self::Notifying { .. } | Self::Notified
        )
    }

    const fn is_latched(&self) -> bool {
        !matches!(self, Self::Idle | Self::Armed(_))
    }

    fn notifying_here() -> Self {
        Self::Notifying {
            thread: thread::current().id(),
            detached: false,
        }
    }
}

impl DisconnectQueue {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(NotifierState::Idle),
            idle: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, NotifierState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Latches the disconnect and runs the registered action, if it has not
    /// already run, on the calling thread.
    pub(crate) fn disconnect(&self) {
        let mut state = self.lock();
        let action = match mem::replace(&mut *state, NotifierState::Latched) {
            NotifierState::Armed(action) => action,
            previous @ (NotifierState::Notifying { .. } | NotifierState::Notified) => {
                *state = previous;
                return;
            }
            NotifierState::Idle | NotifierState::Latched => return,
        };
        *state = NotifierState::notifying_here();
        drop(state);
        self.notify(action);
    }

    /// Registers `action`, or removes the current one when `None`.
    ///
    /// Removal waits for a notification running on another thread to finish.
    /// The latch survives removal, so the next registration fires at once.
    pub(crate) fn set_handler(
        &self,
        action: Option<DisconnectAction>,
    ) -> Result<(), ConnectionError> {
        match action {
            Some(action) => self.register(action),
            None => {
                self.remove();
                Ok(())
            }
        }
    }

    pub(crate) fn shutdown(&self) {
        self.remove();
    }

    #[cfg(test)]
    pub(crate) fn is_latched(&self) -> bool {
        self.lock().is_latched()
    }

    fn register(&self, action: DisconnectAction) -> Result<(), ConnectionError> {
        let mut state = self.lock();
        if state.has_handler() {
            return Err(ConnectionError::MultipleHandlers {
                kind: HandlerKind::Disconnect,
            });
        }
        if matches!(*state, NotifierState::Idle) {
            *state = NotifierState::Armed(action);
            return Ok(());
        }

        debug!(target: CONNECTION_TARGET, "replaying latched disconnect");
        *state = NotifierState::notifying_here();
        drop(state);
        self.notify(action);
        Ok(())
    }

    fn remove(&self) {
        let current = thread::current().id();
        let mut state = self
            .idle
            .wait_while(self.lock(), |state| {
                matches!(state, NotifierState::Notifying { thread, .. } if *thread != current)
            })
            .unwrap_or_else(PoisonError::into_inner);

        // The running action is removing itself; it cannot wait for itself.
        if let NotifierState::Notifying { detached, .. } = &mut *state {
            *detached = true;
            return;
        }

        let next = if state.is_latched() {
            NotifierState::Latched
        } else {
            NotifierState::Idle
        };
        let previous = mem::replace(&mut *state, next);
        drop(state);
        drop(previous);
    }

    fn notify(&self, action: DisconnectAction) {
        debug!(target: CONNECTION_TARGET, "notifying disconnect handler");
        if let Err(failure) = run_guarded(action) {
            warn!(
                target: CONNECTION_TARGET,
                error = %failure,
                "failed to notify disconnect handler"
            );
        }

        let mut state = self.lock();
        *state = match *state {
            NotifierState::Notifying { detached: true, .. } => NotifierState::Latched,
            _ => NotifierState::Notified,
        };
        self.idle.notify_all();
    }
}
