//! Handler capabilities supplied by the daemon's build execution logic.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use kiln_protocol::ForwardInput;
use thiserror::Error;

/// Receives the client's standard input for the running build.
///
/// Calls arrive on the connection's stdin thread, in the order the client
/// sent them. After [`StdinHandler::on_end_of_input`] no further calls are
/// made. Returning an error (or panicking) ends delivery for this
/// registration; the failure is logged and not propagated.
pub trait StdinHandler: Send {
    /// Handles a chunk of client input.
    ///
    /// # Errors
    ///
    /// Any error stops further delivery to this handler.
    fn on_input(&mut self, input: ForwardInput) -> anyhow::Result<()>;

    /// Handles the end of client input.
    ///
    /// # Errors
    ///
    /// Errors are logged; delivery has ended either way.
    fn on_end_of_input(&mut self) -> anyhow::Result<()>;
}

/// One-shot action run when the client disconnects.
///
/// The action runs synchronously on the thread that observed the disconnect,
/// or on the registering thread when the disconnect happened first.
pub type DisconnectAction = Box<dyn FnOnce() -> anyhow::Result<()> + Send>;

/// Failure contained at the handler boundary.
#[derive(Debug, Error)]
pub(crate) enum HandlerFailure {
    #[error("{0:#}")]
    Error(anyhow::Error),
    #[error("handler panicked: {0}")]
    Panic(String),
}

/// Runs user handler code, converting errors and panics into a
/// [`HandlerFailure`].
pub(crate) fn run_guarded<T>(
    call: impl FnOnce() -> anyhow::Result<T>,
) -> Result<T, HandlerFailure> {
    match panic::catch_unwind(AssertUnwindSafe(call)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(error)) => Err(HandlerFailure::Error(error)),
        Err(payload) => Err(HandlerFailure::Panic(panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        return (*message).to_owned();
    }
    payload
        .downcast_ref::<String>()
        .cloned()
        .unwrap_or_else(|| String::from("non-string panic payload"))
}
