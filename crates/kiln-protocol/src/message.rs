//! Typed messages exchanged between the kiln client and daemon.
//!
//! Every message travels as a single JSON object tagged by `kind`. Inbound
//! traffic from the client carries build requests and the client's standard
//! input; outbound traffic from the daemon reports build lifecycle events and
//! log output.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Reason attached to the synthetic [`CloseInput`] raised when the client
/// connection ends.
pub const DISCONNECTED_REASON: &str = "<disconnected>";

/// A chunk of the client's standard input, forwarded to the running build.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ForwardInput {
    bytes: Vec<u8>,
}

impl ForwardInput {
    /// Creates a forwarded input chunk.
    #[must_use]
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }

    /// Returns the forwarded bytes.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Consumes the chunk, returning the forwarded bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// Signals that the client's standard input has ended.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CloseInput {
    reason: String,
}

impl CloseInput {
    /// Creates an end-of-input signal with the given reason.
    #[must_use]
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    /// End-of-input raised because the client went away.
    #[must_use]
    pub fn disconnected() -> Self {
        Self::new(DISCONNECTED_REASON)
    }

    /// Returns the reason input was closed.
    #[must_use]
    pub const fn reason(&self) -> &str {
        self.reason.as_str()
    }

    /// Reports whether this signal was raised by a client disconnect.
    #[must_use]
    pub fn is_disconnect(&self) -> bool {
        self.reason == DISCONNECTED_REASON
    }
}

/// The two message shapes that drive the daemon's stdin relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IoCommand {
    /// Forward a chunk of input to the build.
    Forward(ForwardInput),
    /// No further input will arrive.
    Close(CloseInput),
}

impl From<ForwardInput> for IoCommand {
    fn from(input: ForwardInput) -> Self {
        Self::Forward(input)
    }
}

impl From<CloseInput> for IoCommand {
    fn from(close: CloseInput) -> Self {
        Self::Close(close)
    }
}

impl From<IoCommand> for Message {
    fn from(command: IoCommand) -> Self {
        match command {
            IoCommand::Forward(input) => Self::ForwardInput(input),
            IoCommand::Close(close) => Self::CloseInput(close),
        }
    }
}

/// Request from the client to run a build.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Build {
    /// Client-assigned build identifier.
    pub build_id: String,
    /// Task selectors and flags, forwarded verbatim.
    #[serde(default)]
    pub arguments: Vec<String>,
    /// Directory the client was invoked from.
    pub working_dir: PathBuf,
}

/// Request from the client to cancel a running build.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Cancel {
    /// Build being cancelled.
    pub build_id: String,
}

/// Sent by the daemon when it cannot accept the client's request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DaemonUnavailable {
    /// Human-readable explanation shown to the user.
    pub reason: String,
}

impl DaemonUnavailable {
    /// Creates an unavailability notice.
    #[must_use]
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Sent by the daemon once the requested build has begun executing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BuildStarted {
    /// Build that started.
    pub build_id: String,
    /// Optional diagnostics about the daemon that accepted the build.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<String>,
}

impl BuildStarted {
    /// Creates a start notification without diagnostics.
    #[must_use]
    pub fn new(build_id: impl Into<String>) -> Self {
        Self {
            build_id: build_id.into(),
            diagnostics: None,
        }
    }
}

/// Severity of a relayed log event.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    /// Verbose diagnostic output.
    Debug,
    /// Regular build output.
    #[default]
    Info,
    /// Something the user should look at.
    Warn,
    /// A failure.
    Error,
}

/// Build output relayed to the client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OutputEvent {
    /// Severity of the event.
    #[serde(default)]
    pub level: LogLevel,
    /// Logger category that produced the event.
    pub category: String,
    /// Rendered text.
    pub message: String,
}

impl OutputEvent {
    /// Creates an output event.
    #[must_use]
    pub fn new(level: LogLevel, category: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level,
            category: category.into(),
            message: message.into(),
        }
    }
}

/// Final outcome of a build.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BuildOutcome {
    /// The build completed successfully.
    Success,
    /// The build failed.
    Failure {
        /// Description of the failure.
        message: String,
    },
}

/// Sent by the daemon when the build completes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BuildResult {
    /// Build that completed.
    pub build_id: String,
    /// How it ended.
    pub outcome: BuildOutcome,
}

impl BuildResult {
    /// Creates a successful result.
    #[must_use]
    pub fn success(build_id: impl Into<String>) -> Self {
        Self {
            build_id: build_id.into(),
            outcome: BuildOutcome::Success,
        }
    }

    /// Creates a failed result.
    #[must_use]
    pub fn failure(build_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            build_id: build_id.into(),
            outcome: BuildOutcome::Failure {
                message: message.into(),
            },
        }
    }
}

/// Any message carried on a daemon connection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Message {
    /// Client stdin chunk.
    ForwardInput(ForwardInput),
    /// Client stdin closed.
    CloseInput(CloseInput),
    /// Client build request.
    Build(Build),
    /// Client cancellation request.
    Cancel(Cancel),
    /// Client acknowledges the build result and is going away.
    Finished,
    /// Daemon refuses the request.
    DaemonUnavailable(DaemonUnavailable),
    /// Daemon started the build.
    BuildStarted(BuildStarted),
    /// Daemon relays build output.
    Output(OutputEvent),
    /// Daemon reports the build outcome.
    Result(BuildResult),
}

impl Message {
    /// Splits stdin commands from every other message.
    ///
    /// # Errors
    ///
    /// Returns the original message unchanged when it is not an
    /// [`IoCommand`].
    pub fn into_io_command(self) -> Result<IoCommand, Self> {
        match self {
            Self::ForwardInput(input) => Ok(IoCommand::Forward(input)),
            Self::CloseInput(close) => Ok(IoCommand::Close(close)),
            other => Err(other),
        }
    }

    /// Returns the `kind` tag used on the wire.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::ForwardInput(_) => "forward_input",
            Self::CloseInput(_) => "close_input",
            Self::Build(_) => "build",
            Self::Cancel(_) => "cancel",
            Self::Finished => "finished",
            Self::DaemonUnavailable(_) => "daemon_unavailable",
            Self::BuildStarted(_) => "build_started",
            Self::Output(_) => "output",
            Self::Result(_) => "result",
        }
    }
}

impl From<DaemonUnavailable> for Message {
    fn from(message: DaemonUnavailable) -> Self {
        Self::DaemonUnavailable(message)
    }
}

impl From<BuildStarted> for Message {
    fn from(message: BuildStarted) -> Self {
        Self::BuildStarted(message)
    }
}

impl From<OutputEvent> for Message {
    fn from(event: OutputEvent) -> Self {
        Self::Output(event)
    }
}

impl From<BuildResult> for Message {
    fn from(result: BuildResult) -> Self {
        Self::Result(result)
    }
}
