//! Wire types for the kiln daemon connection.
//!
//! A connection carries [`Message`] values in both directions, one JSON
//! object per line. The daemon's connection core only distinguishes the two
//! stdin commands ([`IoCommand`]) from everything else; the remaining
//! variants describe build requests from the client and lifecycle reports
//! from the daemon.
//!
//! ```
//! use kiln_protocol::{ForwardInput, IoCommand, Message, decode_line, encode_line};
//!
//! let line = encode_line(&Message::ForwardInput(ForwardInput::new(*b"y\n")))?;
//! let decoded = decode_line(&line)?;
//! assert!(matches!(decoded.into_io_command(), Ok(IoCommand::Forward(_))));
//! # Ok::<(), kiln_protocol::ProtocolError>(())
//! ```

mod codec;
mod message;


pub use self::codec::{ProtocolError, decode_line, encode_line};
pub use self::message::{
    Build, BuildOutcome, BuildResult, BuildStarted, Cancel, CloseInput, DISCONNECTED_REASON,
    DaemonUnavailable, ForwardInput, IoCommand, LogLevel, Message, OutputEvent,
};
