//! JSONL framing for [`Message`] values.
//!
//! Each message occupies exactly one line: a JSON object followed by `\n`.
//! Decoding tolerates trailing whitespace, including `\r\n` line endings.

use thiserror::Error;

use crate::Message;

/// Errors raised while encoding or decoding a message line.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The line held nothing but whitespace.
    #[error("empty message line")]
    EmptyLine,
    /// The line was not a valid message.
    #[error("malformed message line: {source}")]
    Malformed {
        /// Underlying parse failure.
        #[source]
        source: serde_json::Error,
    },
    /// The message could not be serialised.
    #[error("failed to serialise message: {source}")]
    Serialize {
        /// Underlying serialisation failure.
        #[source]
        source: serde_json::Error,
    },
}

/// Encodes a message as a newline-terminated JSON line.
///
/// # Errors
///
/// Returns [`ProtocolError::Serialize`] if the message cannot be serialised.
pub fn encode_line(message: &Message) -> Result<Vec<u8>, ProtocolError> {
    let mut line =
        serde_json::to_vec(message).map_err(|source| ProtocolError::Serialize { source })?;
    line.push(b'\n');
    Ok(line)
}

/// Decodes a single JSON line into a message.
///
/// # Errors
///
/// Returns [`ProtocolError::EmptyLine`] for blank input and
/// [`ProtocolError::Malformed`] when the JSON does not describe a message.
pub fn decode_line(line: &[u8]) -> Result<Message, ProtocolError> {
    let trimmed = trim_trailing_whitespace(line);
    if trimmed.is_empty() {
        return Err(ProtocolError::EmptyLine);
    }
    serde_json::from_slice(trimmed).map_err(|source| ProtocolError::Malformed { source })
}

fn trim_trailing_whitespace(bytes: &[u8]) -> &[u8] {
    let end = bytes
        .iter()
        .rposition(|byte| !byte.is_ascii_whitespace())
        .map_or(0, |pos| pos + 1);
    bytes.get(..end).unwrap_or_default()
}
