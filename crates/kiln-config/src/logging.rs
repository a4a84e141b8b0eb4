//! Log output settings.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// How daemon log records are rendered on stderr.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    Display,
    EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum LogFormat {
    /// One JSON object per record, for log shippers.
    #[default]
    Json,
    /// Single-line text for terminals.
    Compact,
}

/// Failure to recognise a [`LogFormat`] name.
pub type LogFormatParseError = strum::ParseError;
