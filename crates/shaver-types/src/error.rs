//! Error types for payload parsing in shaver-types.

use thiserror::Error;

/// Errors that can occur when interpreting shaver payloads.
///
/// Decoders never return this type; they map malformed payloads to "no value".
/// It is used by the conversions that need to refuse a value, such as turning
/// a read-only shaving mode into a write payload.
#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum ParseError {
    /// The payload does not have the length the record requires.
    #[error("Invalid data length: expected {expected} bytes, got {actual}")]
    InvalidLength {
        /// Required length.
        expected: usize,
        /// Length received.
        actual: usize,
    },

    /// The value cannot be written to the device.
    #[error("Value is not writable: {0}")]
    NotWritable(String),

    /// An unrecognised name was given for an enumerated value.
    #[error("Unknown value: {0}")]
    UnknownValue(String),
}

/// Result type alias using shaver-types' ParseError type.
pub type ParseResult<T> = std::result::Result<T, ParseError>;
