//! Error types for shaver-core.
//!
//! # Where errors end up
//!
//! The coordinator absorbs almost every error it meets. The table shows how
//! each kind is handled inside the coordinator; only the write actions and
//! constructors return errors to the caller.
//!
//! | Error Type | Handling | Effect |
//! |------------|----------|--------|
//! | [`Error::Timeout`] | Session failure | Live loop backs off |
//! | [`Error::Bluetooth`] | Per characteristic: logged. Per session: backoff | Field keeps its value |
//! | [`Error::ConnectionFailed`] | Session failure | Live loop backs off |
//! | [`Error::DeviceNotFound`] | Connect failure (peripheral unknown to the adapter) | Live loop backs off |
//! | [`Error::CharacteristicNotFound`] | Logged | Field keeps its value |
//! | [`Error::NotConnected`] | Returned by writes | Caller decides |
//! | [`Error::Unsupported`] | Returned by writes | Capability gate refused |
//! | [`Error::Cancelled`] | Returned by writes once shutdown has begun | Caller stops |
//! | [`Error::InvalidConfig`] | Returned by constructors | Fix configuration |
//!
//! ## Recommended Timeouts
//!
//! | Operation | Default | Notes |
//! |-----------|---------|-------|
//! | Connection | 15 seconds | Shavers are slow to accept while charging |
//! | Read / write | 10 seconds | Usually completes in well under a second |
//! | Keep-alive | every 30 seconds | Battery read on the live session |

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur when talking to a shaver.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Bluetooth Low Energy error.
    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] btleplug::Error),

    /// No recent advertisement from the device.
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    /// Operation attempted while not connected to device.
    #[error("Not connected to device")]
    NotConnected,

    /// Required BLE characteristic not found on device.
    #[error("Characteristic not found: {uuid} (searched in {service_count} services)")]
    CharacteristicNotFound {
        /// The UUID that was not found.
        uuid: String,
        /// Number of services that were searched.
        service_count: usize,
    },

    /// The device does not advertise the capability this operation needs.
    #[error("Unsupported by device: {0}")]
    Unsupported(String),

    /// A value could not be encoded for the device.
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Operation timed out.
    #[error("Operation '{operation}' timed out after {duration:?}")]
    Timeout {
        /// The operation that timed out.
        operation: String,
        /// The timeout duration.
        duration: Duration,
    },

    /// Operation was cancelled.
    #[error("Operation cancelled")]
    Cancelled,

    /// Connection failed with specific reason.
    #[error("Connection failed: {reason}")]
    ConnectionFailed {
        /// The device address that failed to connect.
        address: Option<String>,
        /// The structured reason for the failure.
        reason: ConnectionFailureReason,
    },

    /// Write operation failed.
    #[error("Write failed to characteristic {uuid}: {reason}")]
    WriteFailed {
        /// The characteristic UUID.
        uuid: String,
        /// The reason for the failure.
        reason: String,
    },

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Structured reasons for connection failures.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConnectionFailureReason {
    /// Bluetooth adapter not available or powered off.
    AdapterUnavailable,
    /// Device is out of range.
    OutOfRange,
    /// The BLE stack refused the connection.
    BleError(String),
    /// Other/unknown error.
    Other(String),
}

impl std::fmt::Display for ConnectionFailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AdapterUnavailable => write!(f, "Bluetooth adapter unavailable"),
            Self::OutOfRange => write!(f, "device out of range"),
            Self::BleError(msg) => write!(f, "BLE error: {}", msg),
            Self::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl Error {
    /// Create a device not found error for an address.
    pub fn device_not_found(address: impl Into<String>) -> Self {
        Self::DeviceNotFound(address.into())
    }

    /// Create a timeout error with operation context.
    pub fn timeout(operation: impl Into<String>, duration: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration,
        }
    }

    /// Create a characteristic not found error.
    pub fn characteristic_not_found(uuid: impl Into<String>, service_count: usize) -> Self {
        Self::CharacteristicNotFound {
            uuid: uuid.into(),
            service_count,
        }
    }

    /// Create a configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }

    /// Create a connection failure with structured reason.
    pub fn connection_failed(address: Option<String>, reason: ConnectionFailureReason) -> Self {
        Self::ConnectionFailed { address, reason }
    }
}

impl From<shaver_types::ParseError> for Error {
    fn from(err: shaver_types::ParseError) -> Self {
        match err {
            shaver_types::ParseError::NotWritable(value) => {
                Error::Unsupported(format!("'{value}' cannot be written"))
            }
            other => Error::InvalidData(other.to_string()),
        }
    }
}

/// Result type alias using shaver-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;
