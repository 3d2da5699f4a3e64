//! Error handling for CarveKit
//!
//! Provides error types for the two layers of the sender:
//! - Controller errors (job lifecycle, state gating, firmware responses)
//! - Connection errors (transport failures)
//!
//! All error types use `thiserror`. Transport failures flip connection
//! state; firmware errors and alarms abort the current job but never
//! terminate the process. Malformed protocol input is absorbed by the
//! parser layer and never surfaces as an error.

use crate::data::MachineState;
use thiserror::Error;

/// Controller error type
///
/// Errors raised by the streaming engine and the controller session:
/// rejected operations, firmware error responses, and alarms.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ControllerError {
    /// Transport is not connected
    #[error("Controller not connected")]
    NotConnected,

    /// A job is already being streamed
    #[error("A job is already streaming")]
    AlreadyStreaming,

    /// Operation rejected because of the current machine state
    #[error("{operation} not permitted while machine is {state}")]
    StateViolation {
        /// The rejected operation.
        operation: String,
        /// The machine state at the time of the request.
        state: MachineState,
    },

    /// Request carried an invalid argument
    #[error("Invalid request: {reason}")]
    InvalidRequest {
        /// Why the request was rejected.
        reason: String,
    },

    /// Firmware responded with an `error:` line
    #[error("{message}")]
    Firmware {
        /// The firmware error code.
        code: u8,
        /// The decoded human-readable message.
        message: String,
    },

    /// Firmware raised an `ALARM:` condition
    #[error("{message}")]
    Alarm {
        /// The firmware alarm code.
        code: u8,
        /// The decoded human-readable message.
        message: String,
    },
}

/// Connection error type
///
/// Failures of the underlying transport (serial, TCP, or an injected
/// platform transport). Not retried automatically.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    /// Failed to open the port/endpoint
    #[error("Failed to open {port}: {reason}")]
    FailedToOpen {
        /// The port or endpoint that failed to open.
        port: String,
        /// The reason the open failed.
        reason: String,
    },

    /// Write to the transport failed
    #[error("Send failed: {reason}")]
    SendFailed {
        /// The reason the write failed.
        reason: String,
    },

    /// Read from the transport failed
    #[error("Receive failed: {reason}")]
    ReceiveFailed {
        /// The reason the read failed.
        reason: String,
    },

    /// Connection dropped mid-session
    #[error("Connection lost: {reason}")]
    ConnectionLost {
        /// The reason the connection was lost.
        reason: String,
    },

    /// Connection parameters were invalid for the selected driver
    #[error("Invalid connection parameters: {reason}")]
    InvalidParameters {
        /// The reason the parameters are invalid.
        reason: String,
    },

    /// Operation attempted on a closed transport
    #[error("Transport is not open")]
    NotOpen,
}

/// Main error type for CarveKit
#[derive(Error, Debug)]
pub enum Error {
    /// Controller error
    #[error(transparent)]
    Controller(#[from] ControllerError),

    /// Connection error
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// Standard I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an error from a string message
    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }

    /// Check if this is a connection error
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Error::Connection(_))
    }

    /// Check if this is a controller error
    pub fn is_controller_error(&self) -> bool {
        matches!(self, Error::Controller(_))
    }
}

/// Result type using Error
pub type Result<T> = std::result::Result<T, Error>;
