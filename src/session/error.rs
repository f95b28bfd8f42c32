// Session error taxonomy

use crate::ccdi::{CcdiError, NackCode};
use crate::serial::SerialError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RadioError {
    /// Unparseable or truncated frame
    #[error("Framing error: {0}")]
    Framing(String),

    #[error("Checksum error: {0}")]
    Checksum(String),

    /// An awaited response did not arrive in time
    #[error("Timeout waiting for {0}")]
    Timeout(String),

    /// The radio rejected a command
    #[error("Radio rejected command: {0}")]
    Protocol(NackCode),

    #[error("Transport error: {0}")]
    Transport(#[from] SerialError),

    /// Invalid arguments from the caller
    #[error("Invalid request: {0}")]
    Usage(String),

    #[error("Radio is not in configuration mode")]
    NotInConfigMode,

    #[error("Session is disconnected")]
    Disconnected,

    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<CcdiError> for RadioError {
    fn from(err: CcdiError) -> Self {
        match err {
            CcdiError::InvalidChecksum(frame) => RadioError::Checksum(frame),
            CcdiError::InvalidParameter(reason) => RadioError::Usage(reason),
            CcdiError::Internal(reason) => RadioError::Internal(reason),
            other => RadioError::Framing(other.to_string()),
        }
    }
}

impl RadioError {
    /// Errors the session recovers from by logging and carrying on
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            RadioError::Framing(_)
                | RadioError::Checksum(_)
                | RadioError::Timeout(_)
                | RadioError::Protocol(_)
        )
    }
}

pub type RadioResult<T> = std::result::Result<T, RadioError>;
