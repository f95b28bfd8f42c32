// CCDI protocol codec: framing, checksum, message classification and command builders
pub mod checksum;
pub mod commands;
pub mod frame;
pub mod messages;

pub use commands::{Bandwidth, Direction, PowerLevel};
pub use frame::CcdiFrame;
pub use messages::{
    Acknowledgement, ErrorCategory, ErrorMessage, ModeReport, NackCode, ProgressMessage,
    ProgressType, QueryResponse, QueryType, RadioMode,
};

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CcdiError {
    #[error("Frame too short: {0} characters")]
    FrameTooShort(usize),

    #[error("Invalid hex field: {0:?}")]
    InvalidHex(String),

    #[error("Invalid character in frame: {0:?}")]
    InvalidCharacter(String),

    #[error("Frame declares {declared} parameter characters but carries {actual}")]
    LengthMismatch { declared: usize, actual: usize },

    #[error("Frame {0:?} not followed by a carriage return")]
    MissingTerminator(String),

    #[error("Checksum mismatch in frame {0}")]
    InvalidChecksum(String),

    #[error("Frame '{ident}' is missing parameters: {reason}")]
    MissingParameters { ident: char, reason: String },

    #[error("Unexpected frame identifier '{found}', expected '{expected}'")]
    UnexpectedIdent { expected: char, found: char },

    #[error("Unknown progress type 0x{0:02X}")]
    UnknownProgressType(u8),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type CcdiResult<T> = std::result::Result<T, CcdiError>;

/// Frame identifiers used by the protocol
pub mod ident {
    /// Query sent to the radio
    pub const QUERY: char = 'q';
    /// Response to a CCTM query
    pub const QUERY_RESPONSE: char = 'j';
    /// Unsolicited progress message
    pub const PROGRESS: char = 'p';
    /// Transaction or system error
    pub const ERROR: char = 'e';
    /// Model and CCDI version response
    pub const MODEL: char = 'm';
    /// Configuration-mode report
    pub const MODE_REPORT: char = 'M';
    /// Configuration-mode positive acknowledgement
    pub const ACK: char = '+';
    /// Configuration-mode negative acknowledgement
    pub const NACK: char = '-';
    /// Enter/exit/ping configuration mode
    pub const MODE_COMMAND: char = '%';
    /// Go to channel
    pub const GO_TO_CHANNEL: char = 'g';
    /// Generic function
    pub const FUNCTION: char = 'f';
    /// Set receive frequency
    pub const RX_FREQUENCY: char = 'R';
    /// Set transmit frequency
    pub const TX_FREQUENCY: char = 'T';
    /// Set receive CTCSS
    pub const RX_CTCSS: char = 'A';
    /// Set transmit CTCSS
    pub const TX_CTCSS: char = 'B';
    /// Set volume
    pub const VOLUME: char = 'J';
    /// Set channel bandwidth
    pub const BANDWIDTH: char = 'H';
    /// Set transmit power
    pub const POWER: char = 'P';
    /// Monitor on/off
    pub const MONITOR: char = 'M';
}

/// Out-of-band byte the radio sends when it can accept the next command
pub const READY: u8 = b'.';

/// Bytes that begin a frame the listener knows how to read
pub const FRAME_STARTERS: &[u8] = &[
    ident::PROGRESS as u8,
    ident::ERROR as u8,
    ident::QUERY_RESPONSE as u8,
    ident::MODEL as u8,
    ident::MODE_REPORT as u8,
    ident::ACK as u8,
    ident::NACK as u8,
];

/// Returns `true` if `byte` starts a frame the listener should read
pub fn is_frame_starter(byte: u8) -> bool {
    FRAME_STARTERS.contains(&byte)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_starters() {
        for byte in b"pejmM+-" {
            assert!(is_frame_starter(*byte));
        }
        assert!(!is_frame_starter(READY));
        assert!(!is_frame_starter(b'q'));
        assert!(!is_frame_starter(b'\r'));
    }
}
