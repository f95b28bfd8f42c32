// CCDI message classification
// Queries sent to the radio and the typed views of frames received from it

use super::frame::{parse_hex, CcdiFrame};
use super::{ident, CcdiError, CcdiResult};
use std::fmt;

/// Queries the radio understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryType {
    /// Model and CCDI version, answered with an `m` frame
    ModelAndCcdiVersion,
    QuerySdm,
    Version,
    SerialNumber,
    PaTemperature,
    AveragedRssi,
    RawRssi,
    ForwardPower,
    ReversePower,
    /// Packetised GPS data (TM8100 from v2.10)
    Gps,
    /// Text of the entire display (TM8200 from v3.03)
    Display,
}

impl QueryType {
    /// Every query type, in protocol order
    pub const ALL: [QueryType; 11] = [
        QueryType::ModelAndCcdiVersion,
        QueryType::QuerySdm,
        QueryType::Version,
        QueryType::SerialNumber,
        QueryType::PaTemperature,
        QueryType::AveragedRssi,
        QueryType::RawRssi,
        QueryType::ForwardPower,
        QueryType::ReversePower,
        QueryType::Gps,
        QueryType::Display,
    ];

    /// Pre-built wire form (without terminator)
    ///
    /// The values never change so they are not constructed per call.
    pub fn command(&self) -> &'static str {
        match self {
            QueryType::ModelAndCcdiVersion => "q010FE",
            QueryType::QuerySdm => "q011FD",
            QueryType::Version => "q013FB",
            QueryType::SerialNumber => "q014FA",
            QueryType::PaTemperature => "q0450475B",
            QueryType::AveragedRssi => "q0450635D",
            QueryType::RawRssi => "q0450645C",
            QueryType::ForwardPower => "q0453185A",
            QueryType::ReversePower => "q04531959",
            QueryType::Gps => "q016F8",
            QueryType::Display => "q0270C6",
        }
    }

    /// Query class digit and data, as concatenated into the parameters
    pub fn parts(&self) -> (&'static str, &'static str) {
        match self {
            QueryType::ModelAndCcdiVersion => ("0", ""),
            QueryType::QuerySdm => ("1", ""),
            QueryType::Version => ("3", ""),
            QueryType::SerialNumber => ("4", ""),
            QueryType::Gps => ("6", ""),
            QueryType::Display => ("7", "0"),
            other => ("5", other.response_code().unwrap_or_default()),
        }
    }

    /// Build the query frame from its parts
    pub fn to_frame(&self) -> CcdiResult<CcdiFrame> {
        let (class, data) = self.parts();
        CcdiFrame::from_parts(ident::QUERY, &format!("{}{}", class, data))
    }

    /// Code carried by the `j` response to a CCTM query
    pub fn response_code(&self) -> Option<&'static str> {
        match self {
            QueryType::PaTemperature => Some(response_code::PA_TEMPERATURE),
            QueryType::AveragedRssi => Some(response_code::AVERAGED_RSSI),
            QueryType::RawRssi => Some(response_code::RAW_RSSI),
            QueryType::ForwardPower => Some(response_code::FORWARD_POWER),
            QueryType::ReversePower => Some(response_code::REVERSE_POWER),
            _ => None,
        }
    }
}

/// Codes at the start of `j` response parameters
pub mod response_code {
    pub const PA_TEMPERATURE: &str = "047";
    pub const AVERAGED_RSSI: &str = "063";
    pub const RAW_RSSI: &str = "064";
    pub const FORWARD_POWER: &str = "318";
    pub const REVERSE_POWER: &str = "319";
}

/// Response to a CCTM query (`j` frame)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryResponse {
    /// 3-digit query code
    pub command: String,
    pub data: String,
}

impl QueryResponse {
    /// Data interpreted as a decimal number
    pub fn value(&self) -> Option<f64> {
        self.data.trim().parse().ok()
    }
}

impl TryFrom<&CcdiFrame> for QueryResponse {
    type Error = CcdiError;

    fn try_from(frame: &CcdiFrame) -> CcdiResult<Self> {
        expect_ident(frame, ident::QUERY_RESPONSE)?;
        let params = frame.params();
        if params.len() < 3 {
            return Err(CcdiError::MissingParameters {
                ident: frame.ident(),
                reason: format!("query code needs 3 characters, got {:?}", params),
            });
        }

        Ok(Self {
            command: params[..3].to_string(),
            data: params[3..].to_string(),
        })
    }
}

/// Progress message types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ProgressType {
    CallAnswered = 0x00,
    DeferredCalling = 0x01,
    TxInhibited = 0x02,
    EmergencyModeInitiated = 0x03,
    EmergencyModeTerminated = 0x04,
    /// Signal is being received
    ReceiverBusy = 0x05,
    /// No signal is being received
    ReceiverNotBusy = 0x06,
    /// Radio has started transmitting
    PttMicActivated = 0x07,
    /// Radio has stopped transmitting
    PttMicDeactivated = 0x08,
    SelcallRetry = 0x16,
    RadioStunned = 0x17,
    RadioRevived = 0x18,
    FfskDataReceived = 0x19,
    SelcallAutoAcknowledge = 0x1C,
    SdmAutoAcknowledge = 0x1D,
    SdmGpsDataReceived = 0x1E,
    RadioRestarted = 0x1F,
    SingleInBandToneReceived = 0x20,
    UserInitiatedChannelChange = 0x21,
    TdmaChannelId = 0x22,
    KeyCode = 0x23,
}

impl ProgressType {
    pub fn from_code(code: u8) -> Option<Self> {
        use ProgressType::*;
        let progress_type = match code {
            0x00 => CallAnswered,
            0x01 => DeferredCalling,
            0x02 => TxInhibited,
            0x03 => EmergencyModeInitiated,
            0x04 => EmergencyModeTerminated,
            0x05 => ReceiverBusy,
            0x06 => ReceiverNotBusy,
            0x07 => PttMicActivated,
            0x08 => PttMicDeactivated,
            0x16 => SelcallRetry,
            0x17 => RadioStunned,
            0x18 => RadioRevived,
            0x19 => FfskDataReceived,
            0x1C => SelcallAutoAcknowledge,
            0x1D => SdmAutoAcknowledge,
            0x1E => SdmGpsDataReceived,
            0x1F => RadioRestarted,
            0x20 => SingleInBandToneReceived,
            0x21 => UserInitiatedChannelChange,
            0x22 => TdmaChannelId,
            0x23 => KeyCode,
            _ => return None,
        };
        Some(progress_type)
    }

    pub fn code(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for ProgressType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Unsolicited progress message (`p` frame)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressMessage {
    pub progress_type: ProgressType,
    pub para1: Option<String>,
    /// Only present for channel change, TDMA channel id and key code
    pub para2: Option<String>,
}

impl TryFrom<&CcdiFrame> for ProgressMessage {
    type Error = CcdiError;

    fn try_from(frame: &CcdiFrame) -> CcdiResult<Self> {
        expect_ident(frame, ident::PROGRESS)?;
        let params = frame.params();
        let missing = |reason: &str| CcdiError::MissingParameters {
            ident: frame.ident(),
            reason: format!("{} in {:?}", reason, params),
        };

        let type_field = params
            .get(..2)
            .ok_or_else(|| missing("progress type needs 2 characters"))?;
        let code = u8::try_from(parse_hex(type_field)?)
            .map_err(|_| CcdiError::InvalidHex(type_field.to_string()))?;
        let progress_type =
            ProgressType::from_code(code).ok_or(CcdiError::UnknownProgressType(code))?;

        let len = params.len();
        let field = |start: usize, width: usize| -> CcdiResult<String> {
            params
                .get(start..start + width)
                .map(str::to_string)
                .ok_or_else(|| missing("field out of range"))
        };

        let (para1, para2) = match progress_type {
            ProgressType::SelcallAutoAcknowledge
            | ProgressType::SdmAutoAcknowledge
            | ProgressType::SdmGpsDataReceived
            | ProgressType::RadioRestarted => (Some(params[2..].to_string()), None),
            ProgressType::UserInitiatedChannelChange if len == 4 => {
                // Short form carries only the channel type digit(s)
                (Some(params[2..].to_string()), None)
            }
            ProgressType::UserInitiatedChannelChange => {
                // Fields are taken from the end of the block, overlapping
                // the type field on the shortest frames
                if len < 7 {
                    return Err(missing("channel change needs type, zone and channel"));
                }
                // 0 single channel, 1 scan/vote group, 2 captured within group,
                // 3 temporary channel, 9 not available
                let para1 = field(len - 7, 1)?;
                // zone (2 digits) + channel or group id (4 digits)
                let para2 = field(len - 6, 6)?;
                (Some(para1), Some(para2))
            }
            ProgressType::TdmaChannelId => {
                if len < 4 {
                    return Err(missing("TDMA channel id needs 4 characters"));
                }
                (Some(field(len - 4, 2)?), Some(field(len - 2, 2)?))
            }
            ProgressType::KeyCode => {
                if len < 3 {
                    return Err(missing("key code needs 3 characters"));
                }
                // para2: 0 key down, 1 key up, 2 short press, 3 long press
                (Some(field(len - 3, 2)?), Some(field(len - 1, 1)?))
            }
            _ => (None, None),
        };

        Ok(Self {
            progress_type,
            para1,
            para2,
        })
    }
}

impl fmt::Display for ProgressMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.progress_type)?;
        if let Some(para1) = &self.para1 {
            write!(f, " {}", para1)?;
        }
        if let Some(para2) = &self.para2 {
            write!(f, " {}", para2)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    TransactionError = 0,
    SystemError = 1,
}

/// Error reported by the radio (`e` frame)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorMessage {
    pub category: ErrorCategory,
    /// Only set for transaction errors that carry a code
    pub transaction_error: Option<u32>,
}

impl TryFrom<&CcdiFrame> for ErrorMessage {
    type Error = CcdiError;

    fn try_from(frame: &CcdiFrame) -> CcdiResult<Self> {
        expect_ident(frame, ident::ERROR)?;
        let params = frame.params();

        let category = match params.get(..1) {
            Some("0") => ErrorCategory::TransactionError,
            Some("1") => ErrorCategory::SystemError,
            Some(other) => {
                return Err(CcdiError::InvalidParameter(format!(
                    "unknown error category {:?}",
                    other
                )))
            }
            None => {
                return Err(CcdiError::MissingParameters {
                    ident: frame.ident(),
                    reason: "error category missing".to_string(),
                })
            }
        };

        let transaction_error = match (category, &params[1..]) {
            (ErrorCategory::TransactionError, rest) if !rest.is_empty() => {
                Some(rest.parse().map_err(|_| {
                    CcdiError::InvalidParameter(format!("transaction error code {:?}", rest))
                })?)
            }
            _ => None,
        };

        Ok(Self {
            category,
            transaction_error,
        })
    }
}

impl fmt::Display for ErrorMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.category, self.transaction_error) {
            (ErrorCategory::TransactionError, Some(code)) => {
                write!(f, "transaction error {}", code)
            }
            (ErrorCategory::TransactionError, None) => write!(f, "transaction error"),
            (ErrorCategory::SystemError, _) => write!(f, "system error"),
        }
    }
}

/// Operating mode of the radio
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum RadioMode {
    /// CCDI command mode
    Normal,
    /// Direct hardware configuration mode
    Configuration,
}

impl RadioMode {
    /// Parameter character used for this mode on the wire
    pub fn as_param(&self) -> &'static str {
        match self {
            RadioMode::Normal => "N",
            RadioMode::Configuration => "C",
        }
    }
}

/// Mode report from the radio (`M` frame)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeReport {
    pub mode: RadioMode,
}

impl TryFrom<&CcdiFrame> for ModeReport {
    type Error = CcdiError;

    fn try_from(frame: &CcdiFrame) -> CcdiResult<Self> {
        expect_ident(frame, ident::MODE_REPORT)?;
        let mode = match frame.params() {
            "C" => RadioMode::Configuration,
            "N" => RadioMode::Normal,
            other => {
                return Err(CcdiError::InvalidParameter(format!(
                    "unknown mode {:?}",
                    other
                )))
            }
        };
        Ok(Self { mode })
    }
}

/// Reason code carried by a negative acknowledgement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NackCode {
    UnknownCommand,
    InvalidParameter,
    OutOfRange,
    NotPermitted,
    ChecksumError,
    Other(u8),
}

impl NackCode {
    pub fn from_code(code: u8) -> Self {
        match code {
            0x01 => NackCode::UnknownCommand,
            0x02 => NackCode::InvalidParameter,
            0x03 => NackCode::OutOfRange,
            0x04 => NackCode::NotPermitted,
            0x05 => NackCode::ChecksumError,
            other => NackCode::Other(other),
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, NackCode::Other(_))
    }
}

impl fmt::Display for NackCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NackCode::UnknownCommand => write!(f, "unknown command"),
            NackCode::InvalidParameter => write!(f, "invalid parameter"),
            NackCode::OutOfRange => write!(f, "value out of range"),
            NackCode::NotPermitted => write!(f, "not permitted in current state"),
            NackCode::ChecksumError => write!(f, "checksum error"),
            NackCode::Other(code) => write!(f, "unrecognised code 0x{:02X}", code),
        }
    }
}

/// Configuration-mode acknowledgement (`+` or `-` frame)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acknowledgement {
    /// Command accepted; carries the acknowledged identifier when echoed
    Accepted { command: Option<char> },
    Rejected(NackCode),
}

impl TryFrom<&CcdiFrame> for Acknowledgement {
    type Error = CcdiError;

    fn try_from(frame: &CcdiFrame) -> CcdiResult<Self> {
        match frame.ident() {
            ident::ACK => Ok(Acknowledgement::Accepted {
                command: frame.params().chars().next(),
            }),
            ident::NACK => {
                let params = frame.params();
                let code_field = params.get(..2).ok_or_else(|| CcdiError::MissingParameters {
                    ident: frame.ident(),
                    reason: format!("error code needs 2 characters, got {:?}", params),
                })?;
                let code = u8::try_from(parse_hex(code_field)?)
                    .map_err(|_| CcdiError::InvalidHex(code_field.to_string()))?;
                Ok(Acknowledgement::Rejected(NackCode::from_code(code)))
            }
            found => Err(CcdiError::UnexpectedIdent {
                expected: ident::ACK,
                found,
            }),
        }
    }
}

fn expect_ident(frame: &CcdiFrame, expected: char) -> CcdiResult<()> {
    if frame.ident() == expected {
        Ok(())
    } else {
        Err(CcdiError::UnexpectedIdent {
            expected,
            found: frame.ident(),
        })
    }
}
