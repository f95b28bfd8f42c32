// CCDI command builders
// Each builder validates its arguments and returns a checksummed frame

use super::frame::CcdiFrame;
use super::messages::RadioMode;
use super::{ident, CcdiError, CcdiResult};
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;

/// Frequencies the radio can be tuned to, in Hz
pub const FREQUENCY_RANGE_HZ: RangeInclusive<u64> = 66_000_000..=520_000_000;

/// Highest CTCSS tone accepted, in Hz
pub const MAX_CTCSS_HZ: f64 = 300.0;

/// Channel numbers accepted by go-to-channel
pub const CHANNEL_RANGE: RangeInclusive<u16> = 1..=9999;

/// Receive or transmit side of a setting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Rx,
    Tx,
}

/// Channel bandwidth codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Bandwidth {
    Narrow = 1,
    Medium = 2,
    Wide = 3,
}

/// Transmit power codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PowerLevel {
    VeryLow = 1,
    Low = 2,
    Medium = 3,
    High = 4,
}

/// Set receive or transmit frequency
pub fn set_frequency(direction: Direction, hz: u64) -> CcdiResult<CcdiFrame> {
    if !FREQUENCY_RANGE_HZ.contains(&hz) {
        return Err(CcdiError::InvalidParameter(format!(
            "frequency {} Hz outside {}..={} Hz",
            hz,
            FREQUENCY_RANGE_HZ.start(),
            FREQUENCY_RANGE_HZ.end()
        )));
    }

    let ident = match direction {
        Direction::Rx => ident::RX_FREQUENCY,
        Direction::Tx => ident::TX_FREQUENCY,
    };
    CcdiFrame::from_parts(ident, &hz.to_string())
}

/// Set receive or transmit CTCSS tone; `None` disables CTCSS
pub fn set_ctcss(direction: Direction, tone_hz: Option<f64>) -> CcdiResult<CcdiFrame> {
    let encoded = match tone_hz {
        None => 0,
        Some(hz) if hz.is_finite() && (0.0..=MAX_CTCSS_HZ).contains(&hz) => {
            (hz * 10.0).round() as u32
        }
        Some(hz) => {
            return Err(CcdiError::InvalidParameter(format!(
                "CTCSS tone {} Hz outside 0..={} Hz",
                hz, MAX_CTCSS_HZ
            )))
        }
    };

    let ident = match direction {
        Direction::Rx => ident::RX_CTCSS,
        Direction::Tx => ident::TX_CTCSS,
    };
    CcdiFrame::from_parts(ident, &format!("{:04}", encoded))
}

/// Set audio volume (0-255)
pub fn set_volume(level: u8) -> CcdiResult<CcdiFrame> {
    CcdiFrame::from_parts(ident::VOLUME, &format!("{:03}", level))
}

/// Set channel bandwidth
pub fn set_bandwidth(bandwidth: Bandwidth) -> CcdiResult<CcdiFrame> {
    CcdiFrame::from_parts(ident::BANDWIDTH, &(bandwidth as u8).to_string())
}

/// Set transmit power
pub fn set_power(power: PowerLevel) -> CcdiResult<CcdiFrame> {
    CcdiFrame::from_parts(ident::POWER, &(power as u8).to_string())
}

/// Enable or disable monitor (squelch override)
pub fn set_monitor(enabled: bool) -> CcdiResult<CcdiFrame> {
    CcdiFrame::from_parts(ident::MONITOR, if enabled { "D" } else { "E" })
}

/// Go to a channel, optionally within a 2-character zone
///
/// With a zone the channel is zero-padded to 4 digits and prefixed by the
/// zone; without one it is sent unpadded.
pub fn go_to_channel(channel: u16, zone: Option<&str>) -> CcdiResult<CcdiFrame> {
    if !CHANNEL_RANGE.contains(&channel) {
        return Err(CcdiError::InvalidParameter(format!(
            "channel {} outside {}..={}",
            channel,
            CHANNEL_RANGE.start(),
            CHANNEL_RANGE.end()
        )));
    }

    let parameters = match zone {
        Some(zone) if zone.len() == 2 && zone.chars().all(|c| c.is_ascii_alphanumeric()) => {
            format!("{}{:04}", zone, channel)
        }
        Some(zone) => {
            return Err(CcdiError::InvalidParameter(format!(
                "zone {:?} must be 2 characters",
                zone
            )))
        }
        None => channel.to_string(),
    };
    CcdiFrame::from_parts(ident::GO_TO_CHANNEL, &parameters)
}

/// Generic function command: function digit, optional subfunction and qualifier
pub fn function(
    function: u8,
    subfunction: Option<u8>,
    qualifier: Option<&str>,
) -> CcdiResult<CcdiFrame> {
    if function > 9 {
        return Err(CcdiError::InvalidParameter(format!(
            "function {} outside 0..=9",
            function
        )));
    }

    let mut parameters = function.to_string();
    if let Some(subfunction) = subfunction {
        if subfunction > 99 {
            return Err(CcdiError::InvalidParameter(format!(
                "subfunction {} outside 0..=99",
                subfunction
            )));
        }
        parameters.push_str(&subfunction.to_string());
    }
    if let Some(qualifier) = qualifier {
        parameters.push_str(qualifier);
    }
    CcdiFrame::from_parts(ident::FUNCTION, &parameters)
}

/// Ask the radio which channel it is on (function 0, subfunction 5, qualifier 2)
pub fn get_current_channel() -> CcdiResult<CcdiFrame> {
    function(0, Some(5), Some("2"))
}

/// Switch the radio into the given mode
pub fn set_mode(mode: RadioMode) -> CcdiResult<CcdiFrame> {
    CcdiFrame::from_parts(ident::MODE_COMMAND, mode.as_param())
}

/// Ask the radio to report its mode with an `M` frame
pub fn mode_ping() -> CcdiResult<CcdiFrame> {
    CcdiFrame::from_parts(ident::MODE_COMMAND, "?")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wire(frame: CcdiResult<CcdiFrame>) -> String {
        frame.unwrap().to_string()
    }

    #[test]
    fn test_volume() {
        assert_eq!(wire(set_volume(0)), "J03000C3");
        assert_eq!(wire(set_volume(104)), "J03104BE");
    }

    #[test]
    fn test_ctcss() {
        assert_eq!(wire(set_ctcss(Direction::Rx, Some(67.0))), "A0406708E");
        assert_eq!(wire(set_ctcss(Direction::Rx, Some(0.0))), "A0400009B");
        assert_eq!(wire(set_ctcss(Direction::Rx, None)), "A0400009B");
        assert_eq!(wire(set_ctcss(Direction::Tx, Some(67.0))), "B0406708D");
        assert_eq!(wire(set_ctcss(Direction::Tx, Some(0.0))), "B0400009A");
        assert_eq!(wire(set_ctcss(Direction::Tx, None)), "B0400009A");
    }

    #[test]
    fn test_ctcss_fractional_tone() {
        let frame = set_ctcss(Direction::Rx, Some(88.5)).unwrap();
        assert_eq!(frame.parameters(), Some("0885"));
    }

    #[test]
    fn test_ctcss_out_of_range() {
        assert!(set_ctcss(Direction::Rx, Some(300.1)).is_err());
        assert!(set_ctcss(Direction::Rx, Some(-1.0)).is_err());
        assert!(set_ctcss(Direction::Rx, Some(f64::NAN)).is_err());
    }

    #[test]
    fn test_power() {
        assert_eq!(wire(set_power(PowerLevel::VeryLow)), "P0111E");
        assert_eq!(wire(set_power(PowerLevel::High)), "P0141B");
    }

    #[test]
    fn test_bandwidth() {
        assert_eq!(wire(set_bandwidth(Bandwidth::Wide)), "H01324");
        assert_eq!(wire(set_bandwidth(Bandwidth::Narrow)), "H01126");
    }

    #[test]
    fn test_frequency() {
        assert_eq!(
            wire(set_frequency(Direction::Rx, 453_200_000)),
            "R0945320000087"
        );
        assert_eq!(
            wire(set_frequency(Direction::Tx, 453_200_000)),
            "T0945320000085"
        );
    }

    #[test]
    fn test_frequency_bounds() {
        assert!(set_frequency(Direction::Rx, 66_000_000).is_ok());
        assert!(set_frequency(Direction::Rx, 520_000_000).is_ok());
        assert!(matches!(
            set_frequency(Direction::Rx, 65_999_999),
            Err(CcdiError::InvalidParameter(_))
        ));
        assert!(set_frequency(Direction::Tx, 520_000_001).is_err());
    }

    #[test]
    fn test_monitor() {
        assert_eq!(wire(set_monitor(true)), "M01D0E");
        assert_eq!(wire(set_monitor(false)), "M01E0D");
    }

    #[test]
    fn test_go_to_channel() {
        assert_eq!(wire(go_to_channel(23, None)), "g0223D2");
        assert_eq!(wire(go_to_channel(1499, None)), "g0414995E");
        assert_eq!(wire(go_to_channel(12, Some("01"))), "g060100120F");
    }

    #[test]
    fn test_go_to_channel_invalid() {
        assert!(go_to_channel(0, None).is_err());
        assert!(go_to_channel(10_000, None).is_err());
        assert!(go_to_channel(5, Some("1")).is_err());
    }

    #[test]
    fn test_functions() {
        assert_eq!(wire(function(9, None, Some("1"))), "f0291CE");
        assert_eq!(wire(function(5, None, Some("0"))), "f0250D3");
        assert_eq!(wire(function(0, Some(2), Some("25"))), "f0402256D");
        assert_eq!(wire(function(0, Some(5), Some("1"))), "f03051A1");
        assert_eq!(wire(function(0, Some(5), Some("2"))), "f03052A0");
        assert_eq!(wire(get_current_channel()), "f03052A0");
    }

    #[test]
    fn test_function_invalid() {
        assert!(function(10, None, None).is_err());
        assert!(function(0, Some(100), None).is_err());
    }

    #[test]
    fn test_mode_commands() {
        assert_eq!(wire(set_mode(RadioMode::Configuration)), "%01C37");
        assert_eq!(wire(set_mode(RadioMode::Normal)), "%01N2C");
        assert_eq!(wire(mode_ping()), "%01?3B");
    }
}
