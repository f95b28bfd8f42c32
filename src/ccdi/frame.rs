// CCDI frame structure
// IDENT(1) LEN(2 hex) PARAMS(LEN) CHECKSUM(2 hex), terminated by CR on the wire

use super::checksum;
use super::{CcdiError, CcdiResult};
use std::fmt;

/// Carriage return ending every frame on the wire
pub const TERMINATOR: u8 = 0x0D;

/// Ident + 2 length digits + 2 checksum digits
pub const MIN_FRAME_LEN: usize = 5;

/// Largest parameter block the 2-digit length field can describe
pub const MAX_PARAMETERS_LEN: usize = 0xFF;

/// A single CCDI message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CcdiFrame {
    ident: char,
    size: usize,
    parameters: Option<String>,
    checksum: String,
}

impl CcdiFrame {
    /// Parse a frame from its text form (without the CR terminator)
    ///
    /// Whitespace anywhere in the input is ignored. The checksum is not
    /// verified here; see [`CcdiFrame::is_valid`].
    pub fn parse(text: &str) -> CcdiResult<Self> {
        let text = strip_whitespace(text);

        if text.len() < MIN_FRAME_LEN {
            return Err(CcdiError::FrameTooShort(text.len()));
        }

        if !text.bytes().all(|b| b.is_ascii_graphic()) {
            return Err(CcdiError::InvalidCharacter(text));
        }

        let ident = text.as_bytes()[0] as char;
        let size = parse_length(&text[1..3])?;
        if text.len() - MIN_FRAME_LEN != size {
            return Err(CcdiError::LengthMismatch {
                declared: size,
                actual: text.len() - MIN_FRAME_LEN,
            });
        }
        let checksum = text[text.len() - 2..].to_string();
        let parameters = if size > 0 {
            Some(text[3..text.len() - 2].to_string())
        } else {
            None
        };

        Ok(Self {
            ident,
            size,
            parameters,
            checksum,
        })
    }

    /// Build a frame from an identifier and parameters, computing length and checksum
    pub fn from_parts(ident: char, parameters: &str) -> CcdiResult<Self> {
        if !ident.is_ascii_graphic() {
            return Err(CcdiError::InvalidParameter(format!(
                "identifier {:?} is not a printable ASCII character",
                ident
            )));
        }

        let parameters = strip_whitespace(parameters);
        if !parameters.bytes().all(|b| b.is_ascii_graphic()) {
            return Err(CcdiError::InvalidParameter(format!(
                "{:?} contains characters outside printable ASCII",
                parameters
            )));
        }
        if parameters.len() > MAX_PARAMETERS_LEN {
            return Err(CcdiError::InvalidParameter(format!(
                "{} parameter characters exceed the {} allowed",
                parameters.len(),
                MAX_PARAMETERS_LEN
            )));
        }

        let message = format!("{}{:02X}{}", ident, parameters.len(), parameters);
        let encoded = format!("{}{}", message, checksum::calculate(&message));

        match Self::parse(&encoded) {
            Ok(frame) if frame.params() == parameters => Ok(frame),
            _ => Err(CcdiError::Internal(format!(
                "failed to construct a valid frame from ('{}', \"{}\")",
                ident, parameters
            ))),
        }
    }

    /// Message identifier character
    pub fn ident(&self) -> char {
        self.ident
    }

    /// Declared parameter length
    pub fn size(&self) -> usize {
        self.size
    }

    /// Parameters, absent when the declared length is zero
    pub fn parameters(&self) -> Option<&str> {
        self.parameters.as_deref()
    }

    /// Parameters, or an empty string when absent
    pub fn params(&self) -> &str {
        self.parameters.as_deref().unwrap_or("")
    }

    /// Checksum characters as received or computed
    pub fn checksum(&self) -> &str {
        &self.checksum
    }

    /// Recompute the checksum and compare it with the stored one
    pub fn is_valid(&self) -> bool {
        checksum::validate(&self.to_string())
    }

    /// Encoded form followed by the CR terminator, ready to write
    pub fn to_wire(&self) -> String {
        format!("{}{}", self, TERMINATOR as char)
    }
}

impl fmt::Display for CcdiFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{:02X}{}{}",
            self.ident,
            self.size,
            self.params(),
            self.checksum
        )
    }
}

impl std::str::FromStr for CcdiFrame {
    type Err = CcdiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn strip_whitespace(text: &str) -> String {
    text.chars().filter(|c| !c.is_whitespace()).collect()
}

/// Parse a hex field such as the 2-digit length
/// Length field, two uppercase hex digits
fn parse_length(field: &str) -> CcdiResult<usize> {
    if !field.bytes().all(|b| matches!(b, b'0'..=b'9' | b'A'..=b'F')) {
        return Err(CcdiError::InvalidHex(field.to_string()));
    }
    parse_hex(field)
}

pub(crate) fn parse_hex(field: &str) -> CcdiResult<usize> {
    usize::from_str_radix(field, 16).map_err(|_| CcdiError::InvalidHex(field.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_manual_example() {
        let frame = CcdiFrame::parse("s0D050800TESTHi!DA").unwrap();
        assert_eq!(frame.ident(), 's');
        assert_eq!(frame.size(), 13);
        assert_eq!(frame.parameters(), Some("050800TESTHi!"));
        assert_eq!(frame.checksum(), "DA");
        assert!(frame.is_valid());
    }

    #[test]
    fn test_parse_pa_temp_query() {
        let frame = CcdiFrame::parse("q0450475B").unwrap();
        assert_eq!(frame.ident(), 'q');
        assert_eq!(frame.size(), 4);
        assert_eq!(frame.parameters(), Some("5047"));
        assert_eq!(frame.checksum(), "5B");
    }

    #[test]
    fn test_parse_without_parameters() {
        let frame = CcdiFrame::parse("q002F").unwrap();
        assert_eq!(frame.size(), 0);
        assert_eq!(frame.parameters(), None);
        assert_eq!(frame.params(), "");
        assert!(frame.is_valid());
    }

    #[test]
    fn test_parse_strips_whitespace() {
        let frame = CcdiFrame::parse("p 04 21 01 68").unwrap();
        assert_eq!(frame.ident(), 'p');
        assert_eq!(frame.size(), 4);
        assert_eq!(frame.parameters(), Some("2101"));
        assert_eq!(frame.checksum(), "68");
    }

    #[test]
    fn test_parse_too_short() {
        assert!(matches!(
            CcdiFrame::parse("q00F"),
            Err(CcdiError::FrameTooShort(4))
        ));
        assert!(CcdiFrame::parse("").is_err());
    }

    #[test]
    fn test_parse_bad_length() {
        assert!(matches!(
            CcdiFrame::parse("qZZ2F"),
            Err(CcdiError::InvalidHex(_))
        ));
    }

    #[test]
    fn test_rejects_control_characters() {
        assert!(matches!(
            CcdiFrame::parse("j05\x01472331"),
            Err(CcdiError::InvalidCharacter(_))
        ));
        assert!(matches!(
            CcdiFrame::from_parts('s', "AB\x07"),
            Err(CcdiError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_rejects_length_mismatch() {
        // Declared empty but carries two parameter characters
        assert!(matches!(
            CcdiFrame::parse("q00XY2F"),
            Err(CcdiError::LengthMismatch {
                declared: 0,
                actual: 2
            })
        ));
        assert!(matches!(
            CcdiFrame::parse("q05AB2F"),
            Err(CcdiError::LengthMismatch {
                declared: 5,
                actual: 2
            })
        ));
        assert!(matches!(
            CcdiFrame::parse("q0a0123456789AB"),
            Err(CcdiError::InvalidHex(_))
        ));
    }

    #[test]
    fn test_is_valid_agrees_with_validate() {
        for text in ["q002F", "q002E", "j050472331", "j050472332", "p0205C9"] {
            let frame = CcdiFrame::parse(text).unwrap();
            assert_eq!(frame.is_valid(), checksum::validate(text), "{}", text);
        }
    }

    #[test]
    fn test_from_parts() {
        let frame = CcdiFrame::from_parts('q', "0").unwrap();
        assert_eq!(frame.to_string(), "q010FE");
        assert_eq!(frame.to_wire(), "q010FE\r");

        let frame = CcdiFrame::from_parts('g', "23").unwrap();
        assert_eq!(frame.to_string(), "g0223D2");
    }

    #[test]
    fn test_from_parts_strips_whitespace() {
        let frame = CcdiFrame::from_parts('p', "21 12").unwrap();
        assert_eq!(frame.size(), 4);
        assert_eq!(frame.parameters(), Some("2112"));
        assert_eq!(frame.checksum(), "66");
    }

    #[test]
    fn test_from_parts_round_trips() {
        for (ident, params) in [
            ('q', "5064"),
            ('j', "047467"),
            ('s', "050800TESTHi!"),
            ('g', ""),
            ('f', " 0 5 2 "),
        ] {
            let frame = CcdiFrame::from_parts(ident, params).unwrap();
            assert!(frame.is_valid(), "{} should validate", frame);
            let parsed = CcdiFrame::parse(&frame.to_string()).unwrap();
            assert_eq!(parsed.params(), strip_whitespace(params));
            assert_eq!(parsed, frame);
        }
    }

    #[test]
    fn test_from_parts_rejects_oversized() {
        let params = "1".repeat(MAX_PARAMETERS_LEN + 1);
        assert!(matches!(
            CcdiFrame::from_parts('s', &params),
            Err(CcdiError::InvalidParameter(_))
        ));
    }
}
