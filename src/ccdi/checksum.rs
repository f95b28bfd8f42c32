// CCDI checksum
// Sum of every byte modulo 256, two's complement, rendered as 2 uppercase hex digits.

/// Calculate the checksum byte for a message without its checksum
pub fn checksum_byte(message: &str) -> u8 {
    let sum = message
        .bytes()
        .fold(0u8, |acc, byte| acc.wrapping_add(byte));
    twos_complement(sum)
}

/// Calculate the checksum for a message, as it appears on the wire
pub fn calculate(message: &str) -> String {
    format!("{:02X}", checksum_byte(message))
}

/// Validate a complete frame (message followed by 2 checksum characters)
///
/// Comparison is case-insensitive; the radio always sends uppercase but
/// diagnostics tools do not.
pub fn validate(frame: &str) -> bool {
    if frame.len() < 2 || !frame.is_char_boundary(frame.len() - 2) {
        return false;
    }

    let (message, checksum) = frame.split_at(frame.len() - 2);
    calculate(message).eq_ignore_ascii_case(checksum)
}

/// 0xFF - value + 1, wrapping at 8 bits
pub fn twos_complement(value: u8) -> u8 {
    0xFFu8.wrapping_sub(value).wrapping_add(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calculate_known_values() {
        assert_eq!(calculate("s0D050800TESTHi!"), "DA");
        assert_eq!(calculate("q010"), "FE");
        assert_eq!(calculate("q00"), "2F");
        assert_eq!(calculate("q011"), "FD");
        assert_eq!(calculate("q013"), "FB");
    }

    #[test]
    fn test_validate() {
        assert!(validate("q002F"));
        assert!(validate("q002f"));
        assert!(!validate("q002E"));
    }

    #[test]
    fn test_validate_responses() {
        assert!(validate("j06047469F2"));
        assert!(validate("j05047282C"));
        assert!(validate("p0205C9"));
    }

    #[test]
    fn test_validate_too_short() {
        assert!(!validate(""));
        assert!(!validate("F"));
    }

    #[test]
    fn test_twos_complement_wraps() {
        assert_eq!(twos_complement(0), 0);
        assert_eq!(twos_complement(1), 0xFF);
        assert_eq!(twos_complement(0xFF), 1);
    }
}
