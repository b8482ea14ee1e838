//! Byte helpers
//!
//! Hex rendering for logs and ASCII number conversion for protocols that carry
//! numbers as text digits.

use std::fmt;

// —————————————————————————————————————————————————————————————————————————————————————————————————
//                                            Hex Dump
// —————————————————————————————————————————————————————————————————————————————————————————————————

/// Renders a byte slice as `[aa, 55, 04]`.
pub struct HexBytes<'a>(pub &'a [u8]);

impl fmt::Display for HexBytes<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, b) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{b:02x}")?;
        }
        write!(f, "]")
    }
}

impl fmt::Debug for HexBytes<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

// —————————————————————————————————————————————————————————————————————————————————————————————————
//                                          ASCII Numbers
// —————————————————————————————————————————————————————————————————————————————————————————————————

/// Decimal ASCII digits of `n`, left padded with `'0'` up to `width`.
/// Numbers wider than `width` are returned in full.
pub fn decimal_digits(n: u64, width: usize) -> Vec<u8> {
    format!("{n:0width$}").into_bytes()
}

/// Parses ASCII hex digits (`b"1A"` -> 26). `None` on empty or non-hex input.
pub fn parse_hex(bytes: &[u8]) -> Option<u64> {
    let text = std::str::from_utf8(bytes).ok()?;
    u64::from_str_radix(text, 16).ok()
}

// —————————————————————————————————————————————————————————————————————————————————————————————————
//                                              Tests
// —————————————————————————————————————————————————————————————————————————————————————————————————

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_bytes_format() {
        assert_eq!(HexBytes(&[0xAA, 0x05, 0x00]).to_string(), "[aa, 05, 00]");
        assert_eq!(HexBytes(&[]).to_string(), "[]");
    }

    #[test]
    fn decimal_digits_pads() {
        assert_eq!(decimal_digits(7, 3), b"007");
        assert_eq!(decimal_digits(1234, 2), b"1234");
        assert_eq!(decimal_digits(0, 0), b"0");
    }

    #[test]
    fn parse_hex_digits() {
        assert_eq!(parse_hex(b"1A"), Some(0x1A));
        assert_eq!(parse_hex(b"ff"), Some(0xFF));
        assert_eq!(parse_hex(b""), None);
        assert_eq!(parse_hex(b"zz"), None);
    }
}
