use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Payload width in bits.
pub const PAYLOAD_BITS: usize = 64;
/// Number of hex digits in the canonical textual form.
pub const HEX_DIGITS: usize = PAYLOAD_BITS / 4;

/// A 64-bit watermark payload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Payload(u64);

impl Payload {
    /// Create a payload from its integer value.
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Raw integer value.
    pub const fn value(self) -> u64 {
        self.0
    }

    /// Derive a payload from an arbitrary label (creator id, asset name, ...).
    ///
    /// Uses the `hash * 33 + byte` string hash, so the mapping is stable
    /// across runs and platforms.
    pub fn from_label(label: &str) -> Self {
        let hash = label
            .bytes()
            .fold(0u64, |h, b| (h << 5).wrapping_add(h).wrapping_add(b as u64));
        Self(hash)
    }

    /// Strict hex parser. Accepts an optional `0x`/`0X` prefix followed by
    /// 1 to 16 hex digits and nothing else.
    pub fn parse_hex(hex: &str) -> Result<Self> {
        let digits = strip_prefix(hex.trim());
        if digits.is_empty() || digits.len() > HEX_DIGITS {
            return Err(Error::DecodeAmbiguous(hex.to_string()));
        }
        u64::from_str_radix(digits, 16)
            .map(Self)
            .map_err(|_| Error::DecodeAmbiguous(hex.to_string()))
    }

    /// Lenient hex parser used for config interchange.
    ///
    /// Reads the longest run of leading hex digits after an optional `0x`
    /// prefix. Input with no leading hex digits, or a value wider than
    /// 64 bits, yields the zero payload instead of an error.
    pub fn from_hex(hex: &str) -> Self {
        let digits = strip_prefix(hex.trim());
        let end = digits
            .find(|c: char| !c.is_ascii_hexdigit())
            .unwrap_or(digits.len());
        match u64::from_str_radix(&digits[..end], 16) {
            Ok(value) => Self(value),
            Err(_) => {
                warn!("malformed payload hex {hex:?}, defaulting to zero payload");
                Self(0)
            }
        }
    }

    /// Canonical `0x`-prefixed, zero-padded hex form.
    pub fn to_hex(self) -> String {
        format!("0x{:016x}", self.0)
    }

    /// XOR the payload with `mask`. Applying the same mask twice restores
    /// the original value.
    pub fn masked(self, mask: u64) -> Self {
        Self(self.0 ^ mask)
    }
}

impl From<u64> for Payload {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl std::fmt::Display for Payload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

fn strip_prefix(s: &str) -> &str {
    s.strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_round_trip() {
        let payload = Payload::new(0x0123_4567_89AB_CDEF);
        let hex = payload.to_hex();
        assert_eq!(hex, "0x0123456789abcdef");
        assert_eq!(Payload::from_hex(&hex), payload);
        assert_eq!(Payload::parse_hex(&hex).unwrap(), payload);
    }

    #[test]
    fn hex_is_zero_padded() {
        assert_eq!(Payload::new(0xFF).to_hex(), "0x00000000000000ff");
    }

    #[test]
    fn lenient_hex_defaults_to_zero() {
        assert_eq!(Payload::from_hex("not-hex"), Payload::default());
        assert_eq!(Payload::from_hex(""), Payload::default());
        assert_eq!(Payload::from_hex("0x"), Payload::default());
        // wider than 64 bits
        assert_eq!(Payload::from_hex("0x1ffffffffffffffff"), Payload::default());
    }

    #[test]
    fn lenient_hex_reads_leading_digits() {
        assert_eq!(Payload::from_hex("0x12zz"), Payload::new(0x12));
        assert_eq!(Payload::from_hex("  beef  "), Payload::new(0xBEEF));
    }

    #[test]
    fn strict_hex_rejects_garbage() {
        assert!(matches!(
            Payload::parse_hex("0x12zz"),
            Err(Error::DecodeAmbiguous(_))
        ));
        assert!(Payload::parse_hex("").is_err());
        assert!(Payload::parse_hex("0x00000000000000001").is_err());
    }

    #[test]
    fn label_hash_is_stable() {
        assert_eq!(Payload::from_label(""), Payload::new(0));
        // 'a' = 97
        assert_eq!(Payload::from_label("a"), Payload::new(97));
        // 97 * 33 + 98
        assert_eq!(Payload::from_label("ab"), Payload::new(97 * 33 + 98));
        assert_eq!(
            Payload::from_label("Creator123"),
            Payload::from_label("Creator123")
        );
        assert_ne!(
            Payload::from_label("Creator123"),
            Payload::from_label("Creator124")
        );
    }

    #[test]
    fn mask_is_an_involution() {
        let payload = Payload::new(0xDEAD_BEEF_0000_0001);
        let mask = 0x5A5A_5A5A_A5A5_A5A5;
        assert_ne!(payload.masked(mask), payload);
        assert_eq!(payload.masked(mask).masked(mask), payload);
    }
}
