//! Strict parsing of human-readable byte quantities ("4G", "512M").
//!
//! A malformed quantity is always an explicit error - never a silent zero.
//! CPU counts are plain integers and are not handled here.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Byte-scaled unit suffixes. The set is closed and case-sensitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ByteUnit {
    Mebibytes,
    Gibibytes,
}

impl ByteUnit {
    pub fn suffix(self) -> &'static str {
        match self {
            Self::Mebibytes => "M",
            Self::Gibibytes => "G",
        }
    }
}

/// A parsed quantity: signed decimal magnitude plus a byte unit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceQuantity {
    magnitude: f64,
    unit: ByteUnit,
}

impl ResourceQuantity {
    pub fn mebibytes(magnitude: f64) -> Self {
        Self {
            magnitude,
            unit: ByteUnit::Mebibytes,
        }
    }

    pub fn gibibytes(magnitude: f64) -> Self {
        Self {
            magnitude,
            unit: ByteUnit::Gibibytes,
        }
    }

    /// Parse a quantity string: decimal magnitude followed by exactly one
    /// unit suffix (`M` or `G`). A bare number, unknown suffix, or
    /// non-numeric magnitude is an `InvalidQuantity` error.
    pub fn parse(text: &str) -> Result<Self> {
        let invalid = |reason: &str| Error::InvalidQuantity {
            text: text.to_string(),
            reason: reason.to_string(),
        };

        let trimmed = text.trim();
        let Some((last_index, last_char)) = trimmed.char_indices().last() else {
            return Err(invalid("empty quantity"));
        };

        let unit = match last_char {
            'M' => ByteUnit::Mebibytes,
            'G' => ByteUnit::Gibibytes,
            _ => return Err(invalid("missing or unrecognized unit suffix (expected M or G)")),
        };
        let magnitude_part = &trimmed[..last_index];

        if magnitude_part.is_empty() {
            return Err(invalid("missing magnitude"));
        }
        let magnitude: f64 = magnitude_part
            .parse()
            .map_err(|_| invalid("non-numeric magnitude"))?;
        if !magnitude.is_finite() {
            return Err(invalid("non-finite magnitude"));
        }

        Ok(Self { magnitude, unit })
    }

    pub fn magnitude(&self) -> f64 {
        self.magnitude
    }

    pub fn unit(&self) -> ByteUnit {
        self.unit
    }

    /// Convert to the common base unit (MiB) for arithmetic.
    pub fn as_mib(&self) -> f64 {
        match self.unit {
            ByteUnit::Mebibytes => self.magnitude,
            ByteUnit::Gibibytes => self.magnitude * 1024.0,
        }
    }
}

impl fmt::Display for ResourceQuantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.magnitude.fract() == 0.0 {
            write!(f, "{}{}", self.magnitude as i64, self.unit.suffix())
        } else {
            write!(f, "{}{}", self.magnitude, self.unit.suffix())
        }
    }
}

/// Render a MiB total back to the largest unit with an integer magnitude:
/// whole gibibytes as `G`, whole mebibytes as `M`, anything else as a
/// fractional `G`.
pub fn render_mib(mib: f64) -> String {
    let gib = mib / 1024.0;
    if gib.fract() == 0.0 {
        format!("{}G", gib as i64)
    } else if mib.fract() == 0.0 {
        format!("{}M", mib as i64)
    } else {
        format!("{}G", gib)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_gibibytes() {
        let q = ResourceQuantity::parse("4G").unwrap();
        assert_eq!(q.unit(), ByteUnit::Gibibytes);
        assert_eq!(q.magnitude(), 4.0);
        assert_eq!(q.as_mib(), 4096.0);
    }

    #[test]
    fn test_parse_mebibytes_converts_exactly() {
        let q = ResourceQuantity::parse("512M").unwrap();
        assert_eq!(q.as_mib(), 512.0);
        // 512M is exactly half a gibibyte
        assert_eq!(q.as_mib() / 1024.0, 0.5);
    }

    #[test]
    fn test_parse_fractional_magnitude() {
        let q = ResourceQuantity::parse("1.5G").unwrap();
        assert_eq!(q.as_mib(), 1536.0);
    }

    #[test]
    fn test_parse_unknown_suffix_is_an_error_not_zero() {
        let err = ResourceQuantity::parse("4X").unwrap_err();
        assert!(matches!(err, Error::InvalidQuantity { .. }));
        assert!(err.to_string().contains("4X"));
    }

    #[test]
    fn test_parse_rejects_bare_number() {
        assert!(ResourceQuantity::parse("4").is_err());
    }

    #[test]
    fn test_parse_rejects_lowercase_suffix() {
        assert!(ResourceQuantity::parse("4g").is_err());
        assert!(ResourceQuantity::parse("512m").is_err());
    }

    #[test]
    fn test_parse_rejects_garbage_magnitude() {
        assert!(ResourceQuantity::parse("xG").is_err());
        assert!(ResourceQuantity::parse("G").is_err());
        assert!(ResourceQuantity::parse("").is_err());
        assert!(ResourceQuantity::parse("4 G").is_err());
    }

    #[test]
    fn test_parse_signed_magnitude() {
        let q = ResourceQuantity::parse("-2G").unwrap();
        assert_eq!(q.as_mib(), -2048.0);
    }

    #[test]
    fn test_display_roundtrip() {
        assert_eq!(ResourceQuantity::parse("4G").unwrap().to_string(), "4G");
        assert_eq!(ResourceQuantity::parse("512M").unwrap().to_string(), "512M");
        assert_eq!(ResourceQuantity::parse("1.5G").unwrap().to_string(), "1.5G");
    }

    #[test]
    fn test_render_mib_prefers_whole_gibibytes() {
        assert_eq!(render_mib(4096.0), "4G");
        assert_eq!(render_mib(1536.0), "1536M");
        assert_eq!(render_mib(0.0), "0G");
        assert_eq!(render_mib(512.5), "0.50048828125G");
    }
}
