//! Storage size quantities (`10Gi`, `512Mi`, `1G`, `1.5Ti`).

use std::fmt;

use crate::error::{ConfigError, ConfigResult};

const SUFFIXES: &[(&str, u64)] = &[
    ("Ki", 1 << 10),
    ("Mi", 1 << 20),
    ("Gi", 1 << 30),
    ("Ti", 1 << 40),
    ("Pi", 1 << 50),
    ("Ei", 1 << 60),
    ("k", 1_000),
    ("M", 1_000_000),
    ("G", 1_000_000_000),
    ("T", 1_000_000_000_000),
    ("P", 1_000_000_000_000_000),
    ("E", 1_000_000_000_000_000_000),
];

/// A parsed storage quantity.
///
/// Keeps the original text so manifests carry exactly what the operator
/// wrote, alongside the byte count used for validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quantity {
    text: String,
    bytes: u64,
}

impl Quantity {
    /// Parse a size string with an optional binary or decimal suffix.
    pub fn parse(value: &str) -> ConfigResult<Self> {
        let text = value.trim();
        let invalid = |reason: &str| ConfigError::InvalidQuantity {
            value: value.to_string(),
            reason: reason.to_string(),
        };

        if text.is_empty() {
            return Err(invalid("empty size"));
        }

        let (number, multiplier) = SUFFIXES
            .iter()
            .find_map(|(suffix, mult)| text.strip_suffix(suffix).map(|n| (n, *mult)))
            .unwrap_or((text, 1));

        if number.is_empty() || !number.chars().all(|c| c.is_ascii_digit() || c == '.') {
            return Err(invalid("expected a number followed by an optional unit suffix"));
        }

        let bytes = match number.split_once('.') {
            None => number
                .parse::<u64>()
                .ok()
                .and_then(|n| n.checked_mul(multiplier))
                .ok_or_else(|| invalid("value out of range"))?,
            Some((_, frac)) => {
                if frac.contains('.') || frac.is_empty() {
                    return Err(invalid("malformed decimal"));
                }
                let parsed: f64 = number.parse().map_err(|_| invalid("malformed decimal"))?;
                let total = parsed * multiplier as f64;
                if !total.is_finite() || total > u64::MAX as f64 {
                    return Err(invalid("value out of range"));
                }
                total.round() as u64
            }
        };

        if bytes == 0 {
            return Err(invalid("size must be positive"));
        }

        Ok(Self {
            text: text.to_string(),
            bytes,
        })
    }

    /// Size in bytes.
    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    /// The quantity as written.
    pub fn as_str(&self) -> &str {
        &self.text
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}
