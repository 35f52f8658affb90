//! Size Notation
//!
//! Converts human-readable sizes ("10M", "2GB", "1.5 GiB") to byte counts and
//! back. Units are binary multiples: `K` = 1024, `M` = 1024², and so on.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

// =============================================================================
// Constants
// =============================================================================

pub const KIB: u64 = 1 << 10;
pub const MIB: u64 = 1 << 20;
pub const GIB: u64 = 1 << 30;
pub const TIB: u64 = 1 << 40;

/// Units used by [`format_size`], largest first
const DISPLAY_UNITS: [(&str, u64); 4] = [("TiB", TIB), ("GiB", GIB), ("MiB", MIB), ("KiB", KIB)];

/// Fractional digits accepted by the parser
const MAX_FRACTION_DIGITS: usize = 18;

// =============================================================================
// Size Input
// =============================================================================

/// A size as supplied by a caller: either raw bytes or human notation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SizeInput {
    Bytes(u64),
    Text(String),
}

impl SizeInput {
    /// Resolve to a byte count
    pub fn to_bytes(&self) -> Result<u64> {
        match self {
            SizeInput::Bytes(bytes) => Ok(*bytes),
            SizeInput::Text(text) => parse_size(text),
        }
    }
}

impl From<u64> for SizeInput {
    fn from(bytes: u64) -> Self {
        SizeInput::Bytes(bytes)
    }
}

impl From<&str> for SizeInput {
    fn from(text: &str) -> Self {
        SizeInput::Text(text.to_string())
    }
}

impl From<String> for SizeInput {
    fn from(text: String) -> Self {
        SizeInput::Text(text)
    }
}

impl FromStr for SizeInput {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        // Validate eagerly so command-line parsing reports bad sizes up front
        parse_size(s)?;
        Ok(SizeInput::Text(s.to_string()))
    }
}

impl std::fmt::Display for SizeInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SizeInput::Bytes(bytes) => write!(f, "{}", bytes),
            SizeInput::Text(text) => write!(f, "{}", text),
        }
    }
}

// =============================================================================
// Parsing
// =============================================================================

/// Parse a size string (e.g., "100M", "2GB", "512") to bytes
pub fn parse_size(s: &str) -> Result<u64> {
    let s = s.trim();
    if s.is_empty() {
        return Err(Error::InvalidSize("empty size string".into()));
    }

    // Find where the number ends and unit begins
    let num_end = s
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit() && *c != '.')
        .map(|(i, _)| i)
        .unwrap_or(s.len());

    let num_str = &s[..num_end];
    let unit_str = s[num_end..].trim();

    let multiplier = unit_multiplier(unit_str)
        .ok_or_else(|| Error::InvalidSize(format!("unknown unit '{}' in {}", unit_str, s)))?;

    let (whole_str, frac_str) = match num_str.split_once('.') {
        Some((whole, frac)) => (whole, frac.trim_end_matches('0')),
        None => (num_str, ""),
    };

    if whole_str.is_empty() && frac_str.is_empty() && !num_str.contains(|c: char| c.is_ascii_digit()) {
        return Err(Error::InvalidSize(format!("invalid number in {}", s)));
    }
    if frac_str.contains('.') || frac_str.len() > MAX_FRACTION_DIGITS {
        return Err(Error::InvalidSize(format!("invalid number: {}", num_str)));
    }

    let whole: u128 = if whole_str.is_empty() {
        0
    } else {
        whole_str
            .parse()
            .map_err(|_| Error::InvalidSize(format!("invalid number: {}", num_str)))?
    };

    let mut bytes = whole
        .checked_mul(multiplier as u128)
        .ok_or_else(|| Error::InvalidSize(format!("{} is too large", s)))?;

    if !frac_str.is_empty() {
        let frac: u128 = frac_str
            .parse()
            .map_err(|_| Error::InvalidSize(format!("invalid number: {}", num_str)))?;
        let scale = 10u128.pow(frac_str.len() as u32);
        let scaled = frac * multiplier as u128;
        if scaled % scale != 0 {
            return Err(Error::InvalidSize(format!(
                "{} is not a whole number of bytes",
                s
            )));
        }
        bytes += scaled / scale;
    }

    u64::try_from(bytes).map_err(|_| Error::InvalidSize(format!("{} is too large", s)))
}

/// Multiplier for a unit suffix, case-insensitive
fn unit_multiplier(unit: &str) -> Option<u64> {
    match unit.to_uppercase().as_str() {
        "" | "B" => Some(1),
        "K" | "KB" | "KI" | "KIB" => Some(KIB),
        "M" | "MB" | "MI" | "MIB" => Some(MIB),
        "G" | "GB" | "GI" | "GIB" => Some(GIB),
        "T" | "TB" | "TI" | "TIB" => Some(TIB),
        _ => None,
    }
}

// =============================================================================
// Formatting
// =============================================================================

/// Format a byte count for display
///
/// Picks the largest unit keeping the magnitude at or above one in which the
/// value is exact to two decimals, so the output always parses back to the
/// same byte count. Falls back to plain bytes.
pub fn format_size(bytes: u64) -> String {
    for (suffix, unit) in DISPLAY_UNITS {
        if bytes < unit {
            continue;
        }

        let scaled = bytes as u128 * 100;
        if scaled % unit as u128 != 0 {
            continue;
        }

        let hundredths = scaled / unit as u128;
        let whole = hundredths / 100;
        let frac = hundredths % 100;

        return if frac == 0 {
            format!("{}{}", whole, suffix)
        } else if frac % 10 == 0 {
            format!("{}.{}{}", whole, frac / 10, suffix)
        } else {
            format!("{}.{:02}{}", whole, frac, suffix)
        };
    }

    format!("{}B", bytes)
}
