use std::fmt;
use std::str::FromStr;

use crate::error::VmmgrError;

/// Size suffixes `qemu-img` understands, case-insensitive, binary multiples.
const UNITS: &[(char, u64)] = &[
    ('B', 1),
    ('K', 1 << 10),
    ('M', 1 << 20),
    ('G', 1 << 30),
    ('T', 1 << 40),
    ('P', 1 << 50),
    ('E', 1 << 60),
];

/// Largest image size `qemu-img create` accepts.
const MAX_IMAGE_SIZE: u128 = i64::MAX as u128;

/// Fraction digits beyond this cannot change the byte count.
const MAX_FRACTION_DIGITS: usize = 19;

/// Virtual size for a new instance disk, as given to `--disk-size`.
///
/// Checked against the `qemu-img` size syntax, then passed on as typed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskSize(String);

impl FromStr for DiskSize {
    type Err = VmmgrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if parse_size(s)? == 0 {
            return Err(VmmgrError::Validation {
                message: "disk size must be greater than zero".into(),
            });
        }
        Ok(DiskSize(s.trim().to_string()))
    }
}

impl fmt::Display for DiskSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Parse a `qemu-img` size string into bytes.
///
/// A decimal number with an optional single-letter suffix (`B`, `K`, `M`,
/// `G`, `T`, `P`, `E`). Fractions need a unit larger than bytes: `1.5G` is
/// fine, `1.5` is not.
pub fn parse_size(s: &str) -> Result<u64, VmmgrError> {
    let s = s.trim();
    let invalid = |why: &str| VmmgrError::Validation {
        message: format!("invalid size '{s}': {why}"),
    };

    let split = s
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(s.len());
    let (number, suffix) = s.split_at(split);

    let multiplier = match suffix.chars().collect::<Vec<_>>().as_slice() {
        [] => 1,
        [c] => UNITS
            .iter()
            .find(|(unit, _)| unit.eq_ignore_ascii_case(c))
            .map(|(_, m)| *m)
            .ok_or_else(|| invalid("unknown suffix (use K, M, G, T, P or E)"))?,
        _ => return Err(invalid("unknown suffix (use K, M, G, T, P or E)")),
    };

    let (whole, fraction) = number.split_once('.').unwrap_or((number, ""));
    if whole.is_empty() && fraction.is_empty() {
        return Err(invalid("expected a number"));
    }
    if !fraction.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid("expected a number"));
    }
    if number.contains('.') && multiplier == 1 {
        return Err(invalid("fractional sizes need a unit such as M or G"));
    }

    let too_large = || invalid("larger than qemu-img allows");
    let whole: u128 = match whole {
        "" => 0,
        digits => digits.parse().map_err(|_| too_large())?,
    };
    let mut bytes = whole.checked_mul(multiplier as u128).ok_or_else(too_large)?;

    let fraction = &fraction[..fraction.len().min(MAX_FRACTION_DIGITS)];
    if !fraction.is_empty() {
        let numerator: u128 = fraction.parse().map_err(|_| invalid("expected a number"))?;
        let denominator = 10u128.pow(fraction.len() as u32);
        bytes += numerator * multiplier as u128 / denominator;
    }

    if bytes > MAX_IMAGE_SIZE {
        return Err(too_large());
    }
    Ok(bytes as u64)
}
