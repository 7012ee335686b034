//! Fixed-point decimal values.
//!
//! On the wire a decimal is a run of base-10^9 digit units:
//!
//! ```text
//! i32 precision | i32 scale | i32 integer_len | i32 fraction_len
//! u8 negative   | i32 unit_count | unit_count * i32 unit
//! ```
//!
//! Integer units are right-aligned (the first unit may hold fewer than nine
//! digits); fraction units are left-aligned and the last one is padded with
//! trailing zeros. Zero is laid out using the declared precision and scale so
//! that it reads back as e.g. `0.00` rather than `0`.

use crate::error::ProtocolError;
use crate::frame::{checked_length, WireRead, WireWrite};
use bytes::BufMut;
use std::fmt;
use std::io::Read;
use std::str::FromStr;

/// Decimal digits per wire unit.
pub const DIGITS_PER_UNIT: usize = 9;

const UNIT_BASE: u32 = 1_000_000_000;

/// An exact decimal number with a declared precision and scale.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Decimal {
    precision: i32,
    scale: i32,
    negative: bool,
    /// Integer digits without leading zeros; empty for a zero integer part.
    integer: String,
    /// Fraction digits, exactly `fraction_len` long.
    fraction: String,
}

impl Decimal {
    /// Creates a zero with the given precision and scale.
    pub fn zero(precision: i32, scale: i32) -> Self {
        Self {
            precision,
            scale,
            negative: false,
            integer: String::new(),
            fraction: "0".repeat(scale.max(0) as usize),
        }
    }

    /// Parses `text` and fits it to `precision` and `scale`. The fraction is
    /// padded or, when it carries only trailing zeros, trimmed to `scale`
    /// digits.
    pub fn with_precision(text: &str, precision: i32, scale: i32) -> Result<Self, ProtocolError> {
        if precision <= 0 || scale < 0 || scale > precision {
            return Err(ProtocolError::InvalidDecimal(format!(
                "precision {precision} and scale {scale}"
            )));
        }
        let parsed: Decimal = text.parse()?;
        let scale_len = scale as usize;

        let mut fraction = parsed.fraction;
        if fraction.len() > scale_len {
            if fraction[scale_len..].bytes().any(|b| b != b'0') {
                return Err(ProtocolError::InvalidDecimal(format!(
                    "{text} does not fit scale {scale}"
                )));
            }
            fraction.truncate(scale_len);
        }
        while fraction.len() < scale_len {
            fraction.push('0');
        }
        if parsed.integer.len() > (precision - scale) as usize {
            return Err(ProtocolError::InvalidDecimal(format!(
                "{text} does not fit precision {precision}"
            )));
        }

        let mut decimal = Self {
            precision,
            scale,
            negative: parsed.negative,
            integer: parsed.integer,
            fraction,
        };
        if decimal.is_zero() {
            decimal.negative = false;
        }
        Ok(decimal)
    }

    pub fn precision(&self) -> i32 {
        self.precision
    }

    pub fn scale(&self) -> i32 {
        self.scale
    }

    pub fn is_negative(&self) -> bool {
        self.negative
    }

    pub fn is_zero(&self) -> bool {
        self.integer.is_empty() && self.fraction.bytes().all(|b| b == b'0')
    }

    /// Converts to the nearest `f64`.
    pub fn to_f64(&self) -> f64 {
        self.to_string().parse().unwrap_or(0.0)
    }

    /// Writes the wire layout (without the tag).
    pub fn encode<B: BufMut>(&self, buf: &mut B) {
        let (integer_len, fraction_len, units) = if self.is_zero() {
            let integer_len = (self.precision - self.scale).max(0) as usize;
            let fraction_len = self.scale.max(0) as usize;
            let mut integer_len = integer_len;
            if integer_len == 0 && fraction_len == 0 {
                integer_len = 1;
            }
            let count = units_for(integer_len) + units_for(fraction_len);
            (integer_len, fraction_len, vec![0u32; count])
        } else {
            let mut units = integer_units(&self.integer);
            units.extend(fraction_units(&self.fraction));
            (self.integer.len(), self.fraction.len(), units)
        };

        buf.put_i32(self.precision);
        buf.put_i32(self.scale);
        buf.put_i32(integer_len as i32);
        buf.put_i32(fraction_len as i32);
        buf.put_wire_bool(self.negative);
        buf.put_i32(units.len() as i32);
        for unit in units {
            buf.put_i32(unit as i32);
        }
    }

    /// Reads the wire layout (without the tag).
    pub fn decode<R: Read + ?Sized>(reader: &mut R) -> Result<Self, ProtocolError> {
        let precision = reader.read_i32_wire()?;
        let scale = reader.read_i32_wire()?;
        let integer_len = checked_length(i64::from(reader.read_i32_wire()?))?;
        let fraction_len = checked_length(i64::from(reader.read_i32_wire()?))?;
        let negative = reader.read_bool_wire()?;
        let count = reader.read_count_wire()?;

        let integer_count = units_for(integer_len);
        if count < integer_count + units_for(fraction_len) {
            return Err(ProtocolError::InvalidDecimal(format!(
                "{count} units cannot hold {integer_len}+{fraction_len} digits"
            )));
        }

        let mut units = Vec::with_capacity(count);
        for _ in 0..count {
            let unit = reader.read_i32_wire()?;
            if unit < 0 || unit as u32 >= UNIT_BASE {
                return Err(ProtocolError::InvalidDecimal(format!(
                    "digit unit {unit} out of range"
                )));
            }
            units.push(unit as u32);
        }

        let mut integer = String::with_capacity(integer_len);
        for (i, unit) in units[..integer_count].iter().enumerate() {
            if i == 0 {
                integer.push_str(&unit.to_string());
            } else {
                integer.push_str(&format!("{unit:09}"));
            }
        }
        let integer = integer.trim_start_matches('0').to_string();

        let mut fraction = String::with_capacity(fraction_len + DIGITS_PER_UNIT);
        for unit in &units[integer_count..] {
            fraction.push_str(&format!("{unit:09}"));
        }
        fraction.truncate(fraction_len);

        let mut decimal = Self {
            precision,
            scale,
            negative,
            integer,
            fraction,
        };
        if decimal.is_zero() {
            decimal.negative = false;
        }
        Ok(decimal)
    }
}

fn units_for(digits: usize) -> usize {
    digits.div_ceil(DIGITS_PER_UNIT)
}

fn integer_units(digits: &str) -> Vec<u32> {
    let mut units = Vec::with_capacity(units_for(digits.len()));
    let head = digits.len() % DIGITS_PER_UNIT;
    if head > 0 {
        units.push(parse_unit(&digits[..head]));
    }
    let mut rest = &digits[head..];
    while !rest.is_empty() {
        units.push(parse_unit(&rest[..DIGITS_PER_UNIT]));
        rest = &rest[DIGITS_PER_UNIT..];
    }
    units
}

fn fraction_units(digits: &str) -> Vec<u32> {
    digits
        .as_bytes()
        .chunks(DIGITS_PER_UNIT)
        .map(|chunk| {
            let mut padded = String::from_utf8_lossy(chunk).into_owned();
            while padded.len() < DIGITS_PER_UNIT {
                padded.push('0');
            }
            parse_unit(&padded)
        })
        .collect()
}

// Callers only pass ASCII digit runs of at most nine characters.
fn parse_unit(digits: &str) -> u32 {
    digits.parse().unwrap_or(0)
}

impl FromStr for Decimal {
    type Err = ProtocolError;

    /// Parses `[-+]digits[.digits]`. Precision and scale are taken from the
    /// digits present.
    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let invalid = || ProtocolError::InvalidDecimal(text.to_string());
        let trimmed = text.trim();
        let (negative, body) = match trimmed.as_bytes().first() {
            Some(b'-') => (true, &trimmed[1..]),
            Some(b'+') => (false, &trimmed[1..]),
            _ => (false, trimmed),
        };
        let (int_part, frac_part) = match body.split_once('.') {
            Some((i, f)) => (i, f),
            None => (body, ""),
        };
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(invalid());
        }
        if !int_part.bytes().all(|b| b.is_ascii_digit())
            || !frac_part.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(invalid());
        }

        let integer = int_part.trim_start_matches('0').to_string();
        let fraction = frac_part.to_string();
        let scale = fraction.len() as i32;
        let precision = (integer.len() as i32 + scale).max(1);

        let mut decimal = Self {
            precision,
            scale,
            negative,
            integer,
            fraction,
        };
        if decimal.is_zero() {
            decimal.negative = false;
        }
        Ok(decimal)
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negative {
            f.write_str("-")?;
        }
        if self.integer.is_empty() {
            f.write_str("0")?;
        } else {
            f.write_str(&self.integer)?;
        }
        if !self.fraction.is_empty() {
            write!(f, ".{}", self.fraction)?;
        }
        Ok(())
    }
}
