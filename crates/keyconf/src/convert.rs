//! Conversion of raw source strings into typed values.
//!
//! [`convert`] is the lenient entry point used while building providers: it
//! never fails loudly, it logs and returns `None`. [`try_convert`] exposes the
//! underlying error for callers (and the strict registry mode) that want it.
//!
//! ```rust
//! use keyconf::{ConfigValue, ValueType, convert::convert};
//! use std::time::Duration;
//!
//! assert_eq!(convert("1.1", &ValueType::Float), Some(ConfigValue::Float(1.1)));
//! assert_eq!(
//!     convert("40m", &ValueType::Duration),
//!     Some(ConfigValue::Duration(Duration::from_secs(40 * 60)))
//! );
//! assert_eq!(convert("forty", &ValueType::Int), None);
//! ```

use std::collections::HashMap;
use std::num::{ParseFloatError, ParseIntError};
use std::time::Duration;

use miette::Diagnostic;
use thiserror::Error;

use crate::value::{ConfigValue, ValueType};

/// Why a raw string could not be converted to its declared type.
#[derive(Debug, Error, Diagnostic)]
#[non_exhaustive]
pub enum ConversionError {
    /// Not a base-10 integer.
    #[error("invalid int value {value:?}")]
    #[diagnostic(code(keyconf::convert::int))]
    Int {
        /// The raw input.
        value: String,
        /// The underlying parse error.
        #[source]
        source: ParseIntError,
    },

    /// Not a floating point number.
    #[error("invalid float value {value:?}")]
    #[diagnostic(code(keyconf::convert::float))]
    Float {
        /// The raw input.
        value: String,
        /// The underlying parse error.
        #[source]
        source: ParseFloatError,
    },

    /// Not a recognized boolean spelling.
    #[error("invalid bool value {value:?}")]
    #[diagnostic(
        code(keyconf::convert::bool),
        help("use one of: 1, t, T, TRUE, true, True, 0, f, F, FALSE, false, False")
    )]
    Bool {
        /// The raw input.
        value: String,
    },

    /// Not a duration expression.
    #[error("invalid duration {value:?}: {reason}")]
    #[diagnostic(
        code(keyconf::convert::duration),
        help("durations look like 300ms, 1.5s, 40m or 1h30m")
    )]
    Duration {
        /// The raw input.
        value: String,
        /// What was wrong with it.
        reason: &'static str,
    },

    /// Not a `key:int` list.
    #[error("invalid map data {value:?}: {reason}")]
    #[diagnostic(
        code(keyconf::convert::int_map),
        help("int maps look like key1:1,key2:2")
    )]
    IntMap {
        /// The raw input.
        value: String,
        /// What was wrong with it.
        reason: String,
    },

    /// The declared type tag is not one this crate supports.
    #[error("unknown value item type {tag:?}")]
    #[diagnostic(
        code(keyconf::convert::unknown_type),
        help("supported types: string, int, float, bool, duration, int_map")
    )]
    UnknownType {
        /// The unrecognized tag.
        tag: String,
    },
}

/// Converts `raw` into a value of `value_type`, logging on failure.
///
/// Failures are reported through `tracing` and yield `None`; callers treat
/// `None` as "no value for this key from this source".
#[must_use]
pub fn convert(raw: &str, value_type: &ValueType) -> Option<ConfigValue> {
    match try_convert(raw, value_type) {
        Ok(value) => Some(value),

        Err(ConversionError::UnknownType { tag }) => {
            tracing::warn!(value_type = %tag, "unknown value item type");
            None
        }

        Err(error) => {
            tracing::error!(%error, %value_type, "convert error");
            None
        }
    }
}

/// Converts `raw` into a value of `value_type`.
///
/// # Errors
///
/// Returns a [`ConversionError`] describing why `raw` is not a valid
/// `value_type`, or [`ConversionError::UnknownType`] for an unknown tag.
pub fn try_convert(raw: &str, value_type: &ValueType) -> Result<ConfigValue, ConversionError> {
    match value_type {
        ValueType::String => Ok(ConfigValue::String(raw.to_string())),

        ValueType::Int => parse_int(raw).map(ConfigValue::Int),

        ValueType::Float => raw
            .parse::<f64>()
            .map(ConfigValue::Float)
            .map_err(|source| ConversionError::Float {
                value: raw.to_string(),
                source,
            }),

        ValueType::Bool => parse_bool(raw).map(ConfigValue::Bool),

        ValueType::Duration => parse_duration(raw).map(ConfigValue::Duration),

        ValueType::IntMap => parse_int_map(raw).map(ConfigValue::IntMap),

        ValueType::Unknown(tag) => Err(ConversionError::UnknownType { tag: tag.clone() }),
    }
}

fn parse_int(raw: &str) -> Result<i64, ConversionError> {
    raw.parse::<i64>().map_err(|source| ConversionError::Int {
        value: raw.to_string(),
        source,
    })
}

/// Parses canonical boolean text.
///
/// # Errors
///
/// Returns [`ConversionError::Bool`] for anything outside the accepted set.
pub fn parse_bool(raw: &str) -> Result<bool, ConversionError> {
    match raw {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Ok(true),

        "0" | "f" | "F" | "FALSE" | "false" | "False" => Ok(false),

        _ => Err(ConversionError::Bool {
            value: raw.to_string(),
        }),
    }
}

/// Parses a comma separated list of `key:int` pairs.
///
/// One malformed pair rejects the whole input; no partial map is returned.
///
/// # Errors
///
/// Returns [`ConversionError::IntMap`] naming the offending pair.
pub fn parse_int_map(raw: &str) -> Result<HashMap<String, i64>, ConversionError> {
    let mut map = HashMap::new();

    for pair in raw.split(',') {
        let parts: Vec<&str> = pair.split(':').collect();
        let [key, value] = parts.as_slice() else {
            return Err(ConversionError::IntMap {
                value: raw.to_string(),
                reason: format!("entry {pair:?} is not a key:value pair"),
            });
        };

        let value = value.parse::<i64>().map_err(|e| ConversionError::IntMap {
            value: raw.to_string(),
            reason: format!("entry {pair:?}: {e}"),
        })?;

        map.insert((*key).to_string(), value);
    }

    Ok(map)
}

/// Parses a duration expression such as `300ms`, `1.5s` or `1h30m`.
///
/// The input is one or more `<decimal><unit>` terms with units `ns`, `us`
/// (`µs`, `μs`), `ms`, `s`, `m` and `h`. A bare `0` is accepted. Negative
/// values are rejected.
///
/// # Errors
///
/// Returns [`ConversionError::Duration`] when the input is malformed,
/// negative, or larger than `u64::MAX` nanoseconds.
pub fn parse_duration(raw: &str) -> Result<Duration, ConversionError> {
    let fail = |reason: &'static str| ConversionError::Duration {
        value: raw.to_string(),
        reason,
    };

    let mut s = raw;
    if let Some(rest) = s.strip_prefix('-') {
        if rest == "0" {
            return Ok(Duration::ZERO);
        }
        return Err(fail("negative durations are not supported"));
    }
    if let Some(rest) = s.strip_prefix('+') {
        s = rest;
    }

    if s == "0" {
        return Ok(Duration::ZERO);
    }
    if s.is_empty() {
        return Err(fail("empty duration"));
    }

    let mut total: u64 = 0;

    while !s.is_empty() {
        let int_len = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
        let (int_digits, rest) = s.split_at(int_len);

        let (frac_digits, rest) = match rest.strip_prefix('.') {
            Some(after_dot) => {
                let frac_len = after_dot
                    .find(|c: char| !c.is_ascii_digit())
                    .unwrap_or(after_dot.len());
                after_dot.split_at(frac_len)
            }
            None => ("", rest),
        };

        if int_digits.is_empty() && frac_digits.is_empty() {
            return Err(fail("expected a number"));
        }

        let unit_len = rest
            .find(|c: char| c == '.' || c.is_ascii_digit())
            .unwrap_or(rest.len());
        let (unit, rest) = rest.split_at(unit_len);

        let unit_nanos: u64 = match unit {
            "ns" => 1,
            "us" | "µs" | "μs" => 1_000,
            "ms" => 1_000_000,
            "s" => 1_000_000_000,
            "m" => 60 * 1_000_000_000,
            "h" => 60 * 60 * 1_000_000_000,
            "" => return Err(fail("missing unit")),
            _ => return Err(fail("unknown unit")),
        };

        let whole = if int_digits.is_empty() {
            0
        } else {
            int_digits
                .parse::<u64>()
                .map_err(|_| fail("duration out of range"))?
        };

        let mut nanos = whole
            .checked_mul(unit_nanos)
            .ok_or_else(|| fail("duration out of range"))?;

        if !frac_digits.is_empty() {
            // Digits past u64 precision are dropped.
            let mut fraction: u64 = 0;
            let mut scale: f64 = 1.0;
            for digit in frac_digits.bytes() {
                let Some(next) = fraction
                    .checked_mul(10)
                    .and_then(|f| f.checked_add(u64::from(digit - b'0')))
                else {
                    break;
                };
                fraction = next;
                scale *= 10.0;
            }

            #[allow(
                clippy::cast_precision_loss,
                clippy::cast_possible_truncation,
                clippy::cast_sign_loss
            )]
            let frac_nanos = (fraction as f64 * (unit_nanos as f64 / scale)) as u64;

            nanos = nanos
                .checked_add(frac_nanos)
                .ok_or_else(|| fail("duration out of range"))?;
        }

        total = total
            .checked_add(nanos)
            .ok_or_else(|| fail("duration out of range"))?;
        s = rest;
    }

    Ok(Duration::from_nanos(total))
}
