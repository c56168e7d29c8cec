//! Declared value types and the runtime value union.
//!
//! Every key in the schema declares one of six [`ValueType`]s. Raw strings
//! from a source are converted into the matching [`ConfigValue`] variant by
//! [`convert`](crate::convert::convert).
//!
//! # Example
//!
//! ```rust
//! use keyconf::{ConfigValue, ValueType};
//!
//! let value = ConfigValue::Int(8080);
//! assert_eq!(value.value_type(), ValueType::Int);
//! assert_eq!(value.cast::<u16>(), Some(8080));
//! ```

use std::collections::HashMap;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;
use std::time::Duration;

use num_traits::NumCast;
use serde::{Deserialize, Deserializer};

// ============================================================================
// Macros for reducing boilerplate
// ============================================================================

/// Generates `From<T>` implementations for `ConfigValue`
macro_rules! impl_from_integer {
    ($($t:ty),+ $(,)?) => {
        $(
            impl From<$t> for ConfigValue {
                fn from(n: $t) -> Self {
                    ConfigValue::Int(n.into())
                }
            }
        )+
    };
}

// ============================================================================
// ValueType
// ============================================================================

/// The type a key is declared with in the schema.
///
/// | Tag | Variant | Rust type |
/// |-----|---------|-----------|
/// | `string` | [`String`](Self::String) | `String` |
/// | `int` | [`Int`](Self::Int) | `i64` |
/// | `float` | [`Float`](Self::Float) | `f64` |
/// | `bool` | [`Bool`](Self::Bool) | `bool` |
/// | `duration` | [`Duration`](Self::Duration) | [`std::time::Duration`] |
/// | `int_map` | [`IntMap`](Self::IntMap) | `HashMap<String, i64>` |
///
/// Unrecognized tags are kept as [`Unknown`](Self::Unknown) so the schema
/// still loads; such keys fail later, at conversion time.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum ValueType {
    /// Plain text.
    String,

    /// Base-10 signed integer.
    Int,

    /// 64-bit floating point.
    Float,

    /// Boolean.
    Bool,

    /// Human duration such as `40m` or `1h30m`.
    Duration,

    /// Comma separated `key:int` pairs.
    IntMap,

    /// A tag this crate does not know.
    Unknown(String),
}

impl ValueType {
    /// Canonical tag as written in a schema document.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::String => "string",

            Self::Int => "int",

            Self::Float => "float",

            Self::Bool => "bool",

            Self::Duration => "duration",

            Self::IntMap => "int_map",

            Self::Unknown(tag) => tag,
        }
    }

    /// Returns `true` for [`Unknown`](Self::Unknown).
    #[must_use]
    pub const fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown(_))
    }
}

impl FromStr for ValueType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "string" => Self::String,

            "int" => Self::Int,

            "float" => Self::Float,

            "bool" => Self::Bool,

            "duration" => Self::Duration,

            "int_map" | "int-map" => Self::IntMap,

            other => Self::Unknown(other.to_string()),
        })
    }
}

impl Display for ValueType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ValueType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let tag = String::deserialize(deserializer)?;
        let Ok(value_type) = tag.parse();
        Ok(value_type)
    }
}

// ============================================================================
// ConfigValue
// ============================================================================

/// A converted configuration value.
///
/// The active variant always matches the [`ValueType`] the key was declared
/// with; [`TypedValue`](crate::TypedValue) refuses updates that would change it.
#[derive(Clone, Debug, PartialEq)]
pub enum ConfigValue {
    /// A string value.
    String(String),

    /// A signed integer.
    Int(i64),

    /// A floating-point value.
    Float(f64),

    /// A boolean value.
    Bool(bool),

    /// A time span.
    Duration(Duration),

    /// A map of string keys to integers.
    IntMap(HashMap<String, i64>),
}

impl ConfigValue {
    /// The declared type this variant corresponds to.
    #[must_use]
    pub const fn value_type(&self) -> ValueType {
        match self {
            Self::String(_) => ValueType::String,

            Self::Int(_) => ValueType::Int,

            Self::Float(_) => ValueType::Float,

            Self::Bool(_) => ValueType::Bool,

            Self::Duration(_) => ValueType::Duration,

            Self::IntMap(_) => ValueType::IntMap,
        }
    }

    /// Returns `true` when `other` holds the same variant.
    #[must_use]
    pub fn same_variant(&self, other: &Self) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }

    /// Numeric cast of an `Int` or `Float` value.
    ///
    /// Returns `None` for non-numeric variants or when the value does not
    /// fit in `T`.
    #[must_use]
    pub fn cast<T: NumCast>(&self) -> Option<T> {
        match self {
            Self::Int(n) => T::from(*n),

            Self::Float(f) => T::from(*f),

            _ => None,
        }
    }
}

impl Display for ConfigValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => write!(f, "{s}"),

            Self::Int(n) => write!(f, "{n}"),

            Self::Float(x) => write!(f, "{x}"),

            Self::Bool(b) => write!(f, "{b}"),

            Self::Duration(d) => write!(f, "{d:?}"),

            Self::IntMap(map) => {
                let mut entries: Vec<_> = map.iter().collect();
                entries.sort();

                for (i, (k, v)) in entries.into_iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{k}:{v}")?;
                }

                Ok(())
            }
        }
    }
}

impl_from_integer!(i8, i16, i32, i64, u8, u16, u32);

impl From<String> for ConfigValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<&str> for ConfigValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<f64> for ConfigValue {
    fn from(x: f64) -> Self {
        Self::Float(x)
    }
}

impl From<bool> for ConfigValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<Duration> for ConfigValue {
    fn from(d: Duration) -> Self {
        Self::Duration(d)
    }
}

impl From<HashMap<String, i64>> for ConfigValue {
    fn from(map: HashMap<String, i64>) -> Self {
        Self::IntMap(map)
    }
}
