//! Source routing and value attribution.
//!
//! [`SourceKind`] is what a schema entry declares: which provider owns the
//! key. [`Origin`] records where a cell's initial value actually came from,
//! which may be the schema default when the source had nothing.

use std::fmt::{self, Display, Formatter};
use std::path::PathBuf;

use serde::{Deserialize, Deserializer};

/// The provider a schema entry is routed to.
///
/// Schema documents spell these `yaml` (or `document`) and `env` (or
/// `environment`). Any other spelling is kept as [`Unknown`](Self::Unknown)
/// and the entry is dropped from both partitions.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum SourceKind {
    /// The values document.
    Document,

    /// Process environment variables.
    Environment,

    /// A tag no provider serves.
    Unknown(String),
}

impl SourceKind {
    /// Parses a schema source tag.
    #[must_use]
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "yaml" | "document" => Self::Document,

            "env" | "environment" => Self::Environment,

            other => Self::Unknown(other.to_string()),
        }
    }

    /// Canonical tag as written in a schema document.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Document => "yaml",

            Self::Environment => "env",

            Self::Unknown(tag) => tag,
        }
    }
}

impl Display for SourceKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for SourceKind {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let tag = String::deserialize(deserializer)?;
        Ok(Self::from_tag(&tag))
    }
}

/// Where a cell's initial value came from.
#[derive(Clone, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum Origin {
    /// Read from the values document (file path or reader label).
    Document(String),

    /// Read from the named environment variable.
    Environment(String),

    /// Read from a dotenv file.
    Dotenv(PathBuf),

    /// Converted from the schema default.
    Default,

    /// Constructed directly, not by a provider.
    Runtime,
}

impl Display for Origin {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Document(origin) => write!(f, "Values document ({origin})"),

            Self::Environment(var) => write!(f, "Environment variable ({var})"),

            Self::Dotenv(path) => write!(f, ".env file ({})", path.display()),

            Self::Default => write!(f, "Schema default"),

            Self::Runtime => write!(f, "Runtime"),
        }
    }
}
